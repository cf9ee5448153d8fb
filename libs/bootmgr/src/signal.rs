//! Failure reporting through LED blink patterns.
use crate::panel::Panel;
use crate::Board;

/// Blink period while announcing the stage of a fault.
pub const STAGE_PERIOD_MS: u32 = 500;

/// Blink period while announcing the error code of a fault.
pub const CODE_PERIOD_MS: u32 = 1000;

/// Blinks shown before each fallback to the next candidate image.
pub const FALLBACK_BLINKS: u32 = 10;
pub const FALLBACK_PERIOD_MS: u32 = 33;

/// Periods of the three bursts of three blinks shown while halted.
pub const HALT_PERIODS_MS: [u32; 3] = [33, 66, 33];

/// Storage failure, with the raw error code of the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fault {
    /// Mounting the removable medium failed.
    Mount(u8),
    /// Opening an image file failed.
    Open(u8),
    /// Reading an image file failed.
    Read(u8),
}

impl Fault {
    /// Number of blinks identifying the failed stage.
    pub const fn stage(&self) -> u32 {
        match self {
            Fault::Mount(_) => 2,
            Fault::Open(_) => 3,
            Fault::Read(_) => 4,
        }
    }

    pub const fn code(&self) -> u8 {
        match *self {
            Fault::Mount(code) | Fault::Open(code) | Fault::Read(code) => code,
        }
    }
}

/// Light the LED `times` times, each for `period_ms`, with equally long dark gaps.
pub fn blink<P: Panel + ?Sized>(panel: &mut P, times: u32, period_ms: u32) {
    for _ in 0..times {
        panel.set_led(true);
        panel.delay_ms(period_ms);
        panel.set_led(false);
        panel.delay_ms(period_ms);
    }
}

/// Show the stage of `fault`, then its error code.
///
/// The code is shown as a raw count of slow blinks, which is nothing for code `0`.
pub fn report<P: Panel + ?Sized>(panel: &mut P, fault: Fault) {
    match fault {
        Fault::Mount(_) => {
            panel.delay_ms(500);
            blink(panel, fault.stage(), STAGE_PERIOD_MS);
            panel.delay_ms(500);
            blink(panel, fault.code().into(), CODE_PERIOD_MS);
        }
        Fault::Open(_) | Fault::Read(_) => {
            panel.delay_ms(1000);
            blink(panel, fault.stage(), STAGE_PERIOD_MS);
            panel.delay_ms(2000);
            blink(panel, fault.code().into(), CODE_PERIOD_MS);
            panel.delay_ms(2000);
        }
    }
}

/// Announce that the next candidate image is about to be tried.
pub fn warn_fallback<P: Panel + ?Sized>(panel: &mut P) {
    blink(panel, FALLBACK_BLINKS, FALLBACK_PERIOD_MS);
}

/// Show the generic fault pattern forever, sleeping in between.
pub fn halt<B: Board + ?Sized>(board: &mut B) -> ! {
    loop {
        let panel = board.panel();
        for period_ms in HALT_PERIODS_MS {
            blink(panel, 3, period_ms);
        }
        panel.set_led(true);

        board.wait_for_interrupt();
    }
}
