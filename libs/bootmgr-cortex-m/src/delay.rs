use embedded_hal::delay::DelayNs;

/// Busy-wait delay counting core cycles.
///
/// Needs no timer, so it leaves every peripheral untouched for the application.
pub struct SpinDelay {
    sysclk_hz: u32,
}

impl SpinDelay {
    pub const fn new(sysclk_hz: u32) -> Self {
        Self { sysclk_hz }
    }
}

/// Core cycles spanning at least `ns` nanoseconds.
fn cycles(sysclk_hz: u32, ns: u32) -> u32 {
    let cycles = (u64::from(ns) * u64::from(sysclk_hz)).div_ceil(1_000_000_000);
    u32::try_from(cycles).unwrap_or(u32::MAX)
}

impl DelayNs for SpinDelay {
    fn delay_ns(&mut self, ns: u32) {
        cortex_m::asm::delay(cycles(self.sysclk_hz, ns));
    }
}
