//! Mode selection: let the user override the stored boot decision at power up.
//!
//! Overrides only change the in-memory [BootRecord] and are never persisted.
use bootmgr_state::record::{BootRecord, ImageId};
use defmt_or_log::info;

use crate::panel::{Button, Panel};
use crate::signal::blink;

/// Outcome of a [ModeSelector] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Selection {
    /// Image to boot.
    pub image: ImageId,
    /// The user asked the application to start in its safe mode.
    pub safe_boot: bool,
}

/// Policy run once per boot to adjust `record.active` from user input.
pub trait ModeSelector {
    fn select_image<P: Panel + ?Sized>(panel: &mut P, record: &mut BootRecord) -> Selection;
}

/// Blink window during which the safe boot button is watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub duration_ms: u32,
    pub period_ms: u32,
}

impl Window {
    /// Toggle the LED every period while the button stays held (or `force` is set), up to the window duration.
    ///
    /// Returns whether the button is still held afterwards.
    fn wait_while_blinking<P: Panel + ?Sized>(&self, panel: &mut P, force: bool) -> bool {
        let mut elapsed = 0;
        while (force || panel.is_asserted(Button::SafeBoot)) && elapsed < self.duration_ms {
            panel.toggle_led();
            panel.delay_ms(self.period_ms);
            elapsed += self.period_ms;
        }

        panel.is_asserted(Button::SafeBoot)
    }
}

/// Stages of [TimedHold].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HoldStage {
    /// No safe boot was requested.
    Idle,
    /// Released during sampling, the stored image boots in safe mode.
    Sampling,
    /// Released during the first regression window, the previous image boots in safe mode.
    Regress1,
    /// Held through the first regression window, the factory image is selected.
    Regress2,
    /// Terminal stage after [HoldStage::Regress2], the factory image boots in safe mode.
    FactoryForced,
}

/// Single button policy.
///
/// Holding the safe boot button at power up requests safe mode. Keeping it held first
/// regresses to the previous image, then to the factory image.
pub struct TimedHold;

impl TimedHold {
    /// Debounce delay before the button is sampled a second time.
    pub const SETTLE_MS: u32 = 500;
    pub const SAMPLING: Window = Window {
        duration_ms: 3000,
        period_ms: 500,
    };
    pub const REGRESS_1: Window = Window {
        duration_ms: 3000,
        period_ms: 250,
    };
    /// Shown whether or not the button is still held.
    pub const REGRESS_2: Window = Window {
        duration_ms: 1500,
        period_ms: 100,
    };

    /// Run the hold sequence, adjusting `record.active` as the stages pass.
    ///
    /// Returns the last stage reached.
    pub fn run<P: Panel + ?Sized>(panel: &mut P, record: &mut BootRecord) -> HoldStage {
        if !Self::requested(panel) {
            return HoldStage::Idle;
        }

        let mut stage = HoldStage::Sampling;
        while let Some(next) = Self::step(panel, record, stage) {
            stage = next;
        }

        panel.set_led(false);
        stage
    }

    /// Wait out the window of `stage`, returning the stage that follows it, if any.
    fn step<P: Panel + ?Sized>(panel: &mut P, record: &mut BootRecord, stage: HoldStage) -> Option<HoldStage> {
        match stage {
            HoldStage::Idle | HoldStage::FactoryForced => None,
            HoldStage::Sampling => Self::SAMPLING.wait_while_blinking(panel, false).then(|| {
                record.active = record.previous;
                HoldStage::Regress1
            }),
            HoldStage::Regress1 => Self::REGRESS_1.wait_while_blinking(panel, false).then(|| {
                record.active = ImageId::Factory;
                HoldStage::Regress2
            }),
            HoldStage::Regress2 => {
                Self::REGRESS_2.wait_while_blinking(panel, true);
                Some(HoldStage::FactoryForced)
            }
        }
    }

    fn requested<P: Panel + ?Sized>(panel: &mut P) -> bool {
        if panel.is_asserted(Button::SafeBoot) {
            panel.delay_ms(Self::SETTLE_MS);
        }
        panel.is_asserted(Button::SafeBoot)
    }
}

impl ModeSelector for TimedHold {
    fn select_image<P: Panel + ?Sized>(panel: &mut P, record: &mut BootRecord) -> Selection {
        let stage = Self::run(panel, record);
        if stage != HoldStage::Idle {
            info!("Safe boot requested, reached {:?}, booting {:?}", stage, record.active);
        }

        Selection {
            image: record.active,
            safe_boot: stage != HoldStage::Idle,
        }
    }
}

/// Two button policy.
///
/// While the confirm button ([Button::SafeBoot]) is held, each press of the advance button
/// selects the next image of the cycle, and the LED blinks the selection number.
pub struct PressToCycle;

impl PressToCycle {
    pub const POLL_MS: u32 = 10;
    pub const BLINK_MS: u32 = 100;
    /// Pause between two announcements of the selection.
    pub const PAUSE_MS: u32 = 500;

    fn wait_for_release<P: Panel + ?Sized>(panel: &mut P, button: Button) {
        while panel.is_asserted(button) {
            panel.delay_ms(Self::POLL_MS);
        }
    }
}

impl ModeSelector for PressToCycle {
    fn select_image<P: Panel + ?Sized>(panel: &mut P, record: &mut BootRecord) -> Selection {
        panel.set_led(true);

        Self::wait_for_release(panel, Button::Advance);
        while panel.is_asserted(Button::SafeBoot) {
            if panel.is_asserted(Button::Advance) {
                record.active = record.active.next_in_cycle();
                info!("Selected {:?}", record.active);
                Self::wait_for_release(panel, Button::Advance);
            }

            blink(panel, record.active.index() as u32 + 1, Self::BLINK_MS);
            panel.delay_ms(Self::PAUSE_MS);
        }

        panel.set_led(false);
        Selection {
            image: record.active,
            safe_boot: false,
        }
    }
}
