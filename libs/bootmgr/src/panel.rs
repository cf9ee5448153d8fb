//! User facing I/O: the status LED, the buttons, and the busy-wait delay timing them.
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, StatefulOutputPin};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Button {
    /// Safe boot pin of single button boards, confirm button of two button boards.
    SafeBoot,
    /// Advance button of two button boards.
    Advance,
}

/// Status LED, buttons and delay of a board.
pub trait Panel {
    fn set_led(&mut self, on: bool);

    fn toggle_led(&mut self);

    /// Whether `button` is pressed right now.
    ///
    /// A button that cannot be read counts as released.
    fn is_asserted(&mut self, button: Button) -> bool;

    /// Busy wait for `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32);
}

/// Electrical level of a pressed button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ActiveLevel {
    High,
    Low,
}

/// [Panel] built from `embedded-hal` pins and delay.
pub struct GpioPanel<L, P, D> {
    led: L,
    safe_boot: P,
    advance: Option<P>,
    active_level: ActiveLevel,
    delay: D,
}

impl<L, P, D> GpioPanel<L, P, D> {
    /// Panel with a single, active high, safe boot button.
    pub fn new(led: L, safe_boot: P, delay: D) -> Self {
        Self {
            led,
            safe_boot,
            advance: None,
            active_level: ActiveLevel::High,
            delay,
        }
    }

    /// Add the advance button of two button boards.
    pub fn with_advance(mut self, advance: P) -> Self {
        self.advance = Some(advance);
        self
    }

    pub fn with_active_level(mut self, active_level: ActiveLevel) -> Self {
        self.active_level = active_level;
        self
    }
}

impl<L: StatefulOutputPin, P: InputPin, D: DelayNs> Panel for GpioPanel<L, P, D> {
    fn set_led(&mut self, on: bool) {
        let _ = if on { self.led.set_high() } else { self.led.set_low() };
    }

    fn toggle_led(&mut self) {
        let _ = self.led.toggle();
    }

    fn is_asserted(&mut self, button: Button) -> bool {
        let pin = match button {
            Button::SafeBoot => &mut self.safe_boot,
            Button::Advance => match self.advance.as_mut() {
                Some(pin) => pin,
                None => return false,
            },
        };

        let level = match self.active_level {
            ActiveLevel::High => pin.is_high(),
            ActiveLevel::Low => pin.is_low(),
        };
        level.unwrap_or(false)
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }
}
