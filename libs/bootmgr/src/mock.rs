//! Peripherals and a board running on virtual time, for testing.
use core::cell::{Cell, RefCell};
use core::convert::Infallible;
use core::marker::PhantomData;
use core::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::vec::Vec;

use bootmgr_state::volume::mock::{MockVolume, MockVolumeError};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin, StatefulOutputPin};
use md5::Digest;

use crate::panel::GpioPanel;
use crate::select::ModeSelector;
use crate::verify::{HashEngine, SoftwareMd5, DIGEST_SIZE, HEX_DIGEST_SIZE};
use crate::{Board, BootError, Mount, Parts};

/// Size of the execution region of [MockBoard].
pub const REGION_SIZE: usize = 4096;

/// Virtual time in nanoseconds, only advanced by [MockDelay].
#[derive(Debug, Clone, Default)]
pub struct Clock(Rc<Cell<u64>>);

impl Clock {
    pub fn now_ms(&self) -> u64 {
        self.0.get() / 1_000_000
    }

    fn advance_ns(&self, ns: u64) {
        self.0.set(self.0.get() + ns);
    }
}

pub struct MockDelay {
    clock: Clock,
}

impl MockDelay {
    pub fn new(clock: &Clock) -> Self {
        Self { clock: clock.clone() }
    }
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.clock.advance_ns(ns.into());
    }

    fn delay_ms(&mut self, ms: u32) {
        self.clock.advance_ns(u64::from(ms) * 1_000_000);
    }
}

/// Active high button, held during the given windows of virtual time in milliseconds.
pub struct MockButton {
    clock: Clock,
    held: Vec<Range<u64>>,
}

impl MockButton {
    pub fn new(clock: &Clock, held: Vec<Range<u64>>) -> Self {
        Self {
            clock: clock.clone(),
            held,
        }
    }
}

impl ErrorType for MockButton {
    type Error = Infallible;
}

impl InputPin for MockButton {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        let now = self.clock.now_ms();
        Ok(self.held.iter().any(|window| window.contains(&now)))
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

/// Every level set on a [MockLed], with its timestamp in milliseconds.
pub type LedTrace = Rc<RefCell<Vec<(u64, bool)>>>;

pub struct MockLed {
    clock: Clock,
    level: bool,
    trace: LedTrace,
}

impl MockLed {
    pub fn new(clock: &Clock) -> (Self, LedTrace) {
        let trace = LedTrace::default();
        let led = Self {
            clock: clock.clone(),
            level: false,
            trace: trace.clone(),
        };
        (led, trace)
    }

    fn set(&mut self, level: bool) {
        self.level = level;
        self.trace.borrow_mut().push((self.clock.now_ms(), level));
    }
}

impl ErrorType for MockLed {
    type Error = Infallible;
}

impl OutputPin for MockLed {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.set(true);
        Ok(())
    }
}

impl StatefulOutputPin for MockLed {
    fn is_set_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.level)
    }

    fn is_set_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.level)
    }
}

/// Number of times the LED went from off to on.
pub fn rising_edges(trace: &LedTrace) -> usize {
    let mut level = false;
    let mut edges = 0;
    for &(_, on) in trace.borrow().iter() {
        if on && !level {
            edges += 1;
        }
        level = on;
    }
    edges
}

pub type MockPanel = GpioPanel<MockLed, MockButton, MockDelay>;

/// Two button panel with the given hold windows.
pub fn test_panel(clock: &Clock, safe_boot: Vec<Range<u64>>, advance: Vec<Range<u64>>) -> (MockPanel, LedTrace) {
    let (led, trace) = MockLed::new(clock);
    let panel = GpioPanel::new(led, MockButton::new(clock, safe_boot), MockDelay::new(clock))
        .with_advance(MockButton::new(clock, advance));
    (panel, trace)
}

/// Software MD5 counting how often a digest is started.
#[derive(Default)]
pub struct CountingMd5 {
    inner: SoftwareMd5,
    pub starts: usize,
}

impl HashEngine for CountingMd5 {
    fn start(&mut self, total_len: usize) {
        self.starts += 1;
        self.inner.start(total_len);
    }

    fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    fn finalize(&mut self) -> [u8; DIGEST_SIZE] {
        self.inner.finalize()
    }
}

/// `payload` followed by its hex encoded MD5 digest.
pub fn signed_image(payload: &[u8]) -> Vec<u8> {
    let mut digest = [0u8; HEX_DIGEST_SIZE];
    hex::encode_to_slice(md5::Md5::digest(payload), &mut digest).unwrap();
    [payload, &digest[..]].concat()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    FirstBoot,
    SafeBoot,
    NetworkStopped,
}

/// How a [MockBoard] left [crate::start].
#[derive(Debug)]
pub enum Outcome {
    Launched { image: Vec<u8>, events: Vec<Event> },
    Halted { events: Vec<Event> },
}

impl Outcome {
    /// Contents of the launched image, if any.
    pub fn launched(&self) -> Option<&[u8]> {
        match self {
            Outcome::Launched { image, .. } => Some(image.as_slice()),
            Outcome::Halted { .. } => None,
        }
    }

    pub fn events(&self) -> &[Event] {
        match self {
            Outcome::Launched { events, .. } | Outcome::Halted { events } => events,
        }
    }
}

/// Board whose application launch and sleep unwind out of [crate::start] with an [Outcome].
pub struct MockBoard<'a, S> {
    flash: &'a mut MockVolume,
    removable: &'a mut MockVolume,
    hasher: &'a mut CountingMd5,
    panel: MockPanel,
    mount: Mount<MockVolumeError>,
    /// Images starting with this prefix are rejected by [Board::check_image].
    reject: Option<&'static [u8]>,
    region: Vec<u8>,
    events: Vec<Event>,
    _selector: PhantomData<S>,
}

impl<'a, S> MockBoard<'a, S> {
    pub fn new(
        flash: &'a mut MockVolume,
        removable: &'a mut MockVolume,
        hasher: &'a mut CountingMd5,
        panel: MockPanel,
    ) -> Self {
        Self {
            flash,
            removable,
            hasher,
            panel,
            mount: Mount::Unsupported,
            reject: None,
            region: vec![0; REGION_SIZE],
            events: Vec::new(),
            _selector: PhantomData,
        }
    }

    pub fn with_mount(mut self, mount: Mount<MockVolumeError>) -> Self {
        self.mount = mount;
        self
    }

    pub fn rejecting(mut self, prefix: &'static [u8]) -> Self {
        self.reject = Some(prefix);
        self
    }
}

impl<S: ModeSelector> Board for MockBoard<'_, S> {
    type Flash = MockVolume;
    type Removable = MockVolume;
    type Hasher = CountingMd5;
    type Panel = MockPanel;
    type Selector = S;

    fn parts(&mut self) -> Parts<'_, Self> {
        Parts {
            flash: &mut *self.flash,
            removable: &mut *self.removable,
            hasher: &mut *self.hasher,
            panel: &mut self.panel,
            region: self.region.as_mut_slice(),
        }
    }

    async fn mount_removable(&mut self) -> Mount<MockVolumeError> {
        core::mem::replace(&mut self.mount, Mount::Unsupported)
    }

    fn stop_network(&mut self) {
        self.events.push(Event::NetworkStopped);
    }

    fn check_image(&mut self, len: usize) -> Result<(), BootError> {
        match self.reject {
            Some(prefix) if self.region[..len].starts_with(prefix) => Err(BootError::Rejected),
            _ => Ok(()),
        }
    }

    fn run_application(&mut self, len: usize) -> ! {
        panic::panic_any(Outcome::Launched {
            image: self.region[..len].to_vec(),
            events: core::mem::take(&mut self.events),
        })
    }

    fn wait_for_interrupt(&mut self) {
        panic::panic_any(Outcome::Halted {
            events: core::mem::take(&mut self.events),
        })
    }

    fn request_safe_boot(&mut self) {
        self.events.push(Event::SafeBoot);
    }

    fn signal_first_boot(&mut self) {
        self.events.push(Event::FirstBoot);
    }
}

/// Run the boot manager on `board` until it launches an image or halts.
pub fn run<S: ModeSelector>(board: MockBoard<'_, S>) -> Outcome {
    let payload = panic::catch_unwind(AssertUnwindSafe(|| {
        embassy_futures::block_on(crate::start(board));
    }))
    .expect_err("boot manager returned");

    match payload.downcast::<Outcome>() {
        Ok(outcome) => *outcome,
        Err(payload) => panic::resume_unwind(payload),
    }
}
