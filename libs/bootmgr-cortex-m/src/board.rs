//! [Board] for Cortex-M parts that copy images into RAM and start them from there.
use bootmgr::panel::{GpioPanel, Panel};
use bootmgr::select::ModeSelector;
use bootmgr::state::volume::{ReadVolume, Volume};
use bootmgr::verify::HashEngine;
use bootmgr::{Board, BootError, Mount, Parts};
use defmt_or_log::warn;

use crate::{ExecutionRegion, SpinDelay};

/// [GpioPanel] timed by busy-waiting on the core clock.
pub type SpinPanel<L, P> = GpioPanel<L, P, SpinDelay>;

/// Drivers and policies the integrator brings to a [CortexM] board.
#[allow(async_fn_in_trait)]
pub trait CortexMConfig {
    type Flash: Volume;
    /// [bootmgr::state::volume::NoMedium] for boards without a card slot.
    type Removable: ReadVolume;
    /// [bootmgr::verify::SoftwareMd5] unless the part has a hash accelerator.
    type Hasher: HashEngine;
    type Panel: Panel;
    type Selector: ModeSelector;

    /// Mount the removable medium.
    async fn mount_removable(
        &mut self,
        _removable: &mut Self::Removable,
    ) -> Mount<<Self::Removable as ReadVolume>::Error> {
        Mount::Unsupported
    }

    /// Stop the network and radio services, waiting a bounded time for them to finish.
    fn stop_network(&mut self);

    fn request_safe_boot(&mut self) {}

    fn signal_first_boot(&mut self) {}
}

pub struct Devices<C: CortexMConfig> {
    pub flash: C::Flash,
    pub removable: C::Removable,
    pub hasher: C::Hasher,
    pub panel: C::Panel,
}

pub struct CortexM<C: CortexMConfig> {
    config: C,
    devices: Devices<C>,
    region: ExecutionRegion,
}

impl<C: CortexMConfig> CortexM<C> {
    pub fn new(config: C, devices: Devices<C>, region: ExecutionRegion) -> Self {
        Self {
            config,
            devices,
            region,
        }
    }
}

impl<C: CortexMConfig> Board for CortexM<C> {
    type Flash = C::Flash;
    type Removable = C::Removable;
    type Hasher = C::Hasher;
    type Panel = C::Panel;
    type Selector = C::Selector;

    fn parts(&mut self) -> Parts<'_, Self> {
        let Devices {
            flash,
            removable,
            hasher,
            panel,
        } = &mut self.devices;

        Parts {
            flash,
            removable,
            hasher,
            panel,
            region: self.region.as_mut_slice(),
        }
    }

    async fn mount_removable(&mut self) -> Mount<<Self::Removable as ReadVolume>::Error> {
        self.config.mount_removable(&mut self.devices.removable).await
    }

    fn stop_network(&mut self) {
        self.config.stop_network();
    }

    fn check_image(&mut self, len: usize) -> Result<(), BootError> {
        match self.region.check(len) {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("Image does not start with a usable vector table: {:?}", e);
                Err(BootError::Rejected)
            }
        }
    }

    fn run_application(&mut self, len: usize) -> ! {
        self.region.run(len)
    }

    fn wait_for_interrupt(&mut self) {
        crate::wait_for_interrupt();
    }

    fn request_safe_boot(&mut self) {
        self.config.request_safe_boot();
    }

    fn signal_first_boot(&mut self) {
        self.config.signal_first_boot();
    }
}
