#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

use bootmgr_state::record::{BootRecord, ImageId};
use bootmgr_state::store::{Fetched, RecordFile};
use bootmgr_state::volume::{ReadVolume, StorageError, Volume};
use defmt_or_log::{error, info, warn};

pub mod loader;
pub mod panel;
pub mod select;
pub mod signal;
pub mod verify;

#[cfg(test)]
mod mock;

pub use bootmgr_state as state;

use loader::Medium;
use panel::Panel;
use select::ModeSelector;
use verify::HashEngine;

/// Mutable access to the capabilities of a [Board] at once.
pub struct Parts<'a, B: Board + ?Sized> {
    /// On-board flash, holding the boot record and the flash images.
    pub flash: &'a mut B::Flash,
    pub removable: &'a mut B::Removable,
    pub hasher: &'a mut B::Hasher,
    pub panel: &'a mut B::Panel,
    /// Memory images are copied into before they run.
    pub region: &'a mut [u8],
}

/// Result of mounting the removable medium.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mount<E> {
    /// The board has no removable medium.
    Unsupported,
    Mounted,
    Failed(E),
}

/// A board that can boot an application image.
///
/// Typically a board wraps the filesystem drivers of its flash and removable medium,
/// its status LED and buttons, and the intrinsics to jump into a loaded image.
#[allow(async_fn_in_trait)]
pub trait Board {
    type Flash: Volume;
    type Removable: ReadVolume;
    type Hasher: HashEngine;
    type Panel: Panel;
    /// Mode selection policy built into this device.
    type Selector: ModeSelector;

    /// Give mutable references to the capabilities the boot manager drives.
    fn parts(&mut self) -> Parts<'_, Self>;

    /// Give a mutable reference to the [Panel].
    fn panel(&mut self) -> &mut Self::Panel {
        self.parts().panel
    }

    /// Mount the removable medium, if the board has one.
    async fn mount_removable(&mut self) -> Mount<<Self::Removable as ReadVolume>::Error>;

    /// Stop the network and radio services, waiting a bounded time for them to finish.
    fn stop_network(&mut self);

    /// Check that the image of `len` bytes just loaded into the execution region can be started.
    ///
    /// Called before anything is shut down, so a rejected image falls back to the next candidate.
    fn check_image(&mut self, _len: usize) -> Result<(), BootError> {
        Ok(())
    }

    /// Transfer control to the image of `len` bytes accepted by [Board::check_image].
    fn run_application(&mut self, len: usize) -> !;

    /// Sleep until the next interrupt.
    fn wait_for_interrupt(&mut self);

    /// Ask the application about to be started to come up in its safe mode.
    fn request_safe_boot(&mut self) {}

    /// Called once after the initial boot record was stored.
    fn signal_first_boot(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootError {
    /// Image file could not be opened, with the code of the storage driver.
    Open(u8),
    /// Image file is empty.
    Empty,
    /// Image does not fit the execution region.
    TooLarge,
    /// Reading the image failed, with the code of the storage driver.
    Read(u8),
    /// Image file ended before its reported length.
    ShortRead,
    /// Loaded image was rejected by the board.
    Rejected,
}

/// Run the mode selector, and forward a safe boot request.
fn select<B: Board>(board: &mut B, record: &mut BootRecord) {
    let selection = B::Selector::select_image(board.panel(), record);
    if selection.safe_boot {
        board.request_safe_boot();
    }
}

async fn boot_flash<B: Board>(board: &mut B, record: &mut BootRecord) {
    loader::settle_pending(board, record).await;
    select(board, record);
    loader::boot_chain(board, loader::flash_chain(record)).await;
}

async fn boot<B: Board>(board: &mut B, record: &mut BootRecord) {
    match board.mount_removable().await {
        Mount::Mounted => {
            info!("Removable medium mounted, booting from it");
            select(board, record);
            loader::boot_chain(board, loader::removable_chain(record.active)).await;
        }
        Mount::Failed(e) => {
            warn!("Failed to mount removable medium: code {}", e.code());
            signal::report(board.panel(), signal::Fault::Mount(e.code()));
            boot_flash(board, record).await;
        }
        Mount::Unsupported => boot_flash(board, record).await,
    }
}

pub async fn start<B: Board>(mut board: B) -> ! {
    // Fetch the record or store the initial one.
    let fetched = RecordFile::new(board.parts().flash).load_or_create().await;
    match fetched {
        Ok(Fetched { mut record, first_boot }) => {
            if first_boot {
                board.signal_first_boot();
            }
            boot(&mut board, &mut record).await;
        }
        Err(e) => {
            // Without a record there is nothing to select from, only the factory image is eligible.
            error!("Failed to store initial boot record: code {}", e.code());
            loader::boot_chain(&mut board, [(Medium::Flash, ImageId::Factory)].into_iter()).await;
        }
    }

    error!("No candidates booted successfully, giving up...");
    board.stop_network();
    signal::halt(&mut board)
}
