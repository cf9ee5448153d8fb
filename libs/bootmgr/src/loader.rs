//! Image locations, loading into the execution region, and the fallback chains.
use bootmgr_state::record::{BootRecord, ImageId, Status};
use bootmgr_state::store::RecordFile;
use bootmgr_state::volume::{ReadVolume, StorageError, Volume};
use defmt_or_log::{info, warn};

use crate::signal::{self, Fault};
use crate::{Board, BootError};

/// Storage medium holding image files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Medium {
    Flash,
    Removable,
}

/// Image files on the on-board flash, indexed by [ImageId::index].
pub const FLASH_IMAGES: [&str; ImageId::COUNT] = [
    "/sys/factimg.bin",
    "/sys/updtimg1.bin",
    "/sys/updtimg2.bin",
    "/sys/updtimg3.bin",
];

/// Image files on the removable medium, indexed by [ImageId::index].
pub const REMOVABLE_IMAGES: [&str; ImageId::COUNT] = [
    "/boot/factory.bin",
    "/boot/update1.bin",
    "/boot/update2.bin",
    "/boot/update3.bin",
];

impl Medium {
    /// File name of `image` on this medium.
    pub const fn location(self, image: ImageId) -> &'static str {
        match self {
            Medium::Flash => FLASH_IMAGES[image.index()],
            Medium::Removable => REMOVABLE_IMAGES[image.index()],
        }
    }
}

impl BootError {
    /// User visible fault for this error.
    pub const fn fault(&self) -> Fault {
        match *self {
            BootError::Open(code) => Fault::Open(code),
            BootError::Empty | BootError::TooLarge | BootError::Rejected => Fault::Open(0),
            BootError::Read(code) => Fault::Read(code),
            BootError::ShortRead => Fault::Read(0),
        }
    }
}

/// Copy the file `name` into the start of `region`.
///
/// Returns the image length.
pub async fn load_image<V: ReadVolume>(volume: &mut V, name: &str, region: &mut [u8]) -> Result<usize, BootError> {
    let len = volume.file_len(name).await.map_err(|e| BootError::Open(e.code()))?;
    if len == 0 {
        return Err(BootError::Empty);
    }

    let Some(dest) = region.get_mut(..len) else {
        return Err(BootError::TooLarge);
    };

    let mut offset = 0;
    while offset < len {
        let read = volume
            .read(name, offset, &mut dest[offset..])
            .await
            .map_err(|e| BootError::Read(e.code()))?;
        if read == 0 {
            return Err(BootError::ShortRead);
        }
        offset += read;
    }

    Ok(len)
}

/// Load `image` from `medium` and run it.
///
/// Does not return if the image could be loaded.
pub async fn load_and_run<B: Board>(board: &mut B, medium: Medium, image: ImageId) -> BootError {
    let name = medium.location(image);
    let parts = board.parts();
    let loaded = match medium {
        Medium::Flash => load_image(parts.flash, name, parts.region).await,
        Medium::Removable => load_image(parts.removable, name, parts.region).await,
    };

    let len = match loaded {
        Ok(len) => len,
        Err(e) => return e,
    };

    if let Err(e) = board.check_image(len) {
        return e;
    }

    info!("Booting into {:?} from {:?} ({} bytes)...", image, medium, len);
    board.stop_network();
    board.run_application(len)
}

/// Try each candidate in turn, announcing every failure.
///
/// Only returns if none of them could be loaded.
pub async fn boot_chain<B: Board>(board: &mut B, chain: impl Iterator<Item = (Medium, ImageId)>) {
    for (attempt, (medium, image)) in chain.enumerate() {
        if attempt > 0 {
            info!("Falling back to {:?} from {:?}", image, medium);
            signal::warn_fallback(board.panel());
        }

        info!("Attempting to boot {:?} from {:?}", image, medium);
        let error = load_and_run(board, medium, image).await;
        warn!("Failed to boot {:?} from {:?} because {:?}", image, medium, error);
        signal::report(board.panel(), error.fault());
    }
}

/// Drop later duplicates from `chain`, keeping the order.
fn unique<T: PartialEq + Copy, const N: usize>(chain: [T; N]) -> impl Iterator<Item = T> {
    chain
        .into_iter()
        .enumerate()
        .filter(move |(i, item)| !chain[..*i].contains(item))
        .map(|(_, item)| item)
}

/// Candidates when the removable medium is mounted: the selected image, then the factory image from
/// the removable medium, then the factory image from flash.
pub fn removable_chain(active: ImageId) -> impl Iterator<Item = (Medium, ImageId)> {
    unique([
        (Medium::Removable, active),
        (Medium::Removable, ImageId::Factory),
        (Medium::Flash, ImageId::Factory),
    ])
}

/// Candidates on flash: the selected image, the previous image, then the factory image.
pub fn flash_chain(record: &BootRecord) -> impl Iterator<Item = (Medium, ImageId)> {
    unique([
        (Medium::Flash, record.active),
        (Medium::Flash, record.previous),
        (Medium::Flash, ImageId::Factory),
    ])
}

#[cfg(not(feature = "non-secure"))]
async fn check<B: Board>(board: &mut B, name: &str) -> bool {
    let parts = board.parts();
    crate::verify::verify(parts.flash, parts.hasher, name).await
}

#[cfg(feature = "non-secure")]
async fn check<B: Board>(_board: &mut B, _name: &str) -> bool {
    warn!("Skipped verification because non-secure mode is set");
    true
}

/// Settle a freshly installed image on flash before it is first booted.
///
/// A verified image is marked [Status::Ready]. An image failing verification is deleted,
/// and the record falls back to the previous image. The outcome is persisted on a best
/// effort basis: if that fails, the same decision is simply taken again next boot.
pub async fn settle_pending<B: Board>(board: &mut B, record: &mut BootRecord) {
    if !record.needs_check() {
        return;
    }

    let name = Medium::Flash.location(record.active);
    info!("{:?} is pending a check", record.active);

    if check(board, name).await {
        info!("{:?} verified", record.active);
        record.status = Status::Ready;
    } else {
        warn!("{:?} failed verification, deleting {}", record.active, name);
        if let Err(e) = board.parts().flash.delete(name).await {
            warn!("Failed to delete {}: code {}", name, e.code());
        }
        record.fall_back();
    }

    if let Err(e) = RecordFile::new(board.parts().flash).save(record).await {
        warn!("Failed to store boot record {:?}: code {}", record, e.code());
    }
}
