//! Persistence of the [BootRecord] in a well known file.
use defmt_or_log::{debug, info, warn};

use crate::record::{BootRecord, ParseResult};
use crate::volume::{ReadVolume, StorageError, Volume};

/// Name of the file holding the [BootRecord].
pub const RECORD_FILE: &str = "/sys/bootinfo.bin";

/// Allocation reserved when creating the record file, leaving room for the record to grow in place.
pub const RECORD_ALLOCATION: usize = 2 * BootRecord::SIZE;

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// The storage medium accepted fewer bytes than a full record.
    ShortWrite,

    /// After writing the record a readback does not yield the same record.
    ///
    /// This indicates that something went wrong in the writing process, either on the bus
    /// or in the storage medium itself.
    ReadbackFailed,

    /// The underlying storage medium yielded an error.
    Other(E),
}

impl<E> From<E> for Error<E> {
    fn from(value: E) -> Self {
        Error::Other(value)
    }
}

impl<E: StorageError> Error<E> {
    /// Error code to signal to the user, `0` if the storage medium itself did not complain.
    pub fn code(&self) -> u8 {
        match self {
            Error::Other(e) => e.code(),
            Error::ShortWrite | Error::ReadbackFailed => 0,
        }
    }
}

/// Outcome of [RecordFile::load_or_create].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Fetched {
    pub record: BootRecord,
    /// No valid record was stored, and the default record has just been written.
    pub first_boot: bool,
}

/// [BootRecord] file on a storage [Volume].
pub struct RecordFile<T> {
    /// Inner storage.
    inner: T,
}

impl<T> RecordFile<T> {
    /// Construct the RecordFile given a storage volume, typically `&mut` to the on-board flash.
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

impl<T: ReadVolume> RecordFile<T> {
    /// Get the stored [BootRecord], if any.
    ///
    /// A missing, unreadable, wrongly sized or corrupt file all yield `None`, as none of them is a hard error.
    pub async fn get(&mut self) -> Option<BootRecord> {
        // Read one byte more than a record, to notice a file that is too long.
        let mut buf = [0u8; BootRecord::SIZE + 1];
        let len = match self.inner.read(RECORD_FILE, 0, &mut buf).await {
            Ok(len) => len,
            Err(e) => {
                debug!("No boot record readable: code {}", e.code());
                return None;
            }
        };

        match BootRecord::try_from_bytes(&buf[..len]) {
            Ok(record) => Some(record),
            Err(ParseResult::SizeMismatch) => {
                warn!("Stored boot record has size {}, ignoring it", len);
                None
            }
            Err(ParseResult::Invalid) => {
                warn!("Stored boot record is corrupt, ignoring it");
                None
            }
        }
    }

    /// Get the stored [BootRecord], or the default record if there is none.
    pub async fn load(&mut self) -> BootRecord {
        self.get().await.unwrap_or_default()
    }
}

impl<T: Volume> RecordFile<T> {
    /// Write the full [BootRecord].
    ///
    /// Verifies the write by reading the record back.
    pub async fn save(&mut self, record: &BootRecord) -> Result<(), Error<T::Error>> {
        let written = self.inner.write(RECORD_FILE, 0, &record.to_bytes()).await?;
        if written != BootRecord::SIZE {
            return Err(Error::ShortWrite);
        }

        // Check if the readback is successful.
        if self.get().await == Some(*record) {
            debug!("Stored new boot record: {:?}", record);
            Ok(())
        } else {
            Err(Error::ReadbackFailed)
        }
    }

    /// Get the stored [BootRecord], creating the file with the default record if there is no valid one.
    ///
    /// Fails only if a new record had to be written, and that did not succeed.
    pub async fn load_or_create(&mut self) -> Result<Fetched, Error<T::Error>> {
        if let Some(record) = self.get().await {
            info!("Boot record fetched: {:?}", record);
            return Ok(Fetched {
                record,
                first_boot: false,
            });
        }

        let record = BootRecord::default();
        warn!("Initial bootup and no boot record stored, creating {:?}", record);

        self.inner.create(RECORD_FILE, RECORD_ALLOCATION).await?;
        self.save(&record).await?;

        Ok(Fetched {
            record,
            first_boot: true,
        })
    }
}
