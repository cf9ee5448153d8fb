use core::fmt::Display;
use std::collections::BTreeMap;
use std::string::{String, ToString};
use std::vec::Vec;

use crate::volume::{ReadVolume, StorageError, Volume};

#[derive(Debug, Clone)]
struct MockFile {
    data: Vec<u8>,
    /// Allocated size, writes beyond it fail.
    capacity: usize,
}

/// In memory filesystem that can be used for mocking.
///
/// Every single [Volume] call is committed atomically: a write interrupted by
/// an early shutoff leaves the file untouched.
#[derive(Debug, Clone, Default)]
pub struct MockVolume {
    files: BTreeMap<String, MockFile>,
    /// A countdown to shutoff. When some and 0, an early shutoff will happen.
    ///
    /// Every written byte, and every create and delete, counts as one.
    pub bytes_until_shutoff: Option<u32>,
    /// When true, every mutating operation fails.
    pub write_protected: bool,
    failing_reads: Vec<String>,
    /// Files for which reads stop at the given length.
    short_reads: BTreeMap<String, usize>,
}

impl MockVolume {
    /// Create a new empty volume.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder variant of [MockVolume::insert].
    pub fn with_file(mut self, name: &str, data: &[u8]) -> Self {
        self.insert(name, data);
        self
    }

    /// Put a file on the volume, bypassing shutoff and write protection.
    pub fn insert(&mut self, name: &str, data: &[u8]) {
        self.files.insert(
            name.to_string(),
            MockFile {
                data: data.to_vec(),
                capacity: data.len(),
            },
        );
    }

    /// Get a reference to the contents of a file, if it exists.
    pub fn file(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(|file| file.data.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    /// Let every read of `name` fail.
    pub fn fail_reads(&mut self, name: &str) {
        self.failing_reads.push(name.to_string());
    }

    /// Let reads of `name` behave as if the file ends after `len` bytes, while its reported length stays intact.
    pub fn short_reads(&mut self, name: &str, len: usize) {
        self.short_reads.insert(name.to_string(), len);
    }

    pub fn remove_shutoff(&mut self) {
        self.bytes_until_shutoff = None;
    }

    fn check_shutoff(&mut self, operation: Operation) -> Result<(), MockVolumeError> {
        if let Some(bytes_until_shutoff) = self.bytes_until_shutoff.as_mut() {
            if let Some(next) = bytes_until_shutoff.checked_sub(1) {
                *bytes_until_shutoff = next;
                Ok(())
            } else {
                self.bytes_until_shutoff = None;
                Err(MockVolumeError::EarlyShutoff(operation))
            }
        } else {
            Ok(())
        }
    }

    fn check_writable(&self) -> Result<(), MockVolumeError> {
        if self.write_protected {
            Err(MockVolumeError::WriteProtected)
        } else {
            Ok(())
        }
    }
}

impl ReadVolume for MockVolume {
    type Error = MockVolumeError;

    async fn file_len(&mut self, name: &str) -> Result<usize, Self::Error> {
        self.files
            .get(name)
            .map(|file| file.data.len())
            .ok_or(MockVolumeError::NotFound)
    }

    async fn read(&mut self, name: &str, offset: usize, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.failing_reads.iter().any(|failing| failing == name) {
            return Err(MockVolumeError::Injected);
        }

        let file = self.files.get(name).ok_or(MockVolumeError::NotFound)?;
        let end = match self.short_reads.get(name) {
            Some(&limit) => file.data.len().min(limit),
            None => file.data.len(),
        };

        if offset > end {
            return Err(MockVolumeError::OutOfBounds);
        }

        let count = buf.len().min(end - offset);
        buf[..count].copy_from_slice(&file.data[offset..offset + count]);
        Ok(count)
    }
}

impl Volume for MockVolume {
    async fn create(&mut self, name: &str, max_len: usize) -> Result<(), Self::Error> {
        self.check_writable()?;
        self.check_shutoff(Operation::Create)?;

        self.files.insert(
            name.to_string(),
            MockFile {
                data: Vec::new(),
                capacity: max_len,
            },
        );
        Ok(())
    }

    async fn write(&mut self, name: &str, offset: usize, data: &[u8]) -> Result<usize, Self::Error> {
        self.check_writable()?;

        let file = self.files.get(name).ok_or(MockVolumeError::NotFound)?;
        if offset > file.data.len() || offset + data.len() > file.capacity {
            return Err(MockVolumeError::OutOfBounds);
        }

        // Stage the write, so that a shutoff halfway leaves the committed file as it was.
        let mut staged = file.data.clone();
        staged.resize(staged.len().max(offset + data.len()), 0);
        for (index, byte) in data.iter().enumerate() {
            self.check_shutoff(Operation::Write)?;
            staged[offset + index] = *byte;
        }

        if let Some(file) = self.files.get_mut(name) {
            file.data = staged;
        }
        Ok(data.len())
    }

    async fn delete(&mut self, name: &str) -> Result<(), Self::Error> {
        self.check_writable()?;
        if !self.contains(name) {
            return Err(MockVolumeError::NotFound);
        }

        self.check_shutoff(Operation::Delete)?;
        self.files.remove(name);
        Ok(())
    }
}

/// Errors reported by the mock volume.
///
/// Codes follow the numbering of the FAT filesystem driver results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockVolumeError {
    /// Injected read failure.
    Injected,
    /// We got a shutoff
    EarlyShutoff(Operation),
    /// File does not exist.
    NotFound,
    /// Access beyond the end or the allocation of a file.
    OutOfBounds,
    /// Volume does not accept changes.
    WriteProtected,
}

impl Display for MockVolumeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl StorageError for MockVolumeError {
    fn code(&self) -> u8 {
        match self {
            MockVolumeError::Injected => 1,
            MockVolumeError::EarlyShutoff(_) => 3,
            MockVolumeError::NotFound => 4,
            MockVolumeError::OutOfBounds => 5,
            MockVolumeError::WriteProtected => 7,
        }
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Create,
    Write,
    Delete,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupted_write_keeps_old_contents() {
        let mut volume = MockVolume::new();
        embassy_futures::block_on(async {
            volume.create("a", 8).await.unwrap();
            volume.write("a", 0, &[1, 2, 3, 4]).await.unwrap();

            volume.bytes_until_shutoff = Some(2);
            assert_eq!(
                volume.write("a", 0, &[5, 6, 7, 8]).await,
                Err(MockVolumeError::EarlyShutoff(Operation::Write))
            );
            assert_eq!(volume.file("a"), Some(&[1, 2, 3, 4][..]));

            // Shutoff is a one shot.
            assert_eq!(volume.write("a", 0, &[5, 6, 7, 8]).await, Ok(4));
            assert_eq!(volume.file("a"), Some(&[5, 6, 7, 8][..]));
        });
    }

    #[test]
    fn reads_respect_injected_faults() {
        let mut volume = MockVolume::new().with_file("a", &[1, 2, 3, 4]).with_file("b", &[9; 4]);
        volume.short_reads("a", 3);
        volume.fail_reads("b");

        embassy_futures::block_on(async {
            let mut buf = [0u8; 4];
            assert_eq!(volume.file_len("a").await, Ok(4));
            assert_eq!(volume.read("a", 0, &mut buf).await, Ok(3));
            assert_eq!(&buf[..3], &[1, 2, 3]);

            assert_eq!(volume.file_len("b").await, Ok(4));
            assert_eq!(volume.read("b", 0, &mut buf).await, Err(MockVolumeError::Injected));
            assert_eq!(volume.read("c", 0, &mut buf).await, Err(MockVolumeError::NotFound));
        });
    }

    #[test]
    fn writes_stay_within_allocation() {
        let mut volume = MockVolume::new();
        embassy_futures::block_on(async {
            volume.create("a", 4).await.unwrap();
            assert_eq!(volume.write("a", 2, &[1]).await, Err(MockVolumeError::OutOfBounds));
            assert_eq!(volume.write("a", 0, &[1; 5]).await, Err(MockVolumeError::OutOfBounds));

            volume.write_protected = true;
            assert_eq!(volume.write("a", 0, &[1]).await, Err(MockVolumeError::WriteProtected));
            assert_eq!(volume.delete("a").await, Err(MockVolumeError::WriteProtected));

            volume.write_protected = false;
            volume.delete("a").await.unwrap();
            assert!(!volume.contains("a"));
        });
    }
}
