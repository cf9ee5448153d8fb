//! Named-file storage as offered by the flash and removable-medium filesystem drivers.
#[cfg(any(test, feature = "_test"))]
pub mod mock;

/// Error of a storage driver.
pub trait StorageError: core::fmt::Debug {
    /// Raw error code of the driver, as blinked out to the user.
    fn code(&self) -> u8;
}

/// Read access to a medium holding named files.
#[allow(async_fn_in_trait)]
pub trait ReadVolume {
    type Error: StorageError;

    /// Length in bytes of the file `name`.
    ///
    /// Fails if the file cannot be opened.
    async fn file_len(&mut self, name: &str) -> Result<usize, Self::Error>;

    /// Read from the file `name` starting at `offset` into `buf`.
    ///
    /// Returns the number of bytes read, which is smaller than `buf` if the file ends early.
    async fn read(&mut self, name: &str, offset: usize, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

/// Read and write access to a medium holding named files.
///
/// A single [Volume::write] call is expected to be committed atomically by the driver:
/// if it is interrupted, the previous contents of the file remain.
#[allow(async_fn_in_trait)]
pub trait Volume: ReadVolume {
    /// Create the file `name` with room for `max_len` bytes, replacing it if it already exists.
    async fn create(&mut self, name: &str, max_len: usize) -> Result<(), Self::Error>;

    /// Write `data` to the file `name` starting at `offset`.
    ///
    /// Returns the number of bytes written.
    async fn write(&mut self, name: &str, offset: usize, data: &[u8]) -> Result<usize, Self::Error>;

    /// Delete the file `name`.
    async fn delete(&mut self, name: &str) -> Result<(), Self::Error>;
}

impl<T: ReadVolume + ?Sized> ReadVolume for &mut T {
    type Error = T::Error;

    async fn file_len(&mut self, name: &str) -> Result<usize, Self::Error> {
        T::file_len(self, name).await
    }

    async fn read(&mut self, name: &str, offset: usize, buf: &mut [u8]) -> Result<usize, Self::Error> {
        T::read(self, name, offset, buf).await
    }
}

impl<T: Volume + ?Sized> Volume for &mut T {
    async fn create(&mut self, name: &str, max_len: usize) -> Result<(), Self::Error> {
        T::create(self, name, max_len).await
    }

    async fn write(&mut self, name: &str, offset: usize, data: &[u8]) -> Result<usize, Self::Error> {
        T::write(self, name, offset, data).await
    }

    async fn delete(&mut self, name: &str) -> Result<(), Self::Error> {
        T::delete(self, name).await
    }
}

/// Placeholder medium for boards without a removable medium.
///
/// Every file is reported missing.
#[derive(Debug, Default)]
pub struct NoMedium;

/// Error of [NoMedium].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NotPresent;

impl StorageError for NotPresent {
    fn code(&self) -> u8 {
        0
    }
}

impl ReadVolume for NoMedium {
    type Error = NotPresent;

    async fn file_len(&mut self, _name: &str) -> Result<usize, Self::Error> {
        Err(NotPresent)
    }

    async fn read(&mut self, _name: &str, _offset: usize, _buf: &mut [u8]) -> Result<usize, Self::Error> {
        Err(NotPresent)
    }
}
