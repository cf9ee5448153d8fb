//! Integrity check of image files carrying a trailing hex encoded MD5 digest.
//!
//! The checked file is laid out as `payload || hex(md5(payload))`, with the digest
//! written as 32 lowercase ASCII hex characters.
use bootmgr_state::volume::{ReadVolume, StorageError};
use defmt_or_log::{debug, warn};
use md5::Digest;

/// Bytes fed to the [HashEngine] per step.
pub const CHUNK_SIZE: usize = 512;

/// Length of a raw MD5 digest.
pub const DIGEST_SIZE: usize = 16;

/// Length of the hex encoded digest at the end of a checked file.
pub const HEX_DIGEST_SIZE: usize = 2 * DIGEST_SIZE;

/// Streaming MD5 computation, either in software or on a hardware accelerator.
pub trait HashEngine {
    /// Begin a new digest over `total_len` bytes, discarding any previous state.
    fn start(&mut self, total_len: usize);

    fn update(&mut self, data: &[u8]);

    /// Finish the digest started with [HashEngine::start].
    fn finalize(&mut self) -> [u8; DIGEST_SIZE];
}

/// [HashEngine] for boards without a hash accelerator.
#[derive(Default)]
pub struct SoftwareMd5 {
    inner: md5::Md5,
}

impl HashEngine for SoftwareMd5 {
    fn start(&mut self, _total_len: usize) {
        self.inner = md5::Md5::new();
    }

    fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    fn finalize(&mut self) -> [u8; DIGEST_SIZE] {
        let mut digest = [0u8; DIGEST_SIZE];
        digest.copy_from_slice(&self.inner.finalize_reset());
        digest
    }
}

/// Check whether the digest stored at the end of file `name` matches its contents.
///
/// Every failure to open or read the file, and files too short to hold a digest and
/// at least one byte of payload, count as a mismatch.
pub async fn verify<V: ReadVolume, H: HashEngine>(volume: &mut V, hasher: &mut H, name: &str) -> bool {
    match digest_matches(volume, hasher, name).await {
        Ok(true) => {
            debug!("Digest of {} matches", name);
            true
        }
        Ok(false) => {
            warn!("Digest of {} does not match", name);
            false
        }
        Err(e) => {
            warn!("Failed to read {} for verification: code {}", name, e.code());
            false
        }
    }
}

async fn digest_matches<V: ReadVolume, H: HashEngine>(
    volume: &mut V,
    hasher: &mut H,
    name: &str,
) -> Result<bool, V::Error> {
    let file_len = volume.file_len(name).await?;
    let Some(payload_len) = file_len.checked_sub(HEX_DIGEST_SIZE).filter(|len| *len > 0) else {
        warn!("{} is too short to carry a digest ({} bytes)", name, file_len);
        return Ok(false);
    };

    let mut buf = [0u8; CHUNK_SIZE];
    hasher.start(payload_len);

    let mut offset = 0;
    while offset < payload_len {
        let request = (payload_len - offset).min(CHUNK_SIZE);
        let read = volume.read(name, offset, &mut buf[..request]).await?;
        if read == 0 {
            // File shrunk while hashing.
            return Ok(false);
        }

        hasher.update(&buf[..read]);
        offset += read;
    }

    let mut computed = [0u8; HEX_DIGEST_SIZE];
    if hex::encode_to_slice(hasher.finalize(), &mut computed).is_err() {
        return Ok(false);
    }

    let mut stored = [0u8; HEX_DIGEST_SIZE];
    if volume.read(name, payload_len, &mut stored).await? != HEX_DIGEST_SIZE {
        return Ok(false);
    }

    Ok(computed == stored)
}
