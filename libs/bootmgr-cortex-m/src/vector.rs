//! Sanity checks on the vector table at the start of a loaded image.
use core::ops::Range;

/// Leading entries of a Cortex-M vector table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VectorTable {
    pub initial_sp: u32,
    pub reset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InvalidImage {
    /// Image cannot hold a vector table.
    TooSmall,
    /// Image does not fit the execution region.
    TooLarge,
    /// Initial stack pointer is unaligned or outside RAM.
    StackPointer(u32),
    /// Reset handler is not a Thumb address inside the image.
    ResetVector(u32),
}

impl VectorTable {
    /// Bytes covered by the parsed entries.
    pub const SIZE: usize = 8;

    pub fn read_from_slice(data: &[u8]) -> Option<Self> {
        let &[sp0, sp1, sp2, sp3, reset0, reset1, reset2, reset3, ..] = data else {
            return None;
        };

        Some(Self {
            initial_sp: u32::from_le_bytes([sp0, sp1, sp2, sp3]),
            reset: u32::from_le_bytes([reset0, reset1, reset2, reset3]),
        })
    }

    /// Parse the table of `image`, loaded at address `base`, and check it can run with its stack in `ram`.
    pub fn parse(image: &[u8], base: u32, ram: &Range<u32>) -> Result<Self, InvalidImage> {
        let table = Self::read_from_slice(image).ok_or(InvalidImage::TooSmall)?;

        // Full descending stack, so the initial value may be the end of RAM itself.
        let sp = table.initial_sp;
        if sp % 4 != 0 || sp <= ram.start || sp > ram.end {
            return Err(InvalidImage::StackPointer(sp));
        }

        let entry = table.reset & !1;
        let image_end = base.saturating_add(u32::try_from(image.len()).unwrap_or(u32::MAX));
        if table.reset & 1 == 0 || entry < base || entry >= image_end {
            return Err(InvalidImage::ResetVector(table.reset));
        }

        Ok(table)
    }
}
