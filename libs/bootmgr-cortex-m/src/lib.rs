#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

mod board;
mod bootload;
mod delay;
mod vector;

use core::ops::Range;

use defmt_or_log::{info, panic};

pub use board::{CortexM, CortexMConfig, Devices, SpinPanel};
pub use bootload::boot_application;
pub use delay::SpinDelay;
pub use vector::{InvalidImage, VectorTable};

/// RAM region images are copied into and started from.
pub struct ExecutionRegion {
    base: *mut u8,
    len: usize,
    /// Valid range for the initial stack pointer of a started image.
    ram: Range<u32>,
}

impl ExecutionRegion {
    /// # SAFETY
    /// `base..base + len` must be RAM used by nothing else, including the stack and statics
    /// of the boot manager, for as long as the region lives.
    pub const unsafe fn new(base: usize, len: usize, ram: Range<u32>) -> Self {
        Self {
            base: base as *mut u8,
            len,
            ram,
        }
    }

    /// Address of the region, where the vector table of a loaded image lives.
    pub fn base(&self) -> u32 {
        self.base as u32
    }

    pub fn as_slice(&self) -> &[u8] {
        // Note(unsafe): exclusive use of the memory is promised by the constructor.
        unsafe { core::slice::from_raw_parts(self.base, self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // Note(unsafe): exclusive use of the memory is promised by the constructor.
        unsafe { core::slice::from_raw_parts_mut(self.base, self.len) }
    }

    /// Check that the image of `len` bytes at the start of the region can be started.
    pub fn check(&self, len: usize) -> Result<VectorTable, InvalidImage> {
        let image = self.as_slice().get(..len).ok_or(InvalidImage::TooLarge)?;
        VectorTable::parse(image, self.base(), &self.ram)
    }

    /// Start the image of `len` bytes at the start of the region.
    ///
    /// Panics if the image is not accepted by [ExecutionRegion::check].
    pub fn run(&mut self, len: usize) -> ! {
        let table = match self.check(len) {
            Ok(table) => table,
            Err(e) => panic!("Refusing to start image at {:#x}: {:?}", self.base(), e),
        };

        info!("Starting image of {} bytes, reset handler at {:#x}", len, table.reset);

        // Note(unsafe): the vector table was checked to point into the loaded image.
        unsafe { boot_application(self.base(), &table) }
    }
}

/// Sleep until the next interrupt, once all outstanding memory accesses completed.
pub fn wait_for_interrupt() {
    cortex_m::asm::dsb();
    cortex_m::asm::isb();
    cortex_m::asm::wfi();
}
