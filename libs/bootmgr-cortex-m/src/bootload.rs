use defmt_or_log::info;

use crate::vector::VectorTable;

/// Put the NVIC and SysTick back in their reset state.
///
/// # SAFETY
/// Interrupts must be disabled globally.
unsafe fn quiesce(p: &mut cortex_m::Peripherals) {
    p.SYST.disable_interrupt();
    p.SYST.disable_counter();

    unsafe {
        let nvic = &*cortex_m::peripheral::NVIC::PTR;
        for (enable, pending) in nvic.icer.iter().zip(nvic.icpr.iter()) {
            enable.write(u32::MAX);
            pending.write(u32::MAX);
        }

        for priority in nvic.ipr.iter() {
            priority.write(0);
        }
    }
}

/// Start the image at `base`, whose vector table begins with `table`.
///
/// The image finds the core as after reset: no interrupt enabled or pending, SysTick stopped,
/// and the main stack pointer at the initial value of its table.
///
/// # SAFETY
/// `base` must hold a complete image for this core, `table` must be its checked vector table,
/// and the image must not return control to the caller.
pub unsafe fn boot_application(base: u32, table: &VectorTable) -> ! {
    unsafe {
        cortex_m::interrupt::disable();
        let mut p = cortex_m::Peripherals::steal();
        quiesce(&mut p);
        cortex_m::interrupt::enable();

        info!(
            "Vector table at {:#x}, stack at {:#x}, entering {:#x}",
            base, table.initial_sp, table.reset
        );
        p.SCB.vtor.write(base);

        // The new table must be in effect before the jump.
        cortex_m::asm::dsb();
        cortex_m::asm::isb();

        cortex_m::asm::bootstrap(table.initial_sp as *const u32, table.reset as *const u32)
    }
}
