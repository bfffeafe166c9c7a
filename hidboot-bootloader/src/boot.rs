// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Boot-time hardware: reset-cause capture, the reset-surviving magic-key
//! latch, the arbitration tick source and the application handoff.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;

use embedded_hal::delay::DelayNs;
use rp2040_hal::fugit::ExtU32;
use rp2040_hal::{pac, Timer, Watchdog};

use hidboot_common::boot::{BootHw, ResetCause, MAGIC_BOOT_KEY};
use hidboot_common::hal::DeviceOps;

use crate::flash::APP_ADDR;

/// Read the reset reason registers. Must run before the clock bring-up
/// touches the watchdog block.
///
/// The watchdog reason is checked first: `CHIP_RESET` only logs chip-level
/// resets and can carry a stale RUN bit across a watchdog reboot.
pub fn capture_reset_cause(
    watchdog: &pac::WATCHDOG,
    chip_reset: &pac::VREG_AND_CHIP_RESET,
) -> ResetCause {
    let reason = watchdog.reason().read();
    if reason.timer().bit() || reason.force().bit() {
        return ResetCause::Watchdog;
    }

    let chip = chip_reset.chip_reset().read();
    if chip.had_run().bit() {
        ResetCause::External
    } else {
        // had_por covers power-on and brown-out on this part
        ResetCause::PowerOn
    }
}

/// RAM cell outside the zero-initialized image: the value rides through
/// watchdog and RUN-pin resets and holds garbage after power-on, which the
/// arbitration clears on every non-window path.
struct KeyLatch(UnsafeCell<MaybeUninit<u16>>);

// SAFETY: touched only from the single boot/interrupt thread of control.
unsafe impl Sync for KeyLatch {}

#[link_section = ".uninit.MAGIC_BOOT_KEY"]
static MAGIC_KEY: KeyLatch = KeyLatch(UnsafeCell::new(MaybeUninit::uninit()));

pub fn read_magic_key() -> u16 {
    // SAFETY: single thread of control; any bit pattern is a valid u16 and
    // power-on garbage is part of the latch contract.
    unsafe { (*MAGIC_KEY.0.get()).as_ptr().read() }
}

pub fn write_magic_key(value: u16) {
    // SAFETY: single thread of control.
    unsafe { (*MAGIC_KEY.0.get()).write(value) };
}

/// [`BootHw`] over the captured cause, the key latch and the free-running
/// µs timer (1 ms per arbitration tick).
pub struct BootControl {
    cause: ResetCause,
    timer: Timer,
    started_at: u64,
}

impl BootControl {
    pub fn new(cause: ResetCause, timer: Timer) -> Self {
        let started_at = timer.get_counter().ticks();
        Self {
            cause,
            timer,
            started_at,
        }
    }

    /// Release the timer for reuse once the decision is made.
    pub fn into_timer(self) -> Timer {
        self.timer
    }
}

impl BootHw for BootControl {
    fn reset_cause(&self) -> ResetCause {
        self.cause
    }

    fn magic_key(&self) -> u16 {
        read_magic_key()
    }

    fn set_magic_key(&mut self, value: u16) {
        write_magic_key(value);
    }

    fn ticks(&self) -> u16 {
        let elapsed_us = self.timer.get_counter().ticks() - self.started_at;
        (elapsed_us / 1_000).min(u64::from(u16::MAX)) as u16
    }

    fn application_first_byte(&self) -> u8 {
        unsafe { (APP_ADDR as *const u8).read_volatile() }
    }
}

/// [`DeviceOps`] for the exit-to-application path.
pub struct SystemControl {
    timer: Timer,
    watchdog: Watchdog,
}

impl SystemControl {
    pub fn new(timer: Timer, watchdog: Watchdog) -> Self {
        Self { timer, watchdog }
    }
}

impl DeviceOps for SystemControl {
    fn detach_usb(&mut self) {
        // SAFETY: the pipe owns the USB peripheral singletons, but the
        // device is going down for a reset; dropping off the bus first is
        // the whole point.
        let usb = unsafe { &*pac::USBCTRL_REGS::ptr() };
        usb.sie_ctrl().modify(|_, w| w.pullup_en().clear_bit());
        usb.main_ctrl().modify(|_, w| w.controller_en().clear_bit());
    }

    fn vectors_to_application(&mut self) {
        cortex_m::interrupt::disable();

        const SCB_VTOR: *mut u32 = 0xE000_ED08 as *mut u32;
        // SAFETY: the application's vector table sits at APP_ADDR by linker
        // convention.
        unsafe { SCB_VTOR.write_volatile(APP_ADDR) };

        cortex_m::asm::dsb();
        cortex_m::asm::isb();
    }

    fn settle_delay(&mut self) {
        self.timer.delay_ms(20);
    }

    fn system_reset(&mut self) -> ! {
        // Latch the key so the next arbitration hands over to the
        // application, then let the watchdog pull the plug.
        write_magic_key(MAGIC_BOOT_KEY);
        self.watchdog.start(1_000.micros());
        loop {
            cortex_m::asm::nop();
        }
    }
}

/// Hand execution to the application image in place.
///
/// # Safety
/// Caller must have verified an application is present at `APP_ADDR`.
pub unsafe fn jump_to_application() -> ! {
    let vector_table = APP_ADDR as *const u32;
    let initial_sp = vector_table.read_volatile();
    let reset_vector = vector_table.offset(1).read_volatile();

    cortex_m::interrupt::disable();

    const SCB_VTOR: *mut u32 = 0xE000_ED08 as *mut u32;
    SCB_VTOR.write_volatile(APP_ADDR);

    cortex_m::asm::dsb();
    cortex_m::asm::isb();

    core::arch::asm!(
        "msr msp, {sp}",
        "bx {reset}",
        sp = in(reg) initial_sp,
        reset = in(reg) reset_vector,
        options(noreturn)
    );
}
