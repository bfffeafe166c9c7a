// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Flash self-programming via the RP2040 boot-ROM routines.
//!
//! On RP2040, flash operations (erase/program) require disabling XIP first.
//! The full sequence is:
//!   1. connect_internal_flash()
//!   2. flash_exit_xip()
//!   3. flash_range_erase() or flash_range_program()
//!   4. flash_flush_cache()
//!   5. flash_enter_cmd_xip()
//!
//! All code executing during steps 1-5 must run from RAM, not flash.
//! We use `#[link_section = ".data"]` to place critical functions in RAM,
//! and pre-resolve all ROM function pointers at init time.
//!
//! The protocol's "page" is the QSPI sector (4 KiB), the smallest erasable
//! unit. A RAM staging page stands in for the AVR-style hardware page
//! buffer: `page_fill` stages words, `page_write` programs the whole sector.

use core::sync::atomic::{AtomicUsize, Ordering};

use hidboot_common::hal::FlashPages;

/// XIP-mapped base of the flash.
pub const FLASH_BASE: u32 = 0x1000_0000;
/// Minimum erase unit and therefore the protocol page size.
pub const SECTOR_SIZE: u32 = 4096;
/// Total flash size reported to the host.
pub const FLASH_SIZE: u32 = 2 * 1024 * 1024;
/// First flash offset past the bootloader; the application's vector table
/// lives here by linker convention (see memory.x of both binaries).
pub const APP_OFFSET: u32 = 0x8000;
/// XIP address of the application image.
pub const APP_ADDR: u32 = FLASH_BASE + APP_OFFSET;

// RP2040 ROM table addresses (defined in RP2040 datasheet section 2.8.3)
/// Pointer to the ROM function table (16-bit pointer stored at 0x14)
const ROM_FUNC_TABLE_PTR: *const u16 = 0x0000_0014 as *const u16;
/// Pointer to the ROM table lookup function (16-bit pointer stored at 0x18)
const ROM_TABLE_LOOKUP_PTR: *const u16 = 0x0000_0018 as *const u16;

// ROM function pointer types
type RomFnVoid = unsafe extern "C" fn();
type RomFnErase = unsafe extern "C" fn(u32, usize, u32, u8);
type RomFnProgram = unsafe extern "C" fn(u32, *const u8, usize);

/// ROM function pointers, resolved once at init from the ROM table.
/// Using AtomicUsize for thread-safe initialization without static mut.
static ROM_CONNECT_INTERNAL_FLASH: AtomicUsize = AtomicUsize::new(0);
static ROM_FLASH_EXIT_XIP: AtomicUsize = AtomicUsize::new(0);
static ROM_FLASH_RANGE_ERASE: AtomicUsize = AtomicUsize::new(0);
static ROM_FLASH_RANGE_PROGRAM: AtomicUsize = AtomicUsize::new(0);
static ROM_FLASH_FLUSH_CACHE: AtomicUsize = AtomicUsize::new(0);
static ROM_FLASH_ENTER_CMD_XIP: AtomicUsize = AtomicUsize::new(0);

/// Look up a ROM function by its two-character tag.
unsafe fn rom_func_lookup(tag: &[u8; 2]) -> usize {
    let fn_table = *ROM_FUNC_TABLE_PTR as *const u16;

    let lookup: unsafe extern "C" fn(*const u16, u32) -> usize =
        core::mem::transmute::<usize, unsafe extern "C" fn(*const u16, u32) -> usize>(
            *ROM_TABLE_LOOKUP_PTR as usize,
        );

    let code = u16::from_le_bytes(*tag) as u32;
    lookup(fn_table, code)
}

/// Resolve the ROM flash routines. Must be called once, while XIP is still
/// active, before any flash operation.
pub fn init() {
    unsafe {
        ROM_CONNECT_INTERNAL_FLASH.store(rom_func_lookup(b"IF"), Ordering::Release);
        ROM_FLASH_EXIT_XIP.store(rom_func_lookup(b"EX"), Ordering::Release);
        ROM_FLASH_RANGE_ERASE.store(rom_func_lookup(b"RE"), Ordering::Release);
        ROM_FLASH_RANGE_PROGRAM.store(rom_func_lookup(b"RP"), Ordering::Release);
        ROM_FLASH_FLUSH_CACHE.store(rom_func_lookup(b"FC"), Ordering::Release);
        ROM_FLASH_ENTER_CMD_XIP.store(rom_func_lookup(b"CX"), Ordering::Release);
    }
}

/// Erase flash at the given flash-relative offset.
/// Runs entirely from RAM with proper XIP teardown/setup.
///
/// # Safety
/// The `init()` function must have been called first.
#[link_section = ".data"]
#[inline(never)]
unsafe fn flash_erase(offset: u32, size: u32) {
    let connect: RomFnVoid =
        core::mem::transmute(ROM_CONNECT_INTERNAL_FLASH.load(Ordering::Acquire));
    let exit_xip: RomFnVoid = core::mem::transmute(ROM_FLASH_EXIT_XIP.load(Ordering::Acquire));
    let erase: RomFnErase = core::mem::transmute(ROM_FLASH_RANGE_ERASE.load(Ordering::Acquire));
    let flush: RomFnVoid = core::mem::transmute(ROM_FLASH_FLUSH_CACHE.load(Ordering::Acquire));
    let enter_xip: RomFnVoid =
        core::mem::transmute(ROM_FLASH_ENTER_CMD_XIP.load(Ordering::Acquire));

    cortex_m::interrupt::disable();
    connect();
    exit_xip();
    erase(offset, size as usize, SECTOR_SIZE, 0x20);
    flush();
    enter_xip();
    cortex_m::interrupt::enable();
}

/// Program flash at the given flash-relative offset.
/// Runs entirely from RAM with proper XIP teardown/setup.
///
/// # Safety
/// The `init()` function must have been called first.
#[link_section = ".data"]
#[inline(never)]
unsafe fn flash_program(offset: u32, data: *const u8, len: usize) {
    let connect: RomFnVoid =
        core::mem::transmute(ROM_CONNECT_INTERNAL_FLASH.load(Ordering::Acquire));
    let exit_xip: RomFnVoid = core::mem::transmute(ROM_FLASH_EXIT_XIP.load(Ordering::Acquire));
    let program: RomFnProgram =
        core::mem::transmute(ROM_FLASH_RANGE_PROGRAM.load(Ordering::Acquire));
    let flush: RomFnVoid = core::mem::transmute(ROM_FLASH_FLUSH_CACHE.load(Ordering::Acquire));
    let enter_xip: RomFnVoid =
        core::mem::transmute(ROM_FLASH_ENTER_CMD_XIP.load(Ordering::Acquire));

    cortex_m::interrupt::disable();
    connect();
    exit_xip();
    program(offset, data, len);
    flush();
    enter_xip();
    cortex_m::interrupt::enable();
}

/// [`FlashPages`] over the ROM routines.
///
/// Protocol addresses are flash-relative offsets, so they can be handed to
/// the ROM routines unchanged.
pub struct RomFlash {
    page: [u8; SECTOR_SIZE as usize],
}

impl RomFlash {
    pub const fn new() -> Self {
        Self {
            page: [0xFF; SECTOR_SIZE as usize],
        }
    }

    fn page_start(addr: u32) -> u32 {
        addr & !(SECTOR_SIZE - 1)
    }
}

impl FlashPages for RomFlash {
    fn page_size(&self) -> u32 {
        SECTOR_SIZE
    }

    fn flash_size(&self) -> u32 {
        FLASH_SIZE
    }

    fn page_erase(&mut self, addr: u32) {
        // SAFETY: flash::init() ran before USB came up.
        unsafe { flash_erase(Self::page_start(addr), SECTOR_SIZE) }
    }

    fn page_fill(&mut self, addr: u32, word: u16) {
        let offset = (addr & (SECTOR_SIZE - 1)) as usize;
        self.page[offset..offset + 2].copy_from_slice(&word.to_le_bytes());
    }

    fn page_write(&mut self, addr: u32) {
        // SAFETY: flash::init() ran before USB came up; the staging page is
        // a full sector.
        unsafe { flash_program(Self::page_start(addr), self.page.as_ptr(), self.page.len()) }
    }

    fn busy_wait(&mut self) {
        // The ROM routines only return once the operation has completed.
    }

    fn rww_enable(&mut self) {
        // XIP is restored after every ROM call; nothing left to re-enable.
    }
}

impl Default for RomFlash {
    fn default() -> Self {
        Self::new()
    }
}
