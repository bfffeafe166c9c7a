// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Hardware abstraction seams for the protocol core.
//!
//! Every register-level operation the engines need is behind one of these
//! traits so the same code drives the real peripheral and the test fakes.
//! All `wait_*` methods are busy-waits with no timeout: they block the sole
//! thread of protocol execution until hardware or host action satisfies
//! them (or a physical reset intervenes).

/// Outcome of waiting on the IN bank while a device-to-host transfer is in
/// flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InEvent {
    /// The IN bank is free for the next packet.
    Ready,
    /// The host sent an OUT token instead; it has abandoned the IN phase.
    HostAbort,
}

/// Byte-level access to the control endpoint and the device-address and
/// endpoint-configuration registers it controls.
pub trait ControlPipe {
    /// Copy the 8 SETUP bytes out of the hardware and release the bank.
    /// Also rewinds any in-progress data phase state.
    fn take_setup(&mut self) -> [u8; 8];

    /// Read one byte from the active OUT bank.
    fn read_byte(&mut self) -> u8;

    /// Stage one byte into the IN bank.
    fn write_byte(&mut self, byte: u8);

    /// Hand the staged IN packet (possibly zero-length) to the hardware.
    fn send_in(&mut self);

    /// Block until the IN bank is free.
    fn wait_in_ready(&mut self);

    /// Block until the IN bank frees up or the host delivers an OUT packet.
    fn wait_in_or_abort(&mut self) -> InEvent;

    /// Block until an OUT data packet sits in the bank.
    fn wait_out_received(&mut self);

    /// Release the OUT bank for the next packet.
    fn ack_out(&mut self);

    /// Signal "unsupported request" by stalling the control endpoint.
    fn stall(&mut self);

    /// Program and enable the device address. The caller guarantees the
    /// status packet has been flushed at the old address first.
    fn assign_address(&mut self, address: u8);

    /// (Re)configure the interrupt-IN endpoint after `SET_CONFIGURATION`.
    fn setup_interrupt_endpoint(&mut self);
}

/// Page-granular self-programming of the device's own flash.
///
/// The word stream contract: `page_fill` stages into a single shared page
/// buffer, `page_erase` must precede the fills of a page, and `page_write`
/// commits the buffer to the page containing `addr`. Callers sequence these
/// strictly (see [`crate::flash::PageWriter`]); implementations do not
/// re-check alignment or ordering.
pub trait FlashPages {
    /// Erase/program granularity in bytes. Power of two.
    fn page_size(&self) -> u32;

    /// Total flash size in bytes, as reported to the host.
    fn flash_size(&self) -> u32;

    /// Erase the page starting at `addr`.
    fn page_erase(&mut self, addr: u32);

    /// Stage one 16-bit word at `addr` in the page buffer.
    fn page_fill(&mut self, addr: u32, word: u16);

    /// Commit the page buffer to the page containing `addr`.
    fn page_write(&mut self, addr: u32);

    /// Block until the current erase/write operation completes.
    fn busy_wait(&mut self);

    /// Re-enable read access to the programmed region before handing the
    /// flash back to the application.
    fn rww_enable(&mut self);
}

/// Device-level operations used by the exit-to-application path.
pub trait DeviceOps {
    /// Detach from the bus and shut the USB module down.
    fn detach_usb(&mut self);

    /// Point the vector table back at the application section.
    fn vectors_to_application(&mut self);

    /// Let the bus settle after detach; at least 15 ms.
    fn settle_delay(&mut self);

    /// Full device reset. Does not return.
    fn system_reset(&mut self) -> !;
}
