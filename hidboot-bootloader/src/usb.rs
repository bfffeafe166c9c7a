// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Endpoint-0 control pipe over the raw RP2040 USB device controller.
//!
//! The controller exchanges packets through buffers in USB DPRAM and a pair
//! of buffer-control registers per endpoint; SETUP packets land in a
//! dedicated 8-byte slot at the base of DPRAM. This module maps the
//! byte-FIFO-style [`ControlPipe`] contract onto that scheme: bytes are
//! staged in (or read from) the fixed EP0 buffer and the DATA0/1 PID
//! sequence is tracked per direction, restarting at DATA1 after every SETUP.

use core::cell::UnsafeCell;

use rp2040_hal::gpio;
use rp2040_hal::pac;

use hidboot_common::hal::{ControlPipe, InEvent};
use hidboot_common::{ControlEngine, ENDPOINT0_SIZE};

use crate::boot::SystemControl;
use crate::flash::RomFlash;

/// DPRAM layout: EP0's hardware buffer is fixed at +0x100; the interrupt
/// endpoint's buffer is the first free slot after it.
const DPRAM_BASE: usize = 0x5010_0000;
const EP0_BUFFER_OFFSET: usize = 0x100;
const EP1_BUFFER_OFFSET: u16 = 0x180;

/// `buff_status` bits for EP0 (IN first, then OUT).
const EP0_IN_DONE: u32 = 1 << 0;
const EP0_OUT_DONE: u32 = 1 << 1;

/// Bring the controller up in device mode with EP0 interrupts armed.
/// The pullup is enabled last; that is the moment the host sees us.
pub fn init(
    regs: pac::USBCTRL_REGS,
    dpram: pac::USBCTRL_DPRAM,
    resets: &mut pac::RESETS,
) -> Ep0Pipe {
    resets.reset().modify(|_, w| w.usbctrl().set_bit());
    resets.reset().modify(|_, w| w.usbctrl().clear_bit());
    while !resets.reset_done().read().usbctrl().bit() {}

    // Start from clean DPRAM control state.
    dpram.setup_packet_low().write(|w| unsafe { w.bits(0) });
    dpram.setup_packet_high().write(|w| unsafe { w.bits(0) });
    for i in 0..30 {
        dpram.ep_control(i).write(|w| unsafe { w.bits(0) });
    }
    for i in 0..32 {
        dpram.ep_buffer_control(i).write(|w| unsafe { w.bits(0) });
    }

    // Controller to the on-board PHY, VBUS detection forced for boards
    // that do not wire it up.
    regs.usb_muxing()
        .write(|w| w.to_phy().set_bit().softcon().set_bit());
    regs.usb_pwr()
        .write(|w| w.vbus_detect().set_bit().vbus_detect_override_en().set_bit());

    regs.main_ctrl()
        .write(|w| w.controller_en().set_bit().host_ndevice().clear_bit());

    // Raise buff_status bits per EP0 buffer, and interrupt on SETUP and
    // bus reset. Buffer completion itself is busy-polled from the handler.
    regs.sie_ctrl().write(|w| w.ep0_int_1buf().set_bit());
    regs.inte()
        .write(|w| w.setup_req().set_bit().bus_reset().set_bit());

    regs.sie_ctrl().modify(|_, w| w.pullup_en().set_bit());

    Ep0Pipe {
        regs,
        dpram,
        tx: [0; ENDPOINT0_SIZE],
        tx_len: 0,
        rx_pos: 0,
        in_pending: false,
        out_armed: false,
        next_pid_in: true,
        next_pid_out: true,
    }
}

pub struct Ep0Pipe {
    regs: pac::USBCTRL_REGS,
    dpram: pac::USBCTRL_DPRAM,
    tx: [u8; ENDPOINT0_SIZE],
    tx_len: usize,
    rx_pos: usize,
    in_pending: bool,
    out_armed: bool,
    next_pid_in: bool,
    next_pid_out: bool,
}

/// Interrupt causes the handler dispatches on.
pub struct PendingEvents {
    pub bus_reset: bool,
    pub setup: bool,
}

impl Ep0Pipe {
    pub fn pending(&self) -> PendingEvents {
        let ints = self.regs.ints().read();
        PendingEvents {
            bus_reset: ints.bus_reset().bit(),
            setup: ints.setup_req().bit(),
        }
    }

    /// Bus reset: back to address 0, all transfer state dropped.
    pub fn handle_bus_reset(&mut self) {
        self.regs
            .sie_status()
            .write(|w| w.bus_reset().clear_bit_by_one());
        self.regs.addr_endp().write(|w| unsafe { w.address().bits(0) });
        self.regs
            .buff_status()
            .write(|w| unsafe { w.bits(EP0_IN_DONE | EP0_OUT_DONE) });
        self.in_pending = false;
        self.out_armed = false;
    }

    fn ep0_buffer(&self) -> *mut u8 {
        (DPRAM_BASE + EP0_BUFFER_OFFSET) as *mut u8
    }

    fn buff_status(&self) -> u32 {
        self.regs.buff_status().read().bits()
    }

    fn clear_buff_status(&self, mask: u32) {
        self.regs.buff_status().write(|w| unsafe { w.bits(mask) });
    }

    /// Offer the host an OUT buffer so data (or a premature status packet)
    /// has somewhere to land.
    fn arm_out(&mut self) {
        let pid = self.next_pid_out;
        self.dpram.ep_buffer_control(1).write(|w| unsafe {
            w.pid_0()
                .bit(pid)
                .length_0()
                .bits(ENDPOINT0_SIZE as u16)
        });
        // The controller must observe the descriptor before AVAILABLE.
        cortex_m::asm::delay(12);
        self.dpram
            .ep_buffer_control(1)
            .modify(|_, w| w.available_0().set_bit());
        self.next_pid_out = !pid;
        self.out_armed = true;
    }
}

impl ControlPipe for Ep0Pipe {
    fn take_setup(&mut self) -> [u8; 8] {
        let mut raw = [0u8; 8];
        raw[..4].copy_from_slice(&self.dpram.setup_packet_low().read().bits().to_le_bytes());
        raw[4..].copy_from_slice(&self.dpram.setup_packet_high().read().bits().to_le_bytes());

        self.regs
            .sie_status()
            .write(|w| w.setup_rec().clear_bit_by_one());
        // Drop whatever a previous (possibly aborted) transfer left behind.
        self.clear_buff_status(EP0_IN_DONE | EP0_OUT_DONE);
        self.tx_len = 0;
        self.rx_pos = 0;
        self.in_pending = false;
        self.out_armed = false;
        // Data packets after SETUP start at DATA1 in both directions.
        self.next_pid_in = true;
        self.next_pid_out = true;

        raw
    }

    fn read_byte(&mut self) -> u8 {
        // SAFETY: the OUT bank was handed back to us by wait_out_received;
        // the hardware is not writing it now.
        let byte = unsafe { self.ep0_buffer().add(self.rx_pos).read_volatile() };
        self.rx_pos += 1;
        byte
    }

    fn write_byte(&mut self, byte: u8) {
        self.tx[self.tx_len] = byte;
        self.tx_len += 1;
    }

    fn send_in(&mut self) {
        let len = self.tx_len;
        // SAFETY: the IN bank is ours until AVAILABLE is set below.
        unsafe {
            let buf = self.ep0_buffer();
            for (i, &byte) in self.tx[..len].iter().enumerate() {
                buf.add(i).write_volatile(byte);
            }
        }

        let pid = self.next_pid_in;
        self.dpram.ep_buffer_control(0).write(|w| unsafe {
            w.pid_0()
                .bit(pid)
                .full_0()
                .set_bit()
                .length_0()
                .bits(len as u16)
        });
        cortex_m::asm::delay(12);
        self.dpram
            .ep_buffer_control(0)
            .modify(|_, w| w.available_0().set_bit());

        self.next_pid_in = !pid;
        self.tx_len = 0;
        self.in_pending = true;
    }

    fn wait_in_ready(&mut self) {
        while self.in_pending {
            if self.buff_status() & EP0_IN_DONE != 0 {
                self.clear_buff_status(EP0_IN_DONE);
                self.in_pending = false;
            }
        }
    }

    fn wait_in_or_abort(&mut self) -> InEvent {
        if !self.out_armed {
            self.arm_out();
        }
        loop {
            if !self.in_pending {
                return InEvent::Ready;
            }
            let status = self.buff_status();
            if status & EP0_OUT_DONE != 0 {
                return InEvent::HostAbort;
            }
            if status & EP0_IN_DONE != 0 {
                self.clear_buff_status(EP0_IN_DONE);
                self.in_pending = false;
                return InEvent::Ready;
            }
        }
    }

    fn wait_out_received(&mut self) {
        if !self.out_armed {
            self.arm_out();
        }
        while self.buff_status() & EP0_OUT_DONE == 0 {}
        self.clear_buff_status(EP0_OUT_DONE);
        self.out_armed = false;
        self.rx_pos = 0;
    }

    fn ack_out(&mut self) {
        // The bank was released when its status bit was cleared; just
        // rewind the read cursor.
        self.rx_pos = 0;
    }

    fn stall(&mut self) {
        self.regs
            .ep_stall_arm()
            .modify(|_, w| w.ep0_in().set_bit().ep0_out().set_bit());
        self.dpram
            .ep_buffer_control(0)
            .modify(|_, w| w.stall().set_bit());
        self.dpram
            .ep_buffer_control(1)
            .modify(|_, w| w.stall().set_bit());
    }

    fn assign_address(&mut self, address: u8) {
        self.regs
            .addr_endp()
            .write(|w| unsafe { w.address().bits(address & 0x7F) });
    }

    fn setup_interrupt_endpoint(&mut self) {
        // EP1 IN, declared in the configuration descriptor but never
        // serviced; the host only ever talks to us on EP0.
        self.dpram.ep_control(0).write(|w| unsafe {
            w.enable()
                .set_bit()
                .endpoint_type()
                .interrupt()
                .buffer_address()
                .bits(EP1_BUFFER_OFFSET)
        });
    }
}

pub type LedPin = gpio::Pin<gpio::bank0::Gpio25, gpio::FunctionSioOutput, gpio::PullDown>;

/// Everything the endpoint-0 interrupt needs.
pub struct UsbContext {
    pub engine: ControlEngine,
    pub pipe: Ep0Pipe,
    pub flash: RomFlash,
    pub system: SystemControl,
    pub led: LedPin,
}

impl UsbContext {
    pub fn service(&mut self) {
        let pending = self.pipe.pending();

        if pending.bus_reset {
            defmt::println!("USB: bus reset");
            self.engine.reset();
            self.pipe.handle_bus_reset();
        }

        if pending.setup {
            self.engine.handle_setup(
                &mut self.pipe,
                &mut self.flash,
                &mut self.system,
                &mut self.led,
            );
        }
    }
}

/// Wrapper to hold the context in a static without `static mut`.
///
/// SAFETY: this is only safe in a single-threaded (bare-metal, no OS)
/// environment; the context is touched exclusively from `USBCTRL_IRQ`.
struct SyncContext(UnsafeCell<Option<UsbContext>>);
unsafe impl Sync for SyncContext {}

static CONTEXT: SyncContext = SyncContext(UnsafeCell::new(None));

/// Store the context (call once, before unmasking the interrupt).
pub fn store_context(context: UsbContext) {
    // SAFETY: called once during initialization, single-threaded.
    unsafe {
        *CONTEXT.0.get() = Some(context);
    }
}

/// Run `f` against the stored context.
pub fn with_context<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut UsbContext) -> R,
{
    // SAFETY: single-threaded environment, no concurrent access.
    unsafe { (*CONTEXT.0.get()).as_mut().map(f) }
}
