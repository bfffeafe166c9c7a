// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Control transfer engine for endpoint 0.
//!
//! Entered once per SETUP event and runs the full request to completion,
//! including the IN/OUT data phase and the implicit status handshake. All
//! waiting is busy-polling through [`ControlPipe`]; the handler cannot
//! suspend and resume.

use embedded_hal::digital::OutputPin;

use crate::descriptor;
use crate::hal::{ControlPipe, DeviceOps, FlashPages, InEvent};
use crate::protocol::{
    self, request, SetupPacket, ENDPOINT0_SIZE, REPORT_BUFFER_LEN, REPORT_ID_INFO,
};
use crate::update;

/// Request the engine cannot service; answered with a STALL handshake.
/// Recoverable from the host's point of view — the next SETUP starts clean.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Stall;

/// Per-device protocol state: the configuration byte and the feature-report
/// accumulation buffer.
pub struct ControlEngine {
    configuration: u8,
    report: [u8; REPORT_BUFFER_LEN],
}

impl ControlEngine {
    pub const fn new() -> Self {
        Self {
            configuration: 0,
            report: [0; REPORT_BUFFER_LEN],
        }
    }

    /// Bus reset: back to the unconfigured state.
    pub fn reset(&mut self) {
        self.configuration = 0;
    }

    pub fn configuration(&self) -> u8 {
        self.configuration
    }

    /// Service one SETUP packet to completion.
    pub fn handle_setup<P, F, D, L>(
        &mut self,
        pipe: &mut P,
        flash: &mut F,
        dev: &mut D,
        led: &mut L,
    ) where
        P: ControlPipe,
        F: FlashPages,
        D: DeviceOps,
        L: OutputPin,
    {
        let raw = pipe.take_setup();
        let setup = SetupPacket::parse(&raw);

        if self.dispatch(pipe, flash, dev, led, &setup).is_err() {
            #[cfg(feature = "defmt")]
            defmt::trace!(
                "stall: bmRequestType=0x{:02x} bRequest=0x{:02x}",
                setup.request_type,
                setup.request
            );
            pipe.stall();
        }
    }

    /// Dispatch order matters: `SET_CONFIGURATION` and `HID_SET_REPORT`
    /// share request code 0x09 and are told apart by `bmRequestType`.
    fn dispatch<P, F, D, L>(
        &mut self,
        pipe: &mut P,
        flash: &mut F,
        dev: &mut D,
        led: &mut L,
        setup: &SetupPacket,
    ) -> Result<(), Stall>
    where
        P: ControlPipe,
        F: FlashPages,
        D: DeviceOps,
        L: OutputPin,
    {
        match (setup.request, setup.request_type) {
            (request::GET_DESCRIPTOR, _) => self.get_descriptor(pipe, setup),
            (request::SET_ADDRESS, _) => {
                // Ack with a zero-length packet, flush it at the old
                // address, then switch. The other order loses the ack.
                pipe.send_in();
                pipe.wait_in_ready();
                pipe.assign_address(setup.value as u8);
                Ok(())
            }
            (request::SET_CONFIGURATION, 0x00) => {
                pipe.send_in();
                self.configuration = setup.value as u8;
                pipe.setup_interrupt_endpoint();
                Ok(())
            }
            (request::GET_CONFIGURATION, 0x80) => {
                pipe.wait_in_ready();
                pipe.write_byte(self.configuration);
                pipe.send_in();
                Ok(())
            }
            (request::HID_SET_IDLE, 0x21) => {
                // Idle duration accepted but not tracked; no periodic
                // reports are ever sent.
                pipe.send_in();
                Ok(())
            }
            (request::HID_SET_REPORT, 0x21) => self.set_report(pipe, flash, dev, led, setup),
            (request::HID_GET_REPORT, 0xA1) if setup.report_id() == REPORT_ID_INFO => {
                let info =
                    protocol::device_info_report(flash.page_size() as u16, flash.flash_size());
                send_ep0(pipe, &info);
                Ok(())
            }
            _ => Err(Stall),
        }
    }

    fn get_descriptor<P: ControlPipe>(
        &mut self,
        pipe: &mut P,
        setup: &SetupPacket,
    ) -> Result<(), Stall> {
        let (kind, index) = setup.descriptor_selector();
        let bytes = descriptor::lookup(kind, index).ok_or(Stall)?;

        // Transfer length is min(wLength, descriptor length, 255).
        let limit = if setup.length > 0xFF {
            0xFF
        } else {
            setup.length as usize
        };
        send_ep0(pipe, &bytes[..limit.min(bytes.len())]);
        Ok(())
    }

    fn set_report<P, F, D, L>(
        &mut self,
        pipe: &mut P,
        flash: &mut F,
        dev: &mut D,
        led: &mut L,
        setup: &SetupPacket,
    ) -> Result<(), Stall>
    where
        P: ControlPipe,
        F: FlashPages,
        D: DeviceOps,
        L: OutputPin,
    {
        // Busy indicator for the whole operation.
        led.set_high().ok();

        if setup.report_id() == update::REPORT_EXIT {
            update::exit_to_application(flash, dev);
        }

        self.receive_report(pipe, setup.length);
        pipe.send_in(); // status handshake

        update::program_chunk(&self.report, flash);

        led.set_low().ok();
        Ok(())
    }

    /// OUT data phase: accumulate `length` bytes into the report buffer,
    /// one packet at a time. Bytes past the buffer end are discarded; the
    /// protocol never sends more than 131 payload bytes.
    fn receive_report<P: ControlPipe>(&mut self, pipe: &mut P, length: u16) {
        let mut remaining = length as usize;
        let mut pos = 0;

        loop {
            pipe.wait_out_received();

            let take = remaining.min(ENDPOINT0_SIZE);
            for _ in 0..take {
                let byte = pipe.read_byte();
                if pos < self.report.len() {
                    self.report[pos] = byte;
                    pos += 1;
                }
            }
            pipe.ack_out();

            remaining -= take;
            if remaining == 0 {
                break;
            }
        }
    }
}

impl Default for ControlEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Send `data` to the host on endpoint 0.
///
/// Each packet carries up to the endpoint size; the transfer terminates with
/// a short packet, or with a zero-length packet when the final data packet
/// was exactly full. Aborts early if the host issues an OUT token
/// mid-transfer.
pub fn send_ep0<P: ControlPipe>(pipe: &mut P, data: &[u8]) {
    let mut offset = 0;

    loop {
        if pipe.wait_in_or_abort() == InEvent::HostAbort {
            return;
        }

        let n = (data.len() - offset).min(ENDPOINT0_SIZE);
        for &byte in &data[offset..offset + n] {
            pipe.write_byte(byte);
        }
        pipe.send_in();
        offset += n;

        if offset == data.len() && n < ENDPOINT0_SIZE {
            return;
        }
    }
}
