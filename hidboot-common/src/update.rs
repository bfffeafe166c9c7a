// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Firmware update state machine.
//!
//! Invoked from the `HID_SET_REPORT` handler. Report id 1 leaves the
//! bootloader for good; report id 2 programs one flash chunk.

use crate::flash::PageWriter;
use crate::hal::{DeviceOps, FlashPages};
use crate::protocol::{decode_address, REPORT_BUFFER_LEN, REPORT_DATA_OFFSET};

/// Report id 1 in the host-to-device direction: exit the bootloader. The
/// payload beyond the id is ignored.
pub const REPORT_EXIT: u8 = 1;

/// Hand control back to the resident application.
///
/// Relinquishes the bus, restores flash read access, re-vectors to the
/// application section and resets the device after a settle delay. Never
/// returns; the next boot arbitrates its way into the application.
pub fn exit_to_application<F, D>(flash: &mut F, dev: &mut D) -> !
where
    F: FlashPages,
    D: DeviceOps,
{
    dev.detach_usb();
    flash.rww_enable();
    dev.vectors_to_application();
    dev.settle_delay();
    dev.system_reset()
}

/// Program one report-2 chunk: 3-byte little-endian start address followed
/// by the 64-word data area.
///
/// The whole data area is programmed regardless of how many bytes the
/// transfer carried; the host pads short chunks. Addresses ascend in 2-byte
/// steps, which is what lets [`PageWriter`] erase and commit on page
/// boundaries. No range check is made against the boot section or the flash
/// size; the host tool is trusted.
pub fn program_chunk<F: FlashPages>(report: &[u8; REPORT_BUFFER_LEN], flash: &mut F) {
    let start = decode_address(report);

    #[cfg(feature = "defmt")]
    defmt::println!("flash chunk @ 0x{:06x}", start);

    let mut writer = PageWriter::new(start);
    for pair in report[REPORT_DATA_OFFSET..].chunks_exact(2) {
        writer.write_word(flash, u16::from_le_bytes([pair[0], pair[1]]));
    }
}
