// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Protocol core for the hidboot USB HID bootloader.
//!
//! Everything in this crate is target-independent: the control transfer
//! engine, the flash programming engine, the update state machine and the
//! boot arbitration are generic over the hardware traits in [`hal`], so the
//! same code runs against the RP2040 registers in `hidboot-bootloader` and
//! against software fakes in the host tests.

#![no_std]

pub mod boot;
pub mod control;
pub mod descriptor;
pub mod flash;
pub mod hal;
pub mod protocol;
pub mod update;

pub use boot::{arbitrate, BootDecision, ResetCause, MAGIC_BOOT_KEY};
pub use control::{send_ep0, ControlEngine, Stall};
pub use flash::PageWriter;
pub use hal::{ControlPipe, DeviceOps, FlashPages, InEvent};
pub use protocol::{SetupPacket, ENDPOINT0_SIZE, PRODUCT_ID, REPORT_BUFFER_LEN, VENDOR_ID};
