// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Descriptor tables served verbatim on endpoint 0.
//!
//! Layouts are fixed by the protocol family; the host tool matches the
//! vendor/device strings in addition to VID/PID, so none of these bytes are
//! free to change.

use crate::protocol::{ENDPOINT0_SIZE, PRODUCT_ID, VENDOR_ID};

pub const TYPE_DEVICE: u8 = 0x01;
pub const TYPE_CONFIGURATION: u8 = 0x02;
pub const TYPE_STRING: u8 = 0x03;
pub const TYPE_HID_REPORT: u8 = 0x22;

pub const STRING_INDEX_VENDOR: u8 = 1;
pub const STRING_INDEX_DEVICE: u8 = 2;

/// 18-byte device descriptor, USB 1.1.
pub static DEVICE: [u8; 18] = [
    18,                        // bLength
    TYPE_DEVICE,               // bDescriptorType
    0x10, 0x01,                // bcdUSB 1.10
    0,                         // bDeviceClass (per interface)
    0,                         // bDeviceSubClass
    0,                         // bDeviceProtocol
    ENDPOINT0_SIZE as u8,      // bMaxPacketSize0
    VENDOR_ID as u8, (VENDOR_ID >> 8) as u8,   // idVendor
    PRODUCT_ID as u8, (PRODUCT_ID >> 8) as u8, // idProduct
    0x00, 0x01,                // bcdDevice 1.00
    STRING_INDEX_VENDOR,       // iManufacturer
    STRING_INDEX_DEVICE,       // iProduct
    0,                         // iSerialNumber
    1,                         // bNumConfigurations
];

/// HID report descriptor: a vendor usage page with two feature reports,
/// id 1 (6 bytes) and id 2 (131 bytes).
pub static HID_REPORT: [u8; 33] = [
    0x06, 0x00, 0xFF,          // USAGE_PAGE (vendor defined)
    0x09, 0x01,                // USAGE (vendor usage 1)
    0xA1, 0x01,                // COLLECTION (application)
    0x15, 0x00,                //   LOGICAL_MINIMUM (0)
    0x26, 0xFF, 0x00,          //   LOGICAL_MAXIMUM (255)
    0x75, 0x08,                //   REPORT_SIZE (8)
    0x85, 0x01,                //   REPORT_ID (1)
    0x95, 0x06,                //   REPORT_COUNT (6)
    0x09, 0x00,                //   USAGE (undefined)
    0xB2, 0x02, 0x01,          //   FEATURE (data, var, abs, buf)
    0x85, 0x02,                //   REPORT_ID (2)
    0x95, 0x83,                //   REPORT_COUNT (131)
    0x09, 0x00,                //   USAGE (undefined)
    0xB2, 0x02, 0x01,          //   FEATURE (data, var, abs, buf)
    0xC0,                      // END_COLLECTION
];

/// Configuration descriptor: configuration + interface + HID + endpoint,
/// 34 bytes total, one HID interface with a single interrupt-IN endpoint.
pub static CONFIGURATION: [u8; 34] = [
    // configuration descriptor, USB spec 9.6.3
    9,                         // bLength
    TYPE_CONFIGURATION,        // bDescriptorType
    34, 0,                     // wTotalLength
    1,                         // bNumInterfaces
    1,                         // bConfigurationValue
    0,                         // iConfiguration
    0xC0,                      // bmAttributes (self powered)
    50,                        // bMaxPower (100 mA)
    // interface descriptor, USB spec 9.6.5
    9,                         // bLength
    4,                         // bDescriptorType
    0,                         // bInterfaceNumber
    0,                         // bAlternateSetting
    1,                         // bNumEndpoints
    0x03,                      // bInterfaceClass (HID)
    0x00,                      // bInterfaceSubClass
    0x00,                      // bInterfaceProtocol
    0,                         // iInterface
    // HID descriptor, HID 1.11 section 6.2.1
    9,                         // bLength
    0x21,                      // bDescriptorType
    0x11, 0x01,                // bcdHID 1.11
    0,                         // bCountryCode
    1,                         // bNumDescriptors
    TYPE_HID_REPORT,           // bDescriptorType
    33, 0,                     // wDescriptorLength
    // endpoint descriptor, USB spec 9.6.6
    7,                         // bLength
    5,                         // bDescriptorType
    0x81,                      // bEndpointAddress (EP1 IN)
    3,                         // bmAttributes (interrupt)
    64, 0,                     // wMaxPacketSize
    200,                       // bInterval (ms)
];

/// String descriptors, UTF-16LE with a length|type header word.
pub static STRING_VENDOR: [u8; 18] = [
    18, TYPE_STRING,
    b'o', 0, b'b', 0, b'd', 0, b'e', 0, b'v', 0, b'.', 0, b'a', 0, b't', 0,
];

pub static STRING_DEVICE: [u8; 16] = [
    16, TYPE_STRING,
    b'H', 0, b'I', 0, b'D', 0, b'B', 0, b'o', 0, b'o', 0, b't', 0,
];

/// Resolve a descriptor by type and index.
///
/// Only the string table discriminates on the index; the other types ignore
/// it. There is no index-0 language descriptor: requesting one is answered
/// with a stall, which the host tools of this protocol family tolerate.
pub fn lookup(kind: u8, index: u8) -> Option<&'static [u8]> {
    match (kind, index) {
        (TYPE_DEVICE, _) => Some(&DEVICE),
        (TYPE_CONFIGURATION, _) => Some(&CONFIGURATION),
        (TYPE_HID_REPORT, _) => Some(&HID_REPORT),
        (TYPE_STRING, STRING_INDEX_VENDOR) => Some(&STRING_VENDOR),
        (TYPE_STRING, STRING_INDEX_DEVICE) => Some(&STRING_DEVICE),
        _ => None,
    }
}
