// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Software fakes of the hardware traits, shared by the integration tests.

#![allow(dead_code)]

use std::cell::Cell;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;

use hidboot_common::boot::{BootHw, ResetCause};
use hidboot_common::hal::{ControlPipe, DeviceOps, FlashPages, InEvent};

/// Ordered record of everything a fake observed, shared between fakes when a
/// test needs cross-object sequencing.
pub type Trace = Rc<RefCell<Vec<String>>>;

pub fn new_trace() -> Trace {
    Rc::new(RefCell::new(Vec::new()))
}

// ---------------------------------------------------------------------------
// Control pipe

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipeEvent {
    SendIn(usize),
    WaitInReady,
    AckOut,
    Stall,
    AssignAddress(u8),
    InterruptEpSetup,
}

/// Scripted endpoint-0 pipe: the test queues the SETUP packet and OUT data
/// packets up front, then inspects what the engine sent back.
#[derive(Default)]
pub struct FakePipe {
    setup: Option<[u8; 8]>,
    staged_in: Vec<u8>,
    pub sent: Vec<Vec<u8>>,
    out_packets: VecDeque<Vec<u8>>,
    current_out: VecDeque<u8>,
    pub events: Vec<PipeEvent>,
    pub stalled: bool,
    pub address: Option<u8>,
    /// Deliver a host abort once this many IN packets have been sent.
    pub abort_after_packets: Option<usize>,
}

impl FakePipe {
    pub fn with_setup(raw: [u8; 8]) -> Self {
        Self {
            setup: Some(raw),
            ..Self::default()
        }
    }

    pub fn queue_out(&mut self, packet: &[u8]) {
        self.out_packets.push_back(packet.to_vec());
    }

    /// All IN data concatenated, status/ZLP packets included.
    pub fn sent_bytes(&self) -> Vec<u8> {
        self.sent.iter().flatten().copied().collect()
    }
}

impl ControlPipe for FakePipe {
    fn take_setup(&mut self) -> [u8; 8] {
        self.setup.take().expect("no SETUP packet scripted")
    }

    fn read_byte(&mut self) -> u8 {
        self.current_out.pop_front().unwrap_or(0)
    }

    fn write_byte(&mut self, byte: u8) {
        self.staged_in.push(byte);
    }

    fn send_in(&mut self) {
        let packet = std::mem::take(&mut self.staged_in);
        self.events.push(PipeEvent::SendIn(packet.len()));
        self.sent.push(packet);
    }

    fn wait_in_ready(&mut self) {
        self.events.push(PipeEvent::WaitInReady);
    }

    fn wait_in_or_abort(&mut self) -> InEvent {
        match self.abort_after_packets {
            Some(n) if self.sent.len() >= n => InEvent::HostAbort,
            _ => InEvent::Ready,
        }
    }

    fn wait_out_received(&mut self) {
        let packet = self
            .out_packets
            .pop_front()
            .expect("engine waited for an OUT packet the host never sent");
        self.current_out = packet.into();
    }

    fn ack_out(&mut self) {
        self.events.push(PipeEvent::AckOut);
        self.current_out.clear();
    }

    fn stall(&mut self) {
        self.stalled = true;
        self.events.push(PipeEvent::Stall);
    }

    fn assign_address(&mut self, address: u8) {
        self.address = Some(address);
        self.events.push(PipeEvent::AssignAddress(address));
    }

    fn setup_interrupt_endpoint(&mut self) {
        self.events.push(PipeEvent::InterruptEpSetup);
    }
}

// ---------------------------------------------------------------------------
// Flash

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashOp {
    Erase(u32),
    Fill(u32, u16),
    Write(u32),
    BusyWait,
    RwwEnable,
}

/// Page-buffer flash model: fills stage into a single persistent page
/// buffer, erase fills a page of the image with 0xFF, commit copies the
/// buffer over the page. The image starts as 0x00 so a write to an unerased
/// page is visible.
pub struct FakeFlash {
    page_size: u32,
    flash_size: u32,
    pub image: Vec<u8>,
    buffer: Vec<u8>,
    pub ops: Vec<FlashOp>,
    trace: Option<Trace>,
}

impl FakeFlash {
    pub fn new(page_size: u32, flash_size: u32) -> Self {
        Self {
            page_size,
            flash_size,
            image: vec![0x00; flash_size as usize],
            buffer: vec![0xFF; page_size as usize],
            ops: Vec::new(),
            trace: None,
        }
    }

    pub fn with_trace(page_size: u32, flash_size: u32, trace: Trace) -> Self {
        Self {
            trace: Some(trace),
            ..Self::new(page_size, flash_size)
        }
    }

    fn page_start(&self, addr: u32) -> u32 {
        addr & !(self.page_size - 1)
    }

    pub fn erase_count(&self, page_addr: u32) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, FlashOp::Erase(a) if *a == page_addr))
            .count()
    }

    pub fn word_at(&self, addr: u32) -> u16 {
        let i = addr as usize;
        u16::from_le_bytes([self.image[i], self.image[i + 1]])
    }

    pub fn page_ops(&self) -> Vec<FlashOp> {
        self.ops
            .iter()
            .filter(|op| !matches!(op, FlashOp::BusyWait | FlashOp::RwwEnable))
            .copied()
            .collect()
    }

    fn note(&self, what: &str) {
        if let Some(trace) = &self.trace {
            trace.borrow_mut().push(what.to_string());
        }
    }
}

impl FlashPages for FakeFlash {
    fn page_size(&self) -> u32 {
        self.page_size
    }

    fn flash_size(&self) -> u32 {
        self.flash_size
    }

    fn page_erase(&mut self, addr: u32) {
        self.note("page_erase");
        self.ops.push(FlashOp::Erase(addr));
        let start = self.page_start(addr) as usize;
        self.image[start..start + self.page_size as usize].fill(0xFF);
    }

    fn page_fill(&mut self, addr: u32, word: u16) {
        self.note("page_fill");
        self.ops.push(FlashOp::Fill(addr, word));
        let offset = (addr & (self.page_size - 1)) as usize;
        self.buffer[offset..offset + 2].copy_from_slice(&word.to_le_bytes());
    }

    fn page_write(&mut self, addr: u32) {
        self.note("page_write");
        self.ops.push(FlashOp::Write(addr));
        let start = self.page_start(addr) as usize;
        self.image[start..start + self.page_size as usize].copy_from_slice(&self.buffer);
    }

    fn busy_wait(&mut self) {
        self.ops.push(FlashOp::BusyWait);
    }

    fn rww_enable(&mut self) {
        self.note("rww_enable");
        self.ops.push(FlashOp::RwwEnable);
    }
}

// ---------------------------------------------------------------------------
// Device control

/// Records the exit sequence; `system_reset` panics so tests can observe the
/// diverging call with `catch_unwind`.
pub struct FakeDevice {
    trace: Trace,
}

impl FakeDevice {
    pub fn new(trace: Trace) -> Self {
        Self { trace }
    }

    fn note(&self, what: &str) {
        self.trace.borrow_mut().push(what.to_string());
    }
}

impl DeviceOps for FakeDevice {
    fn detach_usb(&mut self) {
        self.note("detach_usb");
    }

    fn vectors_to_application(&mut self) {
        self.note("vectors_to_application");
    }

    fn settle_delay(&mut self) {
        self.note("settle_delay");
    }

    fn system_reset(&mut self) -> ! {
        self.note("system_reset");
        panic!("system reset");
    }
}

// ---------------------------------------------------------------------------
// LED

#[derive(Default)]
pub struct FakeLed {
    pub is_on: bool,
    pub transitions: Vec<bool>,
}

impl embedded_hal::digital::ErrorType for FakeLed {
    type Error = Infallible;
}

impl embedded_hal::digital::OutputPin for FakeLed {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.is_on = false;
        self.transitions.push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.is_on = true;
        self.transitions.push(true);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Boot hardware

/// Advances one tick per `ticks()` poll and records the key value seen at
/// each poll, so tests can check the latch is held for the whole window.
pub struct FakeBootHw {
    pub cause: ResetCause,
    pub key: u16,
    pub app_first_byte: u8,
    tick: Cell<u16>,
    pub polls: Cell<u32>,
    pub key_during_wait: RefCell<Vec<u16>>,
}

impl FakeBootHw {
    pub fn new(cause: ResetCause, key: u16, app_first_byte: u8) -> Self {
        Self {
            cause,
            key,
            app_first_byte,
            tick: Cell::new(0),
            polls: Cell::new(0),
            key_during_wait: RefCell::new(Vec::new()),
        }
    }
}

impl BootHw for FakeBootHw {
    fn reset_cause(&self) -> ResetCause {
        self.cause
    }

    fn magic_key(&self) -> u16 {
        self.key
    }

    fn set_magic_key(&mut self, value: u16) {
        self.key = value;
    }

    fn ticks(&self) -> u16 {
        self.polls.set(self.polls.get() + 1);
        self.key_during_wait.borrow_mut().push(self.key);
        self.tick.set(self.tick.get() + 1);
        self.tick.get()
    }

    fn application_first_byte(&self) -> u8 {
        self.app_first_byte
    }
}

// ---------------------------------------------------------------------------
// Setup packet helpers

pub fn setup(request_type: u8, request: u8, value: u16, index: u16, length: u16) -> [u8; 8] {
    let v = value.to_le_bytes();
    let i = index.to_le_bytes();
    let l = length.to_le_bytes();
    [request_type, request, v[0], v[1], i[0], i[1], l[0], l[1]]
}

pub fn get_descriptor(value: u16, length: u16) -> [u8; 8] {
    setup(0x80, 0x06, value, 0, length)
}
