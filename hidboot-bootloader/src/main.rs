// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

#![no_std]
#![no_main]

mod boot;
mod flash;
mod usb;

use defmt_rtt as _;
use panic_probe as _;

defmt::timestamp!("{=u64:us}", { 0 });

use cortex_m_rt::entry;
use rp2040_hal::{self as hal, pac};
use pac::interrupt;

use hidboot_common::{arbitrate, BootDecision, ControlEngine};

#[unsafe(link_section = ".boot2")]
#[used]
pub static BOOT2: [u8; 256] = rp2040_boot2::BOOT_LOADER_GENERIC_03H;

const XOSC_CRYSTAL_FREQ: u32 = 12_000_000;

#[entry]
fn main() -> ! {
    let mut pac = pac::Peripherals::take().unwrap();

    // Sample the reset reason before the clock bring-up below touches the
    // watchdog block.
    let cause = boot::capture_reset_cause(&pac.WATCHDOG, &pac.VREG_AND_CHIP_RESET);

    let mut watchdog = hal::Watchdog::new(pac.WATCHDOG);
    let clocks = hal::clocks::init_clocks_and_plls(
        XOSC_CRYSTAL_FREQ,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )
    .ok()
    .unwrap();

    let sio = hal::Sio::new(pac.SIO);
    let pins = hal::gpio::Pins::new(pac.IO_BANK0, pac.PADS_BANK0, sio.gpio_bank0, &mut pac.RESETS);
    let led = pins.gpio25.into_push_pull_output();
    let timer = hal::Timer::new(pac.TIMER, &mut pac.RESETS, &clocks);

    defmt::println!("hidboot init, reset cause: {}", cause);

    let mut hw = boot::BootControl::new(cause, timer);
    match arbitrate(&mut hw) {
        BootDecision::RunApplication => {
            defmt::println!("handing off to application at 0x{:08x}", flash::APP_ADDR);
            // SAFETY: arbitrate() checked an image is present.
            unsafe { boot::jump_to_application() }
        }
        BootDecision::RunUpdater => {
            defmt::println!("entering updater");
        }
    }
    let timer = hw.into_timer();

    flash::init();

    let pipe = usb::init(pac.USBCTRL_REGS, pac.USBCTRL_DPRAM, &mut pac.RESETS);
    usb::store_context(usb::UsbContext {
        engine: ControlEngine::new(),
        pipe,
        flash: flash::RomFlash::new(),
        system: boot::SystemControl::new(timer, watchdog),
        led,
    });

    defmt::println!("USB HID updater ready");

    // SAFETY: the context was stored above; the handler is the only reader.
    unsafe { pac::NVIC::unmask(pac::Interrupt::USBCTRL_IRQ) };

    // Everything from here on happens in the interrupt handler.
    loop {
        cortex_m::asm::wfi();
    }
}

#[interrupt]
fn USBCTRL_IRQ() {
    let _ = usb::with_context(|context| context.service());
}
