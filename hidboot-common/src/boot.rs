// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Boot arbitration: run the updater or hand off to the application.
//!
//! Decided exactly once per reset. The magic key lives in RAM that survives
//! watchdog and external resets but holds garbage after power-on, so every
//! path that does not deliberately latch it clears it.
//!
//! Key lifecycle:
//! - latched on entering the external-reset window, cleared when the window
//!   expires — a second external reset inside the window lands in the
//!   updater (double-tap entry);
//! - latched by the exit-to-application path right before its watchdog
//!   reset, cleared here when that reset arrives — which is what routes the
//!   post-update reboot into the application;
//! - cleared on every other path.

/// Cause of the reset that started this boot, captured before anything else
/// touches the reset-reason registers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetCause {
    PowerOn,
    External,
    Watchdog,
    Brownout,
}

/// One-shot decision produced by [`arbitrate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootDecision {
    RunApplication,
    RunUpdater,
}

/// Hardware state consulted by the arbitration.
pub trait BootHw {
    fn reset_cause(&self) -> ResetCause;

    /// The reset-surviving latch.
    fn magic_key(&self) -> u16;
    fn set_magic_key(&mut self, value: u16);

    /// Ticks elapsed since boot, one per millisecond.
    fn ticks(&self) -> u16;

    /// First byte of the application's flash image.
    fn application_first_byte(&self) -> u8;
}

/// Sentinel marking "we already gave the updater its chance this cycle".
pub const MAGIC_BOOT_KEY: u16 = 0xDC;

/// External-reset window before falling into the application, in ticks.
pub const EXTERNAL_RESET_TIMEOUT_TICKS: u16 = 750;

/// Erased-flash marker; an application image never starts with it.
pub const ERASED_FLASH: u8 = 0xFF;

pub fn arbitrate<H: BootHw>(hw: &mut H) -> BootDecision {
    match hw.reset_cause() {
        ResetCause::External if hw.magic_key() != MAGIC_BOOT_KEY => {
            hw.set_magic_key(MAGIC_BOOT_KEY);
            while hw.ticks() <= EXTERNAL_RESET_TIMEOUT_TICKS {}
            hw.set_magic_key(0);
            application_if_present(hw)
        }
        ResetCause::Watchdog if hw.magic_key() == MAGIC_BOOT_KEY => {
            // Post-update reboot requested by the exit path.
            hw.set_magic_key(0);
            application_if_present(hw)
        }
        // Power-on, brown-out, a watchdog reset without the key, or an
        // external reset inside the window: the updater gets its turn.
        _ => {
            hw.set_magic_key(0);
            BootDecision::RunUpdater
        }
    }
}

fn application_if_present<H: BootHw>(hw: &mut H) -> BootDecision {
    if hw.application_first_byte() != ERASED_FLASH {
        BootDecision::RunApplication
    } else {
        BootDecision::RunUpdater
    }
}
