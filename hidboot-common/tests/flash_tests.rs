// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Sequencing laws of the flash programming engine.

mod support;

use hidboot_common::flash::PageWriter;
use support::{FakeFlash, FlashOp};

const PAGE: u32 = 64; // 32 words per page keeps the scenarios small
const FLASH: u32 = 1024;

fn words(n: usize, seed: u16) -> Vec<u16> {
    (0..n as u16).map(|i| seed.wrapping_add(i * 7)).collect()
}

/// Write a word stream through the engine, split into chunks at the given
/// boundaries; each chunk gets its own `PageWriter`, the way each
/// `SET_REPORT` transfer does.
fn write_chunked(flash: &mut FakeFlash, start: u32, data: &[u16], chunk_words: usize) {
    for (i, chunk) in data.chunks(chunk_words).enumerate() {
        let mut writer = PageWriter::new(start + (i * chunk_words * 2) as u32);
        for &word in chunk {
            writer.write_word(flash, word);
        }
    }
}

#[test]
fn test_erase_precedes_fill_on_every_page() {
    let mut flash = FakeFlash::new(PAGE, FLASH);
    write_chunked(&mut flash, 0, &words(64, 100), 64); // two full pages

    let mut erased_pages = Vec::new();
    for op in &flash.ops {
        match op {
            FlashOp::Erase(addr) => erased_pages.push(*addr),
            FlashOp::Fill(addr, _) => {
                let page = addr & !(PAGE - 1);
                assert!(
                    erased_pages.contains(&page),
                    "fill at {addr:#x} before its page was erased"
                );
            }
            _ => {}
        }
    }
    assert_eq!(erased_pages, vec![0, PAGE]);
}

#[test]
fn test_page_commits_on_boundary_cross() {
    let mut flash = FakeFlash::new(PAGE, FLASH);
    write_chunked(&mut flash, 0, &words(32, 1), 32); // exactly one page

    let commits: Vec<u32> = flash
        .ops
        .iter()
        .filter_map(|op| match op {
            FlashOp::Write(addr) => Some(*addr),
            _ => None,
        })
        .collect();
    // committed once, addressed at the last word of the page
    assert_eq!(commits, vec![PAGE - 2]);
}

#[test]
fn test_partial_page_is_not_committed() {
    let mut flash = FakeFlash::new(PAGE, FLASH);
    write_chunked(&mut flash, 0, &words(10, 1), 10);

    assert!(flash
        .ops
        .iter()
        .all(|op| !matches!(op, FlashOp::Write(_))));
}

#[test]
fn test_each_page_erased_exactly_once() {
    let mut flash = FakeFlash::new(PAGE, FLASH);
    write_chunked(&mut flash, 0, &words(96, 9), 96); // three pages

    for page in [0, PAGE, 2 * PAGE] {
        assert_eq!(flash.erase_count(page), 1);
    }
}

#[test]
fn test_busy_wait_follows_every_erase_and_commit() {
    let mut flash = FakeFlash::new(PAGE, FLASH);
    write_chunked(&mut flash, 0, &words(32, 3), 32);

    for (i, op) in flash.ops.iter().enumerate() {
        if matches!(op, FlashOp::Erase(_) | FlashOp::Write(_)) {
            assert_eq!(flash.ops.get(i + 1), Some(&FlashOp::BusyWait));
        }
    }
}

#[test]
fn test_final_image_is_independent_of_chunking() {
    // For page-crossing sequences the result must not depend on how OUT
    // packets chunked the data. Chunk boundaries here land both on and
    // inside page boundaries.
    let data = words(96, 0x1234); // three pages worth
    let reference = {
        let mut flash = FakeFlash::new(PAGE, FLASH);
        write_chunked(&mut flash, 0, &data, 96);
        flash.image
    };

    for chunk_words in [4, 8, 12, 24, 32, 48] {
        let mut flash = FakeFlash::new(PAGE, FLASH);
        write_chunked(&mut flash, 0, &data, chunk_words);
        assert_eq!(
            flash.image, reference,
            "image diverged with {chunk_words}-word chunks"
        );
    }
}

#[test]
fn test_words_land_at_ascending_addresses() {
    let mut flash = FakeFlash::new(PAGE, FLASH);
    let data = words(48, 42);
    write_chunked(&mut flash, 128, &data, 48);

    let fills: Vec<(u32, u16)> = flash
        .ops
        .iter()
        .filter_map(|op| match op {
            FlashOp::Fill(addr, word) => Some((*addr, *word)),
            _ => None,
        })
        .collect();

    assert_eq!(fills.len(), data.len());
    for (i, (addr, word)) in fills.iter().enumerate() {
        assert_eq!(*addr, 128 + (i as u32) * 2);
        assert_eq!(*word, data[i]);
    }
}

#[test]
fn test_image_contents_after_two_pages() {
    let mut flash = FakeFlash::new(PAGE, FLASH);
    let data = words(64, 0xBEE0);
    write_chunked(&mut flash, 0, &data, 64);

    for (i, &word) in data.iter().enumerate() {
        assert_eq!(flash.word_at((i * 2) as u32), word);
    }
}

#[test]
fn test_session_resuming_mid_page_keeps_staged_words() {
    // A chunk boundary inside a page must not lose the staged half-page:
    // the page buffer persists between writers.
    let data = words(32, 7);
    let mut flash = FakeFlash::new(PAGE, FLASH);
    write_chunked(&mut flash, 0, &data, 16); // boundary at half a page

    for (i, &word) in data.iter().enumerate() {
        assert_eq!(flash.word_at((i * 2) as u32), word);
    }
    assert_eq!(flash.erase_count(0), 1);
}
