// Copyright 2017 The Australian National University
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::{BotConfig, CardIndex};
use crate::utils::mem::memmap;
use crate::utils::mem::{self, BYTES_IN_PAGE};
use crate::utils::math;
use crate::utils::Address;
use crate::utils::ByteSize;
use crate::utils::WordSize;
use crate::TRACE_BOT;

use std::slice;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::atomic::{AtomicU8, AtomicUsize};

/// The byte-per-card table over one reserved address range.
///
/// Storage is an anonymous mapping sized for the whole reservation up front;
/// `resize` moves the committed boundary. Entries are accessed as atomic
/// bytes: different block-offset arrays write disjoint card ranges in
/// parallel, and lookups may race with the lazy repair of cards, which only
/// ever replaces one valid encoding with a more precise one.
pub struct BlockOffsetSharedArray {
    config: BotConfig,
    reserved_start: Address,
    reserved_words: WordSize,

    // keeps the mapping alive, all access goes through `cells`
    #[allow(dead_code)]
    mmap: memmap::MmapMut,
    cells: *const AtomicU8,
    reserved_bytes: ByteSize,

    committed_bytes: AtomicUsize,
    // end of the currently covered range
    end: AtomicUsize
}

unsafe impl Send for BlockOffsetSharedArray {}
unsafe impl Sync for BlockOffsetSharedArray {}

impl BlockOffsetSharedArray {
    /// Reserves a table for `[reserved_start, reserved_start + reserved_words)`
    /// with nothing committed. Fatal if the reservation fails.
    pub fn new(reserved_start: Address, reserved_words: WordSize, config: BotConfig) -> BlockOffsetSharedArray {
        guarantee!(
            reserved_start.is_aligned_to(config.card_bytes()),
            "covered range {} should start at a card boundary",
            reserved_start
        );
        let size = Self::compute_size(&config, reserved_words);
        let mut mmap = match mem::reserve_anon(size) {
            Some(mmap) => mmap,
            None => panic!("failed to reserve/commit block offset table ({} bytes)", size)
        };
        let reserved_bytes = mmap.len();
        let cells = mmap.as_mut_ptr() as *const AtomicU8;

        debug!(
            "block offset table reserved: {} bytes for [{}, {})",
            reserved_bytes,
            reserved_start,
            reserved_start.plus_words(reserved_words)
        );

        BlockOffsetSharedArray {
            config,
            reserved_start,
            reserved_words,
            mmap,
            cells,
            reserved_bytes,
            committed_bytes: AtomicUsize::new(0),
            end: AtomicUsize::new(reserved_start.as_usize())
        }
    }

    fn compute_size(config: &BotConfig, words: WordSize) -> ByteSize {
        let number_of_slots = (words / config.card_words()) + 1;
        math::align_up(number_of_slots, BYTES_IN_PAGE)
    }

    #[inline(always)]
    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    #[inline(always)]
    pub fn card_words(&self) -> WordSize {
        self.config.card_words()
    }

    pub fn reserved_start(&self) -> Address {
        self.reserved_start
    }

    pub fn reserved_end(&self) -> Address {
        self.reserved_start.plus_words(self.reserved_words)
    }

    /// end of the covered range
    pub fn end(&self) -> Address {
        Address::from_usize(self.end.load(Relaxed))
    }

    pub fn committed_size(&self) -> ByteSize {
        self.committed_bytes.load(Relaxed)
    }

    /// number of cards in the covered range
    pub fn cards_covered(&self) -> usize {
        (self.end() - self.reserved_start) / self.config.card_bytes()
    }

    /// Covers `[reserved_start, reserved_start + new_word_size)`, committing
    /// or uncommitting table pages as needed. New entries are not
    /// initialized here, that is up to the block-offset arrays. Fatal if the
    /// new size does not fit the reservation.
    pub fn resize(&self, new_word_size: WordSize) {
        if new_word_size > self.reserved_words {
            panic!(
                "failed to reserve/commit block offset table: resize to {} words is larger than reserved {} words",
                new_word_size,
                self.reserved_words
            );
        }
        let new_size = Self::compute_size(&self.config, new_word_size);
        let old_size = self.committed_size();
        self.end.store(self.reserved_start.plus_words(new_word_size).as_usize(), Relaxed);

        if new_size > old_size {
            let delta = math::align_up(new_size - old_size, BYTES_IN_PAGE);
            if old_size + delta > self.reserved_bytes {
                panic!("failed to reserve/commit block offset table expansion ({} bytes)", delta);
            }
            self.committed_bytes.store(old_size + delta, Relaxed);
        } else {
            let delta = math::align_down(old_size - new_size, BYTES_IN_PAGE);
            if delta == 0 {
                return;
            }
            // uncommitted pages read back as zero when committed again
            let new_committed = old_size - delta;
            for i in new_committed..old_size {
                self.raw_cell(i).store(0, Relaxed);
            }
            self.committed_bytes.store(new_committed, Relaxed);
        }

        trace_if!(
            TRACE_BOT,
            "block offset table resized to {} words, {} bytes committed",
            new_word_size,
            self.committed_size()
        );
    }

    /// every entry of the reservation; the mapping lives as long as `self`
    #[inline(always)]
    fn reserved_cells(&self) -> &[AtomicU8] {
        unsafe { slice::from_raw_parts(self.cells, self.reserved_bytes) }
    }

    #[inline(always)]
    fn raw_cell(&self, i: usize) -> &AtomicU8 {
        match self.reserved_cells().get(i) {
            Some(cell) => cell,
            None => panic!("card {} is outside the reserved table ({} bytes)", i, self.reserved_bytes)
        }
    }

    #[inline(always)]
    fn cell(&self, index: CardIndex) -> &AtomicU8 {
        debug_assert!(
            index.as_usize() < self.committed_size(),
            "{} is outside the committed table ({} bytes)",
            index,
            self.committed_size()
        );
        self.raw_cell(index.as_usize())
    }

    /// the committed part of the table, for diagnostics
    pub fn entries(&self) -> &[AtomicU8] {
        &self.reserved_cells()[..self.committed_size()]
    }

    #[inline(always)]
    pub fn offset_array(&self, index: CardIndex) -> u8 {
        self.cell(index).load(Relaxed)
    }

    #[inline(always)]
    pub fn set_offset_array(&self, index: CardIndex, offset: u8) {
        self.cell(index).store(offset, Relaxed);
    }

    /// Records that the block covering card `index` starts at `low`, where
    /// `high` is the card boundary.
    #[inline(always)]
    pub fn set_offset_array_words(&self, index: CardIndex, high: Address, low: Address, reducing: bool) {
        debug_assert!(high >= low, "addresses out of order");
        let offset = high.words_since(low);
        debug_assert!(
            offset <= self.card_words(),
            "offset {} too large for {}",
            offset,
            index
        );
        self.set_offset_array_checked(index, offset as u8, reducing);
    }

    /// Stores `offset` at `index`; with `reducing`, the entry may only go down.
    #[inline(always)]
    pub fn set_offset_array_checked(&self, index: CardIndex, offset: u8, reducing: bool) {
        debug_assert!(
            !reducing || self.offset_array(index) >= offset,
            "not reducing at {}: {} -> {}",
            index,
            self.offset_array(index),
            offset
        );
        self.set_offset_array(index, offset);
    }

    /// Fills the closed range `[left, right]` with `offset`.
    pub fn set_offset_array_range(&self, left: CardIndex, right: CardIndex, offset: u8, reducing: bool) {
        debug_assert!(right < CardIndex::new(self.committed_size()), "right address out of range");
        debug_assert!(left <= right, "indexes out of order");
        for i in left.as_usize()..=right.as_usize() {
            self.set_offset_array_checked(CardIndex::new(i), offset, reducing);
        }
    }

    /// Fills the cards of `[left, right)` (card-aligned addresses) with `offset`.
    pub fn set_offset_array_addrs(&self, left: Address, right: Address, offset: u8) {
        debug_assert!(self.is_card_boundary(left) && self.is_card_boundary(right));
        if left >= right {
            return;
        }
        let first = self.index_for(left);
        let last = self.index_for(right.minus_words(1));
        self.set_offset_array_range(first, last, offset, false);
    }

    /// Fatal unless the entry at `index` records a block starting at `low`.
    pub fn check_offset_array(&self, index: CardIndex, high: Address, low: Address) {
        debug_assert!(high >= low, "addresses out of order");
        guarantee!(
            self.offset_array(index) as usize == high.words_since(low),
            "wrong value in the offset table at {}: {} should be {}",
            index,
            self.offset_array(index),
            high.words_since(low)
        );
    }

    /// index of the card covering `p`
    #[inline(always)]
    pub fn index_for(&self, p: Address) -> CardIndex {
        debug_assert!(
            p >= self.reserved_start && p < self.reserved_end(),
            "{} is not in the covered range",
            p
        );
        CardIndex::new((p - self.reserved_start) >> (self.config.log_card_words() + crate::utils::LOG_BYTES_IN_WORD))
    }

    /// first address covered by the card at `index`
    #[inline(always)]
    pub fn address_for_index(&self, index: CardIndex) -> Address {
        let ret = self.reserved_start.plus_words(index.as_usize() << self.config.log_card_words());
        debug_assert!(ret <= self.reserved_end(), "{} is past the covered range", index);
        ret
    }

    #[inline(always)]
    pub fn is_card_boundary(&self, p: Address) -> bool {
        p.is_aligned_to(self.config.card_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bot() -> BlockOffsetSharedArray {
        BlockOffsetSharedArray::new(Address::from_usize(0x1_0000_0000), 1 << 20, BotConfig::new(64, 3))
    }

    #[test]
    fn test_index_math() {
        let array = bot();
        let start = array.reserved_start();
        assert_eq!(array.index_for(start), CardIndex::new(0));
        assert_eq!(array.index_for(start.plus_words(63)), CardIndex::new(0));
        assert_eq!(array.index_for(start.plus_words(64)), CardIndex::new(1));
        assert_eq!(array.address_for_index(CardIndex::new(3)), start.plus_words(3 * 64));
        assert!(array.is_card_boundary(start.plus_words(128)));
        assert!(!array.is_card_boundary(start.plus_words(129)));
    }

    #[test]
    fn test_resize_commits_pages() {
        let array = bot();
        assert_eq!(array.committed_size(), 0);

        array.resize(1 << 16);
        assert_eq!(array.committed_size(), BYTES_IN_PAGE);
        assert_eq!(array.cards_covered(), (1 << 16) / 64);

        array.set_offset_array(CardIndex::new(5), 7);
        array.resize(1 << 20);
        assert_eq!(array.committed_size(), 5 * BYTES_IN_PAGE);
        assert_eq!(array.offset_array(CardIndex::new(5)), 7);

        array.resize(1 << 10);
        assert_eq!(array.committed_size(), BYTES_IN_PAGE);
    }

    #[test]
    #[should_panic(expected = "outside the reserved table")]
    fn test_card_past_reservation() {
        let array = bot();
        array.resize(1 << 12);
        array.offset_array(CardIndex::new(1 << 30));
    }

    #[test]
    #[should_panic]
    fn test_resize_past_reservation() {
        let array = bot();
        array.resize((1 << 20) + 64);
    }
}
