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

use super::shared_array::BlockOffsetSharedArray;
use super::{BotConfig, CardIndex, N_POWERS};
use crate::heap::BlockSpace;
use crate::utils::Address;
use crate::utils::WordSize;
use crate::TRACE_BOT;

use std::fmt;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;

/// checks every stamped block against the table after allocation and before
/// split (debug builds only)
const VERIFY_BLOCK_OFFSET_ARRAY: bool = cfg!(debug_assertions);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Action {
    /// record the block; with a zero-initialised table only its offset card
    Mark,
    /// record the block on every card it covers
    Single,
    /// check that the table records the block
    Check
}

/// The block-offset array of one contiguous space `[bottom, end)`.
///
/// All entries live in the shared array; this type only knows which slice of
/// it belongs to the space and where the allocated part of the space ends.
/// Every method takes `&self`: entry writes are atomic, and arrays of
/// different spaces touch disjoint cards.
pub struct BlockOffsetArray {
    array: Arc<BlockOffsetSharedArray>,
    config: BotConfig,
    bottom: Address,
    end: AtomicUsize,
    /// nothing at or above this address has been allocated yet
    unallocated_block: AtomicUsize,
    init_to_zero: bool
}

impl BlockOffsetArray {
    /// Creates the array for `[bottom, bottom + word_size)`. Unless the table
    /// is zero-initialised, every card is stamped to point back to `bottom`.
    pub fn new(
        array: Arc<BlockOffsetSharedArray>,
        bottom: Address,
        word_size: WordSize,
        init_to_zero: bool
    ) -> BlockOffsetArray {
        let config = *array.config();
        let end = bottom.plus_words(word_size);
        guarantee!(
            array.is_card_boundary(bottom) && array.is_card_boundary(end),
            "space [{}, {}) is not card aligned",
            bottom,
            end
        );
        guarantee!(
            bottom >= array.reserved_start() && end <= array.end(),
            "space [{}, {}) is not covered by the committed table",
            bottom,
            end
        );

        let ret = BlockOffsetArray {
            array,
            config,
            bottom,
            end: AtomicUsize::new(end.as_usize()),
            unallocated_block: AtomicUsize::new(bottom.as_usize()),
            init_to_zero
        };
        if !init_to_zero {
            ret.array.set_offset_array(ret.array.index_for(bottom), 0);
            ret.set_remainder_to_point_to_start(bottom.plus_words(config.card_words()), end);
        }
        ret
    }

    #[inline(always)]
    fn n_words(&self) -> WordSize {
        self.config.card_words()
    }

    pub fn shared_array(&self) -> &Arc<BlockOffsetSharedArray> {
        &self.array
    }

    pub fn bottom(&self) -> Address {
        self.bottom
    }

    pub fn end(&self) -> Address {
        Address::from_usize(self.end.load(Relaxed))
    }

    pub fn init_to_zero(&self) -> bool {
        self.init_to_zero
    }

    pub fn unallocated_block(&self) -> Address {
        Address::from_usize(self.unallocated_block.load(Relaxed))
    }

    pub fn set_unallocated_block(&self, block: Address) {
        debug_assert!(block >= self.bottom && block <= self.end(), "out of range");
        self.unallocated_block.store(block.as_usize(), Relaxed);
    }

    /// Stamps the card-aligned range `[start, end)` as covered by one block
    /// starting before `start`.
    pub fn set_remainder_to_point_to_start(&self, start: Address, end: Address) {
        if start >= end {
            return;
        }
        let start_card = self.array.index_for(start);
        let end_card = self.array.index_for(end.minus_words(1));
        debug_assert!(start == self.array.address_for_index(start_card), "precondition");
        debug_assert!(
            end == self.array.address_for_index(end_card).plus_words(self.n_words()),
            "precondition"
        );
        self.set_remainder_to_point_to_start_incl(start_card, end_card);
    }

    /// Stamps the closed card range `[start_card, end_card]`, all covered by
    /// a block that starts before `start_card`. Segments of 1, b-1, b^2-b, ..
    /// cards (b the skip base) get codes 0, 1, 2, .., so that from any card
    /// the first hop lands at or before the start of its own segment and a
    /// lookup reaches `start_card - 1` in a logarithmic number of hops.
    pub fn set_remainder_to_point_to_start_incl(&self, start_card: CardIndex, end_card: CardIndex) {
        if start_card > end_card {
            return;
        }
        debug_assert!(start_card > self.array.index_for(self.bottom), "nothing to point back to");

        let mut start_card_for_region = start_card;
        for i in 0..N_POWERS {
            // last card that a code-i entry may occupy
            let reach = start_card - 1 + (self.config.power_to_cards_back(i + 1) - 1);
            let offset = self.config.code_for_power(i);
            if reach >= end_card {
                self.array
                    .set_offset_array_range(start_card_for_region, end_card, offset, false);
                start_card_for_region = reach + 1;
                break;
            }
            self.array
                .set_offset_array_range(start_card_for_region, reach, offset, false);
            start_card_for_region = reach + 1;
        }
        debug_assert!(start_card_for_region > end_card, "sanity check");

        if cfg!(debug_assertions) {
            self.check_all_cards(start_card, end_card);
        }
    }

    /// Fatal unless `[start_card, end_card]` carries the codes that
    /// `set_remainder_to_point_to_start_incl` would stamp.
    pub fn check_all_cards(&self, start_card: CardIndex, end_card: CardIndex) {
        if end_card < start_card {
            return;
        }
        let n_words = self.n_words();
        guarantee!(
            self.array.offset_array(start_card) as usize == n_words,
            "wrong value in second card of a block at {}",
            start_card
        );
        for c in (start_card.as_usize() + 1)..=end_card.as_usize() {
            let c = CardIndex::new(c);
            let entry = self.array.offset_array(c);
            if c - start_card > self.config.power_to_cards_back(1) {
                guarantee!(
                    entry as usize > n_words,
                    "{} should be in the logarithmic region, found {}",
                    c,
                    entry
                );
            }
            let backskip = self.config.entry_to_cards_back(entry);
            let landing_card = c - backskip;
            guarantee!(landing_card >= start_card - 1, "{} skips past the block", c);
            if landing_card >= start_card {
                guarantee!(
                    self.array.offset_array(landing_card) <= entry,
                    "codes should not increase going back from {}",
                    c
                );
            } else {
                guarantee!(landing_card == start_card - 1, "tautology");
                guarantee!(
                    self.array.offset_array(landing_card) as usize <= n_words,
                    "{} should land on an offset card",
                    c
                );
            }
        }
    }

    fn do_block_internal(&self, blk_start: Address, blk_end: Address, action: Action) {
        debug_assert!(blk_start < blk_end, "empty block");
        debug_assert!(
            blk_start >= self.bottom && blk_end <= self.end(),
            "block [{}, {}) is outside the space",
            blk_start,
            blk_end
        );
        let n_words = self.n_words();
        // last card boundary before the end of the block
        let boundary_before_end = blk_end.minus_words(1).align_down(self.config.card_bytes());
        if blk_start > boundary_before_end {
            // the block neither starts at nor crosses a card boundary
            return;
        }

        let mut start_index = self.array.index_for(blk_start);
        let end_index = self.array.index_for(blk_end.minus_words(1));
        let mut boundary = self.array.address_for_index(start_index);
        debug_assert!(boundary <= blk_start, "block should start at or after the boundary");
        if blk_start != boundary {
            // starts strictly after the boundary, its offset card is the next one
            boundary = boundary.plus_words(n_words);
            start_index = start_index + 1;
        }
        debug_assert!(start_index <= end_index, "monotonicity of index_for()");
        debug_assert!(boundary <= boundary_before_end, "tautology");

        match action {
            Action::Mark if self.init_to_zero => {
                self.array.set_offset_array_words(start_index, boundary, blk_start, false);
            }
            Action::Mark | Action::Single => {
                self.array.set_offset_array_words(start_index, boundary, blk_start, false);
                if start_index < end_index {
                    let rem_st = self.array.address_for_index(start_index).plus_words(n_words);
                    let rem_end = self.array.address_for_index(end_index).plus_words(n_words);
                    self.set_remainder_to_point_to_start(rem_st, rem_end);
                }
            }
            Action::Check => {
                self.array.check_offset_array(start_index, boundary, blk_start);
                self.check_all_cards(start_index + 1, end_index);
            }
        }
    }

    /// records `[blk_start, blk_end)` as one block on every card it covers
    pub fn single_block(&self, blk_start: Address, blk_end: Address) {
        self.do_block_internal(blk_start, blk_end, Action::Single);
    }

    /// records `[blk_start, blk_end)` as one block; a zero-initialised table
    /// only gets the offset card written
    pub fn mark_block(&self, blk_start: Address, blk_end: Address) {
        self.do_block_internal(blk_start, blk_end, Action::Mark);
    }

    /// records a newly allocated block
    pub fn alloc_block(&self, blk_start: Address, blk_end: Address) {
        trace_if!(TRACE_BOT, "bot: alloc_block [{}, {})", blk_start, blk_end);
        self.mark_block(blk_start, blk_end);
        self.allocated(blk_start, blk_end);
    }

    pub fn alloc_block_words(&self, blk: Address, size: WordSize) {
        self.alloc_block(blk, blk.plus_words(size));
    }

    /// advances the unallocated-block mark past `[blk_start, blk_end)`
    pub fn allocated(&self, blk_start: Address, blk_end: Address) {
        self.verify_single_block(blk_start, blk_end);
        self.unallocated_block.fetch_max(blk_end.as_usize(), Relaxed);
    }

    /// Records that `[blk_start, blk_end)` was freed. If the block touches
    /// the unallocated-block mark, the mark moves down to `blk_start`.
    pub fn freed(&self, blk_start: Address, blk_end: Address) {
        self.verify_single_block(blk_start, blk_end);
        let ub = self.unallocated_block();
        debug_assert!(ub <= self.end(), "inconsistent unallocated block");
        if blk_end >= ub && blk_start <= ub {
            self.set_unallocated_block(blk_start);
        }
    }

    /// The block `[blk, blk + blk_size)` turned out to be two blocks, the
    /// first `left_blk_size` words long. Only the cards of the right block
    /// are stamped again.
    pub fn split_block(&self, blk: Address, blk_size: WordSize, left_blk_size: WordSize) {
        debug_assert!(left_blk_size > 0 && left_blk_size < blk_size, "bad split");
        trace_if!(
            TRACE_BOT,
            "bot: split_block {} ({} words) at +{}",
            blk,
            blk_size,
            left_blk_size
        );
        let blk_end = blk.plus_words(blk_size);
        self.verify_single_block(blk, blk_end);
        self.single_block(blk.plus_words(left_blk_size), blk_end);
    }

    /// Coalesces two adjacent blocks. `space` must still report the old size
    /// of `blk1`, that is `blk1 + block_size(blk1) == blk2`.
    ///
    /// Only the offset card of `blk2` changes: it gets the in-card offset of
    /// `blk1` when that is close enough, otherwise a skip code landing inside
    /// the cards `blk1` already covers. Cards further into `blk2` land on that
    /// card and need no change, so the table stays correct but is no longer
    /// what `single_block` would stamp for the joined block.
    pub fn join_blocks<S: BlockSpace + ?Sized>(&self, space: &S, blk1: Address, blk2: Address) {
        let blk1_size = self.block_size_of(space, blk1);
        guarantee!(
            blk1.plus_words(blk1_size) == blk2,
            "blocks {} and {} are not contiguous",
            blk1,
            blk2
        );
        let blk2_end = blk2.plus_words(self.block_size_of(space, blk2));
        trace_if!(TRACE_BOT, "bot: join_blocks {} + {}", blk1, blk2);

        let n_words = self.n_words();
        let card_bytes = self.config.card_bytes();
        let k_boundary = blk2.align_up(card_bytes);
        if k_boundary >= blk2_end {
            // blk2 covers no card boundary, no card records it
            return;
        }
        let k = self.array.index_for(k_boundary);
        debug_assert!(
            self.array.offset_array(k) as usize == k_boundary.words_since(blk2),
            "{} should record {}",
            k,
            blk2
        );

        let delta = k_boundary.words_since(blk1);
        if delta <= n_words {
            // a code of exactly n_words skips one card to blk1's own card
            self.array.set_offset_array(k, delta as u8);
        } else {
            // first card recording the joined block
            let a = self.array.index_for(blk1.align_up(card_bytes));
            debug_assert!(a < k);
            let mut i = 0;
            while k > a + (self.config.power_to_cards_back(i + 1) - 1) {
                i += 1;
            }
            debug_assert!(i < N_POWERS);
            self.array.set_offset_array(k, self.config.code_for_power(i));
        }
    }

    fn block_size_of<S: BlockSpace + ?Sized>(&self, space: &S, blk: Address) -> WordSize {
        match space.block_size(blk) {
            Some(size) => size,
            None => should_not_reach_here!("block {} has no published size", blk)
        }
    }

    /// Covers `[bottom, bottom + new_word_size)`. New cards are stamped as
    /// continuing the last block; shrinking just narrows the range.
    pub fn resize(&self, new_word_size: WordSize) {
        let end = self.end();
        let new_end = self.bottom.plus_words(new_word_size);
        guarantee!(
            new_end <= self.array.end(),
            "cannot grow [{}, {}) past the committed table",
            self.bottom,
            new_end
        );
        if end < new_end && !self.init_to_zero {
            debug_assert!(self.array.is_card_boundary(end), "end is not a card boundary");
            debug_assert!(
                self.array.is_card_boundary(new_end),
                "new end would not be a card boundary"
            );
            self.array
                .set_offset_array_addrs(end, new_end, self.config.code_for_power(0));
        }
        self.end.store(new_end.as_usize(), Relaxed);
        trace_if!(TRACE_BOT, "bot: [{}, {}) resized", self.bottom, new_end);
    }

    /// Forgets every block: the bottom card records a block at `bottom` and
    /// nothing is allocated.
    pub fn reset(&self) {
        self.array.set_offset_array(self.array.index_for(self.bottom), 0);
        self.set_unallocated_block(self.bottom);
    }

    /// Stamps a humongous object `[bottom, obj_top)` whose series spans
    /// `span_words`. The space grows to the whole series, and the tail
    /// after the object, if any, is recorded as one filler block.
    pub fn set_for_starts_humongous(&self, obj_top: Address, span_words: WordSize) {
        self.resize(span_words);
        self.reset();
        guarantee!(
            obj_top > self.bottom && obj_top <= self.end(),
            "humongous object top {} is outside [{}, {})",
            obj_top,
            self.bottom,
            self.end()
        );
        self.alloc_block(self.bottom, obj_top);
        if obj_top < self.end() {
            self.alloc_block(obj_top, self.end());
        }
    }

    /// start of the block covering `addr`, or None if `addr` is outside
    /// the space
    pub fn block_start<S: BlockSpace + ?Sized>(&self, space: &S, addr: Address) -> Option<Address> {
        if addr >= self.bottom && addr < self.end() {
            Some(self.block_start_unsafe(space, addr))
        } else {
            None
        }
    }

    /// Start of the block covering `addr`, which must be inside the space.
    /// Cards found too coarse on the way are repaired.
    pub fn block_start_unsafe<S: BlockSpace + ?Sized>(&self, space: &S, addr: Address) -> Address {
        debug_assert!(
            self.bottom <= addr && addr < self.end(),
            "{} is not covered by this array",
            addr
        );
        // read exactly once, parallel allocation may advance it
        let ub = self.unallocated_block();
        if addr >= ub {
            debug_assert!(ub < self.end(), "tautology");
            return ub;
        }
        let q = self.block_at_or_preceding(addr);
        self.forward_to_block_containing_addr(space, q, addr)
    }

    /// Same as `block_start_unsafe` but never writes the table.
    pub fn block_start_unsafe_const<S: BlockSpace + ?Sized>(&self, space: &S, addr: Address) -> Address {
        debug_assert!(self.bottom <= addr && addr < self.end());
        let ub = self.unallocated_block();
        if addr >= ub {
            return ub;
        }
        let q = self.block_at_or_preceding(addr);
        match space.block_size(q) {
            Some(size) => self.forward_to_block_containing_addr_const(space, q, q.plus_words(size), addr),
            None => q
        }
    }

    /// Start of the block covering the card boundary `addr`, from the table
    /// alone. Never parses the space.
    pub fn block_start_careful(&self, addr: Address) -> Address {
        debug_assert!(self.array.is_card_boundary(addr), "{} should be a card start", addr);
        debug_assert!(self.bottom <= addr && addr < self.end());
        let ub = self.unallocated_block();
        if addr >= ub {
            return ub;
        }
        let q = self.block_at_or_preceding(addr);
        debug_assert!(q <= addr, "block start should be to the left of {}", addr);
        q
    }

    /// Follows the skip codes back from the card of `addr` to an offset card
    /// and returns the block start it records.
    pub fn block_at_or_preceding(&self, addr: Address) -> Address {
        let mut index = self.array.index_for(addr);
        let mut q = self.array.address_for_index(index);
        let mut offset = self.array.offset_array(index);
        while self.config.is_skip_code(offset) {
            let n_cards_back = self.config.entry_to_cards_back(offset);
            q = q.minus_words(self.n_words() * n_cards_back);
            debug_assert!(q >= self.bottom, "went below bottom at {}", index);
            index = index - n_cards_back;
            offset = self.array.offset_array(index);
        }
        q.minus_words(offset as usize)
    }

    /// number of backward skips a lookup of `addr` takes
    pub fn skip_hops(&self, addr: Address) -> usize {
        let mut index = self.array.index_for(addr);
        let mut hops = 0;
        let mut offset = self.array.offset_array(index);
        while self.config.is_skip_code(offset) {
            index = index - self.config.entry_to_cards_back(offset);
            offset = self.array.offset_array(index);
            hops += 1;
        }
        hops
    }

    /// Walks forward from the block at `q` to the block containing `addr`.
    pub fn forward_to_block_containing_addr<S: BlockSpace + ?Sized>(
        &self,
        space: &S,
        q: Address,
        addr: Address
    ) -> Address {
        let n = match space.block_size(q) {
            Some(size) => q.plus_words(size),
            // the block at q is still being published
            None => return q
        };
        // usually the block at q already contains addr
        if n <= addr {
            self.forward_to_block_containing_addr_slow(space, q, n, addr)
        } else {
            q
        }
    }

    /// The table recorded one block where the space now has several (for
    /// example a buffer that was carved into objects after it was
    /// allocated). Walks forward and repairs every card boundary it crosses.
    pub fn forward_to_block_containing_addr_slow<S: BlockSpace + ?Sized>(
        &self,
        space: &S,
        mut q: Address,
        mut n: Address,
        addr: Address
    ) -> Address {
        let n_words = self.n_words();
        // start with the card at n if n is a boundary, else the next one
        let n_index = self.array.index_for(n);
        let on_boundary = self.array.is_card_boundary(n);
        let mut next_index = if on_boundary { n_index } else { n_index + 1 };
        let mut next_boundary = if on_boundary {
            self.array.address_for_index(n_index)
        } else {
            self.array.address_for_index(n_index).plus_words(n_words)
        };
        debug_assert!(next_boundary <= self.end(), "next boundary is beyond the end of the space");

        while next_boundary < addr {
            while n <= next_boundary {
                q = n;
                n = match space.block_size(q) {
                    Some(size) => q.plus_words(size),
                    None => return q
                };
            }
            debug_assert!(q <= next_boundary && n > next_boundary, "consequence of loop");
            // [q, n) is the block that crosses the boundary
            self.alloc_block_work2(&mut next_boundary, &mut next_index, q, n);
        }
        self.forward_to_block_containing_addr_const(space, q, n, addr)
    }

    /// Walks forward from the block `[q, n)` without touching the table.
    pub fn forward_to_block_containing_addr_const<S: BlockSpace + ?Sized>(
        &self,
        space: &S,
        mut q: Address,
        mut n: Address,
        addr: Address
    ) -> Address {
        let top = space.top();
        if addr >= top {
            return top;
        }
        while n <= addr {
            q = n;
            n = match space.block_size(q) {
                Some(size) => q.plus_words(size),
                None => return q
            };
        }
        debug_assert!(q <= addr && addr < n, "wrong order for the current and next block");
        q
    }

    /// Repairs the cards of `[blk_start, blk_end)`, a block crossing the card
    /// boundary `threshold` (at card `index`), then moves `threshold` and
    /// `index` to the first card after the block.
    pub fn alloc_block_work2(
        &self,
        threshold: &mut Address,
        index: &mut CardIndex,
        blk_start: Address,
        blk_end: Address
    ) {
        let n_words = self.n_words();
        debug_assert!(blk_end > *threshold, "should be past threshold");
        debug_assert!(blk_start <= *threshold, "blk_start should be at or before threshold");
        debug_assert!(
            threshold.words_since(blk_start) <= n_words,
            "offset should be <= n_words"
        );
        debug_assert!(
            *threshold == self.array.address_for_index(*index),
            "index must agree with threshold"
        );
        trace_if!(
            TRACE_BOT,
            "bot: repair {} for block [{}, {})",
            *index,
            blk_start,
            blk_end
        );

        let orig_index = *index;
        self.array.set_offset_array_words(orig_index, *threshold, blk_start, false);

        let end_index = self.array.index_for(blk_end.minus_words(1));
        if orig_index + 1 <= end_index {
            let rem_st = self.array.address_for_index(orig_index + 1);
            // end_index may be the last card of the covered range
            let rem_end = self.array.address_for_index(end_index).plus_words(n_words);
            self.set_remainder_to_point_to_start(rem_st, rem_end);
        }

        *index = end_index + 1;
        *threshold = self.array.address_for_index(end_index).plus_words(n_words);
        debug_assert!(*threshold >= blk_end, "incorrect offset threshold");

        if cfg!(debug_assertions) {
            let max_code = (n_words + N_POWERS - 1) as u8;
            let first = self.array.offset_array(orig_index) as usize;
            debug_assert!(first <= n_words, "offset card should have been set");
            for j in (orig_index.as_usize() + 1)..=end_index.as_usize() {
                let entry = self.array.offset_array(CardIndex::new(j));
                debug_assert!(
                    entry > 0 && entry <= max_code,
                    "offset array should have been set at card {}",
                    j
                );
            }
        }
    }

    /// Fatal unless every card boundary inside `[blk_start, blk_end)`
    /// resolves to `blk_start`. Only runs with verification on.
    pub fn verify_single_block(&self, blk_start: Address, blk_end: Address) {
        if !VERIFY_BLOCK_OFFSET_ARRAY || self.init_to_zero {
            return;
        }
        let card_words = self.n_words();
        let mut boundary = blk_start.align_up(self.config.card_bytes());
        while boundary < blk_end {
            let q = self.block_at_or_preceding(boundary);
            guarantee!(
                q == blk_start,
                "card at {} resolves to {}, should be in block [{}, {})",
                boundary,
                q,
                blk_start,
                blk_end
            );
            boundary = boundary.plus_words(card_words);
        }
    }

    /// Fatal unless the table stamped the block exactly as `single_block`
    /// does.
    pub fn check_single_block(&self, blk_start: Address, blk_end: Address) {
        self.do_block_internal(blk_start, blk_end, Action::Check);
    }

    /// `[blk_start, blk_end)` must lie below the unallocated-block mark.
    pub fn verify_not_unallocated(&self, blk_start: Address, blk_end: Address) {
        debug_assert!(blk_start < blk_end, "block inconsistency");
        debug_assert!(
            blk_end <= self.unallocated_block(),
            "block [{}, {}) reaches past the unallocated block {}",
            blk_start,
            blk_end,
            self.unallocated_block()
        );
    }

    /// Checks every card of the allocated part of `space`: offset cards must
    /// lead to a block walk that reaches the card, skip codes must stay
    /// inside the space.
    pub fn verify<S: BlockSpace + ?Sized>(&self, space: &S) {
        let bottom = space.bottom();
        let top = space.top();
        guarantee!(bottom < top, "only non-empty spaces should be verified");
        let start_card = self.array.index_for(bottom);
        let end_card = self.array.index_for(top.minus_words(1));

        for c in start_card.as_usize()..end_card.as_usize() {
            let current_card = CardIndex::new(c);
            let entry = self.array.offset_array(current_card);
            if !self.config.is_skip_code(entry) {
                // the recorded block must reach into the current card
                let card_address = self.array.address_for_index(current_card);
                let mut obj_end = card_address.minus_words(entry as usize);
                while obj_end < card_address {
                    let obj = obj_end;
                    let obj_size = self.block_size_of(space, obj);
                    obj_end = obj.plus_words(obj_size);
                    guarantee!(
                        obj_end > obj && obj_end <= top,
                        "invalid block end. block: {} size: {} end: {} top: {}",
                        obj,
                        obj_size,
                        obj_end,
                        top
                    );
                }
            } else {
                let backskip = self.config.entry_to_cards_back(entry);
                guarantee!(backskip >= 1, "must be going back at least one card");
                let max_backskip = current_card - start_card;
                guarantee!(
                    backskip <= max_backskip,
                    "going backwards beyond the start card. start: {} current: {} backskip: {}",
                    start_card,
                    current_card,
                    backskip
                );
                let backskip_address = self.array.address_for_index(current_card - backskip);
                guarantee!(
                    backskip_address >= bottom,
                    "going backwards beyond bottom of the space: bottom: {} backskip address: {}",
                    bottom,
                    backskip_address
                );
            }
        }
        debug!("bot: verified [{}, {})", bottom, top);
    }

    /// dumps the raw entries of the space, for diagnostics
    pub fn print_contents(&self) -> String {
        let first = self.array.index_for(self.bottom).as_usize();
        let last = self.array.index_for(self.end().minus_words(1)).as_usize();
        let mut ret = String::new();
        for i in first..=last {
            ret.push_str(&format!("{} ", self.array.offset_array(CardIndex::new(i))));
        }
        ret
    }
}

impl fmt::Display for BlockOffsetArray {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "BOT [{}, {}) unallocated block: {}",
            self.bottom,
            self.end(),
            self.unallocated_block()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared(words: WordSize, card_words: WordSize) -> Arc<BlockOffsetSharedArray> {
        let array = BlockOffsetSharedArray::new(
            Address::from_usize(0x2_0000_0000),
            words,
            BotConfig::new(card_words, 3)
        );
        array.resize(words);
        Arc::new(array)
    }

    #[test]
    fn test_fresh_array_points_to_bottom() {
        let array = shared(4096, 8);
        let bottom = array.reserved_start();
        let bot = BlockOffsetArray::new(array.clone(), bottom, 4096, false);
        bot.check_all_cards(CardIndex::new(1), CardIndex::new(511));
        assert_eq!(bot.block_start_careful(bottom.plus_words(4000)), bottom);
        assert_eq!(bot.block_start_careful(bottom.plus_words(8)), bottom);
    }

    #[test]
    fn test_remainder_codes_grow() {
        let array = shared(4096, 8);
        let bottom = array.reserved_start();
        let bot = BlockOffsetArray::new(array.clone(), bottom, 4096, false);
        // card 1..=7 skip one card, 8..=63 skip eight, 64.. skip 64
        assert_eq!(array.offset_array(CardIndex::new(1)), 8);
        assert_eq!(array.offset_array(CardIndex::new(7)), 8);
        assert_eq!(array.offset_array(CardIndex::new(8)), 9);
        assert_eq!(array.offset_array(CardIndex::new(63)), 9);
        assert_eq!(array.offset_array(CardIndex::new(64)), 10);
        assert!(bot.skip_hops(bottom.plus_words(4095)) <= 3 * 7);
    }

    #[test]
    fn test_mark_on_zeroed_table_writes_offset_card_only() {
        let array = shared(4096, 8);
        let bottom = array.reserved_start();
        let bot = BlockOffsetArray::new(array.clone(), bottom, 4096, true);
        bot.mark_block(bottom.plus_words(4), bottom.plus_words(100));
        assert_eq!(array.offset_array(CardIndex::new(1)), 4);
        assert_eq!(array.offset_array(CardIndex::new(2)), 0);

        bot.single_block(bottom.plus_words(4), bottom.plus_words(100));
        assert_eq!(array.offset_array(CardIndex::new(2)), 8);
    }
}
