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

//! Block-offset tables.
//!
//! The covered space is divided into cards of `card_words` words, and the
//! table keeps one byte per card. A byte `v` means one of two things:
//!
//! * `v < card_words`: the block covering the start of this card begins `v`
//!   words before the card boundary;
//! * `v >= card_words`: a backward-skip code. Skip back
//!   `2^(log_base * (v - card_words))` cards and look again.
//!
//! Codes for the cards inside one block grow geometrically with the distance
//! from the block start, so any lookup reaches the card that holds the
//! actual offset in a logarithmic number of hops.

use crate::utils::math;
use crate::utils::ByteSize;
use crate::utils::WordSize;
use crate::utils::BYTES_IN_WORD;

use std::fmt;
use std::ops::{Add, Sub};

mod shared_array;
mod offset_array;

pub use self::offset_array::BlockOffsetArray;
pub use self::shared_array::BlockOffsetSharedArray;

/// number of distinct backward-skip codes
pub const N_POWERS: usize = 14;

/// index of a card in a block-offset table
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct CardIndex(usize);

impl CardIndex {
    #[inline(always)]
    pub fn new(index: usize) -> CardIndex {
        CardIndex(index)
    }

    #[inline(always)]
    pub fn as_usize(self) -> usize {
        self.0
    }
}

impl Add<usize> for CardIndex {
    type Output = CardIndex;
    #[inline(always)]
    fn add(self, n: usize) -> CardIndex {
        CardIndex(self.0 + n)
    }
}

impl Sub<usize> for CardIndex {
    type Output = CardIndex;
    #[inline(always)]
    fn sub(self, n: usize) -> CardIndex {
        debug_assert!(self.0 >= n);
        CardIndex(self.0 - n)
    }
}

/// number of cards between two indices
impl Sub<CardIndex> for CardIndex {
    type Output = usize;
    #[inline(always)]
    fn sub(self, other: CardIndex) -> usize {
        debug_assert!(self.0 >= other.0);
        self.0 - other.0
    }
}

impl fmt::Display for CardIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "card {}", self.0)
    }
}

/// Card size and the base of the backward-skip codes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BotConfig {
    card_words: WordSize,
    log_card_words: usize,
    log_base: usize
}

impl BotConfig {
    pub fn new(card_words: WordSize, log_base: usize) -> BotConfig {
        let log_card_words = match math::is_power_of_two(card_words) {
            Some(log) => log as usize,
            None => should_not_reach_here!("card size {} words is not a power of two", card_words)
        };
        // the largest code must still fit in a byte
        guarantee!(
            card_words >= 1 && card_words + N_POWERS - 1 <= u8::max_value() as usize,
            "card size {} words is out of range",
            card_words
        );
        // and the longest skip must fit in a word
        guarantee!(
            log_base >= 1 && log_base * N_POWERS < 64,
            "backward-skip base 2^{} is out of range",
            log_base
        );

        BotConfig {
            card_words,
            log_card_words,
            log_base
        }
    }

    /// N_words
    #[inline(always)]
    pub fn card_words(&self) -> WordSize {
        self.card_words
    }

    #[inline(always)]
    pub fn log_card_words(&self) -> usize {
        self.log_card_words
    }

    #[inline(always)]
    pub fn card_bytes(&self) -> ByteSize {
        self.card_words * BYTES_IN_WORD
    }

    pub fn log_base(&self) -> usize {
        self.log_base
    }

    /// cards skipped by the i-th backward-skip code
    #[inline(always)]
    pub fn power_to_cards_back(&self, i: usize) -> usize {
        1 << (self.log_base * i)
    }

    #[inline(always)]
    pub fn power_to_words_back(&self, i: usize) -> WordSize {
        self.power_to_cards_back(i) * self.card_words
    }

    /// the stored byte for the i-th backward-skip code
    #[inline(always)]
    pub fn code_for_power(&self, i: usize) -> u8 {
        debug_assert!(i < N_POWERS);
        (self.card_words + i) as u8
    }

    #[inline(always)]
    pub fn is_skip_code(&self, entry: u8) -> bool {
        entry as usize >= self.card_words
    }

    #[inline(always)]
    pub fn entry_to_cards_back(&self, entry: u8) -> usize {
        debug_assert!(self.is_skip_code(entry));
        guarantee!(
            (entry as usize) < self.card_words + N_POWERS,
            "bad block offset entry {}",
            entry
        );
        self.power_to_cards_back(entry as usize - self.card_words)
    }

    #[inline(always)]
    pub fn entry_to_words_back(&self, entry: u8) -> WordSize {
        self.entry_to_cards_back(entry) * self.card_words
    }
}

impl Default for BotConfig {
    fn default() -> BotConfig {
        BotConfig::new(crate::DEFAULT_CARD_WORDS, crate::DEFAULT_BOT_LOG_BASE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        let config = BotConfig::new(64, 3);
        assert_eq!(config.card_bytes(), 512);
        assert_eq!(config.code_for_power(0), 64);
        assert_eq!(config.entry_to_cards_back(64), 1);
        assert_eq!(config.entry_to_cards_back(65), 8);
        assert_eq!(config.entry_to_cards_back(66), 64);
        assert_eq!(config.entry_to_words_back(65), 8 * 64);
    }

    #[test]
    fn test_other_base() {
        let config = BotConfig::new(8, 4);
        assert_eq!(config.entry_to_cards_back(9), 16);
        assert!(!config.is_skip_code(7));
        assert!(config.is_skip_code(8));
    }

    #[test]
    #[should_panic]
    fn test_bad_card_size() {
        BotConfig::new(48, 3);
    }
}
