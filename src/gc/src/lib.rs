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

//! Region bookkeeping and block-offset tables for a region-based collector.
//!
//! The heap is a contiguous range split into fixed-size regions. Region
//! descriptors live in a shared [`HeapRegionTable`](heap::g1::HeapRegionTable);
//! which pool a region currently belongs to is recorded by the region sets in
//! [`heap::g1`], and the [`HeapRegionManager`](heap::g1::HeapRegionManager)
//! owns those sets behind one lock each. Every region also carries a
//! [`BlockOffsetArray`](heap::bot::BlockOffsetArray) that answers
//! "where does the block covering this address start".

#[macro_use]
extern crate log;
extern crate crossbeam;
extern crate stderrlog;
#[macro_use]
extern crate hotspot_utils as utils;

use crate::utils::math;
use crate::utils::Address;
use crate::utils::ByteSize;
use crate::utils::WordSize;
use crate::utils::BYTES_IN_WORD;

pub mod heap;

pub use crate::heap::bot::BotConfig;
pub use crate::heap::g1::HeapRegionManager;

/// verbose tracing of region set transfers
pub const TRACE_REGION_SETS: bool = false;
/// verbose tracing of block-offset table stamping and repair
pub const TRACE_BOT: bool = false;

/// default base address of the reserved heap range
pub const DEFAULT_HEAP_START: Address = Address::from_usize(0x1000_0000_0000);
pub const DEFAULT_REGION_SIZE: ByteSize = 1 << 20;
pub const DEFAULT_MAX_REGIONS: usize = 256;
/// default card size in words (512 bytes)
pub const DEFAULT_CARD_WORDS: WordSize = 64;
/// default backward-skip base exponent: a code N_words + i skips 8^i cards
pub const DEFAULT_BOT_LOG_BASE: usize = 3;

/// Collector configuration. The VM builds this from its options; the
/// collector never parses options itself.
#[derive(Clone, Debug)]
pub struct GCConfig {
    pub heap_start: Address,
    pub region_size: ByteSize,
    pub max_regions: usize,
    pub card_words: WordSize,
    pub bot_log_base: usize,
    pub n_gcthreads: usize,
    /// keep region membership back-references and check them on every
    /// mutation (always on in debug builds)
    pub verify_region_sets: bool
}

impl Default for GCConfig {
    fn default() -> GCConfig {
        GCConfig {
            heap_start: DEFAULT_HEAP_START,
            region_size: DEFAULT_REGION_SIZE,
            max_regions: DEFAULT_MAX_REGIONS,
            card_words: DEFAULT_CARD_WORDS,
            bot_log_base: DEFAULT_BOT_LOG_BASE,
            n_gcthreads: 4,
            verify_region_sets: false
        }
    }
}

impl GCConfig {
    pub fn region_words(&self) -> WordSize {
        self.region_size / BYTES_IN_WORD
    }

    pub fn heap_size(&self) -> ByteSize {
        self.region_size * self.max_regions
    }

    pub fn heap_end(&self) -> Address {
        self.heap_start + self.heap_size()
    }

    /// whether membership back-references are maintained and checked
    pub fn check_membership(&self) -> bool {
        cfg!(debug_assertions) || self.verify_region_sets
    }

    pub fn bot_config(&self) -> BotConfig {
        BotConfig::new(self.card_words, self.bot_log_base)
    }

    /// fatal on a configuration the collector cannot run with
    pub fn validate(&self) {
        guarantee!(
            math::is_power_of_two(self.region_size).is_some(),
            "region size {} is not a power of two",
            self.region_size
        );
        guarantee!(
            self.heap_start.is_aligned_to(self.region_size),
            "heap start {} is not region aligned",
            self.heap_start
        );
        guarantee!(self.max_regions > 0, "heap needs at least one region");
        guarantee!(
            self.region_words() % self.card_words == 0,
            "region size {} is not a multiple of the card size ({} words)",
            self.region_size,
            self.card_words
        );
        guarantee!(self.n_gcthreads > 0, "need at least one gc thread");
    }
}

/// turns on trace-level logging, for tests
pub fn start_logging_trace() {
    match stderrlog::new().verbosity(4).init() {
        Ok(()) => info!("logger initialized"),
        Err(e) => error!(
            "failed to init logger, probably already initialized: {:?}",
            e
        )
    }
}
