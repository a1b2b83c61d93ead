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

use crate::heap::bot::{BlockOffsetArray, BlockOffsetSharedArray};
use crate::heap::g1::free_region_list::FreeRegionList;
use crate::heap::g1::heap_region::*;
use crate::heap::g1::heap_region_set::*;
use crate::heap::BlockSpace;
use crate::utils::math;
use crate::utils::Address;
use crate::utils::ByteSize;
use crate::utils::WordSize;
use crate::utils::BYTES_IN_WORD;
use crate::GCConfig;
use crate::TRACE_REGION_SETS;

use std::panic;
use std::sync::{Arc, Mutex, RwLock};

/// Owns the region table and the sets that partition it.
///
/// Lock order: free list, then secondary free list. The old and humongous
/// sets are only counted, so workers unlink members from them under a read
/// lock and the totals are fixed up later under the write lock (see
/// `remove_from_old_sets`).
pub struct HeapRegionManager {
    config: GCConfig,
    table: Arc<HeapRegionTable>,

    /// free regions ordered by index
    free_list: Mutex<FreeRegionList>,
    /// regions freed concurrently, waiting to be merged into `free_list`
    secondary_free_list: Mutex<FreeRegionList>,
    old_set: RwLock<HeapRegionSet>,
    humongous_set: RwLock<HeapRegionSet>,

    bot_shared: Arc<BlockOffsetSharedArray>,
    bots: Vec<BlockOffsetArray>
}

impl HeapRegionManager {
    /// Creates every region (all free) and the block-offset table covering
    /// the whole heap.
    pub fn new(config: &GCConfig) -> HeapRegionManager {
        config.validate();
        let config = config.clone();
        let check = config.check_membership();
        let table = Arc::new(HeapRegionTable::new(
            config.heap_start,
            config.region_size,
            config.max_regions
        ));

        let bot_shared = Arc::new(BlockOffsetSharedArray::new(
            config.heap_start,
            config.heap_size() / BYTES_IN_WORD,
            config.bot_config()
        ));
        bot_shared.resize(config.heap_size() / BYTES_IN_WORD);
        let bots = table
            .iter()
            .map(|hr| BlockOffsetArray::new(bot_shared.clone(), hr.bottom(), config.region_words(), false))
            .collect();

        let mut free_list = FreeRegionList::new("Free List", RegionSetKind::Free, table.clone(), check);
        let mut secondary_free_list =
            FreeRegionList::new("Secondary Free List", RegionSetKind::Free, table.clone(), check);
        free_list.set_unrealistically_long_length(config.max_regions + 1);
        secondary_free_list.set_unrealistically_long_length(config.max_regions + 1);
        for i in 0..table.len() {
            free_list.add_as_tail(RegionIndex::new(i));
        }

        let old_set = HeapRegionSet::new("Old Set", RegionSetKind::Old, table.clone(), check);
        let humongous_set = HeapRegionSet::new("Humongous Set", RegionSetKind::Humongous, table.clone(), check);

        info!(
            "region manager: {} regions of {} bytes at [{}, {}), card size {} words",
            config.max_regions,
            config.region_size,
            config.heap_start,
            config.heap_end(),
            config.card_words
        );

        HeapRegionManager {
            config,
            table,
            free_list: Mutex::new(free_list),
            secondary_free_list: Mutex::new(secondary_free_list),
            old_set: RwLock::new(old_set),
            humongous_set: RwLock::new(humongous_set),
            bot_shared,
            bots
        }
    }

    pub fn config(&self) -> &GCConfig {
        &self.config
    }

    pub fn table(&self) -> &Arc<HeapRegionTable> {
        &self.table
    }

    #[inline(always)]
    pub fn at(&self, index: RegionIndex) -> &HeapRegion {
        self.table.at(index)
    }

    pub fn bot(&self, index: RegionIndex) -> &BlockOffsetArray {
        &self.bots[index.as_usize()]
    }

    pub fn bot_shared(&self) -> &Arc<BlockOffsetSharedArray> {
        &self.bot_shared
    }

    pub fn num_free_regions(&self) -> usize {
        self.free_list.lock().unwrap().length()
    }

    pub fn num_secondary_free_regions(&self) -> usize {
        self.secondary_free_list.lock().unwrap().length()
    }

    pub fn old_set_count(&self) -> HeapRegionSetCount {
        self.old_set.read().unwrap().count()
    }

    pub fn humongous_set_count(&self) -> HeapRegionSetCount {
        self.humongous_set.read().unwrap().count()
    }

    /// a private list for collecting freed regions
    pub fn new_local_free_list(&self, name: &str) -> FreeRegionList {
        let mut ret = self.free_list.lock().unwrap().new_local(name);
        ret.set_unrealistically_long_length(self.config.max_regions + 1);
        ret
    }

    fn append_secondary_free_list_locked(&self, free_list: &mut FreeRegionList) {
        let mut secondary = self.secondary_free_list.lock().unwrap();
        if !secondary.is_empty() {
            debug_if!(
                TRACE_REGION_SETS,
                "merging {} secondary free regions",
                secondary.length()
            );
            free_list.add_ordered_list(&mut secondary);
        }
    }

    /// Merges the secondary free list into the master free list.
    pub fn append_secondary_free_list(&self) {
        let mut free_list = self.free_list.lock().unwrap();
        self.append_secondary_free_list_locked(&mut free_list);
    }

    /// Hands a batch of freed regions to the secondary free list.
    pub fn add_to_secondary_free_list(&self, list: &mut FreeRegionList) {
        self.secondary_free_list.lock().unwrap().add_ordered_list(list);
    }

    /// Flushes a worker's local free list into the master free list under
    /// one lock acquisition.
    pub fn prepend_to_freelist(&self, list: &mut FreeRegionList) {
        if list.is_empty() {
            return;
        }
        self.free_list.lock().unwrap().add_ordered_list(list);
    }

    fn reset_bot(&self, index: RegionIndex) {
        let bot = self.bot(index);
        bot.resize(self.config.region_words());
        bot.reset();
    }

    /// Takes a free region, old regions from the top of the heap and young
    /// ones from the bottom. Returns None if no region is free.
    pub fn allocate_free_region(&self, is_old: bool) -> Option<RegionIndex> {
        let index = {
            let mut free_list = self.free_list.lock().unwrap();
            match free_list.remove_region(!is_old) {
                Some(index) => Some(index),
                None => {
                    self.append_secondary_free_list_locked(&mut free_list);
                    free_list.remove_region(!is_old)
                }
            }
        };

        let index = match index {
            Some(index) => index,
            None => {
                debug!("region manager: out of free regions");
                return None;
            }
        };
        let hr = self.at(index);
        guarantee!(hr.is_free() && hr.is_empty(), "region {} from the free list is not free", hr);
        if is_old {
            hr.set_old();
        } else {
            hr.set_eden();
        }
        self.reset_bot(index);
        trace_if!(TRACE_REGION_SETS, "allocated {}", hr);
        Some(index)
    }

    /// Bump-allocates `words` words in an allocation region (not a member of
    /// any set) and records the block in its block-offset table.
    pub fn allocate_block(&self, index: RegionIndex, words: WordSize) -> Option<Address> {
        let hr = self.at(index);
        debug_assert!(hr.containing_set().is_none(), "{} is retired", hr);
        let top = hr.top();
        let new_top = top.plus_words(words);
        if words == 0 || new_top > hr.end() {
            return None;
        }
        hr.set_used(new_top - hr.bottom());
        self.bot(index).alloc_block(top, new_top);
        Some(top)
    }

    /// Retires an old allocation region: it joins the old set, or goes
    /// straight back to the free list if nothing was allocated in it.
    pub fn retire_old_region(&self, index: RegionIndex) {
        let hr = self.at(index);
        guarantee!(hr.is_old(), "{} is not an old region", hr);
        if hr.is_empty() {
            hr.hr_clear();
            self.reset_bot(index);
            self.free_list.lock().unwrap().add_ordered(index);
        } else {
            self.old_set.write().unwrap().add(index);
        }
    }

    /// Finds `n` free regions with consecutive indices in the ordered free
    /// list. Must hold the free list lock.
    fn find_contiguous(free_list: &FreeRegionList, n: usize) -> Option<RegionIndex> {
        let mut run_start: Option<RegionIndex> = None;
        let mut run_length = 0;
        let mut prev: Option<RegionIndex> = None;

        for index in free_list.iter() {
            match prev {
                Some(p) if p.as_usize() + 1 == index.as_usize() => run_length += 1,
                _ => {
                    run_start = Some(index);
                    run_length = 1;
                }
            }
            if run_length == n {
                return run_start;
            }
            prev = Some(index);
        }
        None
    }

    /// Allocates a humongous object of `word_size` words in a series of
    /// contiguous free regions and returns the first region of the series.
    pub fn allocate_humongous(&self, word_size: WordSize) -> Option<RegionIndex> {
        guarantee!(word_size > 0, "humongous object of size 0");
        let grain_words = self.config.region_words();
        let n = math::div_round_up(word_size, grain_words);

        let first = {
            let mut free_list = self.free_list.lock().unwrap();
            let first = match Self::find_contiguous(&free_list, n) {
                Some(first) => first,
                None => {
                    self.append_secondary_free_list_locked(&mut free_list);
                    match Self::find_contiguous(&free_list, n) {
                        Some(first) => first,
                        None => {
                            debug!("region manager: no {} contiguous free regions", n);
                            return None;
                        }
                    }
                }
            };

            if n == 1 {
                free_list.remove(first);
            } else {
                for i in first.as_usize()..first.as_usize() + n {
                    self.table.at(RegionIndex::new(i)).set_pending_removal(true);
                }
                free_list.remove_all_pending(n);
            }
            first
        };

        let first_hr = self.at(first);
        let obj_bytes = word_size * BYTES_IN_WORD;
        first_hr.set_starts_humongous(n);
        first_hr.set_used(obj_bytes);
        let mut remaining = obj_bytes.saturating_sub(self.config.region_size);
        for i in (first.as_usize() + 1)..(first.as_usize() + n) {
            let hr = self.table.at(RegionIndex::new(i));
            hr.set_continues_humongous(first);
            let used = remaining.min(self.config.region_size);
            hr.set_used(used);
            remaining -= used;
        }

        self.bot(first)
            .set_for_starts_humongous(first_hr.bottom().plus_words(word_size), n * grain_words);
        self.humongous_set.write().unwrap().add(first);

        debug!(
            "region manager: humongous object of {} words in {} regions from {}",
            word_size,
            n,
            first
        );
        Some(first)
    }

    /// Frees a region that is not a member of any set into `free_list`.
    pub fn free_region(&self, index: RegionIndex, free_list: &mut FreeRegionList) {
        let hr = self.at(index);
        guarantee!(!hr.is_free(), "region {} is already free", index);
        guarantee!(
            !hr.is_continues_humongous(),
            "region {} should be freed with its series",
            index
        );
        trace_if!(TRACE_REGION_SETS, "free {}", hr);
        hr.hr_clear();
        self.reset_bot(index);
        free_list.add_ordered(index);
    }

    /// Frees a whole humongous series. The series start is unlinked from the
    /// humongous set, its counts go to `humongous_removed` for a later
    /// `remove_from_old_sets`.
    pub fn free_humongous_region(
        &self,
        first: RegionIndex,
        free_list: &mut FreeRegionList,
        humongous_removed: &mut HeapRegionSetCount
    ) {
        let first_hr = self.at(first);
        guarantee!(
            first_hr.is_starts_humongous(),
            "region {} does not start a humongous series",
            first
        );
        let span = first_hr.region_num();
        self.humongous_set
            .read()
            .unwrap()
            .remove_deferred(first, humongous_removed);

        for i in (first.as_usize() + 1)..(first.as_usize() + span) {
            let index = RegionIndex::new(i);
            let hr = self.at(index);
            guarantee!(
                hr.humongous_start_region() == Some(first),
                "region {} should continue the series of {}",
                index,
                first
            );
            hr.hr_clear();
            self.reset_bot(index);
            free_list.add_ordered(index);
        }
        self.free_region(first, free_list);
    }

    /// Applies the removals collected by workers to the old and humongous
    /// sets.
    pub fn remove_from_old_sets(&self, old_removed: &HeapRegionSetCount, humongous_removed: &HeapRegionSetCount) {
        if !old_removed.is_empty() {
            self.old_set.write().unwrap().bulk_remove(old_removed);
        }
        if !humongous_removed.is_empty() {
            self.humongous_set.write().unwrap().bulk_remove(humongous_removed);
        }
    }

    fn chunk_size(&self, len: usize, n_workers: usize) -> usize {
        let n_workers = n_workers.max(1).min(self.config.n_gcthreads.max(1));
        math::div_round_up(len.max(1), n_workers)
    }

    /// Frees the regions of a collection set (young regions, not members of
    /// any set) with `n_workers` threads. Each worker frees its chunk into a
    /// private list and flushes it to the free list once.
    pub fn par_free_collection_set(&self, regions: &[RegionIndex], n_workers: usize) {
        if regions.is_empty() {
            return;
        }
        let chunk = self.chunk_size(regions.len(), n_workers);
        debug!(
            "region manager: freeing collection set of {} regions, {} per worker",
            regions.len(),
            chunk
        );

        let res = crossbeam::scope(|s| {
            for (i, part) in regions.chunks(chunk).enumerate() {
                s.spawn(move |_| {
                    let mut local = self.new_local_free_list(&format!("Local Free List {}", i));
                    for &index in part {
                        self.free_region(index, &mut local);
                    }
                    self.prepend_to_freelist(&mut local);
                });
            }
        });
        if let Err(e) = res {
            panic::resume_unwind(e);
        }
    }

    /// Frees old regions and humongous series found to be garbage. Workers
    /// unlink candidates from their sets without taking the write lock and
    /// hand the freed regions to the secondary free list; the set totals
    /// are fixed up once at the end.
    pub fn par_cleanup_old_regions(&self, candidates: &[RegionIndex], n_workers: usize) {
        if candidates.is_empty() {
            return;
        }
        let chunk = self.chunk_size(candidates.len(), n_workers);

        let res = crossbeam::scope(|s| {
            let handles: Vec<_> = candidates
                .chunks(chunk)
                .enumerate()
                .map(|(i, part)| {
                    s.spawn(move |_| {
                        let mut local = self.new_local_free_list(&format!("Cleanup List {}", i));
                        let mut old_removed = HeapRegionSetCount::new();
                        let mut humongous_removed = HeapRegionSetCount::new();
                        for &index in part {
                            let hr = self.at(index);
                            if hr.is_starts_humongous() {
                                self.free_humongous_region(index, &mut local, &mut humongous_removed);
                            } else {
                                guarantee!(hr.is_old(), "cleanup candidate {} is not old", hr);
                                self.old_set.read().unwrap().remove_deferred(index, &mut old_removed);
                                self.free_region(index, &mut local);
                            }
                        }
                        self.add_to_secondary_free_list(&mut local);
                        (old_removed, humongous_removed)
                    })
                })
                .collect();

            let mut old_total = HeapRegionSetCount::new();
            let mut humongous_total = HeapRegionSetCount::new();
            for handle in handles {
                match handle.join() {
                    Ok((old, humongous)) => {
                        old_total.increment_by(&old);
                        humongous_total.increment_by(&humongous);
                    }
                    Err(e) => panic::resume_unwind(e)
                }
            }
            (old_total, humongous_total)
        });

        match res {
            Ok((old_total, humongous_total)) => {
                debug!(
                    "region manager: cleanup removed {} old and {} humongous regions",
                    old_total.length(),
                    humongous_total.length()
                );
                self.remove_from_old_sets(&old_total, &humongous_total);
            }
            Err(e) => panic::resume_unwind(e)
        }
    }

    /// Start of the block covering `addr`, consulting the table of the region
    /// that covers it (the series start for a humongous continuation).
    pub fn block_start<S: BlockSpace + ?Sized>(&self, space: &S, addr: Address) -> Option<Address> {
        let index = self.table.addr_to_region(addr)?;
        let index = match self.at(index).humongous_start_region() {
            Some(first) => first,
            None => index
        };
        self.bot(index).block_start(space, addr)
    }

    /// Checks every list and set, then cross-checks the region table against
    /// them. Must run while no region is being moved between sets.
    pub fn verify_region_sets(&self) {
        let mut free_list = self.free_list.lock().unwrap();
        let mut secondary = self.secondary_free_list.lock().unwrap();
        let old_set = self.old_set.read().unwrap();
        let humongous_set = self.humongous_set.read().unwrap();

        free_list.verify();
        secondary.verify();
        old_set.verify();
        humongous_set.verify();

        let check = self.config.check_membership();
        let mut free_count = HeapRegionSetCount::new();
        let mut old_count = HeapRegionSetCount::new();
        let mut humongous_count = HeapRegionSetCount::new();

        for hr in self.table.iter() {
            match hr.region_type() {
                RegionType::ContinuesHumongous => {}
                RegionType::Eden | RegionType::Survivor => {}
                RegionType::StartsHumongous => {
                    guarantee!(
                        !check || hr.containing_set() == Some(humongous_set.id()),
                        "{} should be in the humongous set",
                        hr
                    );
                    humongous_count.increment(hr);
                }
                RegionType::Free => {
                    guarantee!(
                        !check
                            || hr.containing_set() == Some(free_list.id())
                            || hr.containing_set() == Some(secondary.id()),
                        "{} should be in a free list",
                        hr
                    );
                    free_count.increment(hr);
                }
                RegionType::Old => {
                    // an old allocation region joins the old set when retired
                    if check && hr.containing_set().is_some() {
                        guarantee!(
                            hr.containing_set() == Some(old_set.id()),
                            "{} should be in the old set",
                            hr
                        );
                        old_count.increment(hr);
                    }
                }
            }
        }

        guarantee!(
            free_list.length() + secondary.length() == free_count.length(),
            "free list length: {} + secondary: {} should be == free regions: {}",
            free_list.length(),
            secondary.length(),
            free_count.length()
        );
        guarantee!(
            free_list.total_capacity_bytes() + secondary.total_capacity_bytes() == free_count.capacity(),
            "free list capacity: {} + secondary: {} should be == free capacity: {}",
            free_list.total_capacity_bytes(),
            secondary.total_capacity_bytes(),
            free_count.capacity()
        );
        guarantee!(
            humongous_set.length() == humongous_count.length()
                && humongous_set.total_capacity_bytes() == humongous_count.capacity(),
            "humongous set {} should match humongous regions {:?}",
            humongous_set,
            humongous_count
        );
        if check {
            guarantee!(
                old_set.length() == old_count.length()
                    && old_set.total_capacity_bytes() == old_count.capacity(),
                "old set {} should match old regions {:?}",
                old_set,
                old_count
            );
        }

        debug!(
            "region sets verified: {} free, {} secondary free, {} old, {} humongous",
            free_list.length(),
            secondary.length(),
            old_set.length(),
            humongous_set.length()
        );
    }

    /// total bytes of every region handed out, for diagnostics
    pub fn used_bytes(&self) -> ByteSize {
        self.table.iter().map(|hr| hr.used()).sum()
    }
}
