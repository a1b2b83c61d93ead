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

//! Region descriptors.
//!
//! Descriptors are created once, at heap initialization, and live for the
//! whole life of the heap in a [`HeapRegionTable`]. Everything that changes
//! over a region's life is an atomic so that sets owned by different threads
//! (a worker's private free list, the master free list) can update their
//! disjoint members through a shared table. Set-level consistency is provided
//! by the lock of the set that owns the region, so relaxed ordering suffices
//! for the fields themselves.

use crate::utils::Address;
use crate::utils::ByteSize;
use crate::utils::WordSize;
use crate::utils::BYTES_IN_WORD;

use std::fmt;
use std::num::NonZeroU32;
use std::ops::Index;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, AtomicUsize};

const NO_REGION: u32 = u32::max_value();
const NO_SET: u32 = 0;

/// index of a region in the region table
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct RegionIndex(u32);

impl RegionIndex {
    pub fn new(index: usize) -> RegionIndex {
        debug_assert!(index < NO_REGION as usize);
        RegionIndex(index as u32)
    }

    #[inline(always)]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    #[inline(always)]
    fn encode(region: Option<RegionIndex>) -> u32 {
        match region {
            Some(RegionIndex(i)) => i,
            None => NO_REGION
        }
    }

    #[inline(always)]
    fn decode(raw: u32) -> Option<RegionIndex> {
        if raw == NO_REGION {
            None
        } else {
            Some(RegionIndex(raw))
        }
    }
}

impl fmt::Display for RegionIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of a region set. A region records the id of the set that
/// currently owns it, which lets a set check membership in O(1).
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct RegionSetId(NonZeroU32);

static NEXT_SET_ID: AtomicU32 = AtomicU32::new(1);

impl RegionSetId {
    pub fn fresh() -> RegionSetId {
        let id = NEXT_SET_ID.fetch_add(1, Relaxed);
        match NonZeroU32::new(id) {
            Some(id) => RegionSetId(id),
            None => should_not_reach_here!("region set ids exhausted")
        }
    }

    fn raw(self) -> u32 {
        self.0.get()
    }
}

#[repr(u8)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum RegionType {
    Free = 0,
    Eden = 1,
    Survivor = 2,
    StartsHumongous = 3,
    ContinuesHumongous = 4,
    Old = 5
}

impl RegionType {
    fn from_u8(v: u8) -> RegionType {
        match v {
            0 => RegionType::Free,
            1 => RegionType::Eden,
            2 => RegionType::Survivor,
            3 => RegionType::StartsHumongous,
            4 => RegionType::ContinuesHumongous,
            5 => RegionType::Old,
            _ => should_not_reach_here!("bad region type {}", v)
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            RegionType::Free => "F",
            RegionType::Eden => "E",
            RegionType::Survivor => "S",
            RegionType::StartsHumongous => "HS",
            RegionType::ContinuesHumongous => "HC",
            RegionType::Old => "O"
        }
    }
}

pub struct HeapRegion {
    index: RegionIndex,
    bottom: Address,
    grain_bytes: ByteSize,

    capacity: AtomicUsize,
    used: AtomicUsize,
    region_type: AtomicU8,
    // number of regions a humongous object starting here covers
    humongous_span: AtomicU32,
    // first region of the series, for continues-humongous regions
    humongous_start: AtomicU32,

    pending_removal: AtomicBool,
    containing_set: AtomicU32,
    next: AtomicU32,
    prev: AtomicU32
}

impl HeapRegion {
    fn new(index: RegionIndex, bottom: Address, grain_bytes: ByteSize) -> HeapRegion {
        HeapRegion {
            index,
            bottom,
            grain_bytes,
            capacity: AtomicUsize::new(grain_bytes),
            used: AtomicUsize::new(0),
            region_type: AtomicU8::new(RegionType::Free as u8),
            humongous_span: AtomicU32::new(0),
            humongous_start: AtomicU32::new(NO_REGION),
            pending_removal: AtomicBool::new(false),
            containing_set: AtomicU32::new(NO_SET),
            next: AtomicU32::new(NO_REGION),
            prev: AtomicU32::new(NO_REGION)
        }
    }

    #[inline(always)]
    pub fn index(&self) -> RegionIndex {
        self.index
    }

    #[inline(always)]
    pub fn bottom(&self) -> Address {
        self.bottom
    }

    /// end of the region slot (not of a humongous series)
    #[inline(always)]
    pub fn end(&self) -> Address {
        self.bottom + self.grain_bytes
    }

    #[inline(always)]
    pub fn top(&self) -> Address {
        self.bottom + self.used()
    }

    pub fn grain_words(&self) -> WordSize {
        self.grain_bytes / BYTES_IN_WORD
    }

    #[inline(always)]
    pub fn capacity(&self) -> ByteSize {
        self.capacity.load(Relaxed)
    }

    /// The external allocator adjusts capacity when it (un)commits a region.
    /// Must not be called while the region is a member of a set.
    pub fn set_capacity(&self, capacity: ByteSize) {
        self.capacity.store(capacity, Relaxed);
    }

    #[inline(always)]
    pub fn used(&self) -> ByteSize {
        self.used.load(Relaxed)
    }

    /// Must not be called while the region is a member of a set.
    pub fn set_used(&self, used: ByteSize) {
        guarantee!(
            used <= self.capacity(),
            "region {}: used {} exceeds capacity {}",
            self.index,
            used,
            self.capacity()
        );
        self.used.store(used, Relaxed);
    }

    #[inline(always)]
    pub fn region_type(&self) -> RegionType {
        RegionType::from_u8(self.region_type.load(Relaxed))
    }

    fn set_type(&self, t: RegionType) {
        self.region_type.store(t as u8, Relaxed);
    }

    pub fn is_free(&self) -> bool {
        self.region_type() == RegionType::Free
    }
    pub fn is_eden(&self) -> bool {
        self.region_type() == RegionType::Eden
    }
    pub fn is_survivor(&self) -> bool {
        self.region_type() == RegionType::Survivor
    }
    pub fn is_young(&self) -> bool {
        self.is_eden() || self.is_survivor()
    }
    pub fn is_old(&self) -> bool {
        self.region_type() == RegionType::Old
    }
    pub fn is_starts_humongous(&self) -> bool {
        self.region_type() == RegionType::StartsHumongous
    }
    pub fn is_continues_humongous(&self) -> bool {
        self.region_type() == RegionType::ContinuesHumongous
    }
    pub fn is_humongous(&self) -> bool {
        self.is_starts_humongous() || self.is_continues_humongous()
    }
    pub fn is_empty(&self) -> bool {
        self.used() == 0
    }

    /// Number of region-equivalents this region stands for in set counts.
    /// Only a starts-humongous region can stand for more than one; a
    /// continues-humongous region folds into its series start.
    pub fn region_num(&self) -> usize {
        match self.region_type() {
            RegionType::StartsHumongous => self.humongous_span.load(Relaxed) as usize,
            RegionType::ContinuesHumongous => 0,
            _ => 1
        }
    }

    pub fn humongous_start_region(&self) -> Option<RegionIndex> {
        match self.region_type() {
            RegionType::StartsHumongous => Some(self.index),
            RegionType::ContinuesHumongous => RegionIndex::decode(self.humongous_start.load(Relaxed)),
            _ => None
        }
    }

    pub fn set_free(&self) {
        self.set_type(RegionType::Free);
    }
    pub fn set_eden(&self) {
        debug_assert!(self.is_free());
        self.set_type(RegionType::Eden);
    }
    pub fn set_survivor(&self) {
        debug_assert!(self.is_free());
        self.set_type(RegionType::Survivor);
    }
    pub fn set_old(&self) {
        debug_assert!(self.is_free() || self.is_young());
        self.set_type(RegionType::Old);
    }

    /// Makes this region the head of a humongous series of `span` regions.
    /// Its capacity becomes the capacity of the whole series.
    pub fn set_starts_humongous(&self, span: usize) {
        guarantee!(span >= 1, "humongous series needs at least one region");
        guarantee!(self.is_free(), "region {} should be free", self.index);
        self.humongous_span.store(span as u32, Relaxed);
        self.capacity.store(span * self.grain_bytes, Relaxed);
        self.set_type(RegionType::StartsHumongous);
    }

    pub fn set_continues_humongous(&self, first: RegionIndex) {
        guarantee!(self.is_free(), "region {} should be free", self.index);
        debug_assert!(first < self.index);
        self.humongous_start.store(RegionIndex::encode(Some(first)), Relaxed);
        self.set_type(RegionType::ContinuesHumongous);
    }

    pub fn clear_humongous(&self) {
        debug_assert!(self.is_humongous());
        self.humongous_span.store(0, Relaxed);
        self.humongous_start.store(NO_REGION, Relaxed);
        self.capacity.store(self.grain_bytes, Relaxed);
        self.set_type(RegionType::Free);
    }

    /// resets the region to an empty free region
    pub fn hr_clear(&self) {
        if self.is_humongous() {
            self.clear_humongous();
        }
        self.set_free();
        self.used.store(0, Relaxed);
        self.capacity.store(self.grain_bytes, Relaxed);
        self.pending_removal.store(false, Relaxed);
    }

    pub fn pending_removal(&self) -> bool {
        self.pending_removal.load(Relaxed)
    }

    pub fn set_pending_removal(&self, pending: bool) {
        // we should only be setting this flag, or clearing it, once
        debug_assert!(self.pending_removal() != pending);
        self.pending_removal.store(pending, Relaxed);
    }

    pub fn containing_set(&self) -> Option<RegionSetId> {
        match self.containing_set.load(Relaxed) {
            NO_SET => None,
            raw => NonZeroU32::new(raw).map(RegionSetId)
        }
    }

    /// The back-reference must go from None to a set or from a set to None,
    /// never directly from one set to another.
    pub fn set_containing_set(&self, set: Option<RegionSetId>) {
        let current = self.containing_set();
        guarantee!(
            current.is_none() != set.is_none(),
            "region {}: containing set should go from none to some or back, was {:?} now {:?}",
            self.index,
            current,
            set
        );
        self.containing_set.store(set.map_or(NO_SET, RegionSetId::raw), Relaxed);
    }

    pub(crate) fn next(&self) -> Option<RegionIndex> {
        RegionIndex::decode(self.next.load(Relaxed))
    }

    pub(crate) fn set_next(&self, next: Option<RegionIndex>) {
        self.next.store(RegionIndex::encode(next), Relaxed);
    }

    pub(crate) fn prev(&self) -> Option<RegionIndex> {
        RegionIndex::decode(self.prev.load(Relaxed))
    }

    pub(crate) fn set_prev(&self, prev: Option<RegionIndex>) {
        self.prev.store(RegionIndex::encode(prev), Relaxed);
    }
}

impl fmt::Display for HeapRegion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "HeapRegion {} [{}, {}) {} used: {} capacity: {}",
            self.index,
            self.bottom,
            self.end(),
            self.region_type().short_name(),
            self.used(),
            self.capacity()
        )
    }
}

impl fmt::Debug for HeapRegion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// All region descriptors of one heap, shared by every set and list that
/// links through them.
pub struct HeapRegionTable {
    regions: Box<[HeapRegion]>,
    heap_start: Address,
    grain_bytes: ByteSize
}

impl HeapRegionTable {
    pub fn new(heap_start: Address, grain_bytes: ByteSize, n_regions: usize) -> HeapRegionTable {
        guarantee!(
            heap_start.is_aligned_to(grain_bytes),
            "heap start {} is not aligned to the region size",
            heap_start
        );
        let regions: Vec<HeapRegion> = (0..n_regions)
            .map(|i| HeapRegion::new(RegionIndex::new(i), heap_start + i * grain_bytes, grain_bytes))
            .collect();

        HeapRegionTable {
            regions: regions.into_boxed_slice(),
            heap_start,
            grain_bytes
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    #[inline(always)]
    pub fn at(&self, index: RegionIndex) -> &HeapRegion {
        &self.regions[index.as_usize()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeapRegion> {
        self.regions.iter()
    }

    pub fn heap_start(&self) -> Address {
        self.heap_start
    }

    pub fn heap_end(&self) -> Address {
        self.heap_start + self.len() * self.grain_bytes
    }

    pub fn grain_bytes(&self) -> ByteSize {
        self.grain_bytes
    }

    /// the region covering `addr`, if it lies in the heap
    pub fn addr_to_region(&self, addr: Address) -> Option<RegionIndex> {
        if addr < self.heap_start || addr >= self.heap_end() {
            None
        } else {
            Some(RegionIndex::new((addr - self.heap_start) / self.grain_bytes))
        }
    }
}

impl Index<RegionIndex> for HeapRegionTable {
    type Output = HeapRegion;

    fn index(&self, index: RegionIndex) -> &HeapRegion {
        self.at(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::MB;

    #[test]
    fn test_region_num() {
        let table = HeapRegionTable::new(Address::from_usize(0x4000_0000), MB, 4);
        let hr = &table[RegionIndex::new(1)];
        assert_eq!(hr.region_num(), 1);
        assert_eq!(hr.bottom().as_usize(), 0x4000_0000 + MB);

        hr.set_starts_humongous(3);
        assert_eq!(hr.region_num(), 3);
        assert_eq!(hr.capacity(), 3 * MB);

        let cont = &table[RegionIndex::new(2)];
        cont.set_continues_humongous(RegionIndex::new(1));
        assert_eq!(cont.region_num(), 0);
        assert_eq!(cont.humongous_start_region(), Some(RegionIndex::new(1)));

        hr.hr_clear();
        assert!(hr.is_free());
        assert_eq!(hr.capacity(), MB);
    }

    #[test]
    fn test_addr_to_region() {
        let table = HeapRegionTable::new(Address::from_usize(0x4000_0000), MB, 4);
        assert_eq!(table.addr_to_region(Address::from_usize(0x4000_0000 + MB + 8)), Some(RegionIndex::new(1)));
        assert_eq!(table.addr_to_region(Address::from_usize(0x4000_0000 + 4 * MB)), None);
    }

    #[test]
    #[should_panic]
    fn test_containing_set_cannot_switch_directly() {
        let table = HeapRegionTable::new(Address::from_usize(0x4000_0000), MB, 1);
        let hr = &table[RegionIndex::new(0)];
        hr.set_containing_set(Some(RegionSetId::fresh()));
        hr.set_containing_set(Some(RegionSetId::fresh()));
    }
}
