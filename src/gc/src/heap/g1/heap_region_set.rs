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

//! Region sets: pools of regions with running totals.
//!
//! Every set keeps four counters (length, region-equivalents, capacity and
//! used bytes) that are maintained incrementally and can be recomputed by a
//! verification pass. A region belongs to at most one set at a time; the
//! set it belongs to is recorded in the region's back-reference, which is
//! maintained and checked when membership checking is enabled.

use crate::heap::g1::heap_region::*;
use crate::utils::ByteSize;
use crate::TRACE_REGION_SETS;

use std::fmt;
use std::sync::Arc;

/// Aggregate counts of a batch of regions. Used both as the running totals
/// of a set and as the accumulator for deferred (bulk) removal.
#[derive(Copy, Clone, Default, PartialEq, Eq, Debug)]
pub struct HeapRegionSetCount {
    length: usize,
    region_num: usize,
    capacity: ByteSize,
    used: ByteSize
}

impl HeapRegionSetCount {
    pub fn new() -> HeapRegionSetCount {
        HeapRegionSetCount::default()
    }

    pub fn length(&self) -> usize {
        self.length
    }
    pub fn region_num(&self) -> usize {
        self.region_num
    }
    pub fn capacity(&self) -> ByteSize {
        self.capacity
    }
    pub fn used(&self) -> ByteSize {
        self.used
    }
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn increment(&mut self, hr: &HeapRegion) {
        self.length += 1;
        self.region_num += hr.region_num();
        self.capacity += hr.capacity();
        self.used += hr.used();
    }

    pub fn decrement(&mut self, hr: &HeapRegion) {
        self.decrement_by(&HeapRegionSetCount {
            length: 1,
            region_num: hr.region_num(),
            capacity: hr.capacity(),
            used: hr.used()
        });
    }

    pub fn increment_by(&mut self, other: &HeapRegionSetCount) {
        self.length += other.length;
        self.region_num += other.region_num;
        self.capacity += other.capacity;
        self.used += other.used;
    }

    pub fn decrement_by(&mut self, other: &HeapRegionSetCount) {
        guarantee!(
            other.length <= self.length
                && other.region_num <= self.region_num
                && other.capacity <= self.capacity
                && other.used <= self.used,
            "cannot remove {:?} from {:?}",
            other,
            self
        );
        self.length -= other.length;
        self.region_num -= other.region_num;
        self.capacity -= other.capacity;
        self.used -= other.used;
    }
}

/// The kind of regions a set may hold. Checked for every member during
/// verification.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum RegionSetKind {
    /// empty free regions
    Free,
    /// eden and survivor regions, empty or not
    Young,
    /// non-empty old regions
    Old,
    /// starts-humongous regions, each standing for its whole series
    Humongous
}

impl RegionSetKind {
    pub fn regions_humongous(self) -> bool {
        self == RegionSetKind::Humongous
    }

    pub fn regions_empty(self) -> bool {
        self == RegionSetKind::Free
    }

    /// None if the region may be a member of a set of this kind, otherwise
    /// the reason why not
    pub fn check_region(self, hr: &HeapRegion) -> Option<&'static str> {
        if self.regions_humongous() {
            if !hr.is_starts_humongous() {
                return Some("the region should be 'starts humongous'");
            }
        } else if hr.is_humongous() {
            return Some("the region should not be humongous");
        }

        match self {
            RegionSetKind::Free if !hr.is_empty() => return Some("the region should be empty"),
            // young regions may still be empty, the others are retired full
            RegionSetKind::Old | RegionSetKind::Humongous if hr.is_empty() => {
                return Some("the region should not be empty")
            }
            _ => {}
        }

        match self {
            RegionSetKind::Free if !hr.is_free() => Some("the region should be free"),
            RegionSetKind::Young if !hr.is_young() => Some("the region should be young"),
            RegionSetKind::Old if !hr.is_old() => Some("the region should be old"),
            _ => None
        }
    }
}

/// State shared by the counting set and the linked list: identity, policy,
/// running totals and the verification scratch counters.
pub struct HeapRegionSetBase {
    name: String,
    id: RegionSetId,
    kind: RegionSetKind,
    count: HeapRegionSetCount,
    check_membership: bool,

    verify_in_progress: bool,
    calc: HeapRegionSetCount
}

impl HeapRegionSetBase {
    pub fn new(name: &str, kind: RegionSetKind, check_membership: bool) -> HeapRegionSetBase {
        HeapRegionSetBase {
            name: name.to_string(),
            id: RegionSetId::fresh(),
            kind,
            count: HeapRegionSetCount::new(),
            check_membership,
            verify_in_progress: false,
            calc: HeapRegionSetCount::new()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn id(&self) -> RegionSetId {
        self.id
    }
    pub fn kind(&self) -> RegionSetKind {
        self.kind
    }
    pub fn count(&self) -> HeapRegionSetCount {
        self.count
    }
    pub fn length(&self) -> usize {
        self.count.length
    }
    pub fn region_num(&self) -> usize {
        self.count.region_num
    }
    pub fn total_capacity_bytes(&self) -> ByteSize {
        self.count.capacity
    }
    pub fn total_used_bytes(&self) -> ByteSize {
        self.count.used
    }
    pub fn is_empty(&self) -> bool {
        self.count.is_empty()
    }
    pub fn check_membership(&self) -> bool {
        self.check_membership
    }

    /// Records `hr` as a new member: checks it is not owned by any set and
    /// fits the set's policy, takes ownership and adds it to the totals.
    pub(crate) fn add_internal(&mut self, hr: &HeapRegion) {
        if self.check_membership {
            let violation = self.kind.check_region(hr);
            guarantee!(
                violation.is_none(),
                "[{}] cannot add region {}: {}",
                self.name,
                hr.index(),
                violation.unwrap_or("")
            );
            guarantee!(
                hr.containing_set().is_none(),
                "[{}] region {} is already a member of another set",
                self.name,
                hr.index()
            );
            hr.set_containing_set(Some(self.id));
        }
        guarantee!(
            !hr.is_continues_humongous(),
            "[{}] region {} is continues humongous and cannot be added to a set",
            self.name,
            hr.index()
        );
        self.count.increment(hr);
    }

    /// Drops `hr` from the totals after checking that this set owns it.
    pub(crate) fn remove_internal(&mut self, hr: &HeapRegion) {
        self.release_membership(hr);
        self.count.decrement(hr);
    }

    pub(crate) fn release_membership(&self, hr: &HeapRegion) {
        if self.check_membership {
            guarantee!(
                hr.containing_set() == Some(self.id),
                "[{}] region {} is not a member of this set (owner: {:?})",
                self.name,
                hr.index(),
                hr.containing_set()
            );
            hr.set_containing_set(None);
        }
    }

    /// Re-points the back-reference of a region that moves wholesale from
    /// another set (bulk transfer).
    pub(crate) fn adopt(&self, hr: &HeapRegion) {
        if self.check_membership {
            if hr.containing_set().is_some() {
                hr.set_containing_set(None);
            }
            hr.set_containing_set(Some(self.id));
        }
    }

    pub(crate) fn count_mut(&mut self) -> &mut HeapRegionSetCount {
        &mut self.count
    }

    pub(crate) fn clear(&mut self) {
        self.count = HeapRegionSetCount::new();
    }

    /// None if `hr` is a well-formed member of this set, otherwise the reason
    pub fn verify_region(&self, hr: &HeapRegion) -> Option<&'static str> {
        if let Some(msg) = self.kind.check_region(hr) {
            return Some(msg);
        }
        if self.check_membership && hr.containing_set() != Some(self.id) {
            return Some("inconsistent containing set found");
        }
        None
    }

    /// Basic consistency of the totals. Does not look at members.
    pub fn verify(&self) {
        let c = &self.count;
        guarantee!(
            (c.length == 0 && c.region_num == 0 && c.used == 0 && c.capacity == 0) || c.length > 0,
            "[{}] empty set with non-zero totals: {}",
            self.name,
            self
        );
        guarantee!(
            (!self.kind.regions_humongous() && c.region_num == c.length)
                || (self.kind.regions_humongous() && c.region_num >= c.length),
            "[{}] region num {} inconsistent with length {}",
            self.name,
            c.region_num,
            c.length
        );
        guarantee!(
            !self.kind.regions_empty() || c.used == 0,
            "[{}] set of empty regions has {} used bytes",
            self.name,
            c.used
        );
        guarantee!(
            c.used <= c.capacity,
            "[{}] used bytes {} exceed capacity {}",
            self.name,
            c.used,
            c.capacity
        );
    }

    pub fn verify_start(&mut self) {
        guarantee!(
            !self.verify_in_progress,
            "[{}] verification should not be in progress",
            self.name
        );
        // do the basic verification first before we do the checks over the regions
        self.verify();

        self.calc = HeapRegionSetCount::new();
        self.verify_in_progress = true;
    }

    pub fn verify_next_region(&mut self, hr: &HeapRegion) {
        guarantee!(
            self.verify_in_progress,
            "[{}] verification should be in progress",
            self.name
        );
        if let Some(msg) = self.verify_region(hr) {
            guarantee!(false, "[{}] region {} failed verification: {}", self.name, hr, msg);
        }
        self.calc.increment(hr);
    }

    pub fn verify_end(&mut self) {
        guarantee!(
            self.verify_in_progress,
            "[{}] verification should be in progress",
            self.name
        );
        guarantee!(
            self.count.length == self.calc.length,
            "[{}] length: {} should be == calc length: {}",
            self.name,
            self.count.length,
            self.calc.length
        );
        guarantee!(
            self.count.region_num == self.calc.region_num,
            "[{}] region num: {} should be == calc region num: {}",
            self.name,
            self.count.region_num,
            self.calc.region_num
        );
        guarantee!(
            self.count.capacity == self.calc.capacity,
            "[{}] capacity bytes: {} should be == calc capacity bytes: {}",
            self.name,
            self.count.capacity,
            self.calc.capacity
        );
        guarantee!(
            self.count.used == self.calc.used,
            "[{}] used bytes: {} should be == calc used bytes: {}",
            self.name,
            self.count.used,
            self.calc.used
        );
        self.verify_in_progress = false;
    }
}

impl fmt::Display for HeapRegionSetBase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[{}] length: {} region num: {} capacity: {} used: {}",
            self.name,
            self.count.length,
            self.count.region_num,
            self.count.capacity,
            self.count.used
        )
    }
}

/// forwards the read-only totals of a set type to its `base`
macro_rules! delegate_set_base {
    ($t: ty) => {
        impl $t {
            pub fn base(&self) -> &HeapRegionSetBase {
                &self.base
            }
            pub fn name(&self) -> &str {
                self.base.name()
            }
            pub fn id(&self) -> RegionSetId {
                self.base.id()
            }
            pub fn kind(&self) -> RegionSetKind {
                self.base.kind()
            }
            pub fn length(&self) -> usize {
                self.base.length()
            }
            pub fn region_num(&self) -> usize {
                self.base.region_num()
            }
            pub fn total_capacity_bytes(&self) -> ByteSize {
                self.base.total_capacity_bytes()
            }
            pub fn total_used_bytes(&self) -> ByteSize {
                self.base.total_used_bytes()
            }
            pub fn count(&self) -> HeapRegionSetCount {
                self.base.count()
            }
        }

        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", self.base)
            }
        }
    };
}

/// A set that only counts its members; it has no links, so enumerating its
/// members means walking the region table (see `verify_next_region`).
pub struct HeapRegionSet {
    base: HeapRegionSetBase,
    table: Arc<HeapRegionTable>
}

delegate_set_base!(HeapRegionSet);

impl HeapRegionSet {
    pub fn new(name: &str, kind: RegionSetKind, table: Arc<HeapRegionTable>, check_membership: bool) -> HeapRegionSet {
        HeapRegionSet {
            base: HeapRegionSetBase::new(name, kind, check_membership),
            table
        }
    }

    /// a set for collecting removals from `self` (see `remove_with_proxy`)
    pub fn new_proxy(&self, name: &str) -> HeapRegionSet {
        HeapRegionSet {
            base: HeapRegionSetBase::new(name, self.kind(), false),
            table: self.table.clone()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty()
    }

    pub fn add(&mut self, index: RegionIndex) {
        let hr = self.table.at(index);
        trace_if!(TRACE_REGION_SETS, "[{}] add {}", self.name(), hr);
        self.base.add_internal(hr);
    }

    pub fn remove(&mut self, index: RegionIndex) {
        let hr = self.table.at(index);
        trace_if!(TRACE_REGION_SETS, "[{}] remove {}", self.name(), hr);
        self.base.remove_internal(hr);
    }

    /// Unlinks a member without touching this set's totals; the removed
    /// region's counts are accumulated into `removed` and must be applied
    /// later with `bulk_remove`. Only needs shared access, so several workers
    /// can unlink disjoint members concurrently.
    pub fn remove_deferred(&self, index: RegionIndex, removed: &mut HeapRegionSetCount) {
        let hr = self.table.at(index);
        self.base.release_membership(hr);
        removed.increment(hr);
    }

    /// `remove_deferred` that accumulates into a proxy set of the same kind
    pub fn remove_with_proxy(&self, index: RegionIndex, proxy: &mut HeapRegionSet) {
        guarantee!(
            self.kind() == proxy.kind(),
            "[{}] proxy set [{}] has a different kind",
            self.name(),
            proxy.name()
        );
        self.remove_deferred(index, proxy.base.count_mut());
    }

    /// Applies a batch of deferred removals to the totals.
    pub fn bulk_remove(&mut self, removed: &HeapRegionSetCount) {
        debug_if!(TRACE_REGION_SETS, "[{}] bulk remove {:?}", self.name(), removed);
        self.base.count_mut().decrement_by(removed);
    }

    /// Applies the removals collected in `proxy` and empties it.
    pub fn update_from_proxy(&mut self, proxy: &mut HeapRegionSet) {
        guarantee!(
            self.kind() == proxy.kind(),
            "[{}] proxy set [{}] has a different kind",
            self.name(),
            proxy.name()
        );
        self.base.verify();
        proxy.base.verify();

        if proxy.is_empty() {
            return;
        }

        let removed = proxy.count();
        guarantee!(
            removed.length() <= self.length(),
            "[{}] proxy set length: {} should be <= length: {}",
            self.name(),
            removed.length(),
            self.length()
        );
        self.bulk_remove(&removed);
        proxy.base.clear();

        self.base.verify();
    }

    pub fn verify(&self) {
        self.base.verify();
    }

    pub fn verify_start(&mut self) {
        self.base.verify_start();
    }

    pub fn verify_next_region(&mut self, index: RegionIndex) {
        let table = self.table.clone();
        self.base.verify_next_region(table.at(index));
    }

    pub fn verify_end(&mut self) {
        self.base.verify_end();
    }

    /// full verification by walking the region table for our members
    pub fn verify_members(&mut self) {
        guarantee!(
            self.base.check_membership(),
            "[{}] membership is not tracked, cannot enumerate members",
            self.name()
        );
        let table = self.table.clone();
        let id = self.id();

        self.verify_start();
        for hr in table.iter().filter(|hr| hr.containing_set() == Some(id)) {
            self.base.verify_next_region(hr);
        }
        self.verify_end();
    }
}
