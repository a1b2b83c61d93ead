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

//! Region linked lists.
//!
//! Links are region indices stored in the descriptors, so a list is just a
//! head, a tail and the shared region table. Insertion and removal of a
//! single region and splicing a whole list are O(1); the only O(n) paths are
//! ordered insertion, the pending-removal sweep, verification, and
//! re-pointing back-references on a splice when membership checking is on.

use crate::heap::g1::heap_region::*;
use crate::heap::g1::heap_region_set::*;
use crate::utils::ByteSize;
use crate::TRACE_REGION_SETS;

use std::fmt;
use std::sync::Arc;

pub struct HeapRegionLinkedList {
    base: HeapRegionSetBase,
    table: Arc<HeapRegionTable>,
    head: Option<RegionIndex>,
    tail: Option<RegionIndex>,
    // where the last ordered insertion happened, to speed up the next one
    last: Option<RegionIndex>,
    unrealistically_long_length: usize
}

/// Free regions are kept in linked lists ordered by region index.
pub type FreeRegionList = HeapRegionLinkedList;

delegate_set_base!(HeapRegionLinkedList);

impl HeapRegionLinkedList {
    pub fn new(
        name: &str,
        kind: RegionSetKind,
        table: Arc<HeapRegionTable>,
        check_membership: bool
    ) -> HeapRegionLinkedList {
        let unrealistically_long_length = table.len() + 1;
        HeapRegionLinkedList {
            base: HeapRegionSetBase::new(name, kind, check_membership),
            table,
            head: None,
            tail: None,
            last: None,
            unrealistically_long_length
        }
    }

    /// a private list of the same kind over the same table, for a worker to
    /// fill and later splice into this one
    pub fn new_local(&self, name: &str) -> HeapRegionLinkedList {
        HeapRegionLinkedList::new(name, self.kind(), self.table.clone(), self.base.check_membership())
    }

    /// bound used by `verify` to detect cycles in the links
    pub fn set_unrealistically_long_length(&mut self, len: usize) {
        guarantee!(len > 0, "[{}] unrealistic length must be positive", self.name());
        self.unrealistically_long_length = len;
    }

    pub fn unrealistically_long_length(&self) -> usize {
        self.unrealistically_long_length
    }

    pub fn table(&self) -> &Arc<HeapRegionTable> {
        &self.table
    }

    pub fn is_empty(&self) -> bool {
        debug_assert!(self.head.is_some() || self.base.is_empty());
        self.head.is_none()
    }

    pub fn head(&self) -> Option<RegionIndex> {
        self.head
    }

    pub fn tail(&self) -> Option<RegionIndex> {
        self.tail
    }

    pub fn iter(&self) -> HeapRegionLinkedListIter {
        HeapRegionLinkedListIter {
            table: &self.table,
            curr: self.head
        }
    }

    fn check_unlinked(&self, hr: &HeapRegion) {
        guarantee!(
            hr.next().is_none() && hr.prev().is_none(),
            "[{}] region {} should not be linked into a list",
            self.name(),
            hr.index()
        );
    }

    pub fn add_as_head(&mut self, index: RegionIndex) {
        let table = self.table.clone();
        let hr = table.at(index);
        self.check_unlinked(hr);
        trace_if!(TRACE_REGION_SETS, "[{}] add as head {}", self.name(), hr);
        self.base.add_internal(hr);

        match self.head {
            Some(head) => table.at(head).set_prev(Some(index)),
            None => self.tail = Some(index)
        }
        hr.set_next(self.head);
        self.head = Some(index);
    }

    pub fn add_as_tail(&mut self, index: RegionIndex) {
        let table = self.table.clone();
        let hr = table.at(index);
        self.check_unlinked(hr);
        trace_if!(TRACE_REGION_SETS, "[{}] add as tail {}", self.name(), hr);
        self.base.add_internal(hr);

        match self.tail {
            Some(tail) => table.at(tail).set_next(Some(index)),
            None => self.head = Some(index)
        }
        hr.set_prev(self.tail);
        self.tail = Some(index);
    }

    /// Inserts a region keeping the list sorted by region index.
    pub fn add_ordered(&mut self, index: RegionIndex) {
        let table = self.table.clone();
        let hr = table.at(index);
        self.check_unlinked(hr);
        trace_if!(TRACE_REGION_SETS, "[{}] add ordered {}", self.name(), hr);
        self.base.add_internal(hr);

        match self.head {
            None => {
                self.head = Some(index);
                self.tail = Some(index);
            }
            Some(head) => {
                let mut curr = match self.last {
                    Some(last) if last < index => Some(last),
                    _ => Some(head)
                };
                // find first entry with a region index larger than the one to insert
                while let Some(c) = curr {
                    if c >= index {
                        break;
                    }
                    curr = table.at(c).next();
                }

                hr.set_next(curr);
                match curr {
                    None => {
                        // adding at the end
                        hr.set_prev(self.tail);
                        if let Some(tail) = self.tail {
                            table.at(tail).set_next(Some(index));
                        }
                        self.tail = Some(index);
                    }
                    Some(c) => {
                        let c_hr = table.at(c);
                        match c_hr.prev() {
                            None => {
                                // adding at the beginning
                                hr.set_prev(None);
                                self.head = Some(index);
                            }
                            Some(p) => {
                                hr.set_prev(Some(p));
                                table.at(p).set_next(Some(index));
                            }
                        }
                        c_hr.set_prev(Some(index));
                    }
                }
            }
        }
        self.last = Some(index);
    }

    /// Unlinks a member in O(1).
    pub fn remove(&mut self, index: RegionIndex) {
        let table = self.table.clone();
        let hr = table.at(index);
        trace_if!(TRACE_REGION_SETS, "[{}] remove {}", self.name(), hr);
        self.base.remove_internal(hr);

        match hr.prev() {
            None => {
                guarantee!(
                    self.head == Some(index),
                    "[{}] region {} is not in this list",
                    self.name(),
                    index
                );
                self.head = hr.next();
            }
            Some(p) => table.at(p).set_next(hr.next())
        }
        match hr.next() {
            None => {
                guarantee!(
                    self.tail == Some(index),
                    "[{}] region {} is not in this list",
                    self.name(),
                    index
                );
                self.tail = hr.prev();
            }
            Some(n) => table.at(n).set_prev(hr.prev())
        }
        hr.set_next(None);
        hr.set_prev(None);

        if self.last == Some(index) {
            self.last = None;
        }
    }

    /// Takes a region off the head (lowest index of an ordered list) or the
    /// tail. Returns None if the list is empty.
    pub fn remove_region(&mut self, from_head: bool) -> Option<RegionIndex> {
        let index = if from_head { self.head } else { self.tail };
        if let Some(index) = index {
            self.remove(index);
        }
        index
    }

    // adopts the members of `from` before a splice; only needed to keep the
    // back-references exact
    fn adopt_all(&mut self, from: &HeapRegionLinkedList) {
        if !self.base.check_membership() {
            return;
        }
        for index in from.iter() {
            let hr = self.table.at(index);
            if from.base.check_membership() {
                guarantee!(
                    hr.containing_set() == Some(from.id()),
                    "[{}] region {} is not a member of the list being transferred",
                    from.name(),
                    index
                );
            }
            self.base.adopt(hr);
        }
    }

    fn check_same_table(&self, other: &HeapRegionLinkedList) {
        guarantee!(
            Arc::ptr_eq(&self.table, &other.table),
            "[{}] and [{}] link regions of different heaps",
            self.name(),
            other.name()
        );
    }

    /// Splices all of `from` onto the tail of this list and empties `from`.
    /// The splice itself is O(1) regardless of the batch size.
    pub fn add_list_as_tail(&mut self, from: &mut HeapRegionLinkedList) {
        self.check_same_table(from);
        if from.is_empty() {
            return;
        }
        self.adopt_all(from);
        debug_if!(TRACE_REGION_SETS, "{} <- tail {}", self, from);

        match self.tail {
            Some(tail) => {
                self.table.at(tail).set_next(from.head);
                if let Some(from_head) = from.head {
                    self.table.at(from_head).set_prev(Some(tail));
                }
            }
            None => self.head = from.head
        }
        self.tail = from.tail;

        self.base.count_mut().increment_by(&from.count());
        from.clear();
    }

    /// the proxy-list flush: same as `add_list_as_tail`
    pub fn bulk_transfer(&mut self, from: &mut HeapRegionLinkedList) {
        self.add_list_as_tail(from);
    }

    /// Splices all of `from` in front of this list and empties `from`.
    pub fn add_list_as_head(&mut self, from: &mut HeapRegionLinkedList) {
        self.check_same_table(from);
        if from.is_empty() {
            return;
        }
        self.adopt_all(from);
        debug_if!(TRACE_REGION_SETS, "{} <- head {}", self, from);

        match self.head {
            Some(head) => {
                self.table.at(head).set_prev(from.tail);
                if let Some(from_tail) = from.tail {
                    self.table.at(from_tail).set_next(Some(head));
                }
            }
            None => self.tail = from.tail
        }
        self.head = from.head;

        self.base.count_mut().increment_by(&from.count());
        from.clear();
    }

    /// Merges the sorted list `from` into this sorted list and empties it.
    pub fn add_ordered_list(&mut self, from: &mut HeapRegionLinkedList) {
        self.check_same_table(from);
        if from.is_empty() {
            return;
        }
        self.adopt_all(from);
        debug_if!(TRACE_REGION_SETS, "{} <- ordered {}", self, from);
        let table = self.table.clone();

        if self.is_empty() {
            debug_assert!(self.length() == 0 && self.tail.is_none());
            self.head = from.head;
            self.tail = from.tail;
        } else {
            let mut curr_to = self.head;
            let mut curr_from = from.head;

            while let Some(f) = curr_from {
                while let Some(t) = curr_to {
                    if t >= f {
                        break;
                    }
                    curr_to = table.at(t).next();
                }

                match curr_to {
                    None => {
                        // the rest of the from list goes on the tail
                        if let Some(tail) = self.tail {
                            table.at(tail).set_next(Some(f));
                        }
                        table.at(f).set_prev(self.tail);
                        curr_from = None;
                    }
                    Some(t) => {
                        let f_hr = table.at(f);
                        let t_hr = table.at(t);
                        let next_from = f_hr.next();

                        f_hr.set_next(Some(t));
                        f_hr.set_prev(t_hr.prev());
                        match t_hr.prev() {
                            None => self.head = Some(f),
                            Some(p) => table.at(p).set_next(Some(f))
                        }
                        t_hr.set_prev(Some(f));

                        curr_from = next_from;
                    }
                }
            }

            if let (Some(tail), Some(from_tail)) = (self.tail, from.tail) {
                if tail < from_tail {
                    self.tail = Some(from_tail);
                }
            }
        }

        self.base.count_mut().increment_by(&from.count());
        from.clear();
    }

    /// Removes every region flagged pending-removal, `target_count` of them
    /// in total. Stops once the target is reached, except in debug builds
    /// where it keeps scanning to check that no extra regions are flagged.
    pub fn remove_all_pending(&mut self, target_count: usize) {
        guarantee!(target_count >= 1, "[{}] pre-condition: target count {}", self.name(), target_count);
        guarantee!(!self.is_empty(), "[{}] pre-condition: list is empty", self.name());

        let table = self.table.clone();
        let old_length = self.length();
        let mut curr = self.head;
        let mut count = 0;

        while let Some(index) = curr {
            let hr = table.at(index);
            let next = hr.next();

            if hr.pending_removal() {
                guarantee!(
                    count < target_count,
                    "[{}] should not come across more regions pending for removal than target count: {}",
                    self.name(),
                    target_count
                );
                self.remove(index);
                hr.set_pending_removal(false);
                count += 1;

                if count == target_count && !cfg!(debug_assertions) {
                    break;
                }
            }
            curr = next;
        }

        guarantee!(
            count == target_count,
            "[{}] count: {} should be == target_count: {}",
            self.name(),
            count,
            target_count
        );
        guarantee!(
            self.length() + target_count == old_length,
            "[{}] new length should be consistent: new length: {} old length: {} target_count: {}",
            self.name(),
            self.length(),
            old_length,
            target_count
        );
    }

    /// Unlinks every member.
    pub fn remove_all(&mut self) {
        while self.remove_region(true).is_some() {}
        debug_assert!(self.base.is_empty());
    }

    // forgets the members without touching them, after they were spliced
    // into another list
    fn clear(&mut self) {
        self.base.clear();
        self.head = None;
        self.tail = None;
        self.last = None;
    }

    /// Recomputes the totals by walking the links and compares them with the
    /// running counters. Fatal on any mismatch or on a suspected cycle.
    pub fn verify(&mut self) {
        let table = self.table.clone();
        self.base.verify_start();

        if let Some(head) = self.head {
            guarantee!(
                table.at(head).prev().is_none(),
                "[{}] head {} should not have a prev",
                self.name(),
                head
            );
        }

        let mut curr = self.head;
        let mut prev0: Option<RegionIndex> = None;
        let mut prev1: Option<RegionIndex> = None;
        let mut count = 0;

        while let Some(index) = curr {
            let hr = table.at(index);
            self.base.verify_next_region(hr);

            count += 1;
            guarantee!(
                count < self.unrealistically_long_length,
                "[{}] the calculated length: {} seems very long, is there maybe a cycle? curr: {} prev0: {:?} prev1: {:?} length: {}",
                self.name(),
                count,
                index,
                prev0,
                prev1,
                self.length()
            );

            if let Some(next) = hr.next() {
                guarantee!(
                    table.at(next).prev() == Some(index),
                    "[{}] next or prev links messed up at {}",
                    self.name(),
                    index
                );
            }

            prev1 = prev0;
            prev0 = Some(index);
            curr = hr.next();
        }

        guarantee!(
            self.tail == prev0,
            "[{}] expected to end with {:?} but it ended with {:?}",
            self.name(),
            self.tail,
            prev0
        );
        self.base.verify_end();
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

    pub fn print_contents(&self) -> String {
        let mut ret = format!("{}\n", self);
        for index in self.iter() {
            ret.push_str(&format!("  {}\n", self.table.at(index)));
        }
        ret
    }
}

/// Iterates the member indices from head to tail.
pub struct HeapRegionLinkedListIter<'a> {
    table: &'a HeapRegionTable,
    curr: Option<RegionIndex>
}

impl<'a> Iterator for HeapRegionLinkedListIter<'a> {
    type Item = RegionIndex;

    fn next(&mut self) -> Option<RegionIndex> {
        let ret = self.curr;
        if let Some(index) = ret {
            self.curr = self.table.at(index).next();
        }
        ret
    }
}
