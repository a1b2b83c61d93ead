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

//! Region bookkeeping of the region-based collector.

/// region descriptors and the region table
pub mod heap_region;
/// counting region sets and their shared base
#[macro_use]
pub mod heap_region_set;
/// linked region lists (free lists)
pub mod free_region_list;
/// the region manager owning every set
pub mod heap_region_manager;

pub use self::free_region_list::{FreeRegionList, HeapRegionLinkedList, HeapRegionLinkedListIter};
pub use self::heap_region::{HeapRegion, HeapRegionTable, RegionIndex, RegionSetId, RegionType};
pub use self::heap_region_manager::HeapRegionManager;
pub use self::heap_region_set::{HeapRegionSet, HeapRegionSetBase, HeapRegionSetCount, RegionSetKind};
