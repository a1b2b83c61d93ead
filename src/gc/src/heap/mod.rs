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

use crate::utils::Address;
use crate::utils::WordSize;

/// block-offset tables
pub mod bot;
/// region descriptors, region sets and the region manager
pub mod g1;

/// The narrow view of a contiguous allocation space that a block-offset
/// table needs in order to walk forward block by block.
pub trait BlockSpace {
    fn bottom(&self) -> Address;
    /// first address past the last allocated block
    fn top(&self) -> Address;
    /// size in words of the block starting at `addr`, or None if the block
    /// header is not published yet (its allocation is still in flight)
    fn block_size(&self, addr: Address) -> Option<WordSize>;
}
