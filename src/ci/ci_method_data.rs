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

//! The compiler's copy of a method profile.
//!
//! `load_data` copies the live profile without stopping the threads that
//! update it. The copy is a best-effort snapshot, not a linearizable one:
//! counters may be mutually inconsistent, a trap record may be seen
//! without its trap state, and two loads of the same profile may
//! disagree. Compilers only use it as a hint. Once loaded, the snapshot
//! only changes in its escape analysis state, which `update_escape_info`
//! writes back to the live profile.

use crate::ci::ci_metadata::CiMetadataRef;
use crate::ci::ci_object_factory::CiObjectFactory;
use crate::runtime::method_data::*;
use crate::runtime::MetadataId;

use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// a saturated trap history counter reads as this
pub const TRAP_COUNT_SATURATED: u32 = u32::max_value();

/// When a profile has seen enough execution to be trusted, and how many
/// traps a method may take before compilers stop speculating.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ProfilePolicy {
    /// percentage of the compile thresholds a profile must reach
    pub maturity_percentage: u32,
    pub invocation_threshold: u32,
    pub min_invocation_threshold: u32,
    pub compile_threshold: u32,
    pub backedge_threshold: u32,
    pub per_method_trap_limit: u32
}

impl Default for ProfilePolicy {
    fn default() -> ProfilePolicy {
        ProfilePolicy {
            maturity_percentage: 20,
            invocation_threshold: 5000,
            min_invocation_threshold: 600,
            compile_threshold: 15000,
            backedge_threshold: 40000,
            per_method_trap_limit: 100
        }
    }
}

impl ProfilePolicy {
    fn reaches(&self, count: u64, threshold: u32) -> bool {
        count * 100 >= threshold as u64 * self.maturity_percentage as u64
    }

    /// The call predicate (enough invocations, or enough invocations plus
    /// backedges) or the loop predicate (enough backedges), each scaled by
    /// the maturity percentage.
    pub fn is_mature(&self, invocations: u32, backedges: u32) -> bool {
        let (i, b) = (invocations as u64, backedges as u64);
        self.reaches(i, self.invocation_threshold)
            || (self.reaches(i, self.min_invocation_threshold) && self.reaches(i + b, self.compile_threshold))
            || self.reaches(b, self.backedge_threshold)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ProfileState {
    /// no live profile exists
    Empty,
    Immature,
    Mature
}

/// escape analysis flags kept with a profile
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum EscapeFlag {
    Estimated,
    ReturnLocal,
    ReturnAllocated,
    AllocatedEscapes,
    UnknownModified
}

impl EscapeFlag {
    fn mask(self) -> u32 {
        1 << (self as u32)
    }
}

#[derive(Clone, Debug)]
pub struct ReceiverRow {
    /// None for an empty row, or a receiver that was unloaded
    pub receiver: Option<CiMetadataRef>,
    pub count: usize
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct RetRow {
    pub bci: Option<usize>,
    pub count: usize,
    pub displacement: usize
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct SwitchCase {
    pub count: usize,
    pub displacement: usize
}

/// a copied profile entry, metadata references already translated
#[derive(Clone, Debug)]
pub enum ProfileEntry {
    Bit,
    Counter {
        count: usize
    },
    Jump {
        taken: usize,
        displacement: usize
    },
    ReceiverType {
        count: usize,
        rows: Vec<ReceiverRow>
    },
    VirtualCall {
        count: usize,
        rows: Vec<ReceiverRow>
    },
    Ret {
        count: usize,
        rows: Vec<RetRow>
    },
    Branch {
        taken: usize,
        displacement: usize,
        not_taken: usize
    },
    MultiBranch {
        default_count: usize,
        default_displacement: usize,
        cases: Vec<SwitchCase>
    },
    ArgInfo {
        args: usize
    },
    SpeculativeTrap {
        /// None if the method making the speculation was unloaded
        method: Option<CiMetadataRef>
    }
}

#[derive(Clone, Debug)]
pub struct CiProfileData {
    di: DataIndex,
    tag: DataTag,
    bci: usize,
    flags: u8,
    trap_state: u32,
    size: usize,
    entry: ProfileEntry
}

impl CiProfileData {
    pub fn di(&self) -> DataIndex {
        self.di
    }

    pub fn tag(&self) -> DataTag {
        self.tag
    }

    pub fn bci(&self) -> usize {
        self.bci
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn trap_state(&self) -> u32 {
        self.trap_state
    }

    /// cells the entry occupies, header included
    pub fn size_in_cells(&self) -> usize {
        self.size
    }

    pub fn entry(&self) -> &ProfileEntry {
        &self.entry
    }

    /// the execution count of counted entries
    pub fn count(&self) -> Option<usize> {
        match self.entry {
            ProfileEntry::Counter { count }
            | ProfileEntry::ReceiverType { count, .. }
            | ProfileEntry::VirtualCall { count, .. }
            | ProfileEntry::Ret { count, .. } => Some(count),
            _ => None
        }
    }

    pub fn receiver_rows(&self) -> &[ReceiverRow] {
        match self.entry {
            ProfileEntry::ReceiverType { ref rows, .. } | ProfileEntry::VirtualCall { ref rows, .. } => rows,
            _ => &[]
        }
    }

    fn print_on(&self, out: &mut String) {
        out.push_str(&format!("{:>6} bci: {:<5} {:?}", self.di.as_usize(), self.bci, self.tag));
        match self.entry {
            ProfileEntry::Bit | ProfileEntry::ArgInfo { .. } => {}
            ProfileEntry::Counter { count } => out.push_str(&format!(" count({})", count)),
            ProfileEntry::Jump { taken, displacement } => {
                out.push_str(&format!(" taken({}) displacement({})", taken, displacement))
            }
            ProfileEntry::ReceiverType { count, ref rows } | ProfileEntry::VirtualCall { count, ref rows } => {
                out.push_str(&format!(" count({})", count));
                for row in rows.iter() {
                    match row.receiver {
                        Some(ref r) => {
                            let name = r.as_klass().map_or("?", |k| k.name_str());
                            out.push_str(&format!(" [{}: {}]", name, row.count))
                        }
                        None => out.push_str(" [-]")
                    }
                }
            }
            ProfileEntry::Ret { count, ref rows } => {
                out.push_str(&format!(" count({})", count));
                for row in rows.iter().filter(|r| r.bci.is_some()) {
                    out.push_str(&format!(" [bci {:?}: {}]", row.bci, row.count));
                }
            }
            ProfileEntry::Branch { taken, not_taken, .. } => {
                out.push_str(&format!(" taken({}) not taken({})", taken, not_taken))
            }
            ProfileEntry::MultiBranch { default_count, ref cases, .. } => {
                out.push_str(&format!(" default_count({})", default_count));
                for (i, c) in cases.iter().enumerate() {
                    out.push_str(&format!(" case[{}]({})", i, c.count));
                }
            }
            ProfileEntry::SpeculativeTrap { ref method } => match *method {
                Some(ref m) => out.push_str(&format!(" method({})", m)),
                None => out.push_str(" method(unloaded)")
            }
        }
        if self.trap_state != 0 {
            out.push_str(&format!(" trap({})", trap_state::describe(self.trap_state)));
        }
        out.push('\n');
    }
}

/// A compiler's snapshot of a method profile.
pub struct CiMethodData {
    mdo: Option<Arc<MethodData>>,
    state: ProfileState,
    policy: ProfilePolicy,

    data_size: usize,
    extra_data_size: usize,
    data: Vec<CiProfileData>,
    extra: Vec<CiProfileData>,
    free_extra_cells: usize,
    saw_free_extra_data: bool,
    hint_di: AtomicUsize,

    invocation_count: u32,
    backedge_count: u32,
    creation_mileage: u32,
    current_mileage: u32,
    decompile_count: u32,
    overflow_recompile_count: u32,
    overflow_trap_count: u32,
    trap_hist: [u8; TRAP_HIST_LENGTH],

    eflags: AtomicU32,
    arg_local: AtomicU64,
    arg_stack: AtomicU64,
    arg_returned: AtomicU64,
    arg_modified: Vec<AtomicUsize>,
    would_profile: AtomicBool
}

impl CiMethodData {
    /// a snapshot of `mdo`, empty until `load_data`
    pub(crate) fn new(mdo: Arc<MethodData>) -> CiMethodData {
        let mut ret = CiMethodData::empty();
        ret.mdo = Some(mdo);
        ret
    }

    /// the snapshot of a method with no profile
    pub(crate) fn empty() -> CiMethodData {
        CiMethodData {
            mdo: None,
            state: ProfileState::Empty,
            policy: ProfilePolicy::default(),
            data_size: 0,
            extra_data_size: 0,
            data: vec![],
            extra: vec![],
            free_extra_cells: 0,
            saw_free_extra_data: false,
            hint_di: AtomicUsize::new(0),
            invocation_count: 0,
            backedge_count: 0,
            creation_mileage: 0,
            current_mileage: 0,
            decompile_count: 0,
            overflow_recompile_count: 0,
            overflow_trap_count: 0,
            trap_hist: [0; TRAP_HIST_LENGTH],
            eflags: AtomicU32::new(0),
            arg_local: AtomicU64::new(0),
            arg_stack: AtomicU64::new(0),
            arg_returned: AtomicU64::new(0),
            arg_modified: vec![],
            would_profile: AtomicBool::new(true)
        }
    }

    /// Copies the live profile and translates the metadata it refers to
    /// through `factory`. Receivers and speculating methods that have been
    /// unloaded are dropped from their rows. Panics on a corrupt tag.
    pub fn load_data(&mut self, factory: &mut CiObjectFactory) {
        let mdo = match self.mdo {
            Some(ref mdo) => mdo.clone(),
            None => return
        };
        self.policy = *factory.policy();

        // neither copy is synchronized with the interpreter
        let header = mdo.header_snapshot();
        let copy = mdo.cells_snapshot();
        let data_size = mdo.data_size();
        let arg_info_di = mdo.arg_info_di().as_usize();

        let mut data = vec![];
        let mut di = 0;
        while di < data_size {
            let entry = parse_entry(&copy, di, mdo.id(), factory);
            if entry.tag == DataTag::NoTag || entry.tag == DataTag::ArgInfoData {
                should_not_reach_here!("bad tag {:?} at di{} in the data of {}", entry.tag, di, mdo.id());
            }
            di += entry.size;
            data.push(entry);
        }

        let mut extra = vec![];
        let mut free_extra_cells = 0;
        let mut di = data_size;
        while di < arg_info_di {
            let raw = header_tag(copy[di]);
            match DataTag::from_u8(raw) {
                Some(DataTag::NoTag) => {
                    free_extra_cells = arg_info_di - di;
                    break;
                }
                Some(tag @ DataTag::BitData) | Some(tag @ DataTag::SpeculativeTrapData) => {
                    if di + 1 + tag.cell_count(0) > arg_info_di {
                        break;
                    }
                    let entry = parse_entry(&copy, di, mdo.id(), factory);
                    di += entry.size;
                    extra.push(entry);
                }
                _ => should_not_reach_here!("bad tag {} at di{} in the extra data of {}", raw, di, mdo.id())
            }
        }

        let n_args = copy.get(arg_info_di + 1).cloned().unwrap_or(0);
        self.arg_modified = (0..n_args)
            .map(|i| AtomicUsize::new(copy.get(arg_info_di + 2 + i).cloned().unwrap_or(0)))
            .collect();

        self.data_size = data_size;
        self.extra_data_size = copy.len() - data_size;
        self.data = data;
        self.extra = extra;
        self.free_extra_cells = free_extra_cells;
        self.saw_free_extra_data = free_extra_cells > 0;
        self.hint_di = AtomicUsize::new(header.hint_di);

        self.invocation_count = header.invocation_count;
        self.backedge_count = header.backedge_count;
        self.creation_mileage = header.creation_mileage;
        self.current_mileage = mdo.method().map_or(0, |m| mileage_of(&m));
        self.decompile_count = header.decompile_count;
        self.overflow_recompile_count = header.overflow_recompile_count;
        self.overflow_trap_count = header.overflow_trap_count;
        self.trap_hist = header.trap_hist;
        self.eflags = AtomicU32::new(header.eflags);
        self.arg_local = AtomicU64::new(header.arg_local);
        self.arg_stack = AtomicU64::new(header.arg_stack);
        self.arg_returned = AtomicU64::new(header.arg_returned);
        self.would_profile = AtomicBool::new(header.would_profile);

        self.state = if self.policy.is_mature(self.invocation_count, self.backedge_count) {
            ProfileState::Mature
        } else {
            ProfileState::Immature
        };
        debug!(
            "ciMethodData: loaded {:?}: {:?}, {} entries, {} extra records, {} invocations, {} backedges",
            mdo,
            self.state,
            self.data.len(),
            self.extra.len(),
            self.invocation_count,
            self.backedge_count
        );
    }

    pub fn metadata_id(&self) -> Option<MetadataId> {
        self.mdo.as_ref().map(|mdo| mdo.id())
    }

    pub fn state(&self) -> ProfileState {
        self.state
    }

    pub fn is_empty(&self) -> bool {
        self.state == ProfileState::Empty
    }

    pub fn is_mature(&self) -> bool {
        self.state == ProfileState::Mature
    }

    pub fn invocation_count(&self) -> u32 {
        self.invocation_count
    }

    pub fn backedge_count(&self) -> u32 {
        self.backedge_count
    }

    pub fn creation_mileage(&self) -> u32 {
        self.creation_mileage
    }

    pub fn current_mileage(&self) -> u32 {
        self.current_mileage
    }

    pub fn decompile_count(&self) -> u32 {
        self.decompile_count
    }

    pub fn overflow_recompile_count(&self) -> u32 {
        self.overflow_recompile_count
    }

    pub fn overflow_trap_count(&self) -> u32 {
        self.overflow_trap_count
    }

    pub fn data_size(&self) -> usize {
        self.data_size
    }

    pub fn extra_data_size(&self) -> usize {
        self.extra_data_size
    }

    pub fn data(&self) -> &[CiProfileData] {
        &self.data
    }

    pub fn extra_data(&self) -> &[CiProfileData] {
        &self.extra
    }

    pub fn first_data(&self) -> Option<&CiProfileData> {
        self.data.first()
    }

    pub fn next_data(&self, current: &CiProfileData) -> Option<&CiProfileData> {
        let pos = self.position_of(current.di)?;
        self.data.get(pos + 1)
    }

    pub fn data_at(&self, di: DataIndex) -> Option<&CiProfileData> {
        self.position_of(di).map(|pos| &self.data[pos])
    }

    fn position_of(&self, di: DataIndex) -> Option<usize> {
        self.data.binary_search_by_key(&di, |d| d.di).ok()
    }

    /// where a search for `bci` may start: the hint, if it is not past `bci`
    fn data_before(&self, bci: usize) -> usize {
        let hint = DataIndex::new(self.hint_di.load(Ordering::Relaxed));
        match self.position_of(hint) {
            Some(pos) if self.data[pos].bci <= bci => pos,
            _ => 0
        }
    }

    /// The entry for `bci`. With a method, the speculative trap record that
    /// method made at `bci`; when no such record exists and the extra data
    /// could not take another one, the plain entry for `bci`.
    pub fn bci_to_data(&self, bci: usize, method: Option<&CiMetadataRef>) -> Option<&CiProfileData> {
        if method.is_none() {
            let start = self.data_before(bci);
            for data in self.data[start..].iter() {
                if data.bci == bci {
                    self.hint_di.store(data.di.as_usize(), Ordering::Relaxed);
                    return Some(data);
                } else if data.bci > bci {
                    break;
                }
            }
        }

        let (found, two_free_slots) = self.bci_to_extra_data_impl(bci, method);
        if found.is_some() {
            return found;
        }
        if method.is_some() && !two_free_slots {
            return self.bci_to_data(bci, None);
        }
        None
    }

    pub fn bci_to_extra_data(&self, bci: usize, method: Option<&CiMetadataRef>) -> Option<&CiProfileData> {
        self.bci_to_extra_data_impl(bci, method).0
    }

    fn bci_to_extra_data_impl(&self, bci: usize, method: Option<&CiMetadataRef>) -> (Option<&CiProfileData>, bool) {
        let found = self.extra.iter().find(|e| {
            if e.bci != bci {
                return false;
            }
            match (&e.entry, method) {
                (&ProfileEntry::Bit, None) => true,
                (&ProfileEntry::SpeculativeTrap { method: Some(ref m) }, Some(want)) => Arc::ptr_eq(m, want),
                _ => false
            }
        });
        let two_free_slots = self.free_extra_cells >= 1 + DataTag::SpeculativeTrapData.cell_count(0);
        (found, two_free_slots)
    }

    /// Traps taken for `reason` anywhere in the method;
    /// `TRAP_COUNT_SATURATED` once the counter has run out of range.
    pub fn trap_count(&self, reason: DeoptReason) -> u32 {
        let hist = self.trap_hist[reason.index()] as u32;
        if hist == TRAP_HIST_MASK {
            TRAP_COUNT_SATURATED
        } else {
            hist
        }
    }

    pub fn trap_recompiled_at(&self, bci: usize, method: Option<&CiMetadataRef>) -> bool {
        match self.bci_to_data(bci, method) {
            Some(data) => trap_state::is_recompiled(data.trap_state),
            None => self.overflow_recompile_count > 0
        }
    }

    /// Whether `bci` trapped for `reason`. Without an entry the answer is
    /// only certain if the profile still had room to record one.
    pub fn has_trap_at(&self, bci: usize, method: Option<&CiMetadataRef>, reason: DeoptReason) -> TrapHistory {
        match self.bci_to_data(bci, method) {
            Some(data) => trap_state::has_reason(data.trap_state, reason),
            None => {
                if !self.saw_free_extra_data && self.trap_count(reason) > 0 {
                    TrapHistory::Maybe
                } else {
                    TrapHistory::Absent
                }
            }
        }
    }

    /// Too many traps for `reason` to keep speculating: at this bytecode
    /// at all, or more than the per-method limit overall.
    pub fn too_many_traps(&self, bci: usize, method: Option<&CiMetadataRef>, reason: DeoptReason) -> bool {
        if self.is_empty() {
            return false;
        }
        if self.has_trap_at(bci, method, reason).is_possible() {
            return true;
        }
        self.trap_count(reason) >= self.policy.per_method_trap_limit
    }

    pub fn would_profile(&self) -> bool {
        self.would_profile.load(Ordering::Relaxed)
    }

    /// Also updates the live profile.
    pub fn set_would_profile(&self, p: bool) {
        self.would_profile.store(p, Ordering::Relaxed);
        if let Some(ref mdo) = self.mdo {
            mdo.set_would_profile(p);
        }
    }

    pub fn set_eflag(&self, flag: EscapeFlag) {
        self.eflags.fetch_or(flag.mask(), Ordering::Relaxed);
    }

    pub fn clear_eflag(&self, flag: EscapeFlag) {
        self.eflags.fetch_and(!flag.mask(), Ordering::Relaxed);
    }

    pub fn has_eflag(&self, flag: EscapeFlag) -> bool {
        self.eflags.load(Ordering::Relaxed) & flag.mask() != 0
    }

    fn arg_bit(arg: usize) -> u64 {
        guarantee!(arg < 64, "argument {} does not fit the escape bit vectors", arg);
        1u64 << arg
    }

    pub fn set_arg_local(&self, arg: usize) {
        self.arg_local.fetch_or(Self::arg_bit(arg), Ordering::Relaxed);
    }

    pub fn set_arg_stack(&self, arg: usize) {
        self.arg_stack.fetch_or(Self::arg_bit(arg), Ordering::Relaxed);
    }

    pub fn set_arg_returned(&self, arg: usize) {
        self.arg_returned.fetch_or(Self::arg_bit(arg), Ordering::Relaxed);
    }

    pub fn is_arg_local(&self, arg: usize) -> bool {
        self.arg_local.load(Ordering::Relaxed) & Self::arg_bit(arg) != 0
    }

    pub fn is_arg_stack(&self, arg: usize) -> bool {
        self.arg_stack.load(Ordering::Relaxed) & Self::arg_bit(arg) != 0
    }

    pub fn is_arg_returned(&self, arg: usize) -> bool {
        self.arg_returned.load(Ordering::Relaxed) & Self::arg_bit(arg) != 0
    }

    pub fn arg_count(&self) -> usize {
        self.arg_modified.len()
    }

    pub fn arg_modified(&self, arg: usize) -> usize {
        guarantee!(arg < self.arg_modified.len(), "argument {} out of range", arg);
        self.arg_modified[arg].load(Ordering::Relaxed)
    }

    pub fn set_arg_modified(&self, arg: usize, modified: usize) {
        guarantee!(arg < self.arg_modified.len(), "argument {} out of range", arg);
        self.arg_modified[arg].store(modified, Ordering::Relaxed);
    }

    /// Writes the escape state back to the live profile.
    pub fn update_escape_info(&self) {
        let mdo = match self.mdo {
            Some(ref mdo) => mdo,
            None => return
        };
        mdo.set_escape_info(
            self.eflags.load(Ordering::Relaxed),
            self.arg_local.load(Ordering::Relaxed),
            self.arg_stack.load(Ordering::Relaxed),
            self.arg_returned.load(Ordering::Relaxed)
        );
        for (i, m) in self.arg_modified.iter().enumerate() {
            mdo.set_arg_modified(i, m.load(Ordering::Relaxed));
        }
    }

    pub fn print_data_on(&self) -> String {
        let mut out = format!("{}\n", self);
        for data in self.data.iter() {
            data.print_on(&mut out);
        }
        if !self.extra.is_empty() {
            out.push_str("--- Extra data:\n");
            for data in self.extra.iter() {
                data.print_on(&mut out);
            }
        }
        out
    }
}

/// Parses the entry at `di` of a copied profile.
fn parse_entry(copy: &[usize], di: usize, owner: MetadataId, factory: &mut CiObjectFactory) -> CiProfileData {
    let header = copy[di];
    let raw = header_tag(header);
    let tag = match DataTag::from_u8(raw) {
        Some(tag) => tag,
        None => should_not_reach_here!("bad tag {} at di{} in {}", raw, di, owner)
    };
    let payload = |offset: usize| copy.get(di + 1 + offset).cloned().unwrap_or(0);

    let entry = match tag {
        DataTag::NoTag | DataTag::BitData => ProfileEntry::Bit,
        DataTag::CounterData => ProfileEntry::Counter {
            count: payload(cells::COUNT)
        },
        DataTag::JumpData => ProfileEntry::Jump {
            taken: payload(cells::JUMP_TAKEN),
            displacement: payload(cells::JUMP_DISPLACEMENT)
        },
        DataTag::ReceiverTypeData | DataTag::VirtualCallData => {
            let mut rows = Vec::with_capacity(TYPE_PROFILE_WIDTH);
            for row in 0..TYPE_PROFILE_WIDTH {
                let receiver = cells::decode_metadata(payload(cells::receiver(row)))
                    .and_then(|id| factory.get_metadata_by_id(id))
                    .filter(|k| k.as_klass().is_some());
                // a row whose receiver is gone is cleared
                let count = if receiver.is_some() {
                    payload(cells::receiver_count(row))
                } else {
                    0
                };
                rows.push(ReceiverRow { receiver, count });
            }
            let count = payload(cells::COUNT);
            if tag == DataTag::ReceiverTypeData {
                ProfileEntry::ReceiverType { count, rows }
            } else {
                ProfileEntry::VirtualCall { count, rows }
            }
        }
        DataTag::RetData => ProfileEntry::Ret {
            count: payload(cells::COUNT),
            rows: (0..BCI_PROFILE_WIDTH)
                .map(|row| {
                    let bci = payload(cells::ret_bci(row));
                    RetRow {
                        bci: if bci == NO_BCI { None } else { Some(bci) },
                        count: payload(cells::ret_count(row)),
                        displacement: payload(cells::ret_displacement(row))
                    }
                })
                .collect()
        },
        DataTag::BranchData => ProfileEntry::Branch {
            taken: payload(cells::JUMP_TAKEN),
            displacement: payload(cells::JUMP_DISPLACEMENT),
            not_taken: payload(cells::BRANCH_NOT_TAKEN)
        },
        DataTag::MultiBranchData => {
            let cases = (payload(cells::ARRAY_LEN) / 2).saturating_sub(1);
            ProfileEntry::MultiBranch {
                default_count: payload(cells::MULTI_BRANCH_DEFAULT_COUNT),
                default_displacement: payload(cells::MULTI_BRANCH_DEFAULT_DISPLACEMENT),
                cases: (0..cases)
                    .map(|c| SwitchCase {
                        count: payload(cells::case_count(c)),
                        displacement: payload(cells::case_displacement(c))
                    })
                    .collect()
            }
        }
        DataTag::ArgInfoData => ProfileEntry::ArgInfo {
            args: payload(cells::ARRAY_LEN)
        },
        DataTag::SpeculativeTrapData => ProfileEntry::SpeculativeTrap {
            method: cells::decode_metadata(payload(cells::SPECULATIVE_METHOD))
                .and_then(|id| factory.get_metadata_by_id(id))
                .filter(|m| m.as_method().is_some())
        }
    };

    let array_len = match tag {
        DataTag::MultiBranchData | DataTag::ArgInfoData => payload(cells::ARRAY_LEN),
        _ => 0
    };
    CiProfileData {
        di: DataIndex::new(di),
        tag,
        bci: header_bci(header),
        flags: header_flags(header),
        trap_state: header_trap_state(header),
        size: 1 + tag.cell_count(array_len),
        entry
    }
}

impl fmt::Display for CiMethodData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.mdo {
            Some(ref mdo) => write!(
                f,
                "ciMethodData {} of {} {:?} invocations={} backedges={}",
                mdo.id(),
                mdo.method_id(),
                self.state,
                self.invocation_count,
                self.backedge_count
            ),
            None => write!(f, "ciMethodData (empty)")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ci::ci_object_factory::SharedObjectCache;
    use crate::runtime::*;

    fn profiled_method(universe: &Arc<Universe>) -> Arc<MethodData> {
        let klass = universe.define_instance_klass("Foo", ClassLoaderId::BOOT, None, None, &[]);
        let method = universe.define_method(&klass, "bar", "(I)I", MethodFlags::default(), 20);
        universe.create_method_data(
            &method,
            &[
                ProfileSite::new(2, ProfileKind::Branch),
                ProfileSite::new(7, ProfileKind::VirtualCall)
            ],
            4
        )
    }

    #[test]
    fn test_maturity_rule() {
        let policy = ProfilePolicy::default();
        // 20% of 5000 invocations
        assert!(!policy.is_mature(999, 0));
        assert!(policy.is_mature(1000, 0));
        // 20% of 600 invocations and of 15000 events in total
        assert!(!policy.is_mature(120, 2879));
        assert!(policy.is_mature(120, 2880));
        assert!(!policy.is_mature(119, 5000));
        // 20% of 40000 backedges
        assert!(policy.is_mature(0, 8000));

        let strict = ProfilePolicy {
            maturity_percentage: 100,
            ..ProfilePolicy::default()
        };
        assert!(!strict.is_mature(1000, 0));
        assert!(strict.is_mature(5000, 0));
    }

    #[test]
    fn test_parse_layout() {
        let universe = Universe::genesis(1024);
        let shared = SharedObjectCache::init_shared_objects(&universe);
        let mdo = profiled_method(&universe);
        mdo.record_branch(2, true);
        mdo.record_branch(2, false);
        mdo.record_branch(2, false);

        let mut factory = CiObjectFactory::new(&shared, ProfilePolicy::default());
        let mut snapshot = CiMethodData::new(mdo.clone());
        snapshot.load_data(&mut factory);

        assert_eq!(snapshot.data().len(), 2);
        let first = snapshot.first_data().unwrap();
        assert_eq!(first.di(), DataIndex::new(0));
        match *first.entry() {
            ProfileEntry::Branch { taken, not_taken, .. } => {
                assert_eq!(taken, 1);
                assert_eq!(not_taken, 2);
            }
            ref e => panic!("unexpected entry {:?}", e)
        }
        let second = snapshot.next_data(first).unwrap();
        assert_eq!(second.di(), DataIndex::new(4));
        assert_eq!(second.tag(), DataTag::VirtualCallData);
        assert!(snapshot.next_data(second).is_none());
        assert_eq!(snapshot.data_size(), 4 + 6);
        // (I)I on an instance method: receiver plus one argument
        assert_eq!(snapshot.arg_count(), 2);
        assert_eq!(snapshot.state(), ProfileState::Immature);
    }

    #[test]
    #[should_panic(expected = "bad tag")]
    fn test_bad_tag_is_fatal() {
        let universe = Universe::genesis(1024);
        let shared = SharedObjectCache::init_shared_objects(&universe);
        let mdo = profiled_method(&universe);
        mdo.poke_cell(4, pack_header(DataTag::BitData, 0, 7, 0) | 42);

        let mut factory = CiObjectFactory::new(&shared, ProfilePolicy::default());
        let mut snapshot = CiMethodData::new(mdo);
        snapshot.load_data(&mut factory);
    }
}
