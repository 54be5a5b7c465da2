//! Matching sets: groups of retains and releases that cancel out.
//!
//! The dataflow records, per retain, the releases bottom-up found for it and,
//! per release, the retains top-down found for it. A matching set is the
//! closure of that relation starting from one retain: every retain in the
//! set must be claimed by every release it names and vice versa. Any
//! one-sided claim means the two directions disagree about the program and
//! the set is abandoned.
//!
//! Whether a complete set may be deleted is decided by
//! [`ArcPairingContext::perform_matching`]:
//!
//! - known safe sets are deleted outright;
//! - code-motion-safe sets are deleted only when every retain precedes every
//!   release in one block and nothing between them may decrement or read
//!   the root's reference count;
//! - everything else is left alone.

use ember_ir::{InstId, ValueId};

use crate::alias::ArcQueries;
use crate::dataflow::PairingMaps;
use crate::ptr_set::PtrSetFactory;

/// A group of retains and releases of one RC root whose net effect is zero.
#[derive(Debug, PartialEq, Eq)]
pub struct ArcMatchingSet {
    pub root: ValueId,
    pub increments: Vec<InstId>,
    pub decrements: Vec<InstId>,
    /// Every paired state in both directions was known safe.
    pub known_safe: bool,
    /// No paired state saw a partial merge or a decrement followed by a use.
    pub code_motion_safe: bool,
}

/// Builds one [`ArcMatchingSet`] from the pairing maps.
pub struct ArcMatchingSetBuilder<'m> {
    maps: &'m PairingMaps,
    factory: &'m PtrSetFactory<InstId>,
    set: ArcMatchingSet,
    new_increments: Vec<InstId>,
    new_decrements: Vec<InstId>,
}

impl<'m> ArcMatchingSetBuilder<'m> {
    /// Start a set from `increment`. Returns `None` if bottom-up is not
    /// tracking a root for it.
    pub fn new(
        maps: &'m PairingMaps,
        factory: &'m PtrSetFactory<InstId>,
        increment: InstId,
    ) -> Option<Self> {
        let root = maps.inc_to_dec.get(&increment)?.root()?;
        Some(Self {
            maps,
            factory,
            set: ArcMatchingSet {
                root,
                increments: vec![increment],
                decrements: Vec::new(),
                known_safe: true,
                code_motion_safe: true,
            },
            new_increments: vec![increment],
            new_decrements: Vec::new(),
        })
    }

    /// Compute the closure. Returns `false` if the two directions disagree.
    pub fn match_up_inc_dec_sets_for_ptr(&mut self) -> bool {
        while !self.new_increments.is_empty() {
            if !self.match_increments_to_decrements() {
                return false;
            }
            if !self.match_decrements_to_increments() {
                return false;
            }
        }
        true
    }

    fn match_increments_to_decrements(&mut self) -> bool {
        for increment in std::mem::take(&mut self.new_increments) {
            let Some(bu) = self.maps.inc_to_dec.get(&increment) else {
                return false;
            };
            if !bu.is_tracking_ref_count() {
                continue;
            }
            self.set.known_safe &= bu.is_known_safe();
            self.set.code_motion_safe &= bu.is_code_motion_safe();

            for &decrement in self.factory.elements(bu.instructions()) {
                let Some(td) = self.maps.dec_to_inc.get(&decrement) else {
                    return false;
                };
                if !td.contains_instruction(self.factory, increment) {
                    return false;
                }
                if !self.set.decrements.contains(&decrement) {
                    self.set.decrements.push(decrement);
                    self.new_decrements.push(decrement);
                }
            }
        }
        true
    }

    fn match_decrements_to_increments(&mut self) -> bool {
        for decrement in std::mem::take(&mut self.new_decrements) {
            let Some(td) = self.maps.dec_to_inc.get(&decrement) else {
                return false;
            };
            if !td.is_tracking_ref_count() {
                continue;
            }
            self.set.known_safe &= td.is_known_safe();
            self.set.code_motion_safe &= td.is_code_motion_safe();

            for &increment in self.factory.elements(td.instructions()) {
                let Some(bu) = self.maps.inc_to_dec.get(&increment) else {
                    return false;
                };
                if !bu.contains_instruction(self.factory, decrement) {
                    return false;
                }
                if !self.set.increments.contains(&increment) {
                    self.set.increments.push(increment);
                    self.new_increments.push(increment);
                }
            }
        }
        true
    }

    /// At least one retain and one release were paired.
    pub fn matched_pair(&self) -> bool {
        !self.set.increments.is_empty() && !self.set.decrements.is_empty()
    }

    pub fn into_result(mut self) -> ArcMatchingSet {
        self.set.increments.sort_unstable();
        self.set.decrements.sort_unstable();
        self.set
    }
}

/// Sets found by one round of matching.
#[derive(Debug, Default)]
pub struct MatchingOutcome {
    /// Sets that may be deleted.
    pub removable: Vec<ArcMatchingSet>,
    /// Complete sets that were neither known safe nor provably adjacent.
    pub bailed: usize,
}

/// Owns the pairing maps for one evaluator run and turns them into sets.
#[derive(Debug, Default)]
pub struct ArcPairingContext {
    pub maps: PairingMaps,
}

impl ArcPairingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every matching set and decide which ones may be deleted.
    ///
    /// Instructions of a complete set are removed from the maps so that no
    /// instruction ends up in two sets.
    pub fn perform_matching(
        &mut self,
        q: &ArcQueries<'_>,
        factory: &PtrSetFactory<InstId>,
    ) -> MatchingOutcome {
        let mut outcome = MatchingOutcome::default();
        let increments: Vec<InstId> = self.maps.inc_to_dec.keys().collect();

        for increment in increments {
            if !self.maps.inc_to_dec.contains_key(&increment) {
                continue;
            }
            let Some(mut builder) = ArcMatchingSetBuilder::new(&self.maps, factory, increment)
            else {
                continue;
            };
            if !builder.match_up_inc_dec_sets_for_ptr() || !builder.matched_pair() {
                continue;
            }
            let set = builder.into_result();
            for inc in &set.increments {
                self.maps.inc_to_dec.blot(inc);
            }
            for dec in &set.decrements {
                self.maps.dec_to_inc.blot(dec);
            }

            if set.known_safe || (set.code_motion_safe && is_adjacent_in_block(q, &set)) {
                tracing::trace!(
                    root = set.root.raw(),
                    increments = set.increments.len(),
                    decrements = set.decrements.len(),
                    known_safe = set.known_safe,
                    "matching set removable"
                );
                outcome.removable.push(set);
            } else {
                tracing::trace!(root = set.root.raw(), "matching set not provably safe");
                outcome.bailed += 1;
            }
        }
        outcome
    }

    pub fn clear(&mut self) {
        self.maps.clear();
    }
}

/// All retains precede all releases in one block, and nothing between the
/// last retain and the first release may decrement or read the root's
/// reference count.
fn is_adjacent_in_block(q: &ArcQueries<'_>, set: &ArcMatchingSet) -> bool {
    let func = q.func;
    let Some(&first) = set.increments.first() else {
        return false;
    };
    let block = func.inst(first).block;
    let all = set.increments.iter().chain(&set.decrements);
    if all.clone().any(|&inst| func.inst(inst).block != block) {
        return false;
    }

    let position = |inst: InstId| func.inst_position(inst);
    let last_inc = set.increments.iter().filter_map(|&i| position(i)).max();
    let first_dec = set.decrements.iter().filter_map(|&i| position(i)).min();
    let (Some(last_inc), Some(first_dec)) = (last_inc, first_dec) else {
        return false;
    };
    if last_inc >= first_dec {
        return false;
    }

    func.block(block).insts[last_inc + 1..first_dec]
        .iter()
        .all(|&inst| !q.may_decrement_ref_count(inst, set.root))
}
