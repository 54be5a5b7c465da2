//! ARC sequence dataflow.
//!
//! Two passes over the CFG find retain/release pairs:
//!
//! - **Bottom-up** tracks releases and walks upwards looking for a retain of
//!   the same RC root. A match records `retain → state` in
//!   [`PairingMaps::inc_to_dec`].
//! - **Top-down** tracks retains (and +1 entrances) and walks downwards
//!   looking for a release. A match records `release → state` in
//!   [`PairingMaps::dec_to_inc`].
//!
//! The per-instruction rules live in [`visitor`] and are shared by the two
//! evaluators: [`block::ArcSequenceDataflowEvaluator`] over basic blocks and
//! [`region::LoopArcSequenceDataflowEvaluator`] over the loop region tree.
//! Both reach their state through [`ArcStateStore`].
//!
//! # Merging
//!
//! At a join, the first predecessor (top-down) or successor (bottom-up)
//! seeds the state map and every further one intersects it by root: a root
//! missing on either side is dropped, a root present on both merges its
//! cells. Edges whose source or target state is not yet known (back edges)
//! clear the state. Blocks ending in `unreachable` are allowed to leak and
//! are ignored when merging.

pub mod block;
mod blot_map;
pub mod region;
pub(crate) mod visitor;

pub use blot_map::BlotMapVector;

use ember_ir::{InstId, ValueId};

use crate::ptr_set::PtrSetFactory;
use crate::rc_state::{BottomUpRefCountState, TopDownRefCountState};

pub type TopDownStates = BlotMapVector<ValueId, TopDownRefCountState>;
pub type BottomUpStates = BlotMapVector<ValueId, BottomUpRefCountState>;

/// Match results of one evaluator run.
///
/// Owned by the caller so that the matching-set builder can read them after
/// the evaluator is gone.
#[derive(Debug, Default)]
pub struct PairingMaps {
    /// Release → top-down state (the retains it pairs with).
    pub dec_to_inc: BlotMapVector<InstId, TopDownRefCountState>,
    /// Retain → bottom-up state (the releases it pairs with).
    pub inc_to_dec: BlotMapVector<InstId, BottomUpRefCountState>,
}

impl PairingMaps {
    pub fn clear(&mut self) {
        self.dec_to_inc.clear();
        self.inc_to_dec.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.dec_to_inc.is_empty() && self.inc_to_dec.is_empty()
    }
}

/// Where the visitor finds the per-root cells of the location being
/// processed (a basic block or a loop region).
pub trait ArcStateStore {
    fn top_down(&mut self) -> &mut TopDownStates;
    fn bottom_up(&mut self) -> &mut BottomUpStates;
}

/// State of one basic block.
#[derive(Clone, Debug, Default)]
pub struct ArcBlockState {
    pub td: TopDownStates,
    pub bu: BottomUpStates,
    /// The block ends in `unreachable`: leaking is fine and its state does
    /// not constrain its neighbours.
    pub allows_leaks: bool,
}

impl ArcStateStore for ArcBlockState {
    fn top_down(&mut self) -> &mut TopDownStates {
        &mut self.td
    }

    fn bottom_up(&mut self) -> &mut BottomUpStates {
        &mut self.bu
    }
}

/// Instruction or terminator recorded in a loop summary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SummaryItem {
    Inst(InstId),
    /// The terminator of a block, which may use values it passes along.
    Terminator(ember_ir::BlockId),
}

/// State of one loop region (a block or a loop as seen from its parent).
#[derive(Clone, Debug, Default)]
pub struct ArcRegionState {
    pub td: TopDownStates,
    pub bu: BottomUpStates,
    pub allows_leaks: bool,
    /// For loop regions: every instruction inside the loop (nested loops
    /// included) that may touch a reference count or use a value.
    pub summary: Vec<SummaryItem>,
}

impl ArcStateStore for ArcRegionState {
    fn top_down(&mut self) -> &mut TopDownStates {
        &mut self.td
    }

    fn bottom_up(&mut self) -> &mut BottomUpStates {
        &mut self.bu
    }
}

// ── Merging ─────────────────────────────────────────────────────────

/// Cells that know how to intersect with a neighbour's cell.
pub(crate) trait MergeCell: Copy {
    fn merge_cell(&mut self, other: &Self, factory: &mut PtrSetFactory<InstId>);
    fn is_tracking(&self) -> bool;
}

impl MergeCell for TopDownRefCountState {
    fn merge_cell(&mut self, other: &Self, factory: &mut PtrSetFactory<InstId>) {
        self.merge(other, factory);
    }

    fn is_tracking(&self) -> bool {
        self.is_tracking_ref_count()
    }
}

impl MergeCell for BottomUpRefCountState {
    fn merge_cell(&mut self, other: &Self, factory: &mut PtrSetFactory<InstId>) {
        self.merge(other, factory);
    }

    fn is_tracking(&self) -> bool {
        self.is_tracking_ref_count()
    }
}

/// Seeds and intersects a state map with its neighbours' maps.
pub(crate) struct StateMerger<'m, S> {
    into: &'m mut BlotMapVector<ValueId, S>,
    seeded: bool,
    poisoned: bool,
}

impl<'m, S: MergeCell> StateMerger<'m, S> {
    /// Start a merge; the target map is emptied.
    pub(crate) fn new(into: &'m mut BlotMapVector<ValueId, S>) -> Self {
        into.clear();
        Self {
            into,
            seeded: false,
            poisoned: false,
        }
    }

    pub(crate) fn merge(
        &mut self,
        other: &BlotMapVector<ValueId, S>,
        factory: &mut PtrSetFactory<InstId>,
    ) {
        if self.poisoned {
            return;
        }
        if !self.seeded {
            self.seeded = true;
            for (root, cell) in other.iter() {
                if cell.is_tracking() {
                    self.into.insert(root, *cell);
                }
            }
            return;
        }
        self.into.retain(|root, cell| match other.get(&root) {
            Some(theirs) => {
                cell.merge_cell(theirs, factory);
                cell.is_tracking()
            }
            None => false,
        });
    }

    /// Abandon the merge: an edge with unknown state was seen. Later
    /// merges are ignored.
    pub(crate) fn reset(&mut self) {
        self.into.clear();
        self.poisoned = true;
    }

    pub(crate) fn finish(self) {
        self.into.compact();
    }
}
