//! Per-root reference count state.
//!
//! Each basic block (or loop region) keeps one cell per tracked RC root for
//! each direction. A cell remembers which retains or releases it is tracking
//! (a [`PtrSet`] of instructions), how far the sequence has progressed since
//! then, and two safety bits:
//!
//! - `known_safe`: something outside the tracked sequence keeps the object
//!   alive, so intervening decrements cannot free it;
//! - `partial`: the cell was merged from paths that tracked different
//!   instruction sets.
//!
//! Without the `known_safe` bit a cell is still known safe while nothing
//! that may decrement the root has been seen since the tracked operation.
//! Top-down this is exactly the `Incremented` position. Bottom-up the
//! lattice lets a decrement with no use below it pass unrecorded, so the
//! cell keeps a separate `saw_decrement` bit.
//!
//! Top-down cells track increments and progress
//! `None → Incremented → MightBeDecremented → MightBeUsed`.
//! Bottom-up cells track decrements and progress
//! `None → Decremented → MightBeUsed → MightBeDecremented`.
//! Merging takes the later (more conservative) position.

use ember_ir::{InstId, ValueId};

use crate::alias::ArcQueries;
use crate::ptr_set::{PtrSet, PtrSetFactory};

// ── Transitions ─────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransitionKind {
    /// A +1 reference came into existence (owned argument, allocation,
    /// owned call result).
    Entrance,
    Increment,
    Decrement,
}

/// The reference count operations a cell is tracking.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RcStateTransition {
    pub kind: TransitionKind,
    pub insts: PtrSet,
}

impl RcStateTransition {
    /// Can `inst_kind` be paired with the operations tracked here?
    ///
    /// Only retains pair with releases. Entrances establish a +1 but never
    /// pair.
    fn matches(self, inst_kind: TransitionKind) -> bool {
        matches!(
            (self.kind, inst_kind),
            (TransitionKind::Increment, TransitionKind::Decrement)
                | (TransitionKind::Decrement, TransitionKind::Increment)
        )
    }
}

// ── Lattices ────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TopDownLattice {
    #[default]
    None,
    Incremented,
    MightBeDecremented,
    MightBeUsed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BottomUpLattice {
    #[default]
    None,
    Decremented,
    MightBeUsed,
    MightBeDecremented,
}

/// Direction-independent part of a cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct CellCore {
    root: Option<ValueId>,
    transition: Option<RcStateTransition>,
    known_safe: bool,
    partial: bool,
    /// Bottom-up only: a potential decrement of the root was seen since the
    /// tracked release.
    saw_decrement: bool,
}

impl CellCore {
    fn init_with_mutator(
        &mut self,
        kind: TransitionKind,
        insts: PtrSet,
        root: ValueId,
        tracking: bool,
    ) -> bool {
        let nested = tracking;
        self.transition = Some(RcStateTransition { kind, insts });
        self.root = Some(root);
        self.partial = false;
        self.known_safe = nested;
        self.saw_decrement = false;
        nested
    }

    /// Merge the direction-independent parts. Returns `false` if the cells
    /// are incompatible and the merged cell must be cleared.
    fn merge(&mut self, other: &CellCore, factory: &mut PtrSetFactory<InstId>) -> bool {
        let (Some(mine), Some(theirs)) = (self.transition, other.transition) else {
            return false;
        };
        if mine.kind != theirs.kind || self.root != other.root {
            return false;
        }
        let merged = factory.merge(mine.insts, theirs.insts);
        self.partial |= other.partial || mine.insts != theirs.insts;
        self.known_safe &= other.known_safe;
        self.saw_decrement |= other.saw_decrement;
        self.transition = Some(RcStateTransition {
            kind: mine.kind,
            insts: merged,
        });
        true
    }
}

macro_rules! cell_accessors {
    () => {
        /// Root this cell tracks, once initialized.
        #[inline]
        pub fn root(&self) -> Option<ValueId> {
            self.core.root
        }

        #[inline]
        pub fn transition(&self) -> Option<RcStateTransition> {
            self.core.transition
        }

        /// Instructions tracked by this cell; empty when not tracking.
        pub fn instructions(&self) -> PtrSet {
            self.core.transition.map_or(PtrSet::EMPTY, |t| t.insts)
        }

        pub fn contains_instruction(
            &self,
            factory: &PtrSetFactory<InstId>,
            inst: InstId,
        ) -> bool {
            self.is_tracking_ref_count() && factory.contains(self.instructions(), &inst)
        }

        #[inline]
        pub fn is_partial(&self) -> bool {
            self.core.partial
        }

        /// Raw known-safe bit, without the lattice-based refinement of
        /// `is_known_safe`.
        #[inline]
        pub fn known_safe_flag(&self) -> bool {
            self.core.known_safe
        }

        pub fn update_known_safe(&mut self, known_safe: bool) {
            self.core.known_safe |= known_safe;
        }

        /// Forget everything about the root's tracked sequence.
        pub fn clear(&mut self) {
            self.lattice = Default::default();
            self.core.transition = None;
            self.core.known_safe = false;
            self.core.partial = false;
            self.core.saw_decrement = false;
        }
    };
}

// ── Top-down ────────────────────────────────────────────────────────

/// Top-down cell: tracks increments (and entrances) waiting for a release.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TopDownRefCountState {
    core: CellCore,
    lattice: TopDownLattice,
}

impl TopDownRefCountState {
    cell_accessors!();

    #[inline]
    pub fn lattice(&self) -> TopDownLattice {
        self.lattice
    }

    #[inline]
    pub fn is_tracking_ref_count(&self) -> bool {
        self.lattice != TopDownLattice::None
    }

    /// Track an owned function argument as a +1 entrance.
    pub fn init_with_arg(&mut self, arg: ValueId) {
        self.lattice = TopDownLattice::Incremented;
        self.core.transition = Some(RcStateTransition {
            kind: TransitionKind::Entrance,
            insts: PtrSet::EMPTY,
        });
        self.core.root = Some(arg);
        self.core.known_safe = false;
        self.core.partial = false;
    }

    /// Track the +1 result of an entrance instruction.
    pub fn init_with_entrance_inst(&mut self, insts: PtrSet, value: ValueId) {
        self.lattice = TopDownLattice::Incremented;
        self.core.transition = Some(RcStateTransition {
            kind: TransitionKind::Entrance,
            insts,
        });
        self.core.root = Some(value);
        self.core.known_safe = false;
        self.core.partial = false;
    }

    /// Start tracking a retain. Returns `true` if the root was already being
    /// tracked (nesting), in which case the new retain is known safe.
    pub fn init_with_mutator_inst(&mut self, insts: PtrSet, root: ValueId) -> bool {
        let tracking = self.is_tracking_ref_count();
        let nested = self
            .core
            .init_with_mutator(TransitionKind::Increment, insts, root, tracking);
        self.lattice = TopDownLattice::Incremented;
        nested
    }

    /// Would a release pair with the tracked retains?
    pub fn is_ref_count_inst_matched(&self) -> bool {
        self.is_tracking_ref_count()
            && self
                .core
                .transition
                .is_some_and(|t| t.matches(TransitionKind::Decrement))
    }

    /// Known safe when flagged, or when nothing could have decremented the
    /// root since the tracked retain.
    pub fn is_known_safe(&self) -> bool {
        self.is_tracking_ref_count()
            && (self.core.known_safe || self.lattice == TopDownLattice::Incremented)
    }

    /// No partial merge and no potential decrement followed by a use.
    pub fn is_code_motion_safe(&self) -> bool {
        !self.core.partial && self.lattice != TopDownLattice::MightBeUsed
    }

    fn handle_decrement(&mut self) -> bool {
        if self.lattice == TopDownLattice::Incremented {
            self.lattice = TopDownLattice::MightBeDecremented;
            return true;
        }
        false
    }

    fn handle_user(&mut self) -> bool {
        if self.lattice == TopDownLattice::MightBeDecremented {
            self.lattice = TopDownLattice::MightBeUsed;
            return true;
        }
        false
    }

    /// A decrement we cannot see into: treat it as both decrementing and
    /// using the root.
    fn handle_guaranteed_user(&mut self) {
        if matches!(
            self.lattice,
            TopDownLattice::Incremented | TopDownLattice::MightBeDecremented
        ) {
            self.lattice = TopDownLattice::MightBeUsed;
        }
    }

    /// Advance the cell past an instruction of the same loop region.
    pub fn update_for_same_loop_inst(&mut self, q: &ArcQueries<'_>, inst: InstId) {
        let Some(root) = self.core.root.filter(|_| self.is_tracking_ref_count()) else {
            return;
        };
        let may_decrement = q.may_decrement_ref_count(inst, root);
        if may_decrement && is_call(q, inst) && !self.core.known_safe {
            self.clear();
            return;
        }
        if may_decrement && self.handle_decrement() {
            return;
        }
        if q.may_use(inst, root) {
            self.handle_user();
        }
    }

    /// Advance the cell past an instruction summarized from a nested loop.
    pub fn update_for_different_loop_inst(&mut self, q: &ArcQueries<'_>, inst: InstId) {
        let Some(root) = self.core.root.filter(|_| self.is_tracking_ref_count()) else {
            return;
        };
        if q.may_decrement_ref_count(inst, root) {
            self.handle_guaranteed_user();
        } else if q.may_use(inst, root) {
            self.handle_user();
        }
    }

    /// Advance the cell past a use by a terminator.
    pub fn update_for_terminator_use(&mut self) {
        self.handle_user();
    }

    /// Intersect with a predecessor's cell.
    pub fn merge(&mut self, other: &Self, factory: &mut PtrSetFactory<InstId>) {
        let lattice = if self.lattice == TopDownLattice::None || other.lattice == TopDownLattice::None
        {
            TopDownLattice::None
        } else {
            self.lattice.max(other.lattice)
        };
        if lattice == TopDownLattice::None || !self.core.merge(&other.core, factory) {
            self.clear();
            return;
        }
        self.lattice = lattice;
    }
}

// ── Bottom-up ───────────────────────────────────────────────────────

/// Bottom-up cell: tracks releases waiting for a retain above them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BottomUpRefCountState {
    core: CellCore,
    lattice: BottomUpLattice,
}

impl BottomUpRefCountState {
    cell_accessors!();

    #[inline]
    pub fn lattice(&self) -> BottomUpLattice {
        self.lattice
    }

    #[inline]
    pub fn is_tracking_ref_count(&self) -> bool {
        self.lattice != BottomUpLattice::None
    }

    /// Start tracking a release. Returns `true` on nesting.
    pub fn init_with_mutator_inst(&mut self, insts: PtrSet, root: ValueId) -> bool {
        let tracking = self.is_tracking_ref_count();
        let nested = self
            .core
            .init_with_mutator(TransitionKind::Decrement, insts, root, tracking);
        self.lattice = BottomUpLattice::Decremented;
        nested
    }

    /// Would a retain pair with the tracked releases?
    pub fn is_ref_count_inst_matched(&self) -> bool {
        self.is_tracking_ref_count()
            && self
                .core
                .transition
                .is_some_and(|t| t.matches(TransitionKind::Increment))
    }

    /// Known safe when flagged, or when nothing between the tracked
    /// release and the current position may decrement the root. Uses alone
    /// keep it known safe.
    pub fn is_known_safe(&self) -> bool {
        self.is_tracking_ref_count() && (self.core.known_safe || !self.core.saw_decrement)
    }

    pub fn is_code_motion_safe(&self) -> bool {
        !self.core.partial && self.lattice != BottomUpLattice::MightBeDecremented
    }

    fn handle_user(&mut self) -> bool {
        if self.lattice == BottomUpLattice::Decremented {
            self.lattice = BottomUpLattice::MightBeUsed;
            return true;
        }
        false
    }

    fn handle_decrement(&mut self) -> bool {
        if self.lattice == BottomUpLattice::MightBeUsed {
            self.lattice = BottomUpLattice::MightBeDecremented;
            return true;
        }
        false
    }

    fn handle_guaranteed_user(&mut self) {
        if matches!(
            self.lattice,
            BottomUpLattice::Decremented | BottomUpLattice::MightBeUsed
        ) {
            self.lattice = BottomUpLattice::MightBeDecremented;
        }
    }

    /// Advance the cell past an instruction of the same loop region.
    ///
    /// Walking upwards, uses are seen before the decrements that would make
    /// them unsafe.
    pub fn update_for_same_loop_inst(&mut self, q: &ArcQueries<'_>, inst: InstId) {
        let Some(root) = self.core.root.filter(|_| self.is_tracking_ref_count()) else {
            return;
        };
        let may_decrement = q.may_decrement_ref_count(inst, root);
        if may_decrement && is_call(q, inst) && !self.core.known_safe {
            self.clear();
            return;
        }
        self.core.saw_decrement |= may_decrement;
        if q.may_use(inst, root) && self.handle_user() {
            return;
        }
        if may_decrement {
            self.handle_decrement();
        }
    }

    pub fn update_for_different_loop_inst(&mut self, q: &ArcQueries<'_>, inst: InstId) {
        let Some(root) = self.core.root.filter(|_| self.is_tracking_ref_count()) else {
            return;
        };
        if q.may_decrement_ref_count(inst, root) {
            self.core.saw_decrement = true;
            self.handle_guaranteed_user();
        } else if q.may_use(inst, root) {
            self.handle_user();
        }
    }

    pub fn update_for_terminator_use(&mut self) {
        self.handle_user();
    }

    /// Intersect with a successor's cell.
    pub fn merge(&mut self, other: &Self, factory: &mut PtrSetFactory<InstId>) {
        let lattice =
            if self.lattice == BottomUpLattice::None || other.lattice == BottomUpLattice::None {
                BottomUpLattice::None
            } else {
                self.lattice.max(other.lattice)
            };
        if lattice == BottomUpLattice::None || !self.core.merge(&other.core, factory) {
            self.clear();
            return;
        }
        self.lattice = lattice;
    }
}

fn is_call(q: &ArcQueries<'_>, inst: InstId) -> bool {
    matches!(q.func.inst(inst).kind, ember_ir::InstKind::Apply { .. })
}
