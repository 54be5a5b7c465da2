//! Per-instruction dataflow rules, shared by both evaluators.

use ember_ir::{ArgConvention, BlockId, Function, InstId, InstKind, ValueId};

use crate::alias::{underlying_object, ArcQueries};
use crate::classify::{classify, rc_operand, RcTransition};
use crate::epilogue::EpilogueReleaseMatcher;
use crate::ptr_set::PtrSetFactory;

use super::{ArcStateStore, PairingMaps, SummaryItem};

/// `true` if the caller keeps `root` alive for the whole function: a
/// guaranteed argument, or a value loaded from an `@in_guaranteed` address.
pub(crate) fn is_guaranteed_source(func: &Function, root: ValueId) -> bool {
    if func.arg_convention(root) == Some(ArgConvention::Guaranteed) {
        return true;
    }
    match func.defining_kind(root) {
        Some(InstKind::Load { address }) => {
            let base = underlying_object(func, *address);
            func.arg_convention(base) == Some(ArgConvention::InGuaranteed)
        }
        _ => false,
    }
}

/// Applies one instruction to the state of the location being processed.
pub(crate) struct ArcVisitor<'v, 'a> {
    pub(crate) q: ArcQueries<'a>,
    pub(crate) factory: &'v mut PtrSetFactory<InstId>,
    pub(crate) maps: &'v mut PairingMaps,
    /// Set when epilogue releases of owned arguments are frozen.
    pub(crate) frozen: Option<&'v EpilogueReleaseMatcher>,
}

impl ArcVisitor<'_, '_> {
    fn operand_root(&self, inst: InstId) -> Option<ValueId> {
        rc_operand(&self.q.func.inst(inst).kind).map(|op| self.q.root(op))
    }

    /// Is a bottom-up release of `root` at `inst` known safe?
    ///
    /// Frozen epilogue releases keep their argument alive until the exit, so
    /// every other release of that argument is known safe.
    fn is_known_safe_release(&self, root: ValueId, inst: InstId) -> bool {
        if is_guaranteed_source(self.q.func, root) {
            return true;
        }
        self.frozen.is_some_and(|matcher| {
            matcher.has_epilogue_release(root) && !matcher.is_epilogue_release(inst)
        })
    }

    // ── Bottom-up ───────────────────────────────────────────────────

    /// Visit `inst` bottom-up. Returns `true` if nesting was detected.
    pub(crate) fn visit_bottom_up(&mut self, store: &mut impl ArcStateStore, inst: InstId) -> bool {
        let (handled, nested) = match classify(self.q.func, inst) {
            RcTransition::AutoreleasePoolCall => {
                store.bottom_up().clear();
                return false;
            }
            RcTransition::StrongDecrement => self.bottom_up_decrement(store, inst),
            RcTransition::StrongIncrement => self.bottom_up_increment(store, inst),
            RcTransition::StrongEntrance | RcTransition::Unknown => (None, false),
        };

        let q = self.q;
        for (root, cell) in store.bottom_up().iter_mut() {
            if Some(root) != handled {
                cell.update_for_same_loop_inst(&q, inst);
            }
        }
        nested
    }

    fn bottom_up_decrement(
        &mut self,
        store: &mut impl ArcStateStore,
        inst: InstId,
    ) -> (Option<ValueId>, bool) {
        let Some(root) = self.operand_root(inst) else {
            return (None, false);
        };
        if self
            .frozen
            .is_some_and(|matcher| matcher.is_epilogue_release(inst))
        {
            tracing::trace!(inst = inst.raw(), "skipping frozen epilogue release");
            return (Some(root), false);
        }

        let known_safe = self.is_known_safe_release(root, inst);
        let insts = self.factory.get_single(inst);
        let cell = store.bottom_up().get_or_insert_with(root, Default::default);
        let nested = cell.init_with_mutator_inst(insts, root);
        cell.update_known_safe(known_safe);
        tracing::trace!(
            inst = inst.raw(),
            root = root.raw(),
            nested,
            known_safe = cell.is_known_safe(),
            "bottom-up: tracking release"
        );
        (Some(root), nested)
    }

    fn bottom_up_increment(
        &mut self,
        store: &mut impl ArcStateStore,
        inst: InstId,
    ) -> (Option<ValueId>, bool) {
        let Some(root) = self.operand_root(inst) else {
            return (None, false);
        };
        if let Some(cell) = store.bottom_up().get_mut(&root) {
            if cell.is_ref_count_inst_matched() {
                tracing::trace!(inst = inst.raw(), root = root.raw(), "bottom-up: matched retain");
                self.maps.inc_to_dec.insert(inst, *cell);
            }
            cell.clear();
        }
        (Some(root), false)
    }

    /// Terminators are visited before the block's instructions bottom-up.
    pub(crate) fn visit_terminator_bottom_up(
        &mut self,
        store: &mut impl ArcStateStore,
        block: BlockId,
    ) {
        let q = self.q;
        for (root, cell) in store.bottom_up().iter_mut() {
            if cell.is_tracking_ref_count() && q.terminator_may_use(block, root) {
                cell.update_for_terminator_use();
            }
        }
    }

    // ── Top-down ────────────────────────────────────────────────────

    /// Visit `inst` top-down. Returns `true` if nesting was detected.
    pub(crate) fn visit_top_down(&mut self, store: &mut impl ArcStateStore, inst: InstId) -> bool {
        let (handled, nested) = match classify(self.q.func, inst) {
            RcTransition::AutoreleasePoolCall => {
                store.top_down().clear();
                return false;
            }
            RcTransition::StrongEntrance => self.top_down_entrance(store, inst),
            RcTransition::StrongIncrement => self.top_down_increment(store, inst),
            RcTransition::StrongDecrement => self.top_down_decrement(store, inst),
            RcTransition::Unknown => (None, false),
        };

        let q = self.q;
        for (root, cell) in store.top_down().iter_mut() {
            if Some(root) != handled {
                cell.update_for_same_loop_inst(&q, inst);
            }
        }
        nested
    }

    fn top_down_entrance(
        &mut self,
        store: &mut impl ArcStateStore,
        inst: InstId,
    ) -> (Option<ValueId>, bool) {
        let Some(result) = self.q.func.inst(inst).result else {
            return (None, false);
        };
        let root = self.q.root(result);
        let insts = self.factory.get_single(inst);
        store
            .top_down()
            .get_or_insert_with(root, Default::default)
            .init_with_entrance_inst(insts, root);
        (Some(root), false)
    }

    fn top_down_increment(
        &mut self,
        store: &mut impl ArcStateStore,
        inst: InstId,
    ) -> (Option<ValueId>, bool) {
        let Some(root) = self.operand_root(inst) else {
            return (None, false);
        };
        let known_safe = is_guaranteed_source(self.q.func, root);
        let insts = self.factory.get_single(inst);
        let cell = store.top_down().get_or_insert_with(root, Default::default);
        let nested = cell.init_with_mutator_inst(insts, root);
        cell.update_known_safe(known_safe);
        tracing::trace!(
            inst = inst.raw(),
            root = root.raw(),
            nested,
            known_safe = cell.is_known_safe(),
            "top-down: tracking retain"
        );
        (Some(root), nested)
    }

    fn top_down_decrement(
        &mut self,
        store: &mut impl ArcStateStore,
        inst: InstId,
    ) -> (Option<ValueId>, bool) {
        let Some(root) = self.operand_root(inst) else {
            return (None, false);
        };
        if let Some(cell) = store.top_down().get_mut(&root) {
            if cell.is_ref_count_inst_matched() {
                tracing::trace!(inst = inst.raw(), root = root.raw(), "top-down: matched release");
                self.maps.dec_to_inc.insert(inst, *cell);
            }
            cell.clear();
        }
        (Some(root), false)
    }

    /// Terminators are visited after the block's instructions top-down.
    pub(crate) fn visit_terminator_top_down(&mut self, store: &mut impl ArcStateStore, block: BlockId) {
        let q = self.q;
        for (root, cell) in store.top_down().iter_mut() {
            if cell.is_tracking_ref_count() && q.terminator_may_use(block, root) {
                cell.update_for_terminator_use();
            }
        }
    }

    /// Seed the entry block with the +1 of every owned, non-trivial
    /// function argument.
    pub(crate) fn init_entry_args(&mut self, store: &mut impl ArcStateStore) {
        let func = self.q.func;
        for &arg in func.function_args() {
            if func.arg_convention(arg) == Some(ArgConvention::Owned) && !func.is_trivial(arg) {
                store
                    .top_down()
                    .get_or_insert_with(arg, Default::default)
                    .init_with_arg(arg);
            }
        }
    }

    // ── Nested loop summaries ───────────────────────────────────────

    /// Apply a nested loop's summarized instructions bottom-up.
    pub(crate) fn apply_summary_bottom_up(
        &mut self,
        store: &mut impl ArcStateStore,
        summary: &[SummaryItem],
    ) {
        for &item in summary.iter().rev() {
            self.apply_summary_item(store, item, Direction::BottomUp);
        }
    }

    /// Apply a nested loop's summarized instructions top-down.
    pub(crate) fn apply_summary_top_down(
        &mut self,
        store: &mut impl ArcStateStore,
        summary: &[SummaryItem],
    ) {
        for &item in summary {
            self.apply_summary_item(store, item, Direction::TopDown);
        }
    }

    fn apply_summary_item(
        &mut self,
        store: &mut impl ArcStateStore,
        item: SummaryItem,
        direction: Direction,
    ) {
        let q = self.q;
        match item {
            SummaryItem::Inst(inst) => {
                if q.func.inst(inst).is_erased() {
                    return;
                }
                if classify(q.func, inst) == RcTransition::AutoreleasePoolCall {
                    match direction {
                        Direction::TopDown => store.top_down().clear(),
                        Direction::BottomUp => store.bottom_up().clear(),
                    }
                    return;
                }
                match direction {
                    Direction::TopDown => {
                        for (_, cell) in store.top_down().iter_mut() {
                            cell.update_for_different_loop_inst(&q, inst);
                        }
                    }
                    Direction::BottomUp => {
                        for (_, cell) in store.bottom_up().iter_mut() {
                            cell.update_for_different_loop_inst(&q, inst);
                        }
                    }
                }
            }
            SummaryItem::Terminator(block) => match direction {
                Direction::TopDown => self.visit_terminator_top_down(store, block),
                Direction::BottomUp => self.visit_terminator_bottom_up(store, block),
            },
        }
    }
}

#[derive(Clone, Copy)]
enum Direction {
    TopDown,
    BottomUp,
}
