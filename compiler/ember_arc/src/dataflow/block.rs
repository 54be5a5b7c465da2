//! Basic-block ARC sequence dataflow.
//!
//! Bottom-up over post-order, then top-down over reverse post-order. Loops
//! are not modelled: state flowing along a back edge is unknown, so a block
//! with a back-edge successor (bottom-up) or predecessor (top-down) starts
//! from an empty state.

use ember_ir::{BlockId, InstId, Terminator};

use crate::alias::ArcQueries;
use crate::epilogue::EpilogueReleaseMatcher;
use crate::ptr_set::PtrSetFactory;

use super::visitor::ArcVisitor;
use super::{ArcBlockState, ArcStateStore, PairingMaps, StateMerger};

pub struct ArcSequenceDataflowEvaluator<'e, 'a> {
    q: ArcQueries<'a>,
    factory: &'e mut PtrSetFactory<InstId>,
    maps: &'e mut PairingMaps,
    epilogue: &'e EpilogueReleaseMatcher,
    states: Vec<ArcBlockState>,
}

impl<'e, 'a> ArcSequenceDataflowEvaluator<'e, 'a> {
    pub fn new(
        q: ArcQueries<'a>,
        factory: &'e mut PtrSetFactory<InstId>,
        maps: &'e mut PairingMaps,
        epilogue: &'e EpilogueReleaseMatcher,
    ) -> Self {
        Self {
            q,
            factory,
            maps,
            epilogue,
            states: Vec::new(),
        }
    }

    /// Run both directions, filling the pairing maps.
    ///
    /// With `freeze_epilogue_releases`, epilogue releases of owned arguments
    /// are never tracked and make other releases of their argument known
    /// safe. Returns `true` if nesting was detected in either direction.
    pub fn run(&mut self, freeze_epilogue_releases: bool) -> bool {
        let func = self.q.func;
        self.states = func
            .block_ids()
            .map(|block| ArcBlockState {
                allows_leaks: matches!(func.terminator(block), Terminator::Unreachable),
                ..ArcBlockState::default()
            })
            .collect();

        let mut visitor = ArcVisitor {
            q: self.q,
            factory: &mut *self.factory,
            maps: &mut *self.maps,
            frozen: freeze_epilogue_releases.then_some(self.epilogue),
        };

        let nested_bu = process_bottom_up(&mut visitor, &mut self.states);
        let nested_td = process_top_down(&mut visitor, &mut self.states);
        tracing::trace!(
            function = func.name.as_str(),
            nested_bu,
            nested_td,
            dec_to_inc = self.maps.dec_to_inc.len(),
            inc_to_dec = self.maps.inc_to_dec.len(),
            "block dataflow finished"
        );
        nested_bu || nested_td
    }

    /// Block states after the last run.
    pub fn block_state(&self, block: BlockId) -> Option<&ArcBlockState> {
        self.states.get(block.index())
    }
}

fn process_bottom_up(visitor: &mut ArcVisitor<'_, '_>, states: &mut [ArcBlockState]) -> bool {
    let q = visitor.q;
    let cfg = q.rcfi.cfg();
    let mut nested = false;

    for &block in cfg.postorder() {
        let mut state = std::mem::take(&mut states[block.index()]);
        {
            let mut merger = StateMerger::new(&mut state.bu);
            for &succ in cfg.succs(block) {
                if cfg.is_retreating_edge(block, succ) {
                    merger.reset();
                    break;
                }
                let succ_state = &states[succ.index()];
                if succ_state.allows_leaks {
                    continue;
                }
                merger.merge(&succ_state.bu, visitor.factory);
            }
            merger.finish();
        }

        visitor.visit_terminator_bottom_up(&mut state, block);
        for &inst in q.func.block(block).insts.iter().rev() {
            nested |= visitor.visit_bottom_up(&mut state, inst);
        }
        states[block.index()] = state;
    }
    nested
}

fn process_top_down(visitor: &mut ArcVisitor<'_, '_>, states: &mut [ArcBlockState]) -> bool {
    let q = visitor.q;
    let cfg = q.rcfi.cfg();
    let entry = q.func.entry();
    let mut nested = false;

    for block in cfg.reverse_postorder() {
        let mut state = std::mem::take(&mut states[block.index()]);
        if block == entry {
            state.top_down().clear();
            visitor.init_entry_args(&mut state);
        } else {
            let mut merger = StateMerger::new(&mut state.td);
            for &pred in cfg.preds(block) {
                if !cfg.is_reachable(pred) {
                    continue;
                }
                if cfg.is_retreating_edge(pred, block) {
                    merger.reset();
                    break;
                }
                let pred_state = &states[pred.index()];
                if pred_state.allows_leaks {
                    continue;
                }
                merger.merge(&pred_state.td, visitor.factory);
            }
            merger.finish();
        }

        for &inst in &q.func.block(block).insts {
            nested |= visitor.visit_top_down(&mut state, inst);
        }
        visitor.visit_terminator_top_down(&mut state, block);
        states[block.index()] = state;
    }
    nested
}

#[cfg(test)]
mod tests;
