//! Loop-region ARC sequence dataflow.
//!
//! Works on the region tree of [`LoopRegionInfo`]. Regions are processed
//! innermost loop first. Inside a region the subregions (blocks and
//! directly nested loops) are walked like blocks in the basic-block variant,
//! with local predecessor and successor lists that exclude back edges.
//!
//! Once a loop is done it is summarized into the instructions that may
//! touch a reference count or use a value. When the enclosing region meets
//! the loop as a subregion it applies that summary as "different loop"
//! instructions: the retains and releases inside cannot pair with anything
//! outside, they can only make outer sequences less safe.
//!
//! Region state outlives a single evaluator: the driver keeps a
//! [`RegionStates`] for the whole function so that summaries computed for
//! inner loops are available to outer ones.

use ember_ir::{Function, InstId, LoopRegionInfo, RegionId, RegionKind, Terminator};

use crate::alias::ArcQueries;
use crate::classify::can_never_use_values;
use crate::epilogue::EpilogueReleaseMatcher;
use crate::ptr_set::PtrSetFactory;

use super::visitor::ArcVisitor;
use super::{ArcRegionState, ArcStateStore, PairingMaps, StateMerger, SummaryItem};

/// Per-region state for one function.
#[derive(Debug, Default)]
pub struct RegionStates {
    states: Vec<ArcRegionState>,
}

impl RegionStates {
    pub fn new(func: &Function, lri: &LoopRegionInfo) -> Self {
        let states = (0..lri.num_regions())
            .map(|idx| {
                let region = lri.region(region_id(idx));
                let allows_leaks = region
                    .block()
                    .is_some_and(|b| matches!(func.terminator(b), Terminator::Unreachable));
                ArcRegionState {
                    allows_leaks,
                    ..ArcRegionState::default()
                }
            })
            .collect();
        Self { states }
    }

    pub fn get(&self, region: RegionId) -> &ArcRegionState {
        &self.states[region.index()]
    }

    /// Record the interesting instructions of `region` (its own blocks and
    /// the summaries of its nested loops) in RPO.
    pub fn summarize_loop(&mut self, func: &Function, lri: &LoopRegionInfo, region: RegionId) {
        let mut summary = Vec::new();
        for &sub in lri.region(region).subregions() {
            match lri.region(sub).kind() {
                RegionKind::Block(block) => {
                    let data = func.block(block);
                    summary.extend(
                        data.insts
                            .iter()
                            .filter(|&&inst| !can_never_use_values(&func.inst(inst).kind))
                            .map(|&inst| SummaryItem::Inst(inst)),
                    );
                    if !data.terminator.operands().is_empty() {
                        summary.push(SummaryItem::Terminator(block));
                    }
                }
                RegionKind::Loop { .. } => {
                    summary.extend_from_slice(&self.states[sub.index()].summary);
                }
                RegionKind::Function => {}
            }
        }
        tracing::trace!(region = region.raw(), items = summary.len(), "summarized loop");
        self.states[region.index()].summary = summary;
    }

    /// Drop the dataflow state of every subregion of `region`. Summaries are
    /// kept.
    pub fn clear_loop_state(&mut self, lri: &LoopRegionInfo, region: RegionId) {
        for &sub in lri.region(region).subregions() {
            let state = &mut self.states[sub.index()];
            state.td.clear();
            state.bu.clear();
        }
    }
}

fn region_id(idx: usize) -> RegionId {
    RegionId::new(
        u32::try_from(idx).unwrap_or_else(|_| panic!("region count exceeds u32::MAX")),
    )
}

pub struct LoopArcSequenceDataflowEvaluator<'e, 'a> {
    q: ArcQueries<'a>,
    lri: &'e LoopRegionInfo,
    factory: &'e mut PtrSetFactory<InstId>,
    maps: &'e mut PairingMaps,
    epilogue: &'e EpilogueReleaseMatcher,
    states: &'e mut RegionStates,
}

impl<'e, 'a> LoopArcSequenceDataflowEvaluator<'e, 'a> {
    pub fn new(
        q: ArcQueries<'a>,
        lri: &'e LoopRegionInfo,
        factory: &'e mut PtrSetFactory<InstId>,
        maps: &'e mut PairingMaps,
        epilogue: &'e EpilogueReleaseMatcher,
        states: &'e mut RegionStates,
    ) -> Self {
        Self {
            q,
            lri,
            factory,
            maps,
            epilogue,
            states,
        }
    }

    /// Run both directions over the subregions of `region`. Returns `true`
    /// if nesting was detected.
    pub fn run_on_loop(&mut self, region: RegionId, freeze_epilogue_releases: bool) -> bool {
        let mut visitor = ArcVisitor {
            q: self.q,
            factory: &mut *self.factory,
            maps: &mut *self.maps,
            frozen: freeze_epilogue_releases.then_some(self.epilogue),
        };
        let nested_bu = process_loop_bottom_up(&mut visitor, self.lri, self.states, region);
        let nested_td = process_loop_top_down(&mut visitor, self.lri, self.states, region);
        tracing::trace!(
            region = region.raw(),
            nested_bu,
            nested_td,
            dec_to_inc = self.maps.dec_to_inc.len(),
            inc_to_dec = self.maps.inc_to_dec.len(),
            "region dataflow finished"
        );
        nested_bu || nested_td
    }
}

fn process_loop_bottom_up(
    visitor: &mut ArcVisitor<'_, '_>,
    lri: &LoopRegionInfo,
    states: &mut RegionStates,
    region: RegionId,
) -> bool {
    let func = visitor.q.func;
    let mut nested = false;

    for &sub in lri.region(region).subregions().iter().rev() {
        let data = lri.region(sub);
        let mut state = std::mem::take(&mut states.states[sub.index()]);
        {
            let mut merger = StateMerger::new(&mut state.bu);
            if data.is_backedge_source() || data.exits_parent() {
                merger.reset();
            } else {
                for &succ in data.succs() {
                    let succ_state = &states.states[succ.index()];
                    if succ_state.allows_leaks {
                        continue;
                    }
                    merger.merge(&succ_state.bu, visitor.factory);
                }
            }
            merger.finish();
        }

        match data.kind() {
            RegionKind::Block(block) => {
                visitor.visit_terminator_bottom_up(&mut state, block);
                for &inst in func.block(block).insts.iter().rev() {
                    nested |= visitor.visit_bottom_up(&mut state, inst);
                }
            }
            RegionKind::Loop { .. } => {
                let summary = std::mem::take(&mut state.summary);
                visitor.apply_summary_bottom_up(&mut state, &summary);
                state.summary = summary;
            }
            RegionKind::Function => {}
        }
        states.states[sub.index()] = state;
    }
    nested
}

fn process_loop_top_down(
    visitor: &mut ArcVisitor<'_, '_>,
    lri: &LoopRegionInfo,
    states: &mut RegionStates,
    region: RegionId,
) -> bool {
    let func = visitor.q.func;
    let entry = func.entry();
    let mut nested = false;

    for &sub in lri.region(region).subregions() {
        let data = lri.region(sub);
        let mut state = std::mem::take(&mut states.states[sub.index()]);
        if data.block() == Some(entry) {
            state.top_down().clear();
            visitor.init_entry_args(&mut state);
        } else {
            let mut merger = StateMerger::new(&mut state.td);
            if data.is_backedge_target() {
                merger.reset();
            } else {
                for &pred in data.preds() {
                    let pred_state = &states.states[pred.index()];
                    if pred_state.allows_leaks {
                        continue;
                    }
                    merger.merge(&pred_state.td, visitor.factory);
                }
            }
            merger.finish();
        }

        match data.kind() {
            RegionKind::Block(block) => {
                for &inst in &func.block(block).insts {
                    nested |= visitor.visit_top_down(&mut state, inst);
                }
                visitor.visit_terminator_top_down(&mut state, block);
            }
            RegionKind::Loop { .. } => {
                let summary = std::mem::take(&mut state.summary);
                visitor.apply_summary_top_down(&mut state, &summary);
                state.summary = summary;
            }
            RegionKind::Function => {}
        }
        states.states[sub.index()] = state;
    }
    nested
}
