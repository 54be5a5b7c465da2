//! The ARC sequence optimization pass.
//!
//! Per function the pass runs twice:
//!
//! 1. with epilogue releases tracked like any other release;
//! 2. if that removed anything, again with the epilogue releases of owned
//!    arguments frozen, which makes other releases of those arguments known
//!    safe and exposes pairs the first run could not prove.
//!
//! Within a run, dataflow and matching repeat while the evaluator detected
//! nesting and the last round removed something: removing an inner pair can
//! make an outer pair provable.

use std::ops::AddAssign;

use ember_ir::{FuncId, Function, InstId, LoopRegionInfo, Module, RegionId};

use crate::alias::ArcQueries;
use crate::analysis::{AnalysisManager, InvalidationKind};
use crate::config::ArcOptConfig;
use crate::dataflow::block::ArcSequenceDataflowEvaluator;
use crate::dataflow::region::{LoopArcSequenceDataflowEvaluator, RegionStates};
use crate::epilogue::{EpilogueArcFunctionInfo, EpilogueReleaseMatcher};
use crate::matching::{ArcPairingContext, MatchingOutcome};
use crate::ptr_set::PtrSetFactory;

/// What the pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArcOptStats {
    pub sets_removed: usize,
    pub increments_removed: usize,
    pub decrements_removed: usize,
    /// Complete matching sets left in place because they were not provably
    /// safe to delete.
    pub sets_bailed: usize,
    /// Dataflow evaluations performed.
    pub iterations: usize,
}

impl ArcOptStats {
    pub fn changed(&self) -> bool {
        self.sets_removed > 0
    }
}

impl AddAssign for ArcOptStats {
    fn add_assign(&mut self, other: Self) {
        self.sets_removed += other.sets_removed;
        self.increments_removed += other.increments_removed;
        self.decrements_removed += other.decrements_removed;
        self.sets_bailed += other.sets_bailed;
        self.iterations += other.iterations;
    }
}

/// Per-run scratch state shared by every evaluation of one function.
#[derive(Default)]
struct RunScratch {
    factory: PtrSetFactory<InstId>,
    pairing: ArcPairingContext,
}

impl RunScratch {
    fn reset(&mut self) {
        self.pairing.clear();
        self.factory.clear();
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ArcSequenceOpts {
    config: ArcOptConfig,
}

impl ArcSequenceOpts {
    pub fn new(config: ArcOptConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ArcOptConfig {
        &self.config
    }

    /// Optimize every function of `module`.
    pub fn run_on_module(&self, module: &mut Module, analyses: &mut AnalysisManager) -> ArcOptStats {
        let ids: Vec<FuncId> = module.func_ids().collect();
        let mut total = ArcOptStats::default();
        for id in ids {
            total += self.run_on_function(id, module.function_mut(id), analyses);
        }
        total
    }

    /// Optimize one function, keeping `analyses` in sync with every
    /// deletion.
    pub fn run_on_function(
        &self,
        id: FuncId,
        func: &mut Function,
        analyses: &mut AnalysisManager,
    ) -> ArcOptStats {
        let mut stats = ArcOptStats::default();
        if !self.config.enable_arc_opts {
            return stats;
        }

        if self.process_function(id, func, analyses, false, &mut stats) {
            self.process_function(id, func, analyses, true, &mut stats);
            analyses.invalidate(id, InvalidationKind::INSTRUCTIONS);
            tracing::trace!(body = %func, "after arc sequence opts");
        }

        tracing::debug!(
            function = func.name.as_str(),
            sets_removed = stats.sets_removed,
            increments_removed = stats.increments_removed,
            decrements_removed = stats.decrements_removed,
            sets_bailed = stats.sets_bailed,
            iterations = stats.iterations,
            "arc sequence opts finished"
        );
        stats
    }

    fn process_function(
        &self,
        id: FuncId,
        func: &mut Function,
        analyses: &mut AnalysisManager,
        freeze_epilogue_releases: bool,
        stats: &mut ArcOptStats,
    ) -> bool {
        if !self.config.enable_loop_arc {
            return process_without_loop_support(id, func, analyses, freeze_epilogue_releases, stats);
        }

        let lri = {
            let rcfi = analyses.rc_identity.get(id, func);
            LoopRegionInfo::build(func, rcfi.cfg(), rcfi.dominators())
        };
        if lri.is_irreducible() {
            tracing::debug!(
                function = func.name.as_str(),
                "irreducible control flow, using block dataflow"
            );
            return process_without_loop_support(id, func, analyses, freeze_epilogue_releases, stats);
        }
        process_with_loop_support(id, func, analyses, &lri, freeze_epilogue_releases, stats)
    }
}

fn epilogue_matcher(
    q: &ArcQueries<'_>,
    info: &EpilogueArcFunctionInfo,
    freeze_epilogue_releases: bool,
) -> EpilogueReleaseMatcher {
    if freeze_epilogue_releases {
        EpilogueReleaseMatcher::compute(q, info)
    } else {
        EpilogueReleaseMatcher::default()
    }
}

fn process_without_loop_support(
    id: FuncId,
    func: &mut Function,
    analyses: &mut AnalysisManager,
    freeze_epilogue_releases: bool,
    stats: &mut ArcOptStats,
) -> bool {
    let mut scratch = RunScratch::default();
    let mut changed = false;
    loop {
        stats.iterations += 1;
        let (nested, outcome) = {
            let rcfi = analyses.rc_identity.get(id, func);
            let epilogue = analyses.epilogue_arc.get(id);
            let q = ArcQueries::new(func, rcfi, &analyses.alias);
            let matcher = epilogue_matcher(&q, epilogue, freeze_epilogue_releases);
            let nested = ArcSequenceDataflowEvaluator::new(
                q,
                &mut scratch.factory,
                &mut scratch.pairing.maps,
                &matcher,
            )
            .run(freeze_epilogue_releases);
            (nested, scratch.pairing.perform_matching(&q, &scratch.factory))
        };

        let matched = remove_sets(id, func, analyses, outcome, stats);
        changed |= matched;
        scratch.reset();
        if !(nested && matched) {
            return changed;
        }
    }
}

fn process_with_loop_support(
    id: FuncId,
    func: &mut Function,
    analyses: &mut AnalysisManager,
    lri: &LoopRegionInfo,
    freeze_epilogue_releases: bool,
    stats: &mut ArcOptStats,
) -> bool {
    let mut states = RegionStates::new(func, lri);
    let mut scratch = RunScratch::default();
    let mut changed = false;

    for region in lri.containers_innermost_first() {
        changed |= process_region(
            id,
            func,
            analyses,
            lri,
            &mut states,
            &mut scratch,
            region,
            freeze_epilogue_releases,
            stats,
        );
        states.summarize_loop(func, lri, region);
        states.clear_loop_state(lri, region);
        scratch.reset();
    }
    changed
}

#[expect(
    clippy::too_many_arguments,
    reason = "per-function run state threaded through each region"
)]
fn process_region(
    id: FuncId,
    func: &mut Function,
    analyses: &mut AnalysisManager,
    lri: &LoopRegionInfo,
    states: &mut RegionStates,
    scratch: &mut RunScratch,
    region: RegionId,
    freeze_epilogue_releases: bool,
    stats: &mut ArcOptStats,
) -> bool {
    let mut changed = false;
    loop {
        stats.iterations += 1;
        let (nested, outcome) = {
            let rcfi = analyses.rc_identity.get(id, func);
            let epilogue = analyses.epilogue_arc.get(id);
            let q = ArcQueries::new(func, rcfi, &analyses.alias);
            let matcher = epilogue_matcher(&q, epilogue, freeze_epilogue_releases);
            let nested = LoopArcSequenceDataflowEvaluator::new(
                q,
                lri,
                &mut scratch.factory,
                &mut scratch.pairing.maps,
                &matcher,
                states,
            )
            .run_on_loop(region, freeze_epilogue_releases);
            (nested, scratch.pairing.perform_matching(&q, &scratch.factory))
        };

        let matched = remove_sets(id, func, analyses, outcome, stats);
        changed |= matched;
        scratch.reset();
        if !(nested && matched) {
            return changed;
        }
        tracing::trace!(region = region.raw(), "nesting detected, re-running region");
    }
}

/// Erase every removable set. Returns `true` if anything was erased.
fn remove_sets(
    id: FuncId,
    func: &mut Function,
    analyses: &mut AnalysisManager,
    outcome: MatchingOutcome,
    stats: &mut ArcOptStats,
) -> bool {
    stats.sets_bailed += outcome.bailed;
    let matched = !outcome.removable.is_empty();
    for set in outcome.removable {
        tracing::debug!(
            function = func.name.as_str(),
            root = set.root.raw(),
            increments = ?set.increments,
            decrements = ?set.decrements,
            known_safe = set.known_safe,
            "removing matching set"
        );
        for &inst in set.increments.iter().chain(&set.decrements) {
            let result = func.erase_inst(inst);
            analyses.notify_instruction_deleted(id, inst, result);
        }
        stats.sets_removed += 1;
        stats.increments_removed += set.increments.len();
        stats.decrements_removed += set.decrements.len();
    }
    matched
}

#[cfg(test)]
mod tests;
