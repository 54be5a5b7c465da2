use ember_ir::{ArgConvention, CastKind};
use pretty_assertions::assert_eq;

use super::*;
use crate::alias::ArcQueries;
use crate::epilogue::EpilogueArcKind;
use crate::test_helpers::builder_with_class;

/// `release %x; return %y` with `%y = cast %x`.
struct Sample {
    func: Function,
    x: ValueId,
    y: ValueId,
    release: InstId,
}

fn sample() -> Sample {
    let (mut fb, class) = builder_with_class("f");
    let x = fb.add_function_arg(class, ArgConvention::Owned);
    let y = fb.cast(CastKind::Upcast, x, class);
    let release = fb.strong_release(x);
    fb.ret(y);
    Sample {
        func: fb.finish().unwrap(),
        x,
        y,
        release,
    }
}

fn id() -> FuncId {
    FuncId::new(0)
}

#[test]
fn composite_flags() {
    assert!(InvalidationKind::FUNCTION_BODY.contains(InvalidationKind::BRANCHES));
    assert!(InvalidationKind::CALLS_AND_INSTRUCTIONS.contains(InvalidationKind::CALLS));
    assert!(!InvalidationKind::CALLS_AND_INSTRUCTIONS.intersects(InvalidationKind::BRANCHES));
}

#[test]
fn rc_identity_is_built_once() {
    let Sample { func, x, y, .. } = sample();
    let mut rc = RcIdentityAnalysis::default();
    assert!(!rc.is_cached(id()));

    assert_eq!(rc.get(id(), &func).root(&func, y), x);
    assert_eq!(rc.get(id(), &func).cache_len(), 1);
    assert!(rc.is_cached(id()));
}

#[test]
fn instruction_changes_flush_caches_and_branch_changes_drop() {
    let Sample { func, y, .. } = sample();
    let mut rc = RcIdentityAnalysis::default();
    rc.get(id(), &func).root(&func, y);

    rc.invalidate(id(), InvalidationKind::CALLS);
    assert!(rc.is_cached(id()));
    assert_eq!(rc.get(id(), &func).cache_len(), 0);

    rc.invalidate(id(), InvalidationKind::FUNCTION_BODY);
    assert!(!rc.is_cached(id()));
}

#[test]
fn epilogue_analysis_tracks_deletions() {
    let Sample { func, x, release, .. } = sample();
    let mut rc = RcIdentityAnalysis::default();
    let mut epilogue = EpilogueArcAnalysis::new();
    let rcfi = rc.get(id(), &func);
    let q = ArcQueries::new(&func, rcfi, &BasicAliasAnalysis);

    let found = epilogue
        .get(id())
        .compute_epilogue_arc_instructions(&q, EpilogueArcKind::Release, x);
    assert_eq!(found.to_vec(), vec![release]);
    assert_eq!(epilogue.get(id()).cache_len(), 1);

    epilogue.on_instruction_deleted(id(), release);
    assert_eq!(epilogue.get(id()).cache_len(), 0);

    epilogue.invalidate(id(), InvalidationKind::BRANCHES);
    assert!(!epilogue.is_cached(id()));
}

#[test]
fn manager_forwards_to_every_analysis() {
    let Sample { func, y, release, .. } = sample();
    let cast = func.defining_inst(y).unwrap();
    let mut analyses = AnalysisManager::default();
    analyses.rc_identity.get(id(), &func).root(&func, y);
    analyses.epilogue_arc.get(id());

    analyses.notify_instruction_deleted(id(), cast, Some(y));
    assert_eq!(analyses.rc_identity.get(id(), &func).cache_len(), 0);
    analyses.notify_instruction_deleted(id(), release, None);
    analyses.invalidate(id(), InvalidationKind::BRANCHES);
    assert!(!analyses.rc_identity.is_cached(id()));
    assert!(!analyses.epilogue_arc.is_cached(id()));

    // Other functions are untouched.
    let other = FuncId::new(1);
    analyses.rc_identity.get(other, &func);
    analyses.invalidate(id(), InvalidationKind::FUNCTION_BODY);
    assert!(analyses.rc_identity.is_cached(other));
}
