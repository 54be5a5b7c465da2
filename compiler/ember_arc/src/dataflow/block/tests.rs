use ember_ir::{ArgConvention, FunctionBuilder, ValueId, AUTORELEASE_POOL_POP};

use super::*;
use crate::epilogue::EpilogueArcFunctionInfo;
use crate::rc_state::TransitionKind;
use crate::test_helpers::{builder_with_class, may_release, read_only, Fixture};

struct Run {
    nested: bool,
    maps: PairingMaps,
    factory: PtrSetFactory<InstId>,
}

impl Run {
    fn paired_releases(&self, retain: InstId) -> Vec<InstId> {
        self.maps
            .inc_to_dec
            .get(&retain)
            .map(|state| self.factory.elements(state.instructions()).to_vec())
            .unwrap_or_default()
    }

    fn paired_retains(&self, release: InstId) -> Vec<InstId> {
        self.maps
            .dec_to_inc
            .get(&release)
            .map(|state| self.factory.elements(state.instructions()).to_vec())
            .unwrap_or_default()
    }
}

fn evaluate(fx: &Fixture, freeze: bool) -> Run {
    let q = fx.queries();
    let info = EpilogueArcFunctionInfo::new();
    let matcher = if freeze {
        EpilogueReleaseMatcher::compute(&q, &info)
    } else {
        EpilogueReleaseMatcher::default()
    };
    let mut factory = PtrSetFactory::new();
    let mut maps = PairingMaps::default();
    let nested = ArcSequenceDataflowEvaluator::new(q, &mut factory, &mut maps, &matcher).run(freeze);
    Run {
        nested,
        maps,
        factory,
    }
}

#[test]
fn straight_line_pair() {
    let (mut fb, class) = builder_with_class("f");
    let unit = fb.types().trivial("Unit");
    let x = fb.add_function_arg(class, ArgConvention::Guaranteed);
    let retain = fb.strong_retain(x);
    fb.apply(read_only("peek"), vec![x], unit);
    let release = fb.strong_release(x);
    fb.ret(x);
    let fx = Fixture::new(fb.finish().unwrap());

    let run = evaluate(&fx, false);
    assert!(!run.nested);
    assert_eq!(run.paired_releases(retain), vec![release]);
    assert_eq!(run.paired_retains(release), vec![retain]);
    assert!(run.maps.inc_to_dec.get(&retain).unwrap().is_known_safe());
}

/// bb0: retain; cond_br bb1, bb2. Each arm releases.
#[test]
fn releases_on_both_arms_merge_into_one_state() {
    let (mut fb, class) = builder_with_class("f");
    let bool_ty = fb.types().trivial("Bool");
    let x = fb.add_function_arg(class, ArgConvention::Guaranteed);
    let cond = fb.add_function_arg(bool_ty, ArgConvention::Unowned);
    let (b1, b2) = (fb.create_block(), fb.create_block());
    let retain = fb.strong_retain(x);
    fb.cond_br(cond, b1, vec![], b2, vec![]);
    fb.switch_to(b1);
    let left = fb.strong_release(x);
    fb.ret(cond);
    fb.switch_to(b2);
    let right = fb.strong_release(x);
    fb.ret(cond);
    let fx = Fixture::new(fb.finish().unwrap());

    let run = evaluate(&fx, false);
    assert_eq!(run.paired_releases(retain), vec![left, right]);
    assert!(run.maps.inc_to_dec.get(&retain).unwrap().is_partial());
    assert_eq!(run.paired_retains(left), vec![retain]);
    assert_eq!(run.paired_retains(right), vec![retain]);
}

/// A release only on one arm never survives the join bottom-up.
#[test]
fn release_on_one_arm_is_dropped_at_the_join() {
    let (mut fb, class) = builder_with_class("f");
    let bool_ty = fb.types().trivial("Bool");
    let x = fb.add_function_arg(class, ArgConvention::Guaranteed);
    let cond = fb.add_function_arg(bool_ty, ArgConvention::Unowned);
    let (b1, b2) = (fb.create_block(), fb.create_block());
    let retain = fb.strong_retain(x);
    fb.cond_br(cond, b1, vec![], b2, vec![]);
    fb.switch_to(b1);
    fb.strong_release(x);
    fb.ret(cond);
    fb.switch_to(b2);
    fb.ret(cond);
    let fx = Fixture::new(fb.finish().unwrap());

    let run = evaluate(&fx, false);
    assert!(run.paired_releases(retain).is_empty());
}

/// Paths ending in `unreachable` may leak and do not block pairing.
#[test]
fn unreachable_successors_are_ignored() {
    let (mut fb, class) = builder_with_class("f");
    let bool_ty = fb.types().trivial("Bool");
    let x = fb.add_function_arg(class, ArgConvention::Guaranteed);
    let cond = fb.add_function_arg(bool_ty, ArgConvention::Unowned);
    let (b1, trap) = (fb.create_block(), fb.create_block());
    let retain = fb.strong_retain(x);
    fb.cond_br(cond, b1, vec![], trap, vec![]);
    fb.switch_to(b1);
    let release = fb.strong_release(x);
    fb.ret(cond);
    fb.switch_to(trap);
    fb.unreachable();
    let fx = Fixture::new(fb.finish().unwrap());

    let run = evaluate(&fx, false);
    assert_eq!(run.paired_releases(retain), vec![release]);
    assert_eq!(run.paired_retains(release), vec![retain]);
}

/// The block variant does not look through back edges.
#[test]
fn back_edges_clear_state() {
    let (mut fb, class) = builder_with_class("f");
    let bool_ty = fb.types().trivial("Bool");
    let x = fb.add_function_arg(class, ArgConvention::Guaranteed);
    let cond = fb.add_function_arg(bool_ty, ArgConvention::Unowned);
    let (body, exit) = (fb.create_block(), fb.create_block());
    let retain = fb.strong_retain(x);
    fb.br(body, vec![]);
    fb.switch_to(body);
    let release = fb.strong_release(x);
    fb.cond_br(cond, body, vec![], exit, vec![]);
    fb.switch_to(exit);
    fb.ret(cond);
    let fx = Fixture::new(fb.finish().unwrap());

    let run = evaluate(&fx, false);
    assert!(run.paired_retains(release).is_empty());
    assert!(!run.maps.dec_to_inc.contains_key(&release));
    // Bottom-up still walks from the loop body into the preheader.
    assert_eq!(run.paired_releases(retain), vec![release]);
}

#[test]
fn autorelease_pool_call_clears_everything() {
    let (mut fb, class) = builder_with_class("f");
    let unit = fb.types().trivial("Unit");
    let x = fb.add_function_arg(class, ArgConvention::Guaranteed);
    let retain = fb.strong_retain(x);
    fb.apply(may_release(AUTORELEASE_POOL_POP), vec![], unit);
    let release = fb.strong_release(x);
    fb.ret(x);
    let fx = Fixture::new(fb.finish().unwrap());

    let run = evaluate(&fx, false);
    assert!(run.paired_releases(retain).is_empty());
    assert!(run.paired_retains(release).is_empty());
}

#[test]
fn double_retain_is_nesting() {
    let (mut fb, class) = builder_with_class("f");
    let x = fb.add_function_arg(class, ArgConvention::Guaranteed);
    fb.strong_retain(x);
    fb.strong_retain(x);
    fb.strong_release(x);
    fb.strong_release(x);
    fb.ret(x);
    let fx = Fixture::new(fb.finish().unwrap());

    assert!(evaluate(&fx, false).nested);
}

#[test]
fn owned_arguments_enter_at_plus_one() {
    let (mut fb, class) = builder_with_class("f");
    let x = fb.add_function_arg(class, ArgConvention::Owned);
    fb.ret(x);
    let fx = Fixture::new(fb.finish().unwrap());
    let q = fx.queries();
    let matcher = EpilogueReleaseMatcher::default();
    let mut factory = PtrSetFactory::new();
    let mut maps = PairingMaps::default();
    let mut evaluator = ArcSequenceDataflowEvaluator::new(q, &mut factory, &mut maps, &matcher);
    evaluator.run(false);

    let state = evaluator.block_state(fx.func.entry()).unwrap();
    let cell = state.td.get(&x).unwrap();
    assert!(cell.is_tracking_ref_count());
    assert_eq!(cell.transition().map(|t| t.kind), Some(TransitionKind::Entrance));
}

/// `%x` owned:
///
/// ```text
/// retain %x
/// apply clobber()
/// release %x
/// apply clobber()
/// release %x        // epilogue
/// ```
fn owned_with_epilogue() -> (Fixture, ValueId, InstId, InstId, InstId) {
    let mut fb = FunctionBuilder::new("owned");
    let class = fb.types().class("Klass");
    let unit = fb.types().trivial("Unit");
    let x = fb.add_function_arg(class, ArgConvention::Owned);
    let retain = fb.strong_retain(x);
    fb.apply(may_release("clobber"), vec![], unit);
    let release = fb.strong_release(x);
    let n = fb.apply(may_release("clobber"), vec![], unit);
    let epilogue = fb.strong_release(x);
    fb.ret(n);
    (Fixture::new(fb.finish().unwrap()), x, retain, release, epilogue)
}

#[test]
fn unfrozen_epilogue_release_blocks_pairing() {
    let (fx, _, retain, release, _) = owned_with_epilogue();
    let run = evaluate(&fx, false);
    assert!(run.paired_releases(retain).is_empty());
    // Top-down the retain nests inside the argument's +1 and finds the
    // first release.
    assert_eq!(run.paired_retains(release), vec![retain]);
}

/// Freezing the epilogue release proves the argument stays alive, so the
/// inner release becomes known safe.
#[test]
fn frozen_epilogue_release_exposes_pair() {
    let (fx, _, retain, release, epilogue) = owned_with_epilogue();
    let run = evaluate(&fx, true);
    assert_eq!(run.paired_releases(retain), vec![release]);
    assert!(run.maps.inc_to_dec.get(&retain).unwrap().is_known_safe());
    assert!(!run.maps.dec_to_inc.contains_key(&epilogue));
}
