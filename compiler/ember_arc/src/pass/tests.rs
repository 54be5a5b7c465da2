use ember_ir::{ArgConvention, FunctionBuilder, Module};
use pretty_assertions::assert_eq;

use super::*;
use crate::test_helpers::{
    block_and_loop_configs, builder_with_class, count_rc_ops, is_live, loaded_pair, may_release,
    read_only, run_pass,
};

/// `retain %x; %y = apply foo(%x); release %x; return %y`, where `foo`
/// never releases and `%x` is a guaranteed argument.
fn guaranteed_pair(name: &str) -> Function {
    let (mut fb, class) = builder_with_class(name);
    let unit = fb.types().trivial("Unit");
    let x = fb.add_function_arg(class, ArgConvention::Guaranteed);
    fb.strong_retain(x);
    let y = fb.apply(read_only("foo"), vec![x], unit);
    fb.strong_release(x);
    fb.ret(y);
    fb.finish().unwrap()
}

/// A value loaded from an `@inout` slot, with an unknown call between its
/// retain and release. The call may overwrite the slot and release the
/// loaded object, so the retain is needed.
fn clobbered_load(name: &str) -> Function {
    let mut fb = FunctionBuilder::new(name);
    let class = fb.types().class("Klass");
    let unit = fb.types().trivial("Unit");
    let slot_ty = fb.types().address(class);
    let slot = fb.add_function_arg(slot_ty, ArgConvention::Inout);
    let value = fb.load(slot);
    fb.strong_retain(value);
    fb.apply(may_release("clobber"), vec![], unit);
    fb.strong_release(value);
    fb.ret(value);
    fb.finish().unwrap()
}

#[test]
fn removes_a_known_safe_pair() {
    for config in block_and_loop_configs() {
        let mut func = guaranteed_pair("f");
        let stats = run_pass(&mut func, config);

        assert_eq!(count_rc_ops(&func), 0);
        assert_eq!(func.live_inst_count(), 1);
        assert_eq!(stats.sets_removed, 1);
        assert_eq!(stats.increments_removed, 1);
        assert_eq!(stats.decrements_removed, 1);
        assert!(stats.changed());
    }
}

#[test]
fn keeps_a_pair_around_an_unknown_call() {
    for config in block_and_loop_configs() {
        let mut func = clobbered_load("f");
        let stats = run_pass(&mut func, config);

        assert_eq!(count_rc_ops(&func), 2);
        assert!(!stats.changed());
        assert_eq!(stats.sets_bailed, 0);
    }
}

#[test]
fn removes_pair_around_a_non_releasing_call() {
    for config in block_and_loop_configs() {
        for split in [false, true] {
            let mut func = loaded_pair("f", read_only("foo"), split);
            let stats = run_pass(&mut func, config);

            assert_eq!(count_rc_ops(&func), 0, "split: {split}");
            assert_eq!(stats.sets_removed, 1, "split: {split}");
            assert_eq!(stats.sets_bailed, 0, "split: {split}");
        }
    }
}

#[test]
fn keeps_pair_around_a_releasing_call_taking_the_value() {
    for config in block_and_loop_configs() {
        for split in [false, true] {
            let mut func = loaded_pair("f", may_release("foo"), split);
            let stats = run_pass(&mut func, config);

            assert_eq!(count_rc_ops(&func), 2, "split: {split}");
            assert!(!stats.changed(), "split: {split}");
            assert_eq!(stats.sets_bailed, 0, "split: {split}");
        }
    }
}

/// ```text
/// bb0:        br join(%x)
/// dead(%a):   cond_br %c, dead(%a), join(%a)
/// join(%p):   retain %p; release %p; return %p
/// ```
#[test]
fn join_with_a_dead_self_looping_predecessor() {
    for config in block_and_loop_configs() {
        let (mut fb, class) = builder_with_class("f");
        let bool_ty = fb.types().trivial("Bool");
        let x = fb.add_function_arg(class, ArgConvention::Guaranteed);
        let cond = fb.add_function_arg(bool_ty, ArgConvention::Unowned);
        let (dead, join) = (fb.create_block(), fb.create_block());
        let a = fb.add_block_arg(dead, class);
        let p = fb.add_block_arg(join, class);
        fb.br(join, vec![x]);
        fb.switch_to(dead);
        fb.cond_br(cond, dead, vec![a], join, vec![a]);
        fb.switch_to(join);
        fb.strong_retain(p);
        fb.strong_release(p);
        fb.ret(p);
        let mut func = fb.finish().unwrap();

        let stats = run_pass(&mut func, config);
        assert_eq!(stats.sets_removed, 1);
        assert_eq!(count_rc_ops(&func), 0);
    }
}

#[test]
fn disabled_pass_changes_nothing() {
    let mut func = guaranteed_pair("f");
    let config = ArcOptConfig {
        enable_arc_opts: false,
        ..ArcOptConfig::default()
    };
    let stats = run_pass(&mut func, config);
    assert_eq!(stats, ArcOptStats::default());
    assert_eq!(count_rc_ops(&func), 2);
}

#[test]
fn second_run_is_a_no_op() {
    for config in block_and_loop_configs() {
        let mut func = guaranteed_pair("f");
        run_pass(&mut func, config);
        let again = run_pass(&mut func, config);
        assert!(!again.changed());
        assert_eq!(count_rc_ops(&func), 0);
    }
}

/// ```text
/// retain %g; apply peek(%g); release %g       // removed by the first run
/// retain %x; apply clobber()
/// release %x; apply clobber()
/// release %x                                  // epilogue release
/// ```
///
/// The `%x` pair is only provable once the epilogue release is frozen.
#[test]
fn frozen_epilogue_release_enables_second_phase() {
    for config in block_and_loop_configs() {
        let (mut fb, class) = builder_with_class("f");
        let unit = fb.types().trivial("Unit");
        let g = fb.add_function_arg(class, ArgConvention::Guaranteed);
        let x = fb.add_function_arg(class, ArgConvention::Owned);
        fb.strong_retain(g);
        fb.apply(read_only("peek"), vec![g], unit);
        fb.strong_release(g);
        fb.strong_retain(x);
        fb.apply(may_release("clobber"), vec![], unit);
        fb.strong_release(x);
        let n = fb.apply(may_release("clobber"), vec![], unit);
        let epilogue = fb.strong_release(x);
        fb.ret(n);
        let mut func = fb.finish().unwrap();

        let stats = run_pass(&mut func, config);
        assert_eq!(stats.sets_removed, 2);
        assert_eq!(count_rc_ops(&func), 1);
        assert!(is_live(&func, epilogue));
    }
}

/// Without a first-phase change the frozen phase never runs.
#[test]
fn no_second_phase_without_first_phase_change() {
    let mut fb = FunctionBuilder::new("f");
    let class = fb.types().class("Klass");
    let unit = fb.types().trivial("Unit");
    let x = fb.add_function_arg(class, ArgConvention::Owned);
    fb.strong_retain(x);
    fb.apply(may_release("clobber"), vec![], unit);
    fb.strong_release(x);
    let n = fb.apply(may_release("clobber"), vec![], unit);
    fb.strong_release(x);
    fb.ret(n);
    let mut func = fb.finish().unwrap();

    let stats = run_pass(&mut func, ArcOptConfig::default());
    assert!(!stats.changed());
    assert_eq!(stats.iterations, 1);
    assert_eq!(count_rc_ops(&func), 3);
}

/// ```text
/// bb0:   retain %x; br body
/// body:  retain %x; apply peek(%x); release %x; cond_br %c, body, exit
/// exit:  release %x; return
/// ```
fn loop_with_pairs() -> Function {
    let (mut fb, class) = builder_with_class("loopy");
    let unit = fb.types().trivial("Unit");
    let bool_ty = fb.types().trivial("Bool");
    let x = fb.add_function_arg(class, ArgConvention::Guaranteed);
    let cond = fb.add_function_arg(bool_ty, ArgConvention::Unowned);
    let (body, exit) = (fb.create_block(), fb.create_block());
    fb.strong_retain(x);
    fb.br(body, vec![]);
    fb.switch_to(body);
    fb.strong_retain(x);
    fb.apply(read_only("peek"), vec![x], unit);
    fb.strong_release(x);
    fb.cond_br(cond, body, vec![], exit, vec![]);
    fb.switch_to(exit);
    fb.strong_release(x);
    fb.ret(cond);
    fb.finish().unwrap()
}

#[test]
fn loop_evaluator_pairs_across_the_loop() {
    let [block_config, loop_config] = block_and_loop_configs();

    let mut func = loop_with_pairs();
    let stats = run_pass(&mut func, block_config);
    assert_eq!(stats.sets_removed, 1);
    assert_eq!(count_rc_ops(&func), 2);

    let mut func = loop_with_pairs();
    let stats = run_pass(&mut func, loop_config);
    assert_eq!(stats.sets_removed, 2);
    assert_eq!(count_rc_ops(&func), 0);
}

#[test]
fn changes_flush_cached_analyses() {
    let mut func = guaranteed_pair("f");
    let id = FuncId::new(0);
    let mut analyses = AnalysisManager::default();
    let stats = ArcSequenceOpts::default().run_on_function(id, &mut func, &mut analyses);

    assert!(stats.changed());
    assert!(analyses.rc_identity.is_cached(id));
    assert_eq!(analyses.rc_identity.get(id, &func).cache_len(), 0);
    assert_eq!(analyses.epilogue_arc.get(id).cache_len(), 0);
}

#[test]
fn module_run_sums_per_function_stats() {
    let mut module = Module::new();
    let optimized = module.add_function(guaranteed_pair("optimized"));
    let kept = module.add_function(clobbered_load("kept"));

    let mut analyses = AnalysisManager::default();
    let stats = ArcSequenceOpts::default().run_on_module(&mut module, &mut analyses);

    assert_eq!(stats.sets_removed, 1);
    assert_eq!(count_rc_ops(module.function(optimized)), 0);
    assert_eq!(count_rc_ops(module.function(kept)), 2);
}

#[test]
fn stats_accumulate() {
    let mut total = ArcOptStats::default();
    assert!(!total.changed());
    total += ArcOptStats {
        sets_removed: 1,
        increments_removed: 2,
        decrements_removed: 1,
        sets_bailed: 0,
        iterations: 3,
    };
    total += ArcOptStats {
        sets_bailed: 1,
        iterations: 1,
        ..ArcOptStats::default()
    };
    assert_eq!(
        total,
        ArcOptStats {
            sets_removed: 1,
            increments_removed: 2,
            decrements_removed: 1,
            sets_bailed: 1,
            iterations: 4,
        }
    );
    assert!(total.changed());
}
