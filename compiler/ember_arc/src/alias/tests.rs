use ember_ir::{ArgConvention, CastKind};

use super::*;
use crate::test_helpers::{builder_with_class, may_release, read_only, Fixture};

#[test]
fn distinct_allocations_do_not_alias() {
    let (mut fb, class) = builder_with_class("f");
    let x = fb.add_function_arg(class, ArgConvention::Guaranteed);
    let a = fb.alloc_ref(class);
    let b = fb.alloc_ref(class);
    let a_cast = fb.cast(CastKind::Upcast, a, class);
    fb.ret(x);
    let func = fb.finish().unwrap();

    let aa = BasicAliasAnalysis;
    assert!(!aa.may_alias(&func, a, b));
    assert!(aa.may_alias(&func, a, a_cast));
    assert!(aa.may_alias(&func, x, a));
}

#[test]
fn trivial_values_alias_nothing() {
    let (mut fb, class) = builder_with_class("f");
    let int = fb.types().trivial("Int");
    let x = fb.add_function_arg(class, ArgConvention::Guaranteed);
    let n = fb.integer_literal(int, 3);
    fb.ret(x);
    let func = fb.finish().unwrap();

    assert!(!BasicAliasAnalysis.may_alias(&func, x, n));
}

#[test]
fn address_projections_strip_to_the_base_object() {
    let (mut fb, class) = builder_with_class("f");
    let int = fb.types().trivial("Int");
    let x = fb.add_function_arg(class, ArgConvention::Guaranteed);
    let field = fb.ref_element_addr(x, 0, int);
    fb.ret(x);
    let func = fb.finish().unwrap();

    assert_eq!(underlying_object(&func, field), x);
}

#[test]
fn decrement_queries_follow_call_effects() {
    let (mut fb, class) = builder_with_class("f");
    let unit = fb.types().trivial("Unit");
    let x = fb.add_function_arg(class, ArgConvention::Owned);
    fb.apply(read_only("peek"), vec![x], unit);
    fb.apply(may_release("clobber"), vec![], unit);
    let retain = fb.strong_retain(x);
    let release = fb.strong_release(x);
    fb.ret(x);
    let func = fb.finish().unwrap();
    let insts = func.block(func.entry()).insts.clone();
    let fx = Fixture::new(func);
    let q = fx.queries();

    assert!(!q.may_decrement_ref_count(insts[0], x));
    assert!(q.may_decrement_ref_count(insts[1], x));
    assert!(!q.may_decrement_ref_count(retain, x));
    assert!(q.may_decrement_ref_count(release, x));

    assert!(q.may_use(insts[0], x));
    assert!(q.may_have_symmetric_interference(insts[1], x));
    assert!(q.terminator_may_use(fx.func.entry(), x));
}

/// A pure call only observes the objects it is passed.
#[test]
fn pure_call_uses_only_aliasing_operands() {
    let (mut fb, class) = builder_with_class("f");
    let unit = fb.types().trivial("Unit");
    let x = fb.add_function_arg(class, ArgConvention::Owned);
    let y = fb.alloc_ref(class);
    let z = fb.alloc_ref(class);
    let pure = crate::test_helpers::callee("pure", ember_ir::SideEffects::None);
    fb.apply(pure, vec![y], unit);
    fb.ret(x);
    let func = fb.finish().unwrap();
    let call = func.block(func.entry()).insts[2];
    let fx = Fixture::new(func);
    let q = fx.queries();

    assert!(q.may_use(call, y));
    assert!(!q.may_use(call, z));
    // An argument may be the same object as any allocation passed in.
    assert!(q.may_use(call, x));
    assert!(!q.may_decrement_ref_count(call, x));
}
