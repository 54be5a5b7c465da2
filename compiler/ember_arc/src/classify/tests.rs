use ember_ir::{
    ArgConvention, Callee, FunctionBuilder, InstKind, ResultConvention, SideEffects,
    AUTORELEASE_POOL_POP,
};

use super::*;
use crate::test_helpers::{builder_with_class, may_release, read_only};

#[test]
fn retains_and_releases_of_references() {
    let (mut fb, class) = builder_with_class("f");
    let x = fb.add_function_arg(class, ArgConvention::Guaranteed);
    let retain = fb.strong_retain(x);
    let release = fb.release_value(x);
    fb.ret(x);
    let func = fb.finish().unwrap();

    assert_eq!(classify(&func, retain), RcTransition::StrongIncrement);
    assert_eq!(classify(&func, release), RcTransition::StrongDecrement);
    assert!(is_retain(&func.inst(retain).kind));
    assert!(is_release(&func.inst(release).kind));
    assert_eq!(rc_operand(&func.inst(release).kind), Some(x));
}

/// Retaining a trivial value is a no-op and must not be tracked.
#[test]
fn trivial_operands_are_unknown() {
    let mut fb = FunctionBuilder::new("f");
    let int = fb.types().trivial("Int");
    let n = fb.add_function_arg(int, ArgConvention::Owned);
    let retain = fb.retain_value(n);
    let release = fb.release_value(n);
    fb.ret(n);
    let func = fb.finish().unwrap();

    assert_eq!(classify(&func, retain), RcTransition::Unknown);
    assert_eq!(classify(&func, release), RcTransition::Unknown);
}

#[test]
fn entrances() {
    let (mut fb, class) = builder_with_class("f");
    let int = fb.types().trivial("Int");
    let obj = fb.alloc_ref(class);
    let owned = Callee::new("make", SideEffects::ReadOnly, ResultConvention::Owned);
    let made = fb.apply(owned.clone(), vec![], class);
    let counted = fb.apply(owned, vec![], int);
    let unowned = fb.apply(read_only("peek"), vec![obj], class);
    fb.ret(made);
    let func = fb.finish().unwrap();

    let inst_of = |v| func.defining_inst(v).unwrap();
    assert_eq!(classify(&func, inst_of(obj)), RcTransition::StrongEntrance);
    assert_eq!(classify(&func, inst_of(made)), RcTransition::StrongEntrance);
    // An owned trivial result carries no reference.
    assert_eq!(classify(&func, inst_of(counted)), RcTransition::Unknown);
    assert_eq!(classify(&func, inst_of(unowned)), RcTransition::Unknown);
}

#[test]
fn autorelease_pool_calls() {
    let (mut fb, class) = builder_with_class("f");
    let unit = fb.types().trivial("Unit");
    let x = fb.add_function_arg(class, ArgConvention::Guaranteed);
    let pop = fb.apply(may_release(AUTORELEASE_POOL_POP), vec![], unit);
    fb.ret(x);
    let func = fb.finish().unwrap();

    let inst = func.defining_inst(pop).unwrap();
    assert_eq!(classify(&func, inst), RcTransition::AutoreleasePoolCall);
    assert!(is_autorelease_pool_call(&func.inst(inst).kind));
}

#[test]
fn side_effect_predicates() {
    let release = InstKind::StrongRelease {
        operand: ember_ir::ValueId::new(0),
    };
    let retain = InstKind::StrongRetain {
        operand: ember_ir::ValueId::new(0),
    };
    let pure_call = InstKind::Apply {
        callee: Callee::new("pure", SideEffects::None, ResultConvention::Unowned),
        args: vec![],
    };
    let unknown_call = InstKind::Apply {
        callee: may_release("unknown"),
        args: vec![],
    };

    assert!(may_release_or_read_ref_count(&release));
    assert!(!may_release_or_read_ref_count(&retain));
    assert!(can_never_decrement_ref_counts(&retain));
    assert!(can_never_decrement_ref_counts(&pure_call));
    assert!(!can_never_decrement_ref_counts(&unknown_call));

    assert!(may_have_side_effects(&retain));
    assert!(may_have_side_effects(&unknown_call));
    assert!(!may_have_side_effects(&pure_call));

    assert!(can_never_use_values(&InstKind::IntegerLiteral { value: 1 }));
    assert!(!can_never_use_values(&unknown_call));
}
