//! Instruction classification for ARC.
//!
//! The dataflow evaluator only distinguishes a handful of instruction
//! shapes: operations that create a +1 reference (entrances), retains,
//! releases, autorelease pool boundaries, and everything else. Everything
//! else is then asked, per tracked RC root, whether it may decrement or use
//! that root (see [`crate::alias`]).

use ember_ir::{
    Function, InstId, InstKind, ResultConvention, SideEffects, AUTORELEASE_POOL_POP,
    AUTORELEASE_POOL_PUSH,
};

/// How an instruction moves reference counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RcTransition {
    /// Produces a new +1 reference: allocations, owned call results,
    /// closure construction.
    StrongEntrance,
    /// Retain of its operand.
    StrongIncrement,
    /// Release of its operand.
    StrongDecrement,
    /// Push or pop of an autorelease pool. May release anything.
    AutoreleasePoolCall,
    /// Not a reference count operation.
    Unknown,
}

/// `true` for calls to the autorelease pool entry points.
pub fn is_autorelease_pool_call(kind: &InstKind) -> bool {
    matches!(
        kind,
        InstKind::Apply { callee, .. }
            if callee.name == AUTORELEASE_POOL_PUSH || callee.name == AUTORELEASE_POOL_POP
    )
}

/// Classify one instruction.
pub fn classify(func: &Function, inst: InstId) -> RcTransition {
    let data = func.inst(inst);
    match &data.kind {
        InstKind::StrongRetain { operand } | InstKind::RetainValue { operand } => {
            if func.is_trivial(*operand) {
                RcTransition::Unknown
            } else {
                RcTransition::StrongIncrement
            }
        }
        InstKind::StrongRelease { operand } | InstKind::ReleaseValue { operand } => {
            if func.is_trivial(*operand) {
                RcTransition::Unknown
            } else {
                RcTransition::StrongDecrement
            }
        }
        InstKind::AllocRef | InstKind::AllocBox | InstKind::PartialApply { .. } => {
            RcTransition::StrongEntrance
        }
        InstKind::Apply { callee, .. } => {
            if is_autorelease_pool_call(&data.kind) {
                RcTransition::AutoreleasePoolCall
            } else if callee.result == ResultConvention::Owned
                && data.result.is_some_and(|r| !func.is_trivial(r))
            {
                RcTransition::StrongEntrance
            } else {
                RcTransition::Unknown
            }
        }
        InstKind::IntegerLiteral { .. }
        | InstKind::Cast { .. }
        | InstKind::Struct { .. }
        | InstKind::Tuple { .. }
        | InstKind::StructExtract { .. }
        | InstKind::TupleExtract { .. }
        | InstKind::Enum { .. }
        | InstKind::UncheckedEnumData { .. }
        | InstKind::RefElementAddr { .. }
        | InstKind::StructElementAddr { .. }
        | InstKind::Load { .. }
        | InstKind::Store { .. }
        | InstKind::IsUnique { .. }
        | InstKind::FixLifetime { .. }
        | InstKind::DebugValue { .. } => RcTransition::Unknown,
    }
}

/// `true` for `strong_retain` and `retain_value`.
pub fn is_retain(kind: &InstKind) -> bool {
    matches!(kind, InstKind::StrongRetain { .. } | InstKind::RetainValue { .. })
}

/// `true` for `strong_release` and `release_value`.
pub fn is_release(kind: &InstKind) -> bool {
    matches!(kind, InstKind::StrongRelease { .. } | InstKind::ReleaseValue { .. })
}

/// Operand of a retain or release.
pub fn rc_operand(kind: &InstKind) -> Option<ember_ir::ValueId> {
    match kind {
        InstKind::StrongRetain { operand }
        | InstKind::RetainValue { operand }
        | InstKind::StrongRelease { operand }
        | InstKind::ReleaseValue { operand } => Some(*operand),
        _ => None,
    }
}

/// `true` if the instruction may release an object or observe a reference
/// count.
pub fn may_release_or_read_ref_count(kind: &InstKind) -> bool {
    match kind {
        InstKind::StrongRelease { .. } | InstKind::ReleaseValue { .. } | InstKind::IsUnique { .. } => {
            true
        }
        InstKind::Apply { callee, .. } => callee.effects == SideEffects::MayRelease,
        _ => false,
    }
}

/// `true` if the instruction can never decrement any reference count.
pub fn can_never_decrement_ref_counts(kind: &InstKind) -> bool {
    !may_release_or_read_ref_count(kind)
}

/// `true` if the instruction cannot use any value in a way that needs the
/// value to be alive.
pub fn can_never_use_values(kind: &InstKind) -> bool {
    matches!(
        kind,
        InstKind::IntegerLiteral { .. }
            | InstKind::AllocRef
            | InstKind::AllocBox
            | InstKind::DebugValue { .. }
            | InstKind::Cast { .. }
            | InstKind::Struct { .. }
            | InstKind::Tuple { .. }
            | InstKind::Enum { .. }
    )
}

/// `true` if the instruction writes memory, releases, or calls unknown code.
pub fn may_have_side_effects(kind: &InstKind) -> bool {
    match kind {
        InstKind::Apply { callee, .. } => callee.effects == SideEffects::MayRelease,
        InstKind::StrongRetain { .. }
        | InstKind::StrongRelease { .. }
        | InstKind::RetainValue { .. }
        | InstKind::ReleaseValue { .. }
        | InstKind::Store { .. }
        | InstKind::FixLifetime { .. } => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests;
