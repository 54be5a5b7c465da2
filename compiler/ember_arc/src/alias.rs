//! Alias queries used by the ARC optimizer.
//!
//! [`AliasAnalysis`] answers the two primitive questions (may two values
//! refer to the same object, may a call release a given object).
//! [`ArcQueries`] bundles it with the function and its RC identity info
//! and derives what the dataflow evaluator asks per tracked root:
//! may this instruction decrement the root, may it use the root.

use ember_ir::{BlockId, Function, InstId, InstKind, SideEffects, ValueId};

use crate::classify::{can_never_use_values, may_release_or_read_ref_count, rc_operand};
use crate::rc_identity::RcIdentityFunctionInfo;

/// Primitive alias queries.
pub trait AliasAnalysis {
    /// Could `a` and `b` refer to the same object (or, for addresses, to
    /// memory inside the same object)?
    fn may_alias(&self, func: &Function, a: ValueId, b: ValueId) -> bool;

    /// Could the call `apply` decrement the reference count of `ptr`?
    fn can_apply_decrement_ref_count(&self, func: &Function, apply: InstId, ptr: ValueId) -> bool;
}

/// Type- and allocation-based alias analysis.
///
/// - trivial non-address values alias nothing;
/// - two distinct allocations never alias;
/// - projections of an address alias their base object;
/// - everything else may alias.
#[derive(Clone, Copy, Debug, Default)]
pub struct BasicAliasAnalysis;

/// Strip address projections and identity-preserving casts.
pub fn underlying_object(func: &Function, mut value: ValueId) -> ValueId {
    loop {
        match func.defining_kind(value) {
            Some(
                InstKind::RefElementAddr { operand, .. }
                | InstKind::StructElementAddr { address: operand, .. },
            ) => value = *operand,
            Some(InstKind::Cast { kind, operand }) if kind.preserves_rc_identity() => {
                value = *operand;
            }
            _ => return value,
        }
    }
}

fn is_identified_object(func: &Function, value: ValueId) -> bool {
    matches!(
        func.defining_kind(value),
        Some(InstKind::AllocRef | InstKind::AllocBox)
    )
}

fn carries_no_reference(func: &Function, value: ValueId) -> bool {
    let ty = func.value_ty(value);
    func.types.is_trivial(ty) && !func.types.is_address(ty)
}

impl AliasAnalysis for BasicAliasAnalysis {
    fn may_alias(&self, func: &Function, a: ValueId, b: ValueId) -> bool {
        if a == b {
            return true;
        }
        if carries_no_reference(func, a) || carries_no_reference(func, b) {
            return false;
        }
        let (ua, ub) = (underlying_object(func, a), underlying_object(func, b));
        if ua == ub {
            return true;
        }
        !(is_identified_object(func, ua) && is_identified_object(func, ub))
    }

    fn can_apply_decrement_ref_count(&self, func: &Function, apply: InstId, _ptr: ValueId) -> bool {
        match &func.inst(apply).kind {
            InstKind::Apply { callee, .. } => callee.effects == SideEffects::MayRelease,
            _ => false,
        }
    }
}

/// Per-function view combining the IR, RC identity and alias analysis.
#[derive(Clone, Copy)]
pub struct ArcQueries<'a> {
    pub func: &'a Function,
    pub rcfi: &'a RcIdentityFunctionInfo,
    pub aa: &'a dyn AliasAnalysis,
}

impl<'a> ArcQueries<'a> {
    pub fn new(
        func: &'a Function,
        rcfi: &'a RcIdentityFunctionInfo,
        aa: &'a dyn AliasAnalysis,
    ) -> Self {
        Self { func, rcfi, aa }
    }

    /// RC identity root of `value`.
    #[inline]
    pub fn root(&self, value: ValueId) -> ValueId {
        self.rcfi.root(self.func, value)
    }

    /// Could `inst` decrement the reference count of `root` (or read it)?
    pub fn may_decrement_ref_count(&self, inst: InstId, root: ValueId) -> bool {
        let kind = &self.func.inst(inst).kind;
        match kind {
            InstKind::Apply { .. } => self.aa.can_apply_decrement_ref_count(self.func, inst, root),
            _ => {
                if let Some(operand) = rc_operand(kind) {
                    if self.func.is_trivial(operand) {
                        return false;
                    }
                }
                may_release_or_read_ref_count(kind)
            }
        }
    }

    /// Could `inst` use `root` in a way that requires it to be alive?
    pub fn may_use(&self, inst: InstId, root: ValueId) -> bool {
        let kind = &self.func.inst(inst).kind;
        if can_never_use_values(kind) {
            return false;
        }
        match kind {
            InstKind::Apply { callee, args } => {
                callee.effects != SideEffects::None || self.any_operand_aliases(args, root)
            }
            InstKind::Load { address } => {
                self.aa
                    .may_alias(self.func, underlying_object(self.func, *address), root)
            }
            _ => self.any_operand_aliases(&kind.operands(), root),
        }
    }

    /// Could `inst` observe `root` in either direction: read it, or change
    /// its reference count?
    pub fn may_have_symmetric_interference(&self, inst: InstId, root: ValueId) -> bool {
        self.may_use(inst, root) || self.may_decrement_ref_count(inst, root)
    }

    /// Could the terminator of `block` use `root`?
    pub fn terminator_may_use(&self, block: BlockId, root: ValueId) -> bool {
        self.any_operand_aliases(&self.func.terminator(block).operands(), root)
    }

    fn any_operand_aliases(&self, operands: &[ValueId], root: ValueId) -> bool {
        operands.iter().any(|&op| {
            if carries_no_reference(self.func, op) {
                return false;
            }
            self.aa.may_alias(self.func, self.root(op), root)
        })
    }
}

#[cfg(test)]
mod tests;
