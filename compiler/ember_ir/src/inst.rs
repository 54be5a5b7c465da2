//! Instruction set.
//!
//! A closed set of instruction kinds. Everything the ARC optimizer needs to
//! know about an instruction (its operands, whether it is a retain or a
//! release, whether it can touch reference counts) is answered by an
//! exhaustive `match` over [`InstKind`], so adding a kind forces every
//! query to be revisited.

use smallvec::{smallvec, SmallVec};

use crate::{BlockId, ValueId};

// ── Calls ───────────────────────────────────────────────────────────

/// What a callee may do to memory and reference counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SideEffects {
    /// Pure: reads and writes nothing.
    None,
    /// May read memory, never writes or releases.
    ReadOnly,
    /// Unknown: may write memory and release any object.
    MayRelease,
}

/// Ownership convention of a call result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResultConvention {
    /// The caller receives a +1 reference.
    Owned,
    /// The caller receives a +0 reference.
    Unowned,
}

/// Statically known call target.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Callee {
    pub name: String,
    pub effects: SideEffects,
    pub result: ResultConvention,
}

impl Callee {
    pub fn new(name: impl Into<String>, effects: SideEffects, result: ResultConvention) -> Self {
        Self {
            name: name.into(),
            effects,
            result,
        }
    }
}

/// Runtime entry point that pushes an autorelease pool.
pub const AUTORELEASE_POOL_PUSH: &str = "objc_autoreleasePoolPush";
/// Runtime entry point that drains an autorelease pool.
pub const AUTORELEASE_POOL_POP: &str = "objc_autoreleasePoolPop";

// ── Casts ───────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CastKind {
    Upcast,
    UncheckedRefCast,
    UnconditionalCheckedCast,
    OpenExistentialRef,
    InitExistentialRef,
    RefToBridgeObject,
    BridgeObjectToRef,
    ConvertFunction,
    UncheckedBitwiseCast,
    RefToRawPointer,
    RawPointerToRef,
}

impl CastKind {
    /// `true` if the result refers to the same reference-counted object as
    /// the operand.
    ///
    /// Bitwise and raw-pointer casts are excluded: the result is not
    /// guaranteed to be a live reference.
    pub fn preserves_rc_identity(self) -> bool {
        match self {
            CastKind::Upcast
            | CastKind::UncheckedRefCast
            | CastKind::UnconditionalCheckedCast
            | CastKind::OpenExistentialRef
            | CastKind::InitExistentialRef
            | CastKind::RefToBridgeObject
            | CastKind::BridgeObjectToRef
            | CastKind::ConvertFunction => true,
            CastKind::UncheckedBitwiseCast | CastKind::RefToRawPointer | CastKind::RawPointerToRef => {
                false
            }
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            CastKind::Upcast => "upcast",
            CastKind::UncheckedRefCast => "unchecked_ref_cast",
            CastKind::UnconditionalCheckedCast => "unconditional_checked_cast",
            CastKind::OpenExistentialRef => "open_existential_ref",
            CastKind::InitExistentialRef => "init_existential_ref",
            CastKind::RefToBridgeObject => "ref_to_bridge_object",
            CastKind::BridgeObjectToRef => "bridge_object_to_ref",
            CastKind::ConvertFunction => "convert_function",
            CastKind::UncheckedBitwiseCast => "unchecked_bitwise_cast",
            CastKind::RefToRawPointer => "ref_to_raw_pointer",
            CastKind::RawPointerToRef => "raw_pointer_to_ref",
        }
    }
}

// ── Instructions ────────────────────────────────────────────────────

/// Non-terminator instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstKind {
    IntegerLiteral { value: i64 },

    /// Increment the strong count of a class reference.
    StrongRetain { operand: ValueId },
    /// Decrement the strong count of a class reference.
    StrongRelease { operand: ValueId },
    /// Retain every reference held by a value of any type.
    RetainValue { operand: ValueId },
    /// Release every reference held by a value of any type.
    ReleaseValue { operand: ValueId },

    /// Allocate a class instance (+1).
    AllocRef,
    /// Allocate a heap box (+1).
    AllocBox,

    Apply { callee: Callee, args: Vec<ValueId> },
    /// Build a closure capturing `args` (+1 result; consumes the captures).
    PartialApply { callee: Callee, args: Vec<ValueId> },

    Cast { kind: CastKind, operand: ValueId },

    Struct { operands: Vec<ValueId> },
    Tuple { operands: Vec<ValueId> },
    StructExtract { operand: ValueId, field: u32 },
    TupleExtract { operand: ValueId, index: u32 },

    /// Construct enum case `case`, with a payload for payload cases.
    Enum { case: u32, payload: Option<ValueId> },
    /// Project the payload out of an enum known to be in `case`.
    UncheckedEnumData { operand: ValueId, case: u32 },

    RefElementAddr { operand: ValueId, field: u32 },
    StructElementAddr { address: ValueId, field: u32 },
    Load { address: ValueId },
    /// Initializing store; does not release a previous value.
    Store { value: ValueId, address: ValueId },

    /// Query whether the object at `address` is uniquely referenced.
    IsUnique { address: ValueId },

    FixLifetime { operand: ValueId },
    DebugValue { operand: ValueId },
}

impl InstKind {
    /// Operands in source order.
    pub fn operands(&self) -> SmallVec<[ValueId; 4]> {
        match self {
            InstKind::IntegerLiteral { .. } | InstKind::AllocRef | InstKind::AllocBox => {
                SmallVec::new()
            }
            InstKind::StrongRetain { operand }
            | InstKind::StrongRelease { operand }
            | InstKind::RetainValue { operand }
            | InstKind::ReleaseValue { operand }
            | InstKind::Cast { operand, .. }
            | InstKind::StructExtract { operand, .. }
            | InstKind::TupleExtract { operand, .. }
            | InstKind::UncheckedEnumData { operand, .. }
            | InstKind::RefElementAddr { operand, .. }
            | InstKind::FixLifetime { operand }
            | InstKind::DebugValue { operand } => smallvec![*operand],
            InstKind::StructElementAddr { address, .. }
            | InstKind::Load { address }
            | InstKind::IsUnique { address } => smallvec![*address],
            InstKind::Apply { args, .. } | InstKind::PartialApply { args, .. } => {
                args.iter().copied().collect()
            }
            InstKind::Struct { operands } | InstKind::Tuple { operands } => {
                operands.iter().copied().collect()
            }
            InstKind::Enum { payload, .. } => payload.iter().copied().collect(),
            InstKind::Store { value, address } => smallvec![*value, *address],
        }
    }

    /// `true` for instructions that define a result value.
    pub fn has_result(&self) -> bool {
        !matches!(
            self,
            InstKind::StrongRetain { .. }
                | InstKind::StrongRelease { .. }
                | InstKind::RetainValue { .. }
                | InstKind::ReleaseValue { .. }
                | InstKind::Store { .. }
                | InstKind::FixLifetime { .. }
                | InstKind::DebugValue { .. }
        )
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            InstKind::IntegerLiteral { .. } => "integer_literal",
            InstKind::StrongRetain { .. } => "strong_retain",
            InstKind::StrongRelease { .. } => "strong_release",
            InstKind::RetainValue { .. } => "retain_value",
            InstKind::ReleaseValue { .. } => "release_value",
            InstKind::AllocRef => "alloc_ref",
            InstKind::AllocBox => "alloc_box",
            InstKind::Apply { .. } => "apply",
            InstKind::PartialApply { .. } => "partial_apply",
            InstKind::Cast { kind, .. } => kind.mnemonic(),
            InstKind::Struct { .. } => "struct",
            InstKind::Tuple { .. } => "tuple",
            InstKind::StructExtract { .. } => "struct_extract",
            InstKind::TupleExtract { .. } => "tuple_extract",
            InstKind::Enum { .. } => "enum",
            InstKind::UncheckedEnumData { .. } => "unchecked_enum_data",
            InstKind::RefElementAddr { .. } => "ref_element_addr",
            InstKind::StructElementAddr { .. } => "struct_element_addr",
            InstKind::Load { .. } => "load",
            InstKind::Store { .. } => "store",
            InstKind::IsUnique { .. } => "is_unique",
            InstKind::FixLifetime { .. } => "fix_lifetime",
            InstKind::DebugValue { .. } => "debug_value",
        }
    }
}

// ── Terminators ─────────────────────────────────────────────────────

/// Block terminator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Terminator {
    Return {
        value: ValueId,
    },
    Throw {
        value: ValueId,
    },
    Br {
        dest: BlockId,
        args: Vec<ValueId>,
    },
    CondBr {
        cond: ValueId,
        true_dest: BlockId,
        true_args: Vec<ValueId>,
        false_dest: BlockId,
        false_args: Vec<ValueId>,
    },
    /// Dispatch on an enum case.
    ///
    /// The destination of a payload case takes the payload as its single
    /// block argument; the destination of a no-payload case takes none.
    SwitchEnum {
        operand: ValueId,
        cases: Vec<(u32, BlockId)>,
        default: Option<BlockId>,
    },
    Unreachable,
}

impl Terminator {
    /// Successor blocks in edge order (duplicates preserved).
    pub fn successors(&self) -> SmallVec<[BlockId; 4]> {
        match self {
            Terminator::Return { .. } | Terminator::Throw { .. } | Terminator::Unreachable => {
                SmallVec::new()
            }
            Terminator::Br { dest, .. } => smallvec![*dest],
            Terminator::CondBr {
                true_dest,
                false_dest,
                ..
            } => smallvec![*true_dest, *false_dest],
            Terminator::SwitchEnum { cases, default, .. } => {
                let mut targets: SmallVec<[BlockId; 4]> = cases.iter().map(|&(_, b)| b).collect();
                targets.extend(*default);
                targets
            }
        }
    }

    /// Operands in source order, including branch arguments.
    pub fn operands(&self) -> SmallVec<[ValueId; 4]> {
        match self {
            Terminator::Return { value } | Terminator::Throw { value } => smallvec![*value],
            Terminator::Br { args, .. } => args.iter().copied().collect(),
            Terminator::CondBr {
                cond,
                true_args,
                false_args,
                ..
            } => {
                let mut ops: SmallVec<[ValueId; 4]> = smallvec![*cond];
                ops.extend(true_args.iter().copied());
                ops.extend(false_args.iter().copied());
                ops
            }
            Terminator::SwitchEnum { operand, .. } => smallvec![*operand],
            Terminator::Unreachable => SmallVec::new(),
        }
    }

    /// Explicit arguments passed to `dest`.
    ///
    /// Returns `None` when the terminator does not branch to `dest` with
    /// explicit arguments (a `switch_enum` payload is implicit), or when a
    /// conditional branch reaches `dest` on both edges with different
    /// arguments.
    pub fn branch_args(&self, dest: BlockId) -> Option<&[ValueId]> {
        match self {
            Terminator::Br { dest: d, args } if *d == dest => Some(args),
            Terminator::CondBr {
                true_dest,
                true_args,
                false_dest,
                false_args,
                ..
            } => match (*true_dest == dest, *false_dest == dest) {
                (true, true) if true_args == false_args => Some(true_args),
                (true, false) => Some(true_args),
                (false, true) => Some(false_args),
                _ => None,
            },
            _ => None,
        }
    }

    /// `true` for `return` and `throw`.
    pub fn is_function_exit(&self) -> bool {
        matches!(self, Terminator::Return { .. } | Terminator::Throw { .. })
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            Terminator::Return { .. } => "return",
            Terminator::Throw { .. } => "throw",
            Terminator::Br { .. } => "br",
            Terminator::CondBr { .. } => "cond_br",
            Terminator::SwitchEnum { .. } => "switch_enum",
            Terminator::Unreachable => "unreachable",
        }
    }
}
