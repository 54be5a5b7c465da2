//! Structural verification of function bodies.

use thiserror::Error;

use crate::function::Function;
use crate::inst::{InstKind, Terminator};
use crate::types::TypeData;
use crate::{BlockId, InstId, ValueId};

/// A malformed function body.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("block {} has no terminator", block.raw())]
    MissingTerminator { block: BlockId },

    #[error("block {} branches to unknown block {}", from.raw(), to.raw())]
    UnknownBlock { from: BlockId, to: BlockId },

    #[error("entry block has a predecessor (block {})", pred.raw())]
    EntryHasPredecessor { pred: BlockId },

    #[error(
        "edge {} -> {} passes {found} argument(s), block expects {expected}",
        from.raw(),
        to.raw()
    )]
    BranchArgCount {
        from: BlockId,
        to: BlockId,
        expected: usize,
        found: usize,
    },

    #[error("switch_enum in block {} targets block {} which expects {expected} argument(s)", from.raw(), to.raw())]
    SwitchDestArgs {
        from: BlockId,
        to: BlockId,
        expected: usize,
    },

    #[error("instruction {} uses undefined value {}", inst.raw(), value.raw())]
    UndefinedValue { inst: InstId, value: ValueId },

    #[error("instruction {} requires an address operand", inst.raw())]
    NotAnAddress { inst: InstId },

    #[error("instruction {} extracts field {field} which does not exist", inst.raw())]
    FieldOutOfRange { inst: InstId, field: u32 },
}

/// Check the invariants the optimizer relies on.
pub fn verify_function(func: &Function) -> Result<(), VerifyError> {
    let num_values = func.num_values();
    for block in func.block_ids() {
        for &inst in &func.block(block).insts {
            let data = func.inst(inst);
            for value in data.kind.operands() {
                if value.index() >= num_values {
                    return Err(VerifyError::UndefinedValue { inst, value });
                }
            }
            verify_inst(func, inst, &data.kind)?;
        }
        verify_terminator(func, block)?;
    }
    Ok(())
}

fn verify_inst(func: &Function, inst: InstId, kind: &InstKind) -> Result<(), VerifyError> {
    match kind {
        InstKind::Load { address }
        | InstKind::IsUnique { address }
        | InstKind::StructElementAddr { address, .. }
        | InstKind::Store { address, .. } => {
            if !func.types.is_address(func.value_ty(*address)) {
                return Err(VerifyError::NotAnAddress { inst });
            }
        }
        InstKind::StructExtract { operand, field: index }
        | InstKind::TupleExtract { operand, index } => {
            let in_range = func
                .types
                .fields(func.value_ty(*operand))
                .is_some_and(|fields| (*index as usize) < fields.len());
            if !in_range {
                return Err(VerifyError::FieldOutOfRange { inst, field: *index });
            }
        }
        InstKind::UncheckedEnumData { operand, case } => {
            let ty = func.value_ty(*operand);
            if !matches!(func.types.get(ty), TypeData::Enum { .. })
                || func.types.case_payload(ty, *case).is_none()
            {
                return Err(VerifyError::FieldOutOfRange { inst, field: *case });
            }
        }
        _ => {}
    }
    Ok(())
}

fn verify_terminator(func: &Function, block: BlockId) -> Result<(), VerifyError> {
    let terminator = func.terminator(block);
    for dest in terminator.successors() {
        if dest.index() >= func.num_blocks() {
            return Err(VerifyError::UnknownBlock { from: block, to: dest });
        }
        if dest == func.entry() {
            return Err(VerifyError::EntryHasPredecessor { pred: block });
        }
    }

    let check_args = |dest: BlockId, args: &[ValueId]| {
        let expected = func.block(dest).args.len();
        if expected == args.len() {
            Ok(())
        } else {
            Err(VerifyError::BranchArgCount {
                from: block,
                to: dest,
                expected,
                found: args.len(),
            })
        }
    };

    match terminator {
        Terminator::Br { dest, args } => check_args(*dest, args),
        Terminator::CondBr {
            true_dest,
            true_args,
            false_dest,
            false_args,
            ..
        } => {
            check_args(*true_dest, true_args)?;
            check_args(*false_dest, false_args)
        }
        Terminator::SwitchEnum {
            operand,
            cases,
            default,
        } => {
            let enum_ty = func.value_ty(*operand);
            for &(case, dest) in cases {
                let expected = usize::from(func.types.case_payload(enum_ty, case).is_some());
                if func.block(dest).args.len() != expected {
                    return Err(VerifyError::SwitchDestArgs {
                        from: block,
                        to: dest,
                        expected,
                    });
                }
            }
            if let Some(dest) = default {
                if !func.block(*dest).args.is_empty() {
                    return Err(VerifyError::SwitchDestArgs {
                        from: block,
                        to: *dest,
                        expected: 0,
                    });
                }
            }
            Ok(())
        }
        Terminator::Return { .. } | Terminator::Throw { .. } | Terminator::Unreachable => Ok(()),
    }
}
