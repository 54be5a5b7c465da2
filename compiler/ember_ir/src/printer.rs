//! Textual dump of function bodies, used in trace logs and test failures.
//!
//! ```text
//! fn @f(%0: @guaranteed Foo) {
//! bb0:
//!   strong_retain %0
//!   %1 = apply @foo(%0) : Bar
//!   strong_release %0
//!   return %1
//! }
//! ```

use std::fmt::{self, Write as _};

use crate::function::{Function, ValueDef};
use crate::inst::{InstKind, Terminator};
use crate::{BlockId, ValueId};

fn value_list(values: &[ValueId]) -> String {
    let mut out = String::new();
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "%{}", v.raw());
    }
    out
}

fn write_inst_body(f: &mut fmt::Formatter<'_>, kind: &InstKind) -> fmt::Result {
    let mnemonic = kind.mnemonic();
    match kind {
        InstKind::IntegerLiteral { value } => write!(f, "{mnemonic} {value}"),
        InstKind::Apply { callee, args } | InstKind::PartialApply { callee, args } => {
            write!(f, "{mnemonic} @{}({})", callee.name, value_list(args))
        }
        InstKind::StructExtract { operand, field }
        | InstKind::RefElementAddr { operand, field } => {
            write!(f, "{mnemonic} %{}, #{field}", operand.raw())
        }
        InstKind::StructElementAddr { address, field } => {
            write!(f, "{mnemonic} %{}, #{field}", address.raw())
        }
        InstKind::TupleExtract { operand, index } => {
            write!(f, "{mnemonic} %{}, {index}", operand.raw())
        }
        InstKind::Enum { case, payload } => match payload {
            Some(p) => write!(f, "{mnemonic} #{case}, %{}", p.raw()),
            None => write!(f, "{mnemonic} #{case}"),
        },
        InstKind::UncheckedEnumData { operand, case } => {
            write!(f, "{mnemonic} %{}, #{case}", operand.raw())
        }
        InstKind::Store { value, address } => {
            write!(f, "{mnemonic} %{} to %{}", value.raw(), address.raw())
        }
        _ => write!(f, "{mnemonic} {}", value_list(&kind.operands())),
    }
}

fn write_dest(f: &mut fmt::Formatter<'_>, dest: BlockId, args: &[ValueId]) -> fmt::Result {
    if args.is_empty() {
        write!(f, "bb{}", dest.raw())
    } else {
        write!(f, "bb{}({})", dest.raw(), value_list(args))
    }
}

fn write_terminator(f: &mut fmt::Formatter<'_>, terminator: &Terminator) -> fmt::Result {
    let mnemonic = terminator.mnemonic();
    match terminator {
        Terminator::Return { value } | Terminator::Throw { value } => {
            write!(f, "{mnemonic} %{}", value.raw())
        }
        Terminator::Br { dest, args } => {
            write!(f, "{mnemonic} ")?;
            write_dest(f, *dest, args)
        }
        Terminator::CondBr {
            cond,
            true_dest,
            true_args,
            false_dest,
            false_args,
        } => {
            write!(f, "{mnemonic} %{}, ", cond.raw())?;
            write_dest(f, *true_dest, true_args)?;
            write!(f, ", ")?;
            write_dest(f, *false_dest, false_args)
        }
        Terminator::SwitchEnum {
            operand,
            cases,
            default,
        } => {
            write!(f, "{mnemonic} %{}", operand.raw())?;
            for (case, dest) in cases {
                write!(f, ", case #{case}: bb{}", dest.raw())?;
            }
            if let Some(dest) = default {
                write!(f, ", default: bb{}", dest.raw())?;
            }
            Ok(())
        }
        Terminator::Unreachable => f.write_str(mnemonic),
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn @{}(", self.name)?;
        for (i, &arg) in self.function_args().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            let ty = self.types.display_name(self.value_ty(arg));
            match self.value(arg).def {
                ValueDef::FunctionArg { convention, .. } => {
                    write!(f, "%{}: {} {ty}", arg.raw(), convention.spelling())?;
                }
                _ => write!(f, "%{}: {ty}", arg.raw())?,
            }
        }
        writeln!(f, ") {{")?;

        for block in self.block_ids() {
            let data = self.block(block);
            if block == self.entry() || data.args.is_empty() {
                writeln!(f, "bb{}:", block.raw())?;
            } else {
                let args: Vec<String> = data
                    .args
                    .iter()
                    .map(|&a| format!("%{}: {}", a.raw(), self.types.display_name(self.value_ty(a))))
                    .collect();
                writeln!(f, "bb{}({}):", block.raw(), args.join(", "))?;
            }
            for &inst in &data.insts {
                let inst_data = self.inst(inst);
                f.write_str("  ")?;
                if let Some(result) = inst_data.result {
                    write!(f, "%{} = ", result.raw())?;
                }
                write_inst_body(f, &inst_data.kind)?;
                if let Some(result) = inst_data.result {
                    write!(f, " : {}", self.types.display_name(self.value_ty(result)))?;
                }
                f.write_str("\n")?;
            }
            f.write_str("  ")?;
            write_terminator(f, &data.terminator)?;
            f.write_str("\n")?;
        }
        f.write_str("}")
    }
}
