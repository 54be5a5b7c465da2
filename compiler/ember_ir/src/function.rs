//! Function bodies: values, instructions and basic blocks.
//!
//! A [`Function`] owns three dense tables (values, instructions, blocks)
//! plus its [`TypePool`]. Instructions are never physically removed from the
//! instruction table; [`Function::erase_inst`] unlinks them from their block
//! and marks them erased so that outstanding [`InstId`]s stay valid.

use crate::inst::{InstKind, Terminator};
use crate::types::TypePool;
use crate::{BlockId, InstId, Ty, ValueId};

// ── Values ──────────────────────────────────────────────────────────

/// Calling convention of a function argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArgConvention {
    /// Callee receives +1 and must consume it.
    Owned,
    /// Caller keeps the value alive for the whole call.
    Guaranteed,
    /// Address of a value the caller keeps alive for the whole call.
    InGuaranteed,
    /// Address the callee may read and write.
    Inout,
    /// +0 with no lifetime guarantee.
    Unowned,
}

impl ArgConvention {
    pub fn spelling(self) -> &'static str {
        match self {
            ArgConvention::Owned => "@owned",
            ArgConvention::Guaranteed => "@guaranteed",
            ArgConvention::InGuaranteed => "@in_guaranteed",
            ArgConvention::Inout => "@inout",
            ArgConvention::Unowned => "@unowned",
        }
    }
}

/// Where a value comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueDef {
    /// Argument of the entry block.
    FunctionArg { index: u32, convention: ArgConvention },
    /// Argument of a non-entry block (a phi, or a `switch_enum` payload).
    BlockArg { block: BlockId, index: u32 },
    /// Result of an instruction.
    Inst(InstId),
}

#[derive(Clone, Debug)]
pub struct ValueData {
    pub def: ValueDef,
    pub ty: Ty,
}

// ── Instructions and blocks ─────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct InstData {
    pub kind: InstKind,
    pub block: BlockId,
    pub result: Option<ValueId>,
    pub(crate) erased: bool,
}

impl InstData {
    #[inline]
    pub fn is_erased(&self) -> bool {
        self.erased
    }
}

#[derive(Clone, Debug)]
pub struct BlockData {
    pub args: Vec<ValueId>,
    pub insts: Vec<InstId>,
    pub terminator: Terminator,
}

// ── Function ────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct Function {
    pub name: String,
    pub types: TypePool,
    pub(crate) values: Vec<ValueData>,
    pub(crate) insts: Vec<InstData>,
    pub(crate) blocks: Vec<BlockData>,
}

impl Function {
    /// The entry block is always block 0.
    #[inline]
    pub fn entry(&self) -> BlockId {
        BlockId::new(0)
    }

    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    /// All block IDs in layout order.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        (0..self.blocks.len()).map(BlockId::from_len)
    }

    #[inline]
    pub fn block(&self, block: BlockId) -> &BlockData {
        &self.blocks[block.index()]
    }

    #[inline]
    pub fn terminator(&self, block: BlockId) -> &Terminator {
        &self.blocks[block.index()].terminator
    }

    #[inline]
    pub fn inst(&self, inst: InstId) -> &InstData {
        &self.insts[inst.index()]
    }

    #[inline]
    pub fn value(&self, value: ValueId) -> &ValueData {
        &self.values[value.index()]
    }

    #[inline]
    pub fn value_ty(&self, value: ValueId) -> Ty {
        self.values[value.index()].ty
    }

    /// `true` if the value's type never needs reference counting.
    #[inline]
    pub fn is_trivial(&self, value: ValueId) -> bool {
        self.types.is_trivial(self.value_ty(value))
    }

    /// Arguments of the entry block.
    pub fn function_args(&self) -> &[ValueId] {
        &self.blocks[0].args
    }

    /// Convention of a function argument, `None` for any other value.
    pub fn arg_convention(&self, value: ValueId) -> Option<ArgConvention> {
        match self.value(value).def {
            ValueDef::FunctionArg { convention, .. } => Some(convention),
            _ => None,
        }
    }

    /// Instruction defining `value`, if it is an instruction result.
    pub fn defining_inst(&self, value: ValueId) -> Option<InstId> {
        match self.value(value).def {
            ValueDef::Inst(inst) => Some(inst),
            _ => None,
        }
    }

    /// Kind of the instruction defining `value`.
    pub fn defining_kind(&self, value: ValueId) -> Option<&InstKind> {
        self.defining_inst(value).map(|inst| &self.inst(inst).kind)
    }

    /// Block in which `value` is defined.
    pub fn value_block(&self, value: ValueId) -> BlockId {
        match self.value(value).def {
            ValueDef::FunctionArg { .. } => self.entry(),
            ValueDef::BlockArg { block, .. } => block,
            ValueDef::Inst(inst) => self.inst(inst).block,
        }
    }

    /// `Some((block, index))` for arguments of non-entry blocks.
    pub fn as_block_arg(&self, value: ValueId) -> Option<(BlockId, u32)> {
        match self.value(value).def {
            ValueDef::BlockArg { block, index } => Some((block, index)),
            _ => None,
        }
    }

    /// `true` if `value` is built by a no-payload `enum` instruction.
    pub fn is_no_payload_enum(&self, value: ValueId) -> bool {
        matches!(self.defining_kind(value), Some(InstKind::Enum { payload: None, .. }))
    }

    /// Live instructions of all blocks, in layout order.
    pub fn all_insts(&self) -> impl Iterator<Item = InstId> + '_ {
        self.blocks.iter().flat_map(|b| b.insts.iter().copied())
    }

    /// Number of live (non-erased) instructions.
    pub fn live_inst_count(&self) -> usize {
        self.blocks.iter().map(|b| b.insts.len()).sum()
    }

    /// Position of `inst` inside its block.
    pub fn inst_position(&self, inst: InstId) -> Option<usize> {
        let block = self.inst(inst).block;
        self.block(block).insts.iter().position(|&i| i == inst)
    }

    /// Value passed for argument `index` of `block` along the edge from `pred`.
    ///
    /// Returns `None` if the edge carries no explicit argument (for example
    /// a `switch_enum` payload).
    pub fn incoming_value(&self, pred: BlockId, block: BlockId, index: u32) -> Option<ValueId> {
        self.terminator(pred)
            .branch_args(block)
            .and_then(|args| args.get(index as usize).copied())
    }

    // ── Mutation ────────────────────────────────────────────────────

    /// Unlink `inst` from its block.
    ///
    /// Returns the erased instruction's result, if any, so callers can
    /// forward deletion notifications to caches keyed by value.
    ///
    /// # Panics
    ///
    /// Debug-panics if the instruction was already erased.
    pub fn erase_inst(&mut self, inst: InstId) -> Option<ValueId> {
        let data = &mut self.insts[inst.index()];
        debug_assert!(!data.erased, "instruction {} erased twice", inst.raw());
        data.erased = true;
        let block = data.block;
        let result = data.result;
        self.blocks[block.index()].insts.retain(|&i| i != inst);
        result
    }
}
