//! Incremental construction of [`Function`]s.
//!
//! The builder appends instructions to a current block and infers result
//! types from operand types where the instruction determines them
//! (extractions, loads, element addresses). [`FunctionBuilder::finish`]
//! runs the verifier so malformed bodies never reach the optimizer.

use crate::function::{ArgConvention, BlockData, Function, InstData, ValueData, ValueDef};
use crate::inst::{CastKind, Callee, InstKind, Terminator};
use crate::types::{TypeData, TypePool};
use crate::verify::{verify_function, VerifyError};
use crate::{BlockId, InstId, Ty, ValueId};

pub struct FunctionBuilder {
    func: Function,
    current: BlockId,
    terminated: Vec<bool>,
}

impl FunctionBuilder {
    /// Start a function with an empty entry block selected.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_types(name, TypePool::new())
    }

    /// Start a function that reuses an existing type pool.
    pub fn with_types(name: impl Into<String>, types: TypePool) -> Self {
        let func = Function {
            name: name.into(),
            types,
            values: Vec::new(),
            insts: Vec::new(),
            blocks: vec![BlockData {
                args: Vec::new(),
                insts: Vec::new(),
                terminator: Terminator::Unreachable,
            }],
        };
        Self {
            func,
            current: BlockId::new(0),
            terminated: vec![false],
        }
    }

    pub fn types(&mut self) -> &mut TypePool {
        &mut self.func.types
    }

    /// Read access to the function under construction.
    pub fn func(&self) -> &Function {
        &self.func
    }

    pub fn entry(&self) -> BlockId {
        BlockId::new(0)
    }

    pub fn current_block(&self) -> BlockId {
        self.current
    }

    // ── Blocks and arguments ────────────────────────────────────────

    pub fn create_block(&mut self) -> BlockId {
        let id = BlockId::from_len(self.func.blocks.len());
        self.func.blocks.push(BlockData {
            args: Vec::new(),
            insts: Vec::new(),
            terminator: Terminator::Unreachable,
        });
        self.terminated.push(false);
        id
    }

    pub fn switch_to(&mut self, block: BlockId) {
        self.current = block;
    }

    pub fn add_function_arg(&mut self, ty: Ty, convention: ArgConvention) -> ValueId {
        let index = u32::try_from(self.func.blocks[0].args.len())
            .unwrap_or_else(|_| panic!("argument count exceeds u32::MAX"));
        let value = self.new_value(ValueDef::FunctionArg { index, convention }, ty);
        self.func.blocks[0].args.push(value);
        value
    }

    /// Add an argument to a non-entry block.
    ///
    /// # Panics
    ///
    /// Debug-panics if `block` is the entry block; use
    /// [`add_function_arg`](Self::add_function_arg) instead.
    pub fn add_block_arg(&mut self, block: BlockId, ty: Ty) -> ValueId {
        debug_assert_ne!(block.index(), 0, "entry arguments need a convention");
        let index = u32::try_from(self.func.blocks[block.index()].args.len())
            .unwrap_or_else(|_| panic!("argument count exceeds u32::MAX"));
        let value = self.new_value(ValueDef::BlockArg { block, index }, ty);
        self.func.blocks[block.index()].args.push(value);
        value
    }

    fn new_value(&mut self, def: ValueDef, ty: Ty) -> ValueId {
        let id = ValueId::from_len(self.func.values.len());
        self.func.values.push(ValueData { def, ty });
        id
    }

    // ── Instruction emission ────────────────────────────────────────

    /// Append an instruction to the current block.
    ///
    /// `result_ty` must be `Some` exactly when the kind defines a result.
    pub fn push(&mut self, kind: InstKind, result_ty: Option<Ty>) -> (InstId, Option<ValueId>) {
        debug_assert_eq!(
            kind.has_result(),
            result_ty.is_some(),
            "{} result type mismatch",
            kind.mnemonic()
        );
        let inst = InstId::from_len(self.func.insts.len());
        let result = result_ty.map(|ty| self.new_value(ValueDef::Inst(inst), ty));
        self.func.insts.push(InstData {
            kind,
            block: self.current,
            result,
            erased: false,
        });
        self.func.blocks[self.current.index()].insts.push(inst);
        (inst, result)
    }

    fn push_value(&mut self, kind: InstKind, ty: Ty) -> ValueId {
        let (inst, result) = self.push(kind, Some(ty));
        result.unwrap_or_else(|| panic!("instruction {} defines no result", inst.raw()))
    }

    fn push_void(&mut self, kind: InstKind) -> InstId {
        self.push(kind, None).0
    }

    pub fn integer_literal(&mut self, ty: Ty, value: i64) -> ValueId {
        self.push_value(InstKind::IntegerLiteral { value }, ty)
    }

    pub fn strong_retain(&mut self, operand: ValueId) -> InstId {
        self.push_void(InstKind::StrongRetain { operand })
    }

    pub fn strong_release(&mut self, operand: ValueId) -> InstId {
        self.push_void(InstKind::StrongRelease { operand })
    }

    pub fn retain_value(&mut self, operand: ValueId) -> InstId {
        self.push_void(InstKind::RetainValue { operand })
    }

    pub fn release_value(&mut self, operand: ValueId) -> InstId {
        self.push_void(InstKind::ReleaseValue { operand })
    }

    pub fn alloc_ref(&mut self, ty: Ty) -> ValueId {
        self.push_value(InstKind::AllocRef, ty)
    }

    pub fn alloc_box(&mut self, ty: Ty) -> ValueId {
        self.push_value(InstKind::AllocBox, ty)
    }

    pub fn apply(&mut self, callee: Callee, args: Vec<ValueId>, result_ty: Ty) -> ValueId {
        self.push_value(InstKind::Apply { callee, args }, result_ty)
    }

    pub fn partial_apply(&mut self, callee: Callee, args: Vec<ValueId>) -> ValueId {
        let ty = self.func.types.function();
        self.push_value(InstKind::PartialApply { callee, args }, ty)
    }

    pub fn cast(&mut self, kind: CastKind, operand: ValueId, ty: Ty) -> ValueId {
        self.push_value(InstKind::Cast { kind, operand }, ty)
    }

    pub fn struct_value(&mut self, ty: Ty, operands: Vec<ValueId>) -> ValueId {
        self.push_value(InstKind::Struct { operands }, ty)
    }

    pub fn tuple(&mut self, operands: Vec<ValueId>) -> ValueId {
        let elems = operands.iter().map(|&v| self.func.value_ty(v)).collect();
        let ty = self.func.types.tuple(elems);
        self.push_value(InstKind::Tuple { operands }, ty)
    }

    /// # Panics
    ///
    /// Panics if `operand` is not a struct with a field `field`.
    pub fn struct_extract(&mut self, operand: ValueId, field: u32) -> ValueId {
        let ty = self.field_ty(self.func.value_ty(operand), field);
        self.push_value(InstKind::StructExtract { operand, field }, ty)
    }

    /// # Panics
    ///
    /// Panics if `operand` is not a tuple with element `index`.
    pub fn tuple_extract(&mut self, operand: ValueId, index: u32) -> ValueId {
        let ty = self.field_ty(self.func.value_ty(operand), index);
        self.push_value(InstKind::TupleExtract { operand, index }, ty)
    }

    pub fn enum_value(&mut self, ty: Ty, case: u32, payload: Option<ValueId>) -> ValueId {
        self.push_value(InstKind::Enum { case, payload }, ty)
    }

    /// # Panics
    ///
    /// Panics if `case` of the operand's enum type has no payload.
    pub fn unchecked_enum_data(&mut self, operand: ValueId, case: u32) -> ValueId {
        let enum_ty = self.func.value_ty(operand);
        let ty = self
            .func
            .types
            .case_payload(enum_ty, case)
            .unwrap_or_else(|| panic!("case {case} of {enum_ty:?} has no payload"));
        self.push_value(InstKind::UncheckedEnumData { operand, case }, ty)
    }

    pub fn ref_element_addr(&mut self, operand: ValueId, field: u32, field_ty: Ty) -> ValueId {
        let ty = self.func.types.address(field_ty);
        self.push_value(InstKind::RefElementAddr { operand, field }, ty)
    }

    /// # Panics
    ///
    /// Panics if `address` is not the address of a struct with `field`.
    pub fn struct_element_addr(&mut self, address: ValueId, field: u32) -> ValueId {
        let pointee = self.pointee(address);
        let field_ty = self.field_ty(pointee, field);
        let ty = self.func.types.address(field_ty);
        self.push_value(InstKind::StructElementAddr { address, field }, ty)
    }

    /// # Panics
    ///
    /// Panics if `address` is not an address.
    pub fn load(&mut self, address: ValueId) -> ValueId {
        let ty = self.pointee(address);
        self.push_value(InstKind::Load { address }, ty)
    }

    pub fn store(&mut self, value: ValueId, address: ValueId) -> InstId {
        self.push_void(InstKind::Store { value, address })
    }

    pub fn is_unique(&mut self, address: ValueId) -> ValueId {
        let ty = self.func.types.trivial("Bool");
        self.push_value(InstKind::IsUnique { address }, ty)
    }

    pub fn fix_lifetime(&mut self, operand: ValueId) -> InstId {
        self.push_void(InstKind::FixLifetime { operand })
    }

    pub fn debug_value(&mut self, operand: ValueId) -> InstId {
        self.push_void(InstKind::DebugValue { operand })
    }

    fn pointee(&self, address: ValueId) -> Ty {
        let ty = self.func.value_ty(address);
        self.func
            .types
            .pointee(ty)
            .unwrap_or_else(|| panic!("{address:?} is not an address"))
    }

    fn field_ty(&self, aggregate: Ty, field: u32) -> Ty {
        match self.func.types.get(aggregate) {
            TypeData::Struct { fields, .. } | TypeData::Tuple(fields) => fields
                .get(field as usize)
                .copied()
                .unwrap_or_else(|| panic!("field {field} out of range for {aggregate:?}")),
            other => panic!("{other:?} is not an aggregate"),
        }
    }

    // ── Terminators ─────────────────────────────────────────────────

    /// Set the terminator of the current block.
    ///
    /// # Panics
    ///
    /// Debug-panics if the block already has a terminator.
    pub fn terminate(&mut self, terminator: Terminator) {
        let idx = self.current.index();
        debug_assert!(!self.terminated[idx], "block {idx} terminated twice");
        self.func.blocks[idx].terminator = terminator;
        self.terminated[idx] = true;
    }

    pub fn ret(&mut self, value: ValueId) {
        self.terminate(Terminator::Return { value });
    }

    pub fn throw(&mut self, value: ValueId) {
        self.terminate(Terminator::Throw { value });
    }

    pub fn br(&mut self, dest: BlockId, args: Vec<ValueId>) {
        self.terminate(Terminator::Br { dest, args });
    }

    pub fn cond_br(
        &mut self,
        cond: ValueId,
        true_dest: BlockId,
        true_args: Vec<ValueId>,
        false_dest: BlockId,
        false_args: Vec<ValueId>,
    ) {
        self.terminate(Terminator::CondBr {
            cond,
            true_dest,
            true_args,
            false_dest,
            false_args,
        });
    }

    pub fn switch_enum(
        &mut self,
        operand: ValueId,
        cases: Vec<(u32, BlockId)>,
        default: Option<BlockId>,
    ) {
        self.terminate(Terminator::SwitchEnum {
            operand,
            cases,
            default,
        });
    }

    pub fn unreachable(&mut self) {
        self.terminate(Terminator::Unreachable);
    }

    /// Finish construction and verify the result.
    pub fn finish(self) -> Result<Function, VerifyError> {
        if let Some(idx) = self.terminated.iter().position(|&t| !t) {
            return Err(VerifyError::MissingTerminator {
                block: BlockId::from_len(idx),
            });
        }
        verify_function(&self.func)?;
        Ok(self.func)
    }
}
