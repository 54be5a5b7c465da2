//! Epilogue retain/release discovery.
//!
//! For a value (an owned argument, or a returned value) finds the retains or
//! releases that settle its reference count obligation right before the
//! function exits: exactly one per path to an exit, with nothing in between
//! that could interfere.
//!
//! The analysis is a one-bit backward dataflow over post-order. A block's
//! bit is set when every path from its start to an interesting exit is
//! still looking for an epilogue instruction. Exits start set; the
//! interesting instruction found walking up a block clears it, and a
//! blocking instruction seen first aborts the whole analysis. A block whose
//! successors disagree means some exit path has an epilogue instruction and
//! another does not, which is a failure as well.
//!
//! Failures are reported as an empty result, which callers must read as
//! "no information".

use std::cell::RefCell;
use std::rc::Rc;

use ember_ir::{ArgConvention, BlockId, InstId, InstKind, Terminator, ValueId};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::alias::ArcQueries;
use crate::classify::{is_release, is_retain, rc_operand};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EpilogueArcKind {
    Retain,
    Release,
}

struct EpilogueArcContext<'q, 'a> {
    q: &'q ArcQueries<'a>,
    kind: EpilogueArcKind,
    /// RC root of the value being tracked.
    root: ValueId,
    /// Per-block override of the tracked value when it is a block argument:
    /// along the edge out of a predecessor, the incoming value stands in.
    local_args: FxHashMap<BlockId, ValueId>,
    set_in: Vec<bool>,
}

impl<'q, 'a> EpilogueArcContext<'q, 'a> {
    fn new(q: &'q ArcQueries<'a>, kind: EpilogueArcKind, value: ValueId) -> Self {
        Self {
            q,
            kind,
            root: q.root(value),
            local_args: FxHashMap::default(),
            set_in: vec![false; q.func.num_blocks()],
        }
    }

    /// Split a block-argument root into the values incoming from each
    /// predecessor, transitively.
    fn split_local_args(&mut self) {
        let func = self.q.func;
        let cfg = self.q.rcfi.cfg();
        let mut work = vec![self.root];
        let mut processed: FxHashSet<ValueId> = FxHashSet::default();
        while let Some(value) = work.pop() {
            if !processed.insert(value) {
                continue;
            }
            let Some((block, index)) = func.as_block_arg(value) else {
                continue;
            };
            for &pred in cfg.preds(block) {
                if let Some(incoming) = func.incoming_value(pred, block, index) {
                    self.local_args.insert(pred, incoming);
                    work.push(incoming);
                }
            }
        }
    }

    fn arg_root(&self, block: BlockId) -> ValueId {
        self.local_args
            .get(&block)
            .map_or(self.root, |&local| self.q.root(local))
    }

    fn is_interested_exit(&self, block: BlockId) -> bool {
        match self.q.func.terminator(block) {
            Terminator::Return { .. } => true,
            Terminator::Throw { .. } => self.kind == EpilogueArcKind::Release,
            _ => false,
        }
    }

    fn is_self_recursive_call(&self, inst: InstId) -> bool {
        matches!(
            &self.q.func.inst(inst).kind,
            InstKind::Apply { callee, .. } if callee.name == self.q.func.name
        )
    }

    fn is_interested_inst(&self, inst: InstId) -> bool {
        let kind = &self.q.func.inst(inst).kind;
        let block = self.q.func.inst(inst).block;
        let matches_root =
            || rc_operand(kind).is_some_and(|op| self.q.root(op) == self.arg_root(block));
        match self.kind {
            EpilogueArcKind::Release => is_release(kind) && matches_root(),
            EpilogueArcKind::Retain => {
                self.is_self_recursive_call(inst) || (is_retain(kind) && matches_root())
            }
        }
    }

    fn may_block(&self, inst: InstId) -> bool {
        let kind = &self.q.func.inst(inst).kind;
        if matches!(kind, InstKind::IsUnique { .. }) {
            return true;
        }
        match self.kind {
            EpilogueArcKind::Retain => self.q.may_decrement_ref_count(inst, self.root),
            EpilogueArcKind::Release => false,
        }
    }

    fn successors_out(&self, block: BlockId) -> bool {
        let succs = self.q.rcfi.cfg().succs(block);
        if succs.is_empty() {
            return self.is_interested_exit(block);
        }
        succs.iter().all(|s| self.set_in[s.index()])
    }

    /// Iterate to a fixed point. Returns `false` if a blocking instruction
    /// was reached on some exit path.
    fn converge(&mut self) -> bool {
        let func = self.q.func;
        let cfg = self.q.rcfi.cfg();
        loop {
            let mut changed = false;
            for &block in cfg.postorder() {
                let mut out = self.successors_out(block);
                if out {
                    for &inst in func.block(block).insts.iter().rev() {
                        if self.is_interested_inst(inst) {
                            out = false;
                            break;
                        }
                        if self.may_block(inst) {
                            return false;
                        }
                    }
                }
                changed |= self.set_in[block.index()] != out;
                self.set_in[block.index()] = out;
            }
            if !changed {
                return true;
            }
        }
    }

    /// Collect the epilogue instructions from the converged bits.
    fn collect(&self) -> Option<Vec<InstId>> {
        let func = self.q.func;
        let cfg = self.q.rcfi.cfg();
        let mut found = Vec::new();
        for &block in cfg.postorder() {
            let succs = cfg.succs(block);
            let out = match succs.split_first() {
                Some((first, rest)) => {
                    let base = self.set_in[first.index()];
                    if rest.iter().any(|s| self.set_in[s.index()] != base) {
                        return None;
                    }
                    base
                }
                None => self.is_interested_exit(block),
            };
            if !out {
                continue;
            }
            for &inst in func.block(block).insts.iter().rev() {
                if self.is_interested_inst(inst) {
                    found.push(inst);
                    break;
                }
                if self.may_block(inst) {
                    break;
                }
            }
        }
        found.sort_unstable();
        Some(found)
    }

    fn compute(mut self) -> Option<Vec<InstId>> {
        self.split_local_args();
        if !self.converge() {
            return None;
        }
        self.collect()
    }
}

/// Cached epilogue retains/releases for one function.
#[derive(Debug, Default)]
pub struct EpilogueArcFunctionInfo {
    cache: RefCell<FxHashMap<(EpilogueArcKind, ValueId), Rc<[InstId]>>>,
}

impl EpilogueArcFunctionInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Epilogue instructions of `kind` for `value`.
    ///
    /// Successful results are cached and returned by identity on later
    /// calls. Failures yield an empty set and are recomputed next time.
    pub fn compute_epilogue_arc_instructions(
        &self,
        q: &ArcQueries<'_>,
        kind: EpilogueArcKind,
        value: ValueId,
    ) -> Rc<[InstId]> {
        if let Some(found) = self.cache.borrow().get(&(kind, value)) {
            return Rc::clone(found);
        }
        match EpilogueArcContext::new(q, kind, value).compute() {
            Some(found) if !found.is_empty() => {
                let found: Rc<[InstId]> = found.into();
                self.cache
                    .borrow_mut()
                    .insert((kind, value), Rc::clone(&found));
                found
            }
            _ => {
                tracing::trace!(value = value.raw(), ?kind, "no epilogue instructions");
                Rc::from([])
            }
        }
    }

    /// Drop every cached result mentioning `inst`.
    pub fn on_instruction_deleted(&mut self, inst: InstId) {
        self.cache
            .get_mut()
            .retain(|_, found| !found.contains(&inst));
    }

    pub fn invalidate(&mut self) {
        self.cache.get_mut().clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.borrow().len()
    }
}

/// Epilogue releases of the owned arguments of a function.
#[derive(Debug, Default)]
pub struct EpilogueReleaseMatcher {
    args: FxHashSet<ValueId>,
    releases: FxHashSet<InstId>,
}

impl EpilogueReleaseMatcher {
    pub fn compute(q: &ArcQueries<'_>, info: &EpilogueArcFunctionInfo) -> Self {
        let func = q.func;
        let mut matcher = Self::default();
        for &arg in func.function_args() {
            if func.arg_convention(arg) != Some(ArgConvention::Owned) || func.is_trivial(arg) {
                continue;
            }
            let found = info.compute_epilogue_arc_instructions(q, EpilogueArcKind::Release, arg);
            if found.is_empty() {
                continue;
            }
            matcher.releases.extend(found.iter().copied());
            matcher.args.insert(arg);
        }
        matcher
    }

    pub fn is_epilogue_release(&self, inst: InstId) -> bool {
        self.releases.contains(&inst)
    }

    /// `true` if `root` is an owned argument with epilogue releases.
    pub fn has_epilogue_release(&self, root: ValueId) -> bool {
        self.args.contains(&root)
    }
}
