//! Reference-count identity.
//!
//! Two values have the same RC identity when retaining one is equivalent to
//! retaining the other. The canonical representative ("RC root") of a value
//! is found by repeatedly stripping operations that forward a reference
//! unchanged:
//!
//! 1. identity-preserving casts (upcasts, unchecked reference casts,
//!    existential wrapping, bridge object conversion, function conversion);
//! 2. struct/tuple construction and extraction when the aggregate has exactly
//!    one non-trivial field;
//! 3. enum payload construction and projection, including the payload block
//!    argument of a `switch_enum` destination;
//! 4. block arguments whose incoming values all share one root. Incoming
//!    no-payload enums are tolerated when the incoming edge is dominated by a
//!    `switch_enum` on that root taking a no-payload case.
//!
//! Recursion through block arguments is bounded by
//! [`RcIdentityConfig::max_recursion_depth`]. Each block argument is
//! resolved at most once per query: an argument reached again while it is
//! still being resolved stops the walk, so cyclic phis resolve
//! conservatively to themselves. Edges from unreachable predecessors are
//! ignored.
//!
//! # Caching
//!
//! Results are memoized per function. The cache is bounded; once it reaches
//! capacity it is dropped wholesale rather than evicted entry by entry.

use std::cell::RefCell;

use ember_ir::{BlockId, Cfg, DominatorTree, Function, InstKind, Terminator, ValueId};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Bounds for RC identity queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RcIdentityConfig {
    /// Maximum nesting of block-argument resolution per query.
    pub max_recursion_depth: usize,
    /// Number of cached roots before the cache is dropped.
    pub cache_capacity: usize,
    /// Maximum immediate-dominator steps when looking for a `switch_enum`
    /// that justifies a no-payload incoming value.
    pub max_dominator_walk: usize,
}

impl Default for RcIdentityConfig {
    fn default() -> Self {
        Self {
            max_recursion_depth: 16,
            cache_capacity: 64,
            max_dominator_walk: 64,
        }
    }
}

/// RC identity information for one function.
pub struct RcIdentityFunctionInfo {
    cfg: Cfg,
    dom: DominatorTree,
    config: RcIdentityConfig,
    cache: RefCell<FxHashMap<ValueId, ValueId>>,
    /// Block arguments seen by the current query, with their resolution.
    /// `None` while in progress or after a failed resolution.
    visited_args: RefCell<FxHashMap<ValueId, Option<ValueId>>>,
}

impl RcIdentityFunctionInfo {
    pub fn new(func: &Function, config: RcIdentityConfig) -> Self {
        let cfg = Cfg::build(func);
        let dom = DominatorTree::build(func, &cfg);
        Self {
            cfg,
            dom,
            config,
            cache: RefCell::new(FxHashMap::default()),
            visited_args: RefCell::new(FxHashMap::default()),
        }
    }

    /// CFG snapshot the info was built from.
    #[inline]
    pub fn cfg(&self) -> &Cfg {
        &self.cfg
    }

    #[inline]
    pub fn dominators(&self) -> &DominatorTree {
        &self.dom
    }

    /// Canonical RC root of `value`.
    ///
    /// Never fails: when resolution gives up, the value is its own root.
    pub fn root(&self, func: &Function, value: ValueId) -> ValueId {
        if let Some(&root) = self.cache.borrow().get(&value) {
            return root;
        }

        self.visited_args.borrow_mut().clear();
        let root = self.root_inner(func, value, 0).unwrap_or(value);
        self.visited_args.borrow_mut().clear();

        let mut cache = self.cache.borrow_mut();
        if cache.len() >= self.config.cache_capacity {
            tracing::trace!(entries = cache.len(), "rc identity cache full, dropping");
            cache.clear();
        }
        cache.insert(value, root);
        root
    }

    /// Forget everything cached.
    pub fn invalidate(&mut self) {
        self.cache.get_mut().clear();
    }

    /// Evict `value` from the cache, both as a key and as a cached root.
    pub fn on_value_deleted(&mut self, value: ValueId) {
        let cache = self.cache.get_mut();
        cache.remove(&value);
        cache.retain(|_, root| *root != value);
    }

    /// Number of cached entries.
    pub fn cache_len(&self) -> usize {
        self.cache.borrow().len()
    }

    fn root_inner(&self, func: &Function, value: ValueId, depth: usize) -> Option<ValueId> {
        if depth >= self.config.max_recursion_depth {
            return None;
        }
        Some(self.strip_ops(func, value, depth))
    }

    fn strip_ops(&self, func: &Function, mut value: ValueId, depth: usize) -> ValueId {
        let mut followed: SmallVec<[ValueId; 4]> = SmallVec::new();
        loop {
            if let Some(next) = strip_inst_once(func, value) {
                value = next;
                continue;
            }
            if followed.contains(&value) {
                return value;
            }
            followed.push(value);
            match self.strip_arg(func, value, depth) {
                Some(next) if next != value => value = next,
                _ => return value,
            }
        }
    }

    /// Resolve a block argument to the common root of its incoming values.
    fn strip_arg(&self, func: &Function, arg: ValueId, depth: usize) -> Option<ValueId> {
        let (block, index) = func.as_block_arg(arg)?;

        if let Some(&seen) = self.visited_args.borrow().get(&arg) {
            return seen;
        }
        self.visited_args.borrow_mut().insert(arg, None);
        let root = self.resolve_incoming(func, block, index, depth);
        self.visited_args.borrow_mut().insert(arg, root);
        root
    }

    fn resolve_incoming(
        &self,
        func: &Function,
        block: BlockId,
        index: u32,
        depth: usize,
    ) -> Option<ValueId> {
        let incoming = self.incoming_values(func, block, index)?;

        let first_root = incoming
            .iter()
            .find(|&&(_, v)| !func.is_no_payload_enum(v))
            .map(|&(_, v)| self.root_inner(func, v, depth + 1))??;

        for &(pred, value) in &incoming {
            if func.is_no_payload_enum(value) {
                if !self.find_dominating_non_payloaded_edge(func, pred, first_root, depth) {
                    return None;
                }
                continue;
            }
            if self.root_inner(func, value, depth + 1)? != first_root {
                return None;
            }
        }

        Some(first_root)
    }

    /// Incoming `(pred, value)` pairs from reachable predecessors, treating
    /// a `switch_enum` edge as passing the switched enum.
    fn incoming_values(
        &self,
        func: &Function,
        block: BlockId,
        index: u32,
    ) -> Option<SmallVec<[(BlockId, ValueId); 4]>> {
        let mut preds = self
            .cfg
            .preds(block)
            .iter()
            .copied()
            .filter(|&pred| self.cfg.is_reachable(pred))
            .peekable();
        preds.peek()?;
        preds
            .map(|pred| match func.terminator(pred) {
                Terminator::SwitchEnum { operand, .. } if index == 0 => Some((pred, *operand)),
                _ => func.incoming_value(pred, block, index).map(|v| (pred, v)),
            })
            .collect()
    }

    /// Is the edge out of `incoming_bb` only reachable when `rc_root` is a
    /// no-payload case?
    ///
    /// Walks up the dominator tree from `incoming_bb` towards the block
    /// defining `rc_root`, looking for a block whose single predecessor
    /// switches on `rc_root` and reaches it through exactly one no-payload
    /// case.
    fn find_dominating_non_payloaded_edge(
        &self,
        func: &Function,
        incoming_bb: BlockId,
        rc_root: ValueId,
        depth: usize,
    ) -> bool {
        let root_bb = func.value_block(rc_root);
        if incoming_bb == root_bb || !self.dom.dominates(root_bb, incoming_bb) {
            return false;
        }

        let mut current = Some(incoming_bb);
        let mut steps = 0;
        while let Some(dom_bb) = current {
            if dom_bb == root_bb || steps >= self.config.max_dominator_walk {
                return false;
            }
            steps += 1;
            current = self.dom.idom(dom_bb);

            let Some(pred) = self.cfg.single_pred(dom_bb) else {
                continue;
            };
            let Terminator::SwitchEnum {
                operand,
                cases,
                default,
            } = func.terminator(pred)
            else {
                continue;
            };
            if self.root_inner(func, *operand, depth + 1) != Some(rc_root) {
                continue;
            }

            let mut to_dest = cases.iter().filter(|&&(_, dest)| dest == dom_bb);
            let (Some(&(case, _)), None) = (to_dest.next(), to_dest.next()) else {
                continue;
            };
            if *default == Some(dom_bb) {
                continue;
            }
            if func.types.case_payload(func.value_ty(*operand), case).is_none() {
                return true;
            }
        }
        false
    }
}

/// One step of instruction stripping.
fn strip_inst_once(func: &Function, value: ValueId) -> Option<ValueId> {
    match func.defining_kind(value)? {
        InstKind::Cast { kind, operand } if kind.preserves_rc_identity() => Some(*operand),
        InstKind::Struct { operands } | InstKind::Tuple { operands } => {
            let mut non_trivial = operands.iter().filter(|&&op| !func.is_trivial(op));
            match (non_trivial.next(), non_trivial.next()) {
                (Some(&only), None) => Some(only),
                _ => None,
            }
        }
        InstKind::StructExtract { operand, field: index }
        | InstKind::TupleExtract { operand, index } => {
            let aggregate = func.value_ty(*operand);
            (func.types.single_non_trivial_field(aggregate) == Some(*index as usize))
                .then_some(*operand)
        }
        InstKind::Enum {
            payload: Some(payload),
            ..
        } => Some(*payload),
        InstKind::UncheckedEnumData { operand, .. } => Some(*operand),
        _ => None,
    }
}
