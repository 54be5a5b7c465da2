//! CFG utilities: predecessor and successor lists, traversal orders and
//! the dominator tree.
//!
//! The optimizer walks the same function many times per pass (top-down,
//! bottom-up, once per loop region), so [`Cfg`] computes edges and both
//! traversal orders once and hands out slices.

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::function::Function;
use crate::BlockId;

/// Precomputed edges and traversal orders of a function's CFG.
#[derive(Clone, Debug)]
pub struct Cfg {
    preds: Vec<SmallVec<[BlockId; 4]>>,
    succs: Vec<SmallVec<[BlockId; 4]>>,
    postorder: Vec<BlockId>,
    /// RPO position of each reachable block; `None` for unreachable blocks.
    rpo_pos: Vec<Option<usize>>,
}

impl Cfg {
    pub fn build(func: &Function) -> Self {
        let n = func.num_blocks();
        let mut preds: Vec<SmallVec<[BlockId; 4]>> = vec![SmallVec::new(); n];
        let mut succs: Vec<SmallVec<[BlockId; 4]>> = vec![SmallVec::new(); n];

        for block in func.block_ids() {
            let mut seen = FxHashSet::default();
            for succ in func.terminator(block).successors() {
                if succ.index() < n && seen.insert(succ) {
                    succs[block.index()].push(succ);
                    preds[succ.index()].push(block);
                }
            }
        }

        let postorder = compute_postorder(func.entry(), &succs);
        let mut rpo_pos = vec![None; n];
        for (pos, &block) in postorder.iter().rev().enumerate() {
            rpo_pos[block.index()] = Some(pos);
        }

        Self {
            preds,
            succs,
            postorder,
            rpo_pos,
        }
    }

    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.preds.len()
    }

    /// Distinct predecessors of `block`.
    #[inline]
    pub fn preds(&self, block: BlockId) -> &[BlockId] {
        &self.preds[block.index()]
    }

    /// Distinct successors of `block`.
    #[inline]
    pub fn succs(&self, block: BlockId) -> &[BlockId] {
        &self.succs[block.index()]
    }

    /// The only predecessor of `block`, if it has exactly one.
    pub fn single_pred(&self, block: BlockId) -> Option<BlockId> {
        match self.preds(block) {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// Reachable blocks in postorder.
    #[inline]
    pub fn postorder(&self) -> &[BlockId] {
        &self.postorder
    }

    /// Reachable blocks in reverse postorder.
    pub fn reverse_postorder(&self) -> impl DoubleEndedIterator<Item = BlockId> + '_ {
        self.postorder.iter().rev().copied()
    }

    #[inline]
    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.rpo_pos[block.index()].is_some()
    }

    /// Position of `block` in reverse postorder.
    #[inline]
    pub fn rpo_position(&self, block: BlockId) -> Option<usize> {
        self.rpo_pos[block.index()]
    }

    /// `true` if the edge `from -> to` goes backwards in reverse postorder.
    ///
    /// Every loop back edge is retreating; in an irreducible CFG some
    /// retreating edges do not target a dominator.
    pub fn is_retreating_edge(&self, from: BlockId, to: BlockId) -> bool {
        match (self.rpo_position(from), self.rpo_position(to)) {
            (Some(f), Some(t)) => t <= f,
            _ => false,
        }
    }
}

/// Postorder traversal from `entry`.
///
/// Uses an iterative DFS with an explicit stack to avoid recursion depth
/// issues on deeply nested CFGs. Only visits reachable blocks.
fn compute_postorder(entry: BlockId, succs: &[SmallVec<[BlockId; 4]>]) -> Vec<BlockId> {
    let num_blocks = succs.len();
    let mut visited = vec![false; num_blocks];
    let mut postorder = Vec::with_capacity(num_blocks);
    if num_blocks == 0 {
        return postorder;
    }

    // Stack entries: (block, next successor index to try).
    let mut stack: Vec<(BlockId, usize)> = vec![(entry, 0)];
    visited[entry.index()] = true;

    while let Some(&mut (block, ref mut next)) = stack.last_mut() {
        let block_succs = &succs[block.index()];
        if let Some(&succ) = block_succs.get(*next) {
            *next += 1;
            if !visited[succ.index()] {
                visited[succ.index()] = true;
                stack.push((succ, 0));
            }
        } else {
            postorder.push(block);
            stack.pop();
        }
    }

    postorder
}

/// Dominator tree.
///
/// Uses the Cooper-Harvey-Kennedy iterative algorithm, which is simpler than
/// Lengauer-Tarjan and fast enough for typical function sizes. The algorithm
/// works on reverse postorder and converges in O(n * d) where d is the loop
/// nesting depth.
///
/// Reference: Cooper, Harvey, Kennedy, "A Simple, Fast Dominance Algorithm" (2001)
#[derive(Clone, Debug)]
pub struct DominatorTree {
    /// Immediate dominator for each block, indexed by block index.
    /// `idom[entry] == Some(entry)`; unreachable blocks have `None`.
    idom: Vec<Option<usize>>,
    entry: usize,
}

impl DominatorTree {
    pub fn build(func: &Function, cfg: &Cfg) -> Self {
        let n = cfg.num_blocks();
        let entry = func.entry().index();
        if n == 0 {
            return Self { idom: vec![], entry };
        }

        let rpo: Vec<usize> = cfg.reverse_postorder().map(BlockId::index).collect();
        let rpo_pos: Vec<usize> = (0..n)
            .map(|b| cfg.rpo_pos[b].unwrap_or(usize::MAX))
            .collect();

        let mut idom: Vec<Option<usize>> = vec![None; n];
        idom[entry] = Some(entry);

        let mut changed = true;
        while changed {
            changed = false;
            for &block_idx in &rpo[1..] {
                let preds = &cfg.preds[block_idx];
                let Some(first) = preds.iter().map(|p| p.index()).find(|&p| idom[p].is_some())
                else {
                    continue;
                };

                let mut new_idom = first;
                for pred in preds.iter().map(|p| p.index()) {
                    if pred != first && idom[pred].is_some() {
                        new_idom = Self::intersect(pred, new_idom, &idom, &rpo_pos);
                    }
                }

                if idom[block_idx] != Some(new_idom) {
                    idom[block_idx] = Some(new_idom);
                    changed = true;
                }
            }
        }

        Self { idom, entry }
    }

    /// Immediate dominator of `block`; `None` for the entry and for
    /// unreachable blocks.
    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        match self.idom.get(block.index()).copied().flatten() {
            Some(dom) if dom != block.index() => Some(BlockId::from_len(dom)),
            _ => None,
        }
    }

    /// Does block `a` dominate block `b`?
    ///
    /// A block dominates itself. Unreachable blocks are dominated by nothing
    /// but themselves.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let a_idx = a.index();
        let mut current = b.index();
        loop {
            if current == a_idx {
                return true;
            }
            match self.idom.get(current).copied().flatten() {
                Some(dom) if dom != current => current = dom,
                _ => return false,
            }
        }
    }

    /// `true` if `block` was reached from the entry.
    pub fn is_reachable(&self, block: BlockId) -> bool {
        block.index() == self.entry || self.idom.get(block.index()).copied().flatten().is_some()
    }

    /// CHK intersect: walk two fingers upward until they meet.
    fn intersect(mut a: usize, mut b: usize, idom: &[Option<usize>], rpo_pos: &[usize]) -> usize {
        while a != b {
            while rpo_pos[a] > rpo_pos[b] {
                a = idom[a].unwrap_or(a);
            }
            while rpo_pos[b] > rpo_pos[a] {
                b = idom[b].unwrap_or(b);
            }
        }
        a
    }
}

#[cfg(test)]
mod tests;
