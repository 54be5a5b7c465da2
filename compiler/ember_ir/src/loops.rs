//! Loop region tree.
//!
//! Partitions a function into a hierarchy of regions: the function region
//! contains top-level blocks and outermost loops, each loop region contains
//! its own blocks and directly nested loops. Every container lists its
//! subregions in reverse postorder, and every subregion records its
//! predecessors and successors *within the parent* with back edges removed.
//! Edges leaving the parent are not recorded as successors; the source is
//! flagged with [`LoopRegion::exits_parent`] instead.
//!
//! Only natural loops are modelled. If the CFG is irreducible no loop regions
//! are built: the function region holds every block, and retreating edges are
//! treated like back edges.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::function::Function;
use crate::graph::{Cfg, DominatorTree};
use crate::{BlockId, RegionId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegionKind {
    Function,
    Loop { header: BlockId },
    Block(BlockId),
}

#[derive(Clone, Debug)]
pub struct LoopRegion {
    kind: RegionKind,
    parent: Option<RegionId>,
    depth: u32,
    subregions: Vec<RegionId>,
    preds: SmallVec<[RegionId; 4]>,
    succs: SmallVec<[RegionId; 4]>,
    exits_parent: bool,
    backedge_source: bool,
    backedge_target: bool,
}

impl LoopRegion {
    fn new(kind: RegionKind, parent: Option<RegionId>) -> Self {
        Self {
            kind,
            parent,
            depth: 0,
            subregions: Vec::new(),
            preds: SmallVec::new(),
            succs: SmallVec::new(),
            exits_parent: false,
            backedge_source: false,
            backedge_target: false,
        }
    }

    #[inline]
    pub fn kind(&self) -> RegionKind {
        self.kind
    }

    #[inline]
    pub fn parent(&self) -> Option<RegionId> {
        self.parent
    }

    /// Loop nesting depth: 0 for the function region.
    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Direct children in reverse postorder. Empty for block regions.
    #[inline]
    pub fn subregions(&self) -> &[RegionId] {
        &self.subregions
    }

    /// Predecessors within the parent region, back edges excluded.
    #[inline]
    pub fn preds(&self) -> &[RegionId] {
        &self.preds
    }

    /// Successors within the parent region, back edges excluded.
    #[inline]
    pub fn succs(&self) -> &[RegionId] {
        &self.succs
    }

    /// Some edge out of this region leaves the parent region.
    #[inline]
    pub fn exits_parent(&self) -> bool {
        self.exits_parent
    }

    /// Some edge out of this region is a back edge of the parent.
    #[inline]
    pub fn is_backedge_source(&self) -> bool {
        self.backedge_source
    }

    /// Some back edge of the parent targets this region.
    #[inline]
    pub fn is_backedge_target(&self) -> bool {
        self.backedge_target
    }

    #[inline]
    pub fn is_block(&self) -> bool {
        matches!(self.kind, RegionKind::Block(_))
    }

    pub fn block(&self) -> Option<BlockId> {
        match self.kind {
            RegionKind::Block(b) => Some(b),
            _ => None,
        }
    }
}

/// Region tree of one function.
#[derive(Clone, Debug)]
pub struct LoopRegionInfo {
    regions: Vec<LoopRegion>,
    block_regions: Vec<Option<RegionId>>,
    irreducible: bool,
}

struct NaturalLoop {
    header: BlockId,
    body: Vec<bool>,
    size: usize,
}

impl LoopRegionInfo {
    pub fn build(func: &Function, cfg: &Cfg, dom: &DominatorTree) -> Self {
        let n = func.num_blocks();

        let mut latches: FxHashMap<BlockId, Vec<BlockId>> = FxHashMap::default();
        let mut headers: Vec<BlockId> = Vec::new();
        let mut irreducible = false;
        for block in cfg.reverse_postorder() {
            for &succ in cfg.succs(block) {
                if dom.dominates(succ, block) {
                    let entry = latches.entry(succ).or_default();
                    if entry.is_empty() {
                        headers.push(succ);
                    }
                    entry.push(block);
                } else if cfg.is_retreating_edge(block, succ) {
                    irreducible = true;
                }
            }
        }

        let mut loops: Vec<NaturalLoop> = Vec::new();
        if !irreducible {
            for &header in &headers {
                let mut body = vec![false; n];
                body[header.index()] = true;
                let mut size = 1;
                let mut work: Vec<BlockId> = latches[&header].clone();
                while let Some(b) = work.pop() {
                    if body[b.index()] {
                        continue;
                    }
                    body[b.index()] = true;
                    size += 1;
                    work.extend(cfg.preds(b).iter().copied().filter(|p| cfg.is_reachable(*p)));
                }
                loops.push(NaturalLoop { header, body, size });
            }
            loops.sort_by_key(|l| (l.size, cfg.rpo_position(l.header)));
        }

        let mut info = Self {
            regions: vec![LoopRegion::new(RegionKind::Function, None)],
            block_regions: vec![None; n],
            irreducible,
        };

        // Loop regions: ids 1..=loops.len(), innermost (smallest) first.
        for (i, l) in loops.iter().enumerate() {
            let parent = loops
                .iter()
                .enumerate()
                .skip(i + 1)
                .find(|(_, m)| m.header != l.header && m.body[l.header.index()])
                .map_or(RegionId::new(0), |(j, _)| Self::loop_region_id(j));
            info.regions
                .push(LoopRegion::new(RegionKind::Loop { header: l.header }, Some(parent)));
        }

        // Block regions, in reverse postorder.
        for block in cfg.reverse_postorder() {
            let parent = loops
                .iter()
                .position(|l| l.body[block.index()])
                .map_or(RegionId::new(0), Self::loop_region_id);
            let id = RegionId::from_len(info.regions.len());
            info.regions.push(LoopRegion::new(RegionKind::Block(block), Some(parent)));
            info.block_regions[block.index()] = Some(id);
        }

        for idx in 1..=loops.len() {
            info.regions[idx].depth = info.loop_depth(RegionId::from_len(idx));
        }
        for idx in loops.len() + 1..info.regions.len() {
            let parent = info.regions[idx].parent.map_or(0, RegionId::index);
            info.regions[idx].depth = info.regions[parent].depth;
        }

        info.connect_edges(cfg);
        info.order_subregions(func, cfg);
        info
    }

    fn loop_region_id(loop_index: usize) -> RegionId {
        RegionId::from_len(loop_index + 1)
    }

    fn loop_depth(&self, region: RegionId) -> u32 {
        let mut depth = 0;
        let mut current = Some(region);
        while let Some(r) = current {
            if matches!(self.regions[r.index()].kind, RegionKind::Loop { .. }) {
                depth += 1;
            }
            current = self.regions[r.index()].parent;
        }
        depth
    }

    fn ancestors(&self, region: RegionId) -> SmallVec<[RegionId; 8]> {
        let mut chain = SmallVec::new();
        let mut current = Some(region);
        while let Some(r) = current {
            chain.push(r);
            current = self.regions[r.index()].parent;
        }
        chain
    }

    fn connect_edges(&mut self, cfg: &Cfg) {
        let blocks: Vec<BlockId> = cfg.reverse_postorder().collect();
        for block in blocks {
            for &succ in cfg.succs(block) {
                let (Some(from), Some(to)) = (self.block_region(block), self.block_region(succ))
                else {
                    continue;
                };
                let from_chain = self.ancestors(from);
                let to_chain = self.ancestors(to);

                // Lowest common container and the children of it on each side.
                let Some((from_pos, lca)) = from_chain
                    .iter()
                    .enumerate()
                    .skip(1)
                    .find(|&(_, r)| to_chain[1..].contains(r))
                    .map(|(i, r)| (i, *r))
                else {
                    continue;
                };
                let Some(to_pos) = to_chain.iter().position(|&r| r == lca) else {
                    continue;
                };
                let src = from_chain[from_pos - 1];
                let dst = to_chain[to_pos - 1];

                for &r in &from_chain[..from_pos - 1] {
                    self.regions[r.index()].exits_parent = true;
                }

                let is_backedge = match self.regions[lca.index()].kind {
                    RegionKind::Loop { header } => succ == header && Some(dst) == self.block_region(header),
                    _ => self.irreducible && cfg.is_retreating_edge(block, succ),
                };
                if is_backedge {
                    self.regions[src.index()].backedge_source = true;
                    self.regions[dst.index()].backedge_target = true;
                } else {
                    if !self.regions[src.index()].succs.contains(&dst) {
                        self.regions[src.index()].succs.push(dst);
                    }
                    if !self.regions[dst.index()].preds.contains(&src) {
                        self.regions[dst.index()].preds.push(src);
                    }
                }
            }
        }
    }

    fn order_subregions(&mut self, func: &Function, cfg: &Cfg) {
        let mut children: Vec<Vec<RegionId>> = vec![Vec::new(); self.regions.len()];
        for idx in 1..self.regions.len() {
            if let Some(parent) = self.regions[idx].parent {
                children[parent.index()].push(RegionId::from_len(idx));
            }
        }

        for (container, kids) in children.into_iter().enumerate() {
            if kids.is_empty() {
                continue;
            }
            let entry_block = match self.regions[container].kind {
                RegionKind::Function => func.entry(),
                RegionKind::Loop { header } => header,
                RegionKind::Block(_) => continue,
            };
            let entry = if cfg.is_reachable(entry_block) {
                self.block_region(entry_block)
            } else {
                None
            };

            let mut order = Vec::with_capacity(kids.len());
            let mut visited: SmallVec<[RegionId; 16]> = SmallVec::new();
            if let Some(entry) = entry {
                // Iterative DFS postorder over local successors.
                let mut stack: Vec<(RegionId, usize)> = vec![(entry, 0)];
                visited.push(entry);
                while let Some(&mut (region, ref mut next)) = stack.last_mut() {
                    if let Some(&succ) = self.regions[region.index()].succs.get(*next) {
                        *next += 1;
                        if !visited.contains(&succ) {
                            visited.push(succ);
                            stack.push((succ, 0));
                        }
                    } else {
                        order.push(region);
                        stack.pop();
                    }
                }
                order.reverse();
            }
            for kid in kids {
                if !order.contains(&kid) {
                    order.push(kid);
                }
            }
            self.regions[container].subregions = order;
        }
    }

    // ── Queries ─────────────────────────────────────────────────────

    #[inline]
    pub fn region(&self, id: RegionId) -> &LoopRegion {
        &self.regions[id.index()]
    }

    #[inline]
    pub fn function_region(&self) -> RegionId {
        RegionId::new(0)
    }

    /// Region wrapping `block`; `None` for unreachable blocks.
    #[inline]
    pub fn block_region(&self, block: BlockId) -> Option<RegionId> {
        self.block_regions.get(block.index()).copied().flatten()
    }

    #[inline]
    pub fn num_regions(&self) -> usize {
        self.regions.len()
    }

    /// `true` if the CFG has a retreating edge that is not a natural back edge.
    #[inline]
    pub fn is_irreducible(&self) -> bool {
        self.irreducible
    }

    /// Loop regions, innermost first, followed by the function region.
    pub fn containers_innermost_first(&self) -> Vec<RegionId> {
        let mut loops: Vec<RegionId> = (1..self.regions.len())
            .filter(|&i| matches!(self.regions[i].kind, RegionKind::Loop { .. }))
            .map(RegionId::from_len)
            .collect();
        loops.sort_by_key(|r| std::cmp::Reverse(self.regions[r.index()].depth));
        loops.push(self.function_region());
        loops
    }

    /// Every block region nested (transitively) inside `region`.
    pub fn blocks_in(&self, region: RegionId) -> Vec<BlockId> {
        let mut out = Vec::new();
        let mut stack = vec![region];
        while let Some(r) = stack.pop() {
            let data = self.region(r);
            match data.kind {
                RegionKind::Block(b) => out.push(b),
                _ => stack.extend(data.subregions.iter().rev().copied()),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests;
