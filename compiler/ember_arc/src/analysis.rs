//! Per-function analysis caching and invalidation.
//!
//! Analyses are computed lazily on first request and kept until a
//! transformation reports what it changed. The kind of change decides how
//! much survives:
//!
//! - `BRANCHES` changes the CFG, which RC identity snapshots: the
//!   per-function info is dropped and rebuilt on next use.
//! - `INSTRUCTIONS` and `CALLS` keep the info but flush its caches.
//!
//! Deleting individual instructions does not require invalidation at all as
//! long as the deletion is reported through
//! [`AnalysisManager::notify_instruction_deleted`].

use bitflags::bitflags;
use ember_ir::{FuncId, Function, InstId, ValueId};
use rustc_hash::FxHashMap;

use crate::alias::BasicAliasAnalysis;
use crate::epilogue::EpilogueArcFunctionInfo;
use crate::rc_identity::{RcIdentityConfig, RcIdentityFunctionInfo};

bitflags! {
    /// What a transformation changed in a function body.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
    pub struct InvalidationKind: u8 {
        /// Instructions were added, removed or rewritten.
        const INSTRUCTIONS = 1 << 0;
        /// Calls were added, removed or retargeted.
        const CALLS = 1 << 1;
        /// Terminators or block structure changed.
        const BRANCHES = 1 << 2;

        const CALLS_AND_INSTRUCTIONS = Self::CALLS.bits() | Self::INSTRUCTIONS.bits();
        const FUNCTION_BODY =
            Self::INSTRUCTIONS.bits() | Self::CALLS.bits() | Self::BRANCHES.bits();
    }
}

// ── RC identity ─────────────────────────────────────────────────────

/// Lazily built [`RcIdentityFunctionInfo`] per function.
#[derive(Default)]
pub struct RcIdentityAnalysis {
    infos: FxHashMap<FuncId, RcIdentityFunctionInfo>,
    config: RcIdentityConfig,
}

impl RcIdentityAnalysis {
    pub fn new(config: RcIdentityConfig) -> Self {
        Self {
            infos: FxHashMap::default(),
            config,
        }
    }

    pub fn get(&mut self, id: FuncId, func: &Function) -> &RcIdentityFunctionInfo {
        let config = self.config;
        self.infos
            .entry(id)
            .or_insert_with(|| RcIdentityFunctionInfo::new(func, config))
    }

    pub fn invalidate(&mut self, id: FuncId, kind: InvalidationKind) {
        if kind.contains(InvalidationKind::BRANCHES) {
            self.infos.remove(&id);
        } else if kind.intersects(InvalidationKind::CALLS_AND_INSTRUCTIONS) {
            if let Some(info) = self.infos.get_mut(&id) {
                info.invalidate();
            }
        }
    }

    pub fn on_value_deleted(&mut self, id: FuncId, value: ValueId) {
        if let Some(info) = self.infos.get_mut(&id) {
            info.on_value_deleted(value);
        }
    }

    pub fn is_cached(&self, id: FuncId) -> bool {
        self.infos.contains_key(&id)
    }
}

// ── Epilogue ARC ────────────────────────────────────────────────────

/// Lazily built [`EpilogueArcFunctionInfo`] per function.
#[derive(Debug, Default)]
pub struct EpilogueArcAnalysis {
    infos: FxHashMap<FuncId, EpilogueArcFunctionInfo>,
}

impl EpilogueArcAnalysis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, id: FuncId) -> &EpilogueArcFunctionInfo {
        self.infos.entry(id).or_default()
    }

    pub fn invalidate(&mut self, id: FuncId, kind: InvalidationKind) {
        if kind.contains(InvalidationKind::BRANCHES) {
            self.infos.remove(&id);
        } else if kind.intersects(InvalidationKind::CALLS_AND_INSTRUCTIONS) {
            if let Some(info) = self.infos.get_mut(&id) {
                info.invalidate();
            }
        }
    }

    pub fn on_instruction_deleted(&mut self, id: FuncId, inst: InstId) {
        if let Some(info) = self.infos.get_mut(&id) {
            info.on_instruction_deleted(inst);
        }
    }

    pub fn is_cached(&self, id: FuncId) -> bool {
        self.infos.contains_key(&id)
    }
}

// ── Manager ─────────────────────────────────────────────────────────

/// The analyses the ARC optimizer consumes.
#[derive(Default)]
pub struct AnalysisManager {
    pub rc_identity: RcIdentityAnalysis,
    pub epilogue_arc: EpilogueArcAnalysis,
    pub alias: BasicAliasAnalysis,
}

impl AnalysisManager {
    pub fn new(rc_identity: RcIdentityConfig) -> Self {
        Self {
            rc_identity: RcIdentityAnalysis::new(rc_identity),
            epilogue_arc: EpilogueArcAnalysis::new(),
            alias: BasicAliasAnalysis,
        }
    }

    pub fn invalidate(&mut self, id: FuncId, kind: InvalidationKind) {
        tracing::trace!(func = id.raw(), ?kind, "invalidating analyses");
        self.rc_identity.invalidate(id, kind);
        self.epilogue_arc.invalidate(id, kind);
    }

    /// Tell every analysis that `inst` (and its result, if any) is gone.
    pub fn notify_instruction_deleted(
        &mut self,
        id: FuncId,
        inst: InstId,
        result: Option<ValueId>,
    ) {
        self.epilogue_arc.on_instruction_deleted(id, inst);
        if let Some(value) = result {
            self.rc_identity.on_value_deleted(id, value);
        }
    }
}

#[cfg(test)]
mod tests;
