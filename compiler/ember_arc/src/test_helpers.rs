//! Shared test utilities for the ARC optimizer. Only compiled in test builds.

use ember_ir::{
    ArgConvention, Callee, FuncId, Function, FunctionBuilder, InstId, ResultConvention,
    SideEffects, Ty,
};

use crate::alias::{ArcQueries, BasicAliasAnalysis};
use crate::analysis::AnalysisManager;
use crate::classify::{is_release, is_retain};
use crate::config::ArcOptConfig;
use crate::pass::{ArcOptStats, ArcSequenceOpts};
use crate::rc_identity::{RcIdentityConfig, RcIdentityFunctionInfo};

/// A function together with its RC identity info.
pub(crate) struct Fixture {
    pub(crate) func: Function,
    pub(crate) rcfi: RcIdentityFunctionInfo,
}

impl Fixture {
    pub(crate) fn new(func: Function) -> Self {
        Self::with_config(func, RcIdentityConfig::default())
    }

    pub(crate) fn with_config(func: Function, config: RcIdentityConfig) -> Self {
        let rcfi = RcIdentityFunctionInfo::new(&func, config);
        Self { func, rcfi }
    }

    pub(crate) fn queries(&self) -> ArcQueries<'_> {
        ArcQueries::new(&self.func, &self.rcfi, &BasicAliasAnalysis)
    }
}

/// A builder with a `Klass` class type already interned.
pub(crate) fn builder_with_class(name: &str) -> (FunctionBuilder, Ty) {
    let mut fb = FunctionBuilder::new(name);
    let class = fb.types().class("Klass");
    (fb, class)
}

pub(crate) fn callee(name: &str, effects: SideEffects) -> Callee {
    Callee::new(name, effects, ResultConvention::Unowned)
}

/// A call that may read but never releases.
pub(crate) fn read_only(name: &str) -> Callee {
    callee(name, SideEffects::ReadOnly)
}

/// A call that may release anything.
pub(crate) fn may_release(name: &str) -> Callee {
    callee(name, SideEffects::MayRelease)
}

/// `retain %x; %y = apply foo(%x); release %x; return %y`, where `%x` is
/// loaded from an `@inout` slot. The caller gives no guarantee for `%x`, so
/// only `foo` decides whether the retain is needed. With `split` the three
/// instructions sit in three consecutive blocks.
pub(crate) fn loaded_pair(name: &str, foo: Callee, split: bool) -> Function {
    let (mut fb, class) = builder_with_class(name);
    let unit = fb.types().trivial("Unit");
    let slot_ty = fb.types().address(class);
    let slot = fb.add_function_arg(slot_ty, ArgConvention::Inout);
    let x = fb.load(slot);
    let next_block = |fb: &mut FunctionBuilder| {
        if split {
            let next = fb.create_block();
            fb.br(next, vec![]);
            fb.switch_to(next);
        }
    };
    fb.strong_retain(x);
    next_block(&mut fb);
    let y = fb.apply(foo, vec![x], unit);
    next_block(&mut fb);
    fb.strong_release(x);
    fb.ret(y);
    fb.finish().unwrap()
}

pub(crate) fn is_live(func: &Function, inst: InstId) -> bool {
    !func.inst(inst).is_erased()
}

/// Number of live retains and releases in `func`.
pub(crate) fn count_rc_ops(func: &Function) -> usize {
    func.all_insts()
        .filter(|&inst| is_live(func, inst))
        .filter(|&inst| {
            let kind = &func.inst(inst).kind;
            is_retain(kind) || is_release(kind)
        })
        .count()
}

/// Run the pass on a single function with a fresh analysis manager.
pub(crate) fn run_pass(func: &mut Function, config: ArcOptConfig) -> ArcOptStats {
    let mut analyses = AnalysisManager::new(config.rc_identity);
    ArcSequenceOpts::new(config).run_on_function(FuncId::new(0), func, &mut analyses)
}

/// Both evaluator variants, for tests that must hold either way.
pub(crate) fn block_and_loop_configs() -> [ArcOptConfig; 2] {
    [
        ArcOptConfig {
            enable_loop_arc: false,
            ..ArcOptConfig::default()
        },
        ArcOptConfig::default(),
    ]
}
