//! ARC sequence optimization for the Ember compiler.
//!
//! Removes retain/release pairs whose combined effect on a reference count
//! is zero and that nothing in between could observe.
//!
//! - **RC identity** ([`RcIdentityFunctionInfo`]) maps every value to the
//!   canonical value whose reference count it shares.
//!
//! - **Dataflow** ([`ArcSequenceDataflowEvaluator`],
//!   [`LoopArcSequenceDataflowEvaluator`]) walks the CFG bottom-up and
//!   top-down, tracking per RC root the retains (or releases) that could be
//!   paired and how the instructions in between affect the pairing
//!   ([`TopDownRefCountState`], [`BottomUpRefCountState`]).
//!
//! - **Matching** ([`ArcMatchingSetBuilder`], [`ArcPairingContext`])
//!   closes the pairs found in both directions into [`ArcMatchingSet`]s and
//!   decides which can be deleted.
//!
//! - **Epilogue analysis** ([`EpilogueArcFunctionInfo`]) finds the final
//!   release of an owned argument on every exit path.
//!
//! - **Driver** ([`ArcSequenceOpts`]) runs all of the above per function and
//!   keeps the [`AnalysisManager`] caches consistent with every deletion.
//!
//! # Crate Dependencies
//!
//! `ember_arc` depends only on `ember_ir` for the IR, CFG, dominance and
//! loop regions.

pub mod alias;
pub mod analysis;
pub mod classify;
pub mod config;
pub mod dataflow;
pub mod epilogue;
pub mod matching;
pub mod pass;
pub mod ptr_set;
pub mod rc_identity;
pub mod rc_state;
#[cfg(test)]
mod test_helpers;

pub use alias::{AliasAnalysis, ArcQueries, BasicAliasAnalysis};
pub use analysis::{AnalysisManager, EpilogueArcAnalysis, InvalidationKind, RcIdentityAnalysis};
pub use classify::{classify, RcTransition};
pub use config::{ArcOptConfig, ConfigError};
pub use dataflow::block::ArcSequenceDataflowEvaluator;
pub use dataflow::region::{LoopArcSequenceDataflowEvaluator, RegionStates};
pub use dataflow::PairingMaps;
pub use epilogue::{EpilogueArcFunctionInfo, EpilogueArcKind, EpilogueReleaseMatcher};
pub use matching::{ArcMatchingSet, ArcMatchingSetBuilder, ArcPairingContext, MatchingOutcome};
pub use pass::{ArcOptStats, ArcSequenceOpts};
pub use ptr_set::{PtrSet, PtrSetFactory};
pub use rc_identity::{RcIdentityConfig, RcIdentityFunctionInfo};
pub use rc_state::{BottomUpRefCountState, TopDownRefCountState};

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Safe to call multiple times. Enable with `RUST_LOG=ember_arc=debug` for
/// per-function summaries or `RUST_LOG=ember_arc=trace` for every dataflow
/// step.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        // Only initialize if RUST_LOG is set
        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}
