//! SSA intermediate representation for the Ember optimizer.
//!
//! This crate provides:
//!
//! - **Types** ([`TypePool`], [`TypeData`]): interned structural types with
//!   precomputed triviality (whether values need reference counting).
//!
//! - **IR** ([`Function`], [`InstKind`], [`Terminator`]): basic blocks with
//!   block arguments, a closed instruction set covering reference-count
//!   operations, calls, casts, aggregates, enums and memory.
//!
//! - **Construction and checking** ([`FunctionBuilder`], [`verify_function`]).
//!
//! - **CFG analyses** ([`Cfg`], [`DominatorTree`], [`LoopRegionInfo`]):
//!   traversal orders, dominance and the loop region tree consumed by the
//!   ARC optimizer in `ember_arc`.
//!
//! # Conventions
//!
//! All entities are referred to by dense `u32` IDs ([`ValueId`], [`InstId`],
//! [`BlockId`]) into tables owned by the [`Function`]. Erasing an
//! instruction unlinks it from its block but keeps its ID valid.

mod builder;
mod function;
pub mod graph;
mod ids;
mod inst;
pub mod loops;
mod module;
mod printer;
#[cfg(test)]
mod test_helpers;
mod types;
mod verify;

pub use builder::FunctionBuilder;
pub use function::{ArgConvention, BlockData, Function, InstData, ValueData, ValueDef};
pub use graph::{Cfg, DominatorTree};
pub use ids::{BlockId, FuncId, InstId, RegionId, Ty, ValueId};
pub use inst::{
    CastKind, Callee, InstKind, ResultConvention, SideEffects, Terminator, AUTORELEASE_POOL_POP,
    AUTORELEASE_POOL_PUSH,
};
pub use loops::{LoopRegion, LoopRegionInfo, RegionKind};
pub use module::Module;
pub use types::{EnumCase, TypeData, TypePool};
pub use verify::{verify_function, VerifyError};
