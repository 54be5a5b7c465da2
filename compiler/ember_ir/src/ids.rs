//! Dense ID newtypes for IR entities.
//!
//! Every entity (value, instruction, block, function, type) is stored in a
//! `Vec` owned by its container and referred to by a `u32` index. IDs are
//! only meaningful relative to the container that issued them.

// ── ID newtypes ─────────────────────────────────────────────────────

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Create an ID from a raw index.
            #[inline]
            pub fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// Get the raw `u32` value.
            #[inline]
            pub fn raw(self) -> u32 {
                self.0
            }

            /// Get the index as `usize` (for indexing into `Vec`s).
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }

            /// Build an ID from a `Vec` length.
            ///
            /// # Panics
            ///
            /// Panics if the container outgrew `u32`.
            #[inline]
            pub(crate) fn from_len(len: usize) -> Self {
                Self(
                    u32::try_from(len)
                        .unwrap_or_else(|_| panic!("{} count exceeds u32::MAX", stringify!($name))),
                )
            }
        }
    };
}

define_id!(
    /// SSA value within a [`Function`](crate::Function).
    ///
    /// Function arguments, block arguments and instruction results share one
    /// ID space.
    ValueId
);

define_id!(
    /// Instruction within a [`Function`](crate::Function).
    ///
    /// IDs stay stable when other instructions are erased.
    InstId
);

define_id!(
    /// Basic block within a [`Function`](crate::Function).
    BlockId
);

define_id!(
    /// Function within a [`Module`](crate::Module).
    FuncId
);

define_id!(
    /// Interned type handle into a [`TypePool`](crate::TypePool).
    Ty
);

define_id!(
    /// Region within a [`LoopRegionInfo`](crate::LoopRegionInfo).
    RegionId
);
