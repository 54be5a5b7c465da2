//! Uniqued immutable sets of small copyable keys.
//!
//! The dataflow evaluator tracks, for every RC root, the set of retains or
//! releases that produced its current state, and merges those sets at every
//! control-flow join. Most merges see sets that already exist, so sets are
//! hash-consed: a [`PtrSetFactory`] stores each distinct sorted element
//! sequence once in a bump arena and hands out [`PtrSet`] handles. Two
//! handles are equal iff the sets are equal, so equality is O(1).
//!
//! # Lifetime
//!
//! Handles carry the factory epoch they were created in. [`PtrSetFactory::clear`]
//! drops every set and bumps the epoch; using a stale handle afterwards is a
//! programming error caught by a debug assertion.

use std::hash::{Hash, Hasher};

use rustc_hash::{FxHashMap, FxHasher};
use smallvec::SmallVec;

/// Handle to a set owned by a [`PtrSetFactory`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PtrSet {
    index: u32,
    epoch: u32,
}

impl PtrSet {
    /// The empty set. Valid in every epoch of every factory.
    pub const EMPTY: PtrSet = PtrSet { index: 0, epoch: 0 };

    #[inline]
    pub fn is_empty(self) -> bool {
        self.index == 0
    }
}

/// Factory and arena for [`PtrSet`]s over elements of type `T`.
#[derive(Debug)]
pub struct PtrSetFactory<T> {
    arena: Vec<T>,
    /// `(start, len)` into `arena`, indexed by `PtrSet::index`.
    /// Slot 0 is the empty set.
    sets: Vec<(u32, u32)>,
    /// Content hash → candidate set indices.
    lookup: FxHashMap<u64, SmallVec<[u32; 1]>>,
    epoch: u32,
    scratch: Vec<T>,
}

impl<T: Copy + Ord + Hash> Default for PtrSetFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Ord + Hash> PtrSetFactory<T> {
    pub fn new() -> Self {
        Self {
            arena: Vec::new(),
            sets: vec![(0, 0)],
            lookup: FxHashMap::default(),
            epoch: 0,
            scratch: Vec::new(),
        }
    }

    fn content_hash(elems: &[T]) -> u64 {
        let mut hasher = FxHasher::default();
        elems.hash(&mut hasher);
        hasher.finish()
    }

    #[inline]
    fn check_live(&self, set: PtrSet) {
        debug_assert!(
            set.is_empty() || set.epoch == self.epoch,
            "stale PtrSet handle from epoch {} used in epoch {}",
            set.epoch,
            self.epoch
        );
    }

    fn slice(&self, index: u32) -> &[T] {
        let (start, len) = self.sets[index as usize];
        &self.arena[start as usize..(start + len) as usize]
    }

    /// Return the canonical set holding exactly `elems`.
    ///
    /// `elems` must be sorted strictly increasing.
    pub fn get(&mut self, elems: &[T]) -> PtrSet {
        debug_assert!(
            elems.windows(2).all(|w| w[0] < w[1]),
            "PtrSetFactory::get requires sorted unique elements"
        );
        if elems.is_empty() {
            return PtrSet::EMPTY;
        }

        let hash = Self::content_hash(elems);
        if let Some(candidates) = self.lookup.get(&hash) {
            for &index in candidates {
                if self.slice(index) == elems {
                    return PtrSet {
                        index,
                        epoch: self.epoch,
                    };
                }
            }
        }

        let start = u32::try_from(self.arena.len())
            .unwrap_or_else(|_| panic!("pointer set arena exceeds u32::MAX"));
        let len = u32::try_from(elems.len())
            .unwrap_or_else(|_| panic!("pointer set exceeds u32::MAX elements"));
        let index = u32::try_from(self.sets.len())
            .unwrap_or_else(|_| panic!("pointer set count exceeds u32::MAX"));
        self.arena.extend_from_slice(elems);
        self.sets.push((start, len));
        self.lookup.entry(hash).or_default().push(index);
        PtrSet {
            index,
            epoch: self.epoch,
        }
    }

    pub fn get_single(&mut self, elem: T) -> PtrSet {
        self.get(&[elem])
    }

    /// Union of two sets.
    ///
    /// Returns one of the inputs whenever it already is the union, so merging
    /// with the empty set or with a subset never touches the arena.
    pub fn merge(&mut self, a: PtrSet, b: PtrSet) -> PtrSet {
        self.check_live(a);
        self.check_live(b);
        if a == b || b.is_empty() {
            return a;
        }
        if a.is_empty() {
            return b;
        }

        let mut union = std::mem::take(&mut self.scratch);
        union.clear();
        {
            let (left, right) = (self.slice(a.index), self.slice(b.index));
            let (mut i, mut j) = (0, 0);
            while i < left.len() && j < right.len() {
                match left[i].cmp(&right[j]) {
                    std::cmp::Ordering::Less => {
                        union.push(left[i]);
                        i += 1;
                    }
                    std::cmp::Ordering::Greater => {
                        union.push(right[j]);
                        j += 1;
                    }
                    std::cmp::Ordering::Equal => {
                        union.push(left[i]);
                        i += 1;
                        j += 1;
                    }
                }
            }
            union.extend_from_slice(&left[i..]);
            union.extend_from_slice(&right[j..]);
        }

        let result = if union.len() == self.len(a) {
            a
        } else if union.len() == self.len(b) {
            b
        } else {
            self.get(&union)
        };
        self.scratch = union;
        result
    }

    /// Elements of `set` in increasing order.
    pub fn elements(&self, set: PtrSet) -> &[T] {
        self.check_live(set);
        if set.is_empty() {
            return &[];
        }
        self.slice(set.index)
    }

    pub fn len(&self, set: PtrSet) -> usize {
        self.elements(set).len()
    }

    /// Number of occurrences of `elem` in `set`: 0 or 1.
    pub fn count(&self, set: PtrSet, elem: &T) -> usize {
        usize::from(self.elements(set).binary_search(elem).is_ok())
    }

    pub fn contains(&self, set: PtrSet, elem: &T) -> bool {
        self.count(set, elem) == 1
    }

    /// `true` if no element is in both sets.
    pub fn has_empty_intersection(&self, a: PtrSet, b: PtrSet) -> bool {
        let (left, right) = (self.elements(a), self.elements(b));
        let (mut i, mut j) = (0, 0);
        while i < left.len() && j < right.len() {
            match left[i].cmp(&right[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => return false,
            }
        }
        true
    }

    /// Drop every set and invalidate all outstanding handles.
    pub fn clear(&mut self) {
        self.arena.clear();
        self.sets.truncate(1);
        self.lookup.clear();
        self.epoch = self.epoch.wrapping_add(1);
    }

    /// Number of distinct non-empty sets alive in this epoch.
    pub fn num_sets(&self) -> usize {
        self.sets.len() - 1
    }
}

#[cfg(test)]
mod tests;
