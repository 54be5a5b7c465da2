//! Insertion-ordered map with O(1) tombstone removal.
//!
//! Iteration follows first-insertion order, which keeps dataflow merges and
//! matching deterministic. Removing an entry ("blotting") leaves a hole
//! instead of shifting later entries; [`BlotMapVector::compact`] squeezes
//! the holes out.

use std::hash::Hash;

use rustc_hash::FxHashMap;

#[derive(Clone, Debug)]
pub struct BlotMapVector<K, V> {
    index: FxHashMap<K, usize>,
    entries: Vec<Option<(K, V)>>,
}

impl<K, V> Default for BlotMapVector<K, V> {
    fn default() -> Self {
        Self {
            index: FxHashMap::default(),
            entries: Vec::new(),
        }
    }
}

impl<K: Copy + Eq + Hash, V> BlotMapVector<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let &slot = self.index.get(key)?;
        self.entries[slot].as_ref().map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let &slot = self.index.get(key)?;
        self.entries[slot].as_mut().map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Insert or overwrite. An overwritten entry keeps its position.
    pub fn insert(&mut self, key: K, value: V) {
        if let Some(&slot) = self.index.get(&key) {
            self.entries[slot] = Some((key, value));
            return;
        }
        self.index.insert(key, self.entries.len());
        self.entries.push(Some((key, value)));
    }

    pub fn get_or_insert_with(&mut self, key: K, make: impl FnOnce() -> V) -> &mut V {
        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => {
                let slot = self.entries.len();
                self.index.insert(key, slot);
                self.entries.push(Some((key, make())));
                slot
            }
        };
        match &mut self.entries[slot] {
            Some((_, v)) => v,
            None => unreachable!("indexed slot {slot} was blotted"),
        }
    }

    /// Remove `key`, leaving a hole. Returns `true` if it was present.
    pub fn blot(&mut self, key: &K) -> bool {
        match self.index.remove(key) {
            Some(slot) => {
                self.entries[slot] = None;
                true
            }
            None => false,
        }
    }

    /// Keep only the entries for which `keep` returns `true`.
    pub fn retain(&mut self, mut keep: impl FnMut(K, &mut V) -> bool) {
        for entry in &mut self.entries {
            if let Some((k, v)) = entry {
                if !keep(*k, v) {
                    self.index.remove(k);
                    *entry = None;
                }
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> + '_ {
        self.entries.iter().flatten().map(|(k, v)| (*k, v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (K, &mut V)> + '_ {
        self.entries.iter_mut().flatten().map(|(k, v)| (*k, v))
    }

    /// Live keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.iter().map(|(k, _)| k)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.entries.clear();
    }

    /// Drop the holes left by [`blot`](Self::blot).
    pub fn compact(&mut self) {
        if self.entries.len() == self.index.len() {
            return;
        }
        self.entries.retain(Option::is_some);
        for (slot, entry) in self.entries.iter().enumerate() {
            if let Some((k, _)) = entry {
                self.index.insert(*k, slot);
            }
        }
    }
}
