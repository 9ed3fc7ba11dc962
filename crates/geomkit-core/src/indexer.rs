//! Deduplicating Indexer
//!
//! Maps structured keys to dense integer slots. Equal keys (by value, not
//! identity) always land in the same slot, and the first occurrence of a key
//! decides its slot.

use std::hash::Hash;

use ahash::AHashMap;

/// Assigns a unique slot to every distinct key
#[derive(Debug, Clone)]
pub struct Indexer<K> {
    /// Distinct keys in first-seen order; `unique[slot]` is the key of `slot`
    unique: Vec<K>,
    /// Slot returned by every `add` call, in call order
    indices: Vec<u32>,
    /// Key to slot lookup
    map: AHashMap<K, u32>,
}

impl<K: Hash + Eq + Clone> Indexer<K> {
    /// Create an empty indexer
    pub fn new() -> Self {
        Self {
            unique: Vec::new(),
            indices: Vec::new(),
            map: AHashMap::new(),
        }
    }

    /// Create an indexer with room for `capacity` distinct keys
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            unique: Vec::with_capacity(capacity),
            indices: Vec::new(),
            map: AHashMap::with_capacity(capacity),
        }
    }

    /// Insert a key and return its slot.
    ///
    /// Unseen keys get the next free slot; known keys return their existing one.
    pub fn add(&mut self, key: K) -> u32 {
        let slot = match self.map.get(&key) {
            Some(&slot) => slot,
            None => {
                let slot = self.unique.len() as u32;
                self.unique.push(key.clone());
                self.map.insert(key, slot);
                slot
            }
        };
        self.indices.push(slot);
        slot
    }

    /// Look up the slot of a key without inserting it
    pub fn slot_of(&self, key: &K) -> Option<u32> {
        self.map.get(key).copied()
    }

    /// Distinct keys in slot order
    pub fn unique(&self) -> &[K] {
        &self.unique
    }

    /// Slots returned so far, one per `add` call
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.unique.len()
    }

    /// Check if no key has been added
    pub fn is_empty(&self) -> bool {
        self.unique.is_empty()
    }

    /// Consume the indexer, returning distinct keys and the slot stream
    pub fn into_parts(self) -> (Vec<K>, Vec<u32>) {
        (self.unique, self.indices)
    }
}

impl<K: Hash + Eq + Clone> Default for Indexer<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_idempotent() {
        let mut indexer = Indexer::new();
        let first = indexer.add((1u32, 2u32));
        let second = indexer.add((1u32, 2u32));

        assert_eq!(first, second);
        assert_eq!(indexer.len(), 1);
        assert_eq!(indexer.indices(), &[0, 0]);
    }

    #[test]
    fn test_first_seen_wins() {
        let mut indexer = Indexer::new();
        assert_eq!(indexer.add([3, 4]), 0);
        assert_eq!(indexer.add([1, 2]), 1);
        assert_eq!(indexer.add([3, 4]), 0);
        assert_eq!(indexer.unique(), &[[3, 4], [1, 2]]);
        assert_eq!(indexer.slot_of(&[1, 2]), Some(1));
        assert_eq!(indexer.slot_of(&[2, 1]), None);
    }

    #[test]
    fn test_structural_equality() {
        let mut indexer = Indexer::new();
        let a = vec![String::from("x"), String::from("y")];
        let b = vec![String::from("x"), String::from("y")];
        assert_eq!(indexer.add(a), indexer.add(b));
        assert_eq!(indexer.len(), 1);
    }

    #[test]
    fn test_vertex_reuse() {
        let mut indexer = Indexer::with_capacity(4);
        for key in [7, 8, 7, 9, 8] {
            indexer.add(key);
        }
        let (unique, indices) = indexer.into_parts();
        assert_eq!(unique, vec![7, 8, 9]);
        assert_eq!(indices, vec![0, 1, 0, 2, 1]);
    }

    #[test]
    fn test_empty() {
        let indexer: Indexer<u32> = Indexer::default();
        assert!(indexer.is_empty());
        assert!(indexer.unique().is_empty());
    }
}
