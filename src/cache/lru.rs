//! LRU Index Module
//!
//! Tracks access recency of local-tier keys for eviction.

use std::collections::{BTreeMap, HashMap};

// == LRU Index ==
/// Access-order index over cache keys.
///
/// Every touch stamps the key with a fresh sequence number; the smallest
/// stamp is the least recently used key.
#[derive(Debug, Default)]
pub struct LruIndex {
    /// Sequence number -> key, ordered oldest first
    order: BTreeMap<u64, String>,
    /// Key -> its current sequence number
    stamps: HashMap<String, u64>,
    next: u64,
}

impl LruIndex {
    pub fn new() -> Self {
        Self::default()
    }

    // == Touch ==
    /// Marks a key as most recently used, tracking it if new.
    pub fn touch(&mut self, key: &str) {
        let stamp = self.next;
        self.next += 1;

        if let Some(old) = self.stamps.insert(key.to_string(), stamp) {
            self.order.remove(&old);
        }
        self.order.insert(stamp, key.to_string());
    }

    // == Remove ==
    /// Stops tracking a key. Unknown keys are ignored.
    pub fn remove(&mut self, key: &str) {
        if let Some(stamp) = self.stamps.remove(key) {
            self.order.remove(&stamp);
        }
    }

    // == Evict Oldest ==
    /// Removes and returns the least recently used key.
    pub fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        self.stamps.remove(&key);
        Some(key)
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.stamps.clear();
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }
}
