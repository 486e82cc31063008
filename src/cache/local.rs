//! Local Tier Module
//!
//! In-process cache combining HashMap storage with LRU eviction and
//! TTL expiration.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::cache::clock::Clock;
use crate::cache::lru::LruIndex;
use crate::cache::stats::CacheStats;
use crate::cache::tier::{CacheTier, TierResult, TierWrite};

// == Slot ==
/// Stored value with its TTL deadline.
#[derive(Debug, Clone)]
struct Slot {
    value: String,
    /// Unix milliseconds at which the slot expires
    expires_at: u64,
}

impl Slot {
    /// Expired once the clock reaches the deadline.
    fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at
    }
}

// == Local Store ==
/// Bounded key/value store with per-entry TTL.
#[derive(Debug)]
pub struct LocalStore {
    /// Key-value storage
    entries: HashMap<String, Slot>,
    /// Access recency for eviction
    lru: LruIndex,
    stats: CacheStats,
    /// Ceiling on resident entries
    max_entries: usize,
    clock: Arc<dyn Clock>,
}

impl LocalStore {
    // == Constructor ==
    /// Creates a store holding at most `max_entries` entries.
    ///
    /// A ceiling of zero is treated as one.
    pub fn new(max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruIndex::new(),
            stats: CacheStats::new(),
            max_entries: max_entries.max(1),
            clock,
        }
    }

    // == Set ==
    /// Stores a value for `ttl_secs` seconds.
    ///
    /// Overwriting a key replaces the value and restarts its TTL. Inserting a
    /// new key at capacity evicts the least recently used entry first.
    pub fn set(&mut self, key: String, value: String, ttl_secs: u64) {
        let now = self.clock.now_ms();

        if !self.entries.contains_key(&key) {
            while self.entries.len() >= self.max_entries {
                let Some(evicted) = self.lru.evict_oldest() else {
                    break;
                };
                self.entries.remove(&evicted);
                self.stats.record_eviction();
                debug!(key = %evicted, "local tier evicted entry");
            }
        }

        let slot = Slot {
            value,
            expires_at: now.saturating_add(ttl_secs.saturating_mul(1000)),
        };
        self.lru.touch(&key);
        self.entries.insert(key, slot);
        self.stats.set_total_entries(self.entries.len());
    }

    // == Get ==
    /// Returns the live value for `key`.
    ///
    /// Expired entries are removed and count as misses.
    pub fn get(&mut self, key: &str) -> Option<String> {
        let now = self.clock.now_ms();

        let live = match self.entries.get(key) {
            Some(slot) if !slot.is_expired(now) => Some(slot.value.clone()),
            Some(_) => {
                self.remove_slot(key);
                self.stats.record_expired(1);
                None
            }
            None => None,
        };

        match live {
            Some(value) => {
                self.stats.record_hit();
                self.lru.touch(key);
                Some(value)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    // == Delete ==
    /// Removes `key`, reporting whether it was present.
    pub fn delete(&mut self, key: &str) -> bool {
        self.remove_slot(key)
    }

    // == Keys ==
    /// Keys currently resident, including ones not yet swept.
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    // == Delete Matching ==
    /// Removes every key containing `substring`.
    pub fn delete_matching(&mut self, substring: &str) -> usize {
        let matched: Vec<String> = self
            .entries
            .keys()
            .filter(|key| key.contains(substring))
            .cloned()
            .collect();

        for key in &matched {
            self.remove_slot(key);
        }
        matched.len()
    }

    pub fn flush_all(&mut self) {
        self.entries.clear();
        self.lru.clear();
        self.stats.set_total_entries(0);
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    // == Cleanup Expired ==
    /// Removes all expired entries, returning how many were dropped.
    pub fn cleanup_expired(&mut self) -> usize {
        let now = self.clock.now_ms();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, slot)| slot.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.remove_slot(key);
        }
        self.stats.record_expired(expired.len());
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn remove_slot(&mut self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.lru.remove(key);
            self.stats.set_total_entries(self.entries.len());
        }
        removed
    }
}

// == Local Cache ==
/// Shared handle to a [`LocalStore`]. Clones refer to the same store.
#[derive(Debug, Clone)]
pub struct LocalCache {
    store: Arc<Mutex<LocalStore>>,
}

impl LocalCache {
    pub fn new(max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self::from_store(LocalStore::new(max_entries, clock))
    }

    pub fn from_store(store: LocalStore) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
        }
    }

    pub async fn keys(&self) -> Vec<String> {
        self.store.lock().await.keys()
    }

    pub async fn stats(&self) -> CacheStats {
        self.store.lock().await.stats()
    }

    pub async fn len(&self) -> usize {
        self.store.lock().await.len()
    }

    pub async fn cleanup_expired(&self) -> usize {
        self.store.lock().await.cleanup_expired()
    }
}

#[async_trait]
impl CacheTier for LocalCache {
    fn name(&self) -> &'static str {
        "local"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn get(&self, key: &str) -> TierResult<Option<String>> {
        Ok(self.store.lock().await.get(key))
    }

    async fn get_many(&self, keys: &[String]) -> TierResult<Vec<Option<String>>> {
        let mut store = self.store.lock().await;
        Ok(keys.iter().map(|key| store.get(key)).collect())
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> TierResult<()> {
        self.store
            .lock()
            .await
            .set(key.to_string(), value.to_string(), ttl_secs);
        Ok(())
    }

    async fn set_many(&self, items: &[TierWrite]) -> TierResult<()> {
        let mut store = self.store.lock().await;
        for (key, value, ttl) in items {
            store.set(key.clone(), value.clone(), *ttl);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> TierResult<()> {
        self.store.lock().await.delete(key);
        Ok(())
    }

    async fn delete_matching(&self, substring: &str) -> TierResult<usize> {
        Ok(self.store.lock().await.delete_matching(substring))
    }

    async fn flush_all(&self) -> TierResult<()> {
        self.store.lock().await.flush_all();
        Ok(())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;

    fn store_with_clock(max_entries: usize) -> (LocalStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        (LocalStore::new(max_entries, clock.clone()), clock)
    }

    #[test]
    fn test_set_and_get() {
        let (mut store, _) = store_with_clock(10);
        store.set("k".to_string(), "v".to_string(), 60);

        assert_eq!(store.get("k").as_deref(), Some("v"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_missing_counts_miss() {
        let (mut store, _) = store_with_clock(10);
        assert_eq!(store.get("missing"), None);
        assert_eq!(store.stats().misses, 1);
    }

    #[test]
    fn test_expired_entry_never_returned() {
        let (mut store, clock) = store_with_clock(10);
        store.set("k".to_string(), "v".to_string(), 60);

        clock.advance_secs(59);
        assert!(store.get("k").is_some());

        clock.advance_secs(1);
        assert_eq!(store.get("k"), None);
        assert!(store.is_empty());
        assert_eq!(store.stats().expired, 1);
    }

    #[test]
    fn test_overwrite_restarts_ttl() {
        let (mut store, clock) = store_with_clock(10);
        store.set("k".to_string(), "v1".to_string(), 60);
        clock.advance_secs(50);
        store.set("k".to_string(), "v2".to_string(), 60);
        clock.advance_secs(50);

        assert_eq!(store.get("k").as_deref(), Some("v2"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let (mut store, _) = store_with_clock(3);
        store.set("a".to_string(), "1".to_string(), 60);
        store.set("b".to_string(), "2".to_string(), 60);
        store.set("c".to_string(), "3".to_string(), 60);

        store.get("a");
        store.set("d".to_string(), "4".to_string(), 60);

        assert_eq!(store.len(), 3);
        assert_eq!(store.get("b"), None);
        assert!(store.get("a").is_some());
        assert!(store.get("d").is_some());
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_overwrite_at_capacity_does_not_evict() {
        let (mut store, _) = store_with_clock(2);
        store.set("a".to_string(), "1".to_string(), 60);
        store.set("b".to_string(), "2".to_string(), 60);
        store.set("a".to_string(), "3".to_string(), 60);

        assert_eq!(store.len(), 2);
        assert_eq!(store.stats().evictions, 0);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (mut store, _) = store_with_clock(10);
        store.set("k".to_string(), "v".to_string(), 60);

        assert!(store.delete("k"));
        assert!(!store.delete("k"));
    }

    #[test]
    fn test_delete_matching_substring() {
        let (mut store, _) = store_with_clock(10);
        store.set("presign:get:media:a.jpg".to_string(), "1".to_string(), 60);
        store.set("presign:put:media:a.jpg".to_string(), "2".to_string(), 60);
        store.set("presign:get:media:b.png".to_string(), "3".to_string(), 60);

        assert_eq!(store.delete_matching("a.jpg"), 2);
        assert_eq!(store.keys(), vec!["presign:get:media:b.png".to_string()]);
    }

    #[test]
    fn test_cleanup_expired() {
        let (mut store, clock) = store_with_clock(10);
        store.set("short".to_string(), "1".to_string(), 1);
        store.set("long".to_string(), "2".to_string(), 10);

        clock.advance_secs(2);

        assert_eq!(store.cleanup_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get("long").is_some());
    }

    #[test]
    fn test_flush_all() {
        let (mut store, _) = store_with_clock(10);
        store.set("a".to_string(), "1".to_string(), 60);
        store.set("b".to_string(), "2".to_string(), 60);

        store.flush_all();
        assert!(store.is_empty());
        assert_eq!(store.stats().total_entries, 0);
    }

    #[tokio::test]
    async fn test_local_cache_tier_roundtrip() {
        let clock = Arc::new(ManualClock::starting_now());
        let cache = LocalCache::new(10, clock);

        cache.set("k", "v", 60).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));

        cache.delete("k").await.unwrap();
        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_available());
    }

    #[tokio::test]
    async fn test_local_cache_clones_share_store() {
        let clock = Arc::new(ManualClock::starting_now());
        let cache = LocalCache::new(10, clock);
        let other = cache.clone();

        cache.set("k", "v", 60).await.unwrap();
        assert_eq!(other.len().await, 1);
    }
}
