//! Cache Service Module
//!
//! Facade over the local and distributed tiers: key derivation, dual-tier
//! read/write with fallback, freshness checks, invalidation, batch
//! operations and statistics.
//!
//! Tier failures are absorbed here. They cost performance, never the result.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::clock::Clock;
use crate::cache::entry::SignedUrlEntry;
use crate::cache::key::{CacheKey, Operation};
use crate::cache::local::LocalCache;
use crate::cache::stats::{hit_rate, ServiceStats};
use crate::cache::tier::{CacheTier, TierKind, TierWrite};

/// Default margin before expiry inside which entries are no longer served.
pub const DEFAULT_SAFETY_BUFFER_SECS: i64 = 300;

// == Settings ==
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// TTL applied to cache writes, in seconds
    pub ttl_secs: u64,
    /// Entries with no more than this much validity left are treated as absent
    pub safety_buffer: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 3000,
            safety_buffer: Duration::seconds(DEFAULT_SAFETY_BUFFER_SECS),
        }
    }
}

// == Cache Hit ==
/// A fresh entry and the tier that served it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheHit {
    pub entry: SignedUrlEntry,
    pub tier: TierKind,
}

// == Batch Write ==
/// One prepared entry for [`CacheService::write_batch`].
#[derive(Debug, Clone)]
pub struct BatchWrite {
    pub key: CacheKey,
    pub entry: SignedUrlEntry,
    pub ttl_secs: u64,
}

// == Cache Service ==
pub struct CacheService {
    local: LocalCache,
    distributed: Option<Arc<dyn CacheTier>>,
    clock: Arc<dyn Clock>,
    settings: CacheSettings,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheService {
    /// Builds the service. `distributed: None` runs in local-only mode.
    pub fn new(
        local: LocalCache,
        distributed: Option<Arc<dyn CacheTier>>,
        clock: Arc<dyn Clock>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            local,
            distributed,
            clock,
            settings,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn local(&self) -> &LocalCache {
        &self.local
    }

    /// The distributed tier, only while it reports itself available.
    fn available_distributed(&self) -> Option<&Arc<dyn CacheTier>> {
        self.distributed.as_ref().filter(|tier| tier.is_available())
    }

    // == Read ==
    /// Returns a fresh entry for the tuple, or `None`.
    ///
    /// Tries the distributed tier first, then the local tier. A distributed
    /// value that is stale or undecodable is dropped from that tier and the
    /// local tier is still consulted. Absent only if neither holds a fresh
    /// entry.
    pub async fn read(&self, operation: Operation, bucket: &str, path: &str) -> Option<CacheHit> {
        let key = CacheKey::derive(operation, bucket, path);

        let mut remote = None;
        if let Some(tier) = self.available_distributed() {
            match tier.get(key.as_str()).await {
                Ok(raw) => remote = raw,
                Err(e) => warn!(
                    key = %key,
                    tier = tier.name(),
                    error = %e,
                    "distributed read failed, using local tier"
                ),
            }
        }

        let hit = self.lookup(&key, remote).await;
        self.record(hit.is_some(), &key);
        hit
    }

    // == Write ==
    /// Stores an entry: local tier unconditionally, distributed best-effort.
    ///
    /// The local write happens first so a caller dropping this future after
    /// the first await still leaves the entry cached.
    pub async fn write(
        &self,
        operation: Operation,
        bucket: &str,
        path: &str,
        entry: &SignedUrlEntry,
        ttl_secs: u64,
    ) {
        let key = CacheKey::derive(operation, bucket, path);
        let raw = match entry.encode() {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to encode cache entry");
                return;
            }
        };

        let _ = self.local.set(key.as_str(), &raw, ttl_secs).await;

        if let Some(tier) = self.available_distributed() {
            if let Err(e) = tier.set(key.as_str(), &raw, ttl_secs).await {
                warn!(key = %key, tier = tier.name(), error = %e, "distributed write failed, entry kept locally");
            }
        }
        debug!(key = %key, ttl_secs, "cache write");
    }

    // == Invalidate ==
    /// Removes the tuple from both tiers. Absent keys are not an error.
    pub async fn invalidate(&self, operation: Operation, bucket: &str, path: &str) {
        let key = CacheKey::derive(operation, bucket, path);
        self.remove_everywhere(&key).await;
        debug!(key = %key, "cache invalidated");
    }

    // == Invalidate By Pattern ==
    /// Removes every resident key containing `substring` (plain substring
    /// match, no globbing) and returns how many local entries were removed.
    pub async fn invalidate_by_pattern(&self, substring: &str) -> usize {
        let removed = self.local.delete_matching(substring).await.unwrap_or(0);

        if let Some(tier) = self.available_distributed() {
            match tier.delete_matching(substring).await {
                Ok(remote) => debug!(pattern = %substring, remote, "distributed pattern invalidation"),
                Err(e) => warn!(pattern = %substring, tier = tier.name(), error = %e, "distributed pattern invalidation failed"),
            }
        }

        info!(pattern = %substring, removed, "pattern invalidation");
        removed
    }

    // == Read Batch ==
    /// Reads many tuples: one multi-get on the distributed tier, local tier
    /// for whatever it did not answer.
    pub async fn read_batch(
        &self,
        requests: &[(Operation, &str, &str)],
    ) -> HashMap<CacheKey, Option<CacheHit>> {
        let keys: Vec<CacheKey> = requests
            .iter()
            .map(|(op, bucket, path)| CacheKey::derive(*op, bucket, path))
            .collect();
        let raw_keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();

        let mut remote: Vec<Option<String>> = vec![None; keys.len()];
        if let Some(tier) = self.available_distributed() {
            match tier.get_many(&raw_keys).await {
                Ok(values) if values.len() == keys.len() => remote = values,
                Ok(values) => warn!(
                    expected = keys.len(),
                    got = values.len(),
                    "distributed multi-get returned wrong length, ignoring"
                ),
                Err(e) => warn!(tier = tier.name(), error = %e, "distributed multi-get failed, using local tier"),
            }
        }

        let mut results = HashMap::with_capacity(keys.len());
        for (key, remote_raw) in keys.into_iter().zip(remote) {
            if results.contains_key(&key) {
                continue;
            }
            let hit = self.lookup(&key, remote_raw).await;
            self.record(hit.is_some(), &key);
            results.insert(key, hit);
        }
        results
    }

    // == Write Batch ==
    /// Stores many entries. The distributed tier gets one pipeline, falling
    /// back to per-entry writes if the pipeline fails; the local tier always
    /// gets every entry.
    pub async fn write_batch(&self, items: Vec<BatchWrite>) {
        let prepared: Vec<TierWrite> = items
            .iter()
            .filter_map(|item| match item.entry.encode() {
                Ok(raw) => Some((item.key.to_string(), raw, item.ttl_secs)),
                Err(e) => {
                    warn!(key = %item.key, error = %e, "failed to encode cache entry");
                    None
                }
            })
            .collect();

        if prepared.is_empty() {
            return;
        }

        let _ = self.local.set_many(&prepared).await;

        if let Some(tier) = self.available_distributed() {
            if let Err(e) = tier.set_many(&prepared).await {
                warn!(count = prepared.len(), tier = tier.name(), error = %e, "distributed pipeline failed, writing entries one by one");
                for (key, raw, ttl) in &prepared {
                    if let Err(e) = tier.set(key, raw, *ttl).await {
                        debug!(key = %key, error = %e, "distributed write failed, entry kept locally");
                    }
                }
            }
        }
        debug!(count = prepared.len(), "cache batch write");
    }

    // == Stats ==
    pub async fn stats(&self) -> ServiceStats {
        let local = self.local.stats().await;
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);

        ServiceStats {
            entries: local.total_entries,
            hits,
            misses,
            evictions: local.evictions,
            hit_rate: hit_rate(hits, misses),
            distributed_status: self.distributed_status(),
            local,
        }
    }

    pub fn distributed_status(&self) -> &'static str {
        match &self.distributed {
            Some(tier) if tier.is_available() => "connected",
            _ => "disconnected",
        }
    }

    // == Flush ==
    /// Clears both tiers.
    pub async fn flush_all(&self) {
        let _ = self.local.flush_all().await;
        if let Some(tier) = self.available_distributed() {
            if let Err(e) = tier.flush_all().await {
                warn!(tier = tier.name(), error = %e, "distributed flush failed");
            }
        }
        info!("cache flushed");
    }

    // == Shutdown ==
    /// Drops the local tier and logs final statistics. The distributed tier
    /// is shared with other instances and left untouched.
    pub async fn shutdown(&self) {
        let stats = self.stats().await;
        let _ = self.local.flush_all().await;
        info!(
            hits = stats.hits,
            misses = stats.misses,
            hit_rate = stats.hit_rate,
            local_hit_rate = stats.local.hit_rate(),
            entries = stats.entries,
            "cache service shut down"
        );
    }

    /// Resolves a key from an already fetched distributed value, falling
    /// back to the local tier.
    async fn lookup(&self, key: &CacheKey, remote: Option<String>) -> Option<CacheHit> {
        if let Some(raw) = remote {
            match self.fresh_entry(key, &raw) {
                Some(entry) => {
                    self.promote(key, &raw, &entry).await;
                    debug!(key = %key, tier = "distributed", "cache hit");
                    return Some(CacheHit {
                        entry: entry.served_from_cache(),
                        tier: TierKind::Distributed,
                    });
                }
                None => self.remove_distributed(key).await,
            }
        }

        let raw = self.local_get(key).await?;
        match self.fresh_entry(key, &raw) {
            Some(entry) => {
                debug!(key = %key, tier = "local", "cache hit");
                Some(CacheHit {
                    entry: entry.served_from_cache(),
                    tier: TierKind::Local,
                })
            }
            None => {
                self.remove_everywhere(key).await;
                None
            }
        }
    }

    /// Decodes a stored value and applies the freshness policy.
    fn fresh_entry(&self, key: &CacheKey, raw: &str) -> Option<SignedUrlEntry> {
        let entry = match SignedUrlEntry::decode(raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "discarding undecodable cache entry");
                return None;
            }
        };

        let now = self.clock.now();
        if !entry.is_fresh(now, self.settings.safety_buffer) {
            debug!(
                key = %key,
                remaining_secs = entry.remaining(now).num_seconds(),
                "cached URL inside safety buffer, purging"
            );
            return None;
        }
        Some(entry)
    }

    /// Copies a distributed hit into the local tier, never past the point
    /// where it would go stale.
    async fn promote(&self, key: &CacheKey, raw: &str, entry: &SignedUrlEntry) {
        let now = self.clock.now();
        let usable = (entry.remaining(now) - self.settings.safety_buffer).num_seconds();
        let ttl = self.settings.ttl_secs.min(usable.max(1) as u64);
        let _ = self.local.set(key.as_str(), raw, ttl).await;
    }

    async fn local_get(&self, key: &CacheKey) -> Option<String> {
        self.local.get(key.as_str()).await.ok().flatten()
    }

    async fn remove_everywhere(&self, key: &CacheKey) {
        let _ = self.local.delete(key.as_str()).await;
        self.remove_distributed(key).await;
    }

    async fn remove_distributed(&self, key: &CacheKey) {
        if let Some(tier) = self.available_distributed() {
            if let Err(e) = tier.delete(key.as_str()).await {
                warn!(key = %key, tier = tier.name(), error = %e, "distributed delete failed");
            }
        }
    }

    fn record(&self, hit: bool, key: &CacheKey) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "cache miss");
        }
    }
}
