//! Cache Statistics Module
//!
//! Counters for the local tier and the service-level snapshot exposed to
//! callers.

use serde::Serialize;

/// hits / (hits + misses), or 0.0 before any lookup.
pub fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

// == Cache Stats ==
/// Local tier counters. Accumulate for the lifetime of the process.
///
/// Hits and misses here are raw local lookups, including the fallback
/// lookups the service makes after a distributed miss.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Lookups that found a live entry
    pub hits: u64,
    /// Lookups that found nothing or an expired entry
    pub misses: u64,
    /// Entries dropped to make room
    pub evictions: u64,
    /// Entries removed because their TTL elapsed
    pub expired: u64,
    /// Current number of entries
    pub total_entries: usize,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit_rate(&self) -> f64 {
        hit_rate(self.hits, self.misses)
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_expired(&mut self, count: usize) {
        self.expired += count as u64;
    }

    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}

// == Service Stats ==
/// Snapshot returned by the cache service.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStats {
    /// Entries resident in the local tier
    pub entries: usize,
    /// Reads answered from either tier
    pub hits: u64,
    /// Reads that found nothing fresh
    pub misses: u64,
    /// Local tier evictions
    pub evictions: u64,
    /// hits / (hits + misses)
    pub hit_rate: f64,
    /// "connected" or "disconnected"
    pub distributed_status: &'static str,
    /// Raw local tier counters
    pub local: CacheStats,
}
