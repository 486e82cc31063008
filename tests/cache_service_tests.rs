//! Integration Tests for the two-tier cache service
//!
//! Drives `CacheService` against an in-memory distributed tier that can be
//! switched offline or made to fail.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Duration;
use presign_cache::cache::{
    BatchWrite, CacheKey, CacheService, CacheSettings, CacheTier, Clock, LocalCache,
    ManualClock, Operation, RedisSettings, RedisTier, TierKind,
};

use common::{entry, MemoryTier};

// == Helper Functions ==

fn settings() -> CacheSettings {
    CacheSettings {
        ttl_secs: 600,
        safety_buffer: Duration::seconds(300),
    }
}

fn with_tier(tier: Arc<MemoryTier>) -> (CacheService, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_now());
    let local = LocalCache::new(100, clock.clone());
    let distributed: Arc<dyn CacheTier> = tier;
    let service = CacheService::new(local, Some(distributed), clock.clone(), settings());
    (service, clock)
}

fn key(path: &str) -> String {
    CacheKey::derive(Operation::Get, "media", path).to_string()
}

// == Freshness ==

#[tokio::test]
async fn test_entry_inside_buffer_removed_from_both_tiers() {
    let tier = MemoryTier::new();
    let (service, clock) = with_tier(tier.clone());
    let e = entry("a.jpg", clock.now(), 400);

    service.write(Operation::Get, "media", "a.jpg", &e, 600).await;
    let hit = service.read(Operation::Get, "media", "a.jpg").await.unwrap();
    assert!(hit.entry.from_cache);
    assert_eq!(hit.tier, TierKind::Distributed);

    clock.advance_secs(150);
    assert!(service.read(Operation::Get, "media", "a.jpg").await.is_none());
    assert!(!tier.contains(&key("a.jpg")));
    assert_eq!(service.local().len().await, 0);
}

/// Leaves a stale copy in the distributed tier and a fresh one only locally.
async fn stale_remote_fresh_local(tier: &MemoryTier, service: &CacheService, clock: &ManualClock) -> String {
    let stale = entry("a.jpg", clock.now(), 200);
    tier.insert(&key("a.jpg"), &stale.encode().unwrap());

    *tier.reject_containing.lock().unwrap() = Some("a.jpg".to_string());
    let mut fresh = entry("a.jpg", clock.now(), 3600);
    fresh.url = "https://storage.test/media/a.jpg?X-Amz-Signature=fresh".to_string();
    service.write(Operation::Get, "media", "a.jpg", &fresh, 600).await;
    *tier.reject_containing.lock().unwrap() = None;

    fresh.url
}

#[tokio::test]
async fn test_stale_distributed_copy_falls_through_to_local() {
    let tier = MemoryTier::new();
    let (service, clock) = with_tier(tier.clone());
    let fresh_url = stale_remote_fresh_local(&tier, &service, &clock).await;

    let hit = service.read(Operation::Get, "media", "a.jpg").await.unwrap();

    assert_eq!(hit.tier, TierKind::Local);
    assert_eq!(hit.entry.url, fresh_url);
    assert!(!tier.contains(&key("a.jpg")));
    assert_eq!(service.local().len().await, 1);
}

#[tokio::test]
async fn test_undecodable_distributed_copy_falls_through_to_local() {
    let tier = MemoryTier::new();
    let (service, clock) = with_tier(tier.clone());
    let fresh_url = stale_remote_fresh_local(&tier, &service, &clock).await;
    tier.insert(&key("a.jpg"), "{not json");

    let hit = service.read(Operation::Get, "media", "a.jpg").await.unwrap();

    assert_eq!(hit.entry.url, fresh_url);
    assert!(!tier.contains(&key("a.jpg")));
}

#[tokio::test]
async fn test_read_batch_stale_distributed_copy_falls_through_to_local() {
    let tier = MemoryTier::new();
    let (service, clock) = with_tier(tier.clone());
    let fresh_url = stale_remote_fresh_local(&tier, &service, &clock).await;

    let results = service
        .read_batch(&[(Operation::Get, "media", "a.jpg")])
        .await;

    let hit = results[&CacheKey::derive(Operation::Get, "media", "a.jpg")]
        .as_ref()
        .unwrap();
    assert_eq!(hit.tier, TierKind::Local);
    assert_eq!(hit.entry.url, fresh_url);
    assert!(!tier.contains(&key("a.jpg")));
    assert_eq!(service.stats().await.hits, 1);
}

// == Local-only Mode ==

#[tokio::test]
async fn test_local_only_mode() {
    let clock = Arc::new(ManualClock::starting_now());
    let service = CacheService::new(
        LocalCache::new(100, clock.clone()),
        None,
        clock.clone(),
        settings(),
    );
    let e = entry("a.jpg", clock.now(), 3600);

    service.write(Operation::Get, "media", "a.jpg", &e, 600).await;
    let hit = service.read(Operation::Get, "media", "a.jpg").await.unwrap();

    assert_eq!(hit.tier, TierKind::Local);
    let stats = service.stats().await;
    assert_eq!(stats.distributed_status, "disconnected");
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.hit_rate, 1.0);
}

// == Tier Fallback ==

#[tokio::test]
async fn test_failing_tier_falls_back_to_local() {
    let tier = MemoryTier::new();
    tier.broken.store(true, Ordering::SeqCst);
    let (service, clock) = with_tier(tier.clone());
    let e = entry("a.jpg", clock.now(), 3600);

    service.write(Operation::Get, "media", "a.jpg", &e, 600).await;
    let hit = service.read(Operation::Get, "media", "a.jpg").await.unwrap();
    assert_eq!(hit.tier, TierKind::Local);
    assert_eq!(hit.entry.url, e.url);

    service.invalidate(Operation::Get, "media", "a.jpg").await;
    service.invalidate(Operation::Get, "media", "a.jpg").await;
    assert!(service.read(Operation::Get, "media", "a.jpg").await.is_none());
    assert_eq!(service.stats().await.distributed_status, "connected");
}

#[tokio::test]
async fn test_unreachable_redis_falls_back_to_local() {
    let clock = Arc::new(ManualClock::starting_now());
    let redis = RedisTier::new("redis://127.0.0.1:1/", RedisSettings::default()).unwrap();
    let distributed: Arc<dyn CacheTier> = Arc::new(redis);
    let service = CacheService::new(
        LocalCache::new(100, clock.clone()),
        Some(distributed),
        clock.clone(),
        settings(),
    );
    let e = entry("a.jpg", clock.now(), 3600);

    service.write(Operation::Get, "media", "a.jpg", &e, 600).await;
    assert!(service.read(Operation::Get, "media", "a.jpg").await.is_some());
    assert_eq!(service.invalidate_by_pattern("a.jpg").await, 1);
    assert_eq!(service.stats().await.distributed_status, "disconnected");
}

#[tokio::test]
async fn test_offline_tier_is_skipped() {
    let tier = MemoryTier::new();
    tier.offline.store(true, Ordering::SeqCst);
    let (service, clock) = with_tier(tier.clone());
    let e = entry("a.jpg", clock.now(), 3600);

    service.write(Operation::Get, "media", "a.jpg", &e, 600).await;

    assert_eq!(tier.len(), 0);
    assert!(service.read(Operation::Get, "media", "a.jpg").await.is_some());
}

// == Promotion ==

#[tokio::test]
async fn test_distributed_hit_promoted_to_local() {
    let tier = MemoryTier::new();
    let (service, clock) = with_tier(tier.clone());
    let e = entry("a.jpg", clock.now(), 3600);
    tier.insert(&key("a.jpg"), &e.encode().unwrap());

    let hit = service.read(Operation::Get, "media", "a.jpg").await.unwrap();
    assert_eq!(hit.tier, TierKind::Distributed);
    assert_eq!(service.local().len().await, 1);

    tier.offline.store(true, Ordering::SeqCst);
    let hit = service.read(Operation::Get, "media", "a.jpg").await.unwrap();
    assert_eq!(hit.tier, TierKind::Local);
}

// == Pattern Invalidation ==

#[tokio::test]
async fn test_pattern_invalidation_is_substring() {
    let tier = MemoryTier::new();
    let (service, clock) = with_tier(tier.clone());
    for path in ["user-1/a.jpg", "user-1/b.jpg", "user-2/a.jpg"] {
        let e = entry(path, clock.now(), 3600);
        service.write(Operation::Get, "media", path, &e, 600).await;
    }

    assert_eq!(service.invalidate_by_pattern("user-1/").await, 2);
    assert_eq!(service.invalidate_by_pattern("*").await, 0);

    let keys = service.local().keys().await;
    assert_eq!(keys, vec![key("user-2/a.jpg")]);
    assert_eq!(tier.len(), 1);
}

// == Batch ==

#[tokio::test]
async fn test_write_batch_survives_mid_batch_failure() {
    let tier = MemoryTier::new();
    tier.broken_pipeline.store(true, Ordering::SeqCst);
    *tier.reject_containing.lock().unwrap() = Some("flaky".to_string());
    let (service, clock) = with_tier(tier.clone());

    let paths = ["a.jpg", "flaky-1.jpg", "b.jpg", "flaky-2.jpg", "c.jpg"];
    let items = paths
        .iter()
        .map(|path| BatchWrite {
            key: CacheKey::derive(Operation::Get, "media", path),
            entry: entry(path, clock.now(), 3600),
            ttl_secs: 600,
        })
        .collect();
    service.write_batch(items).await;

    assert_eq!(tier.len(), 3);
    for path in paths {
        assert!(
            service.read(Operation::Get, "media", path).await.is_some(),
            "{} should be retrievable",
            path
        );
    }
}

#[tokio::test]
async fn test_read_batch_mixes_tiers() {
    let tier = MemoryTier::new();
    let (service, clock) = with_tier(tier.clone());
    let remote = entry("remote.jpg", clock.now(), 3600);
    tier.insert(&key("remote.jpg"), &remote.encode().unwrap());

    tier.offline.store(true, Ordering::SeqCst);
    let local = entry("local.jpg", clock.now(), 3600);
    service.write(Operation::Get, "media", "local.jpg", &local, 600).await;
    tier.offline.store(false, Ordering::SeqCst);

    let results = service
        .read_batch(&[
            (Operation::Get, "media", "remote.jpg"),
            (Operation::Get, "media", "local.jpg"),
            (Operation::Get, "media", "none.jpg"),
        ])
        .await;

    let hit = |path: &str| {
        results[&CacheKey::derive(Operation::Get, "media", path)]
            .as_ref()
            .map(|h| h.tier)
    };
    assert_eq!(hit("remote.jpg"), Some(TierKind::Distributed));
    assert_eq!(hit("local.jpg"), Some(TierKind::Local));
    assert_eq!(hit("none.jpg"), None);

    let stats = service.stats().await;
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 1);
}

// == Shutdown ==

#[tokio::test]
async fn test_shutdown_leaves_distributed_tier() {
    let tier = MemoryTier::new();
    let (service, clock) = with_tier(tier.clone());
    let e = entry("a.jpg", clock.now(), 3600);
    service.write(Operation::Get, "media", "a.jpg", &e, 600).await;

    service.shutdown().await;

    assert_eq!(service.local().len().await, 0);
    assert_eq!(tier.len(), 1);
}
