//! Shared fakes for integration tests: an in-memory distributed tier with
//! switchable failures and a deterministic signer.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use presign_cache::cache::{CacheTier, Clock, ManualClock, SignedUrlEntry, TierError, TierResult, TierWrite};
use presign_cache::signing::{SignRequest, SignedUrl, SigningError, UrlSigner};

// == Memory Tier ==
/// Stands in for Redis. TTLs are accepted and ignored.
#[derive(Default)]
pub struct MemoryTier {
    pub data: Mutex<HashMap<String, String>>,
    /// Reported through `is_available`
    pub offline: AtomicBool,
    /// Every operation errors while still claiming availability
    pub broken: AtomicBool,
    /// Pipelined writes error
    pub broken_pipeline: AtomicBool,
    /// Single writes of keys containing this substring error
    pub reject_containing: Mutex<Option<String>>,
}

impl MemoryTier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        self.data.lock().unwrap().len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.lock().unwrap().contains_key(key)
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.data
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    fn check(&self) -> TierResult<()> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(TierError::Unavailable("connection reset".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheTier for MemoryTier {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn is_available(&self) -> bool {
        !self.offline.load(Ordering::SeqCst)
    }

    async fn get(&self, key: &str) -> TierResult<Option<String>> {
        self.check()?;
        Ok(self.data.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str, _ttl_secs: u64) -> TierResult<()> {
        self.check()?;
        if let Some(marker) = self.reject_containing.lock().unwrap().as_deref() {
            if key.contains(marker) {
                return Err(TierError::Timeout(1000));
            }
        }
        self.insert(key, value);
        Ok(())
    }

    async fn set_many(&self, items: &[TierWrite]) -> TierResult<()> {
        self.check()?;
        if self.broken_pipeline.load(Ordering::SeqCst) {
            return Err(TierError::Unavailable("pipeline aborted".to_string()));
        }
        for (key, value, _) in items {
            self.insert(key, value);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> TierResult<()> {
        self.check()?;
        self.data.lock().unwrap().remove(key);
        Ok(())
    }

    async fn delete_matching(&self, substring: &str) -> TierResult<usize> {
        self.check()?;
        let mut data = self.data.lock().unwrap();
        let before = data.len();
        data.retain(|key, _| !key.contains(substring));
        Ok(before - data.len())
    }

    async fn flush_all(&self) -> TierResult<()> {
        self.check()?;
        self.data.lock().unwrap().clear();
        Ok(())
    }
}

// == Fake Signer ==
/// Signs deterministically against a manual clock. Paths under `missing/`
/// do not exist.
pub struct FakeSigner {
    pub clock: Arc<ManualClock>,
    pub calls: AtomicUsize,
}

impl FakeSigner {
    pub fn new(clock: Arc<ManualClock>) -> Arc<Self> {
        Arc::new(Self {
            clock,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UrlSigner for FakeSigner {
    async fn sign(&self, request: &SignRequest) -> Result<SignedUrl, SigningError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if request.key.starts_with("missing/") {
            return Err(SigningError::NotFound(request.key.clone()));
        }
        Ok(SignedUrl {
            url: format!(
                "https://storage.test/{}/{}?X-Amz-Signature={:08x}",
                request.bucket, request.key, n
            ),
            expires_at: self.clock.now() + Duration::seconds(i64::from(request.expiry_secs)),
        })
    }
}

pub fn entry(path: &str, now: DateTime<Utc>, valid_secs: i64) -> SignedUrlEntry {
    SignedUrlEntry {
        url: format!("https://storage.test/media/{}?X-Amz-Signature=abc", path),
        path: path.to_string(),
        content_type: "application/octet-stream".to_string(),
        issued_at: now,
        expires_at: now + Duration::seconds(valid_secs),
        from_cache: false,
    }
}
