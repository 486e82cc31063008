//! Issuer Module
//!
//! The signed-URL issuance flow. Consults the cache service before calling
//! the signing primitive and stores fresh signatures on a miss.

mod validate;

pub use validate::{validate_bucket, validate_expiry, validate_path, MAX_EXPIRY_SECS};

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{BatchWrite, CacheKey, CacheService, Clock, Operation, ServiceStats, SignedUrlEntry};
use crate::error::{Result, ServiceError};
use crate::signing::{RetryPolicy, SignRequest, SigningError, UrlSigner};

// == Settings ==
#[derive(Debug, Clone)]
pub struct IssuerSettings {
    /// TTL for cache writes, normally shorter than the signature validity
    pub cache_ttl_secs: u64,
    /// Concurrent signing calls per batch wave
    pub wave_size: usize,
    /// Pause between batch waves
    pub wave_delay: Duration,
    /// Retry policy for signing calls made by batches
    pub batch_retry: RetryPolicy,
}

impl Default for IssuerSettings {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 3000,
            wave_size: 10,
            wave_delay: Duration::from_millis(100),
            batch_retry: RetryPolicy::default(),
        }
    }
}

// == Issue Request ==
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRequest {
    pub operation: Operation,
    pub bucket: String,
    pub path: String,
    pub expiry_secs: u32,
}

impl IssueRequest {
    pub fn new(
        operation: Operation,
        bucket: impl Into<String>,
        path: impl Into<String>,
        expiry_secs: u32,
    ) -> Self {
        Self {
            operation,
            bucket: bucket.into(),
            path: path.into(),
            expiry_secs,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_bucket(&self.bucket)?;
        validate_path(&self.path)?;
        validate_expiry(self.expiry_secs)
    }

    fn cache_key(&self) -> CacheKey {
        CacheKey::derive(self.operation, &self.bucket, &self.path)
    }
}

// == Batch Report ==
/// Outcome for one path of a batch.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub path: String,
    pub result: Result<SignedUrlEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// One item per request, in request order
    pub items: Vec<BatchItem>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|item| item.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }
}

/// Summary returned by pattern invalidation.
#[derive(Debug, Clone, Serialize)]
pub struct InvalidationReport {
    pub pattern: String,
    pub deleted: usize,
}

// == URL Issuer ==
pub struct UrlIssuer {
    cache: Arc<CacheService>,
    signer: Arc<dyn UrlSigner>,
    clock: Arc<dyn Clock>,
    settings: IssuerSettings,
}

impl UrlIssuer {
    pub fn new(
        cache: Arc<CacheService>,
        signer: Arc<dyn UrlSigner>,
        clock: Arc<dyn Clock>,
        settings: IssuerSettings,
    ) -> Self {
        Self {
            cache,
            signer,
            clock,
            settings,
        }
    }

    pub fn cache(&self) -> &Arc<CacheService> {
        &self.cache
    }

    // == Issue ==
    /// Returns a signed URL for the request, from cache when a fresh one
    /// exists. Makes a single signing attempt on a miss.
    pub async fn issue(&self, request: &IssueRequest) -> Result<SignedUrlEntry> {
        request.validate()?;

        if let Some(hit) = self
            .cache
            .read(request.operation, &request.bucket, &request.path)
            .await
        {
            return Ok(hit.entry);
        }

        let entry = self.sign(request, &RetryPolicy::none()).await?;
        if self.is_cacheable(&entry) {
            self.cache
                .write(
                    request.operation,
                    &request.bucket,
                    &request.path,
                    &entry,
                    self.settings.cache_ttl_secs,
                )
                .await;
        }
        Ok(entry)
    }

    // == Issue Batch ==
    /// Issues URLs for many requests.
    ///
    /// Cached entries are looked up in one batch read. Misses are signed in
    /// waves of `wave_size` concurrent calls with `wave_delay` between waves,
    /// and each wave is cached before the next begins. A failing item never
    /// affects the others.
    pub async fn issue_batch(&self, requests: Vec<IssueRequest>) -> BatchReport {
        let mut results: Vec<Option<Result<SignedUrlEntry>>> = vec![None; requests.len()];

        let mut pending = Vec::new();
        for (index, request) in requests.iter().enumerate() {
            match request.validate() {
                Ok(()) => pending.push(index),
                Err(e) => results[index] = Some(Err(e)),
            }
        }

        let lookups: Vec<(Operation, &str, &str)> = pending
            .iter()
            .map(|&i| {
                let r = &requests[i];
                (r.operation, r.bucket.as_str(), r.path.as_str())
            })
            .collect();
        let cached = self.cache.read_batch(&lookups).await;

        let mut misses = Vec::new();
        for &index in &pending {
            match cached.get(&requests[index].cache_key()) {
                Some(Some(hit)) => results[index] = Some(Ok(hit.entry.clone())),
                _ => misses.push(index),
            }
        }
        debug!(
            total = requests.len(),
            cached = pending.len() - misses.len(),
            to_sign = misses.len(),
            "batch issuance"
        );

        let wave_size = self.settings.wave_size.max(1);
        for (wave, indices) in misses.chunks(wave_size).enumerate() {
            if wave > 0 {
                tokio::time::sleep(self.settings.wave_delay).await;
            }

            let outcomes = join_all(
                indices
                    .iter()
                    .map(|&i| self.sign(&requests[i], &self.settings.batch_retry)),
            )
            .await;

            let mut writes = Vec::new();
            for (&index, outcome) in indices.iter().zip(outcomes) {
                let request = &requests[index];
                match outcome {
                    Ok(entry) => {
                        if self.is_cacheable(&entry) {
                            writes.push(BatchWrite {
                                key: request.cache_key(),
                                entry: entry.clone(),
                                ttl_secs: self.settings.cache_ttl_secs,
                            });
                        }
                        results[index] = Some(Ok(entry));
                    }
                    Err(e) => {
                        warn!(path = %request.path, error = %e, "batch item failed to sign");
                        results[index] = Some(Err(e.into()));
                    }
                }
            }
            self.cache.write_batch(writes).await;
        }

        let report = BatchReport {
            items: requests
                .into_iter()
                .zip(results)
                .map(|(request, result)| BatchItem {
                    path: request.path,
                    result: result.unwrap_or_else(|| {
                        Err(ServiceError::Internal("item was not processed".to_string()))
                    }),
                })
                .collect(),
        };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "batch issuance complete"
        );
        report
    }

    // == Invalidate ==
    /// Drops cached URLs for every operation on one object.
    pub async fn invalidate(&self, bucket: &str, path: &str) -> Result<()> {
        validate_bucket(bucket)?;
        validate_path(path)?;
        for operation in Operation::ALL {
            self.cache.invalidate(operation, bucket, path).await;
        }
        Ok(())
    }

    /// Drops every cached URL whose key contains `pattern`.
    pub async fn invalidate_by_pattern(&self, pattern: &str) -> Result<InvalidationReport> {
        if pattern.is_empty() {
            return Err(ServiceError::InvalidInput(
                "Pattern cannot be empty".to_string(),
            ));
        }
        let deleted = self.cache.invalidate_by_pattern(pattern).await;
        Ok(InvalidationReport {
            pattern: pattern.to_string(),
            deleted,
        })
    }

    pub async fn stats(&self) -> ServiceStats {
        self.cache.stats().await
    }

    /// Calls the signer and wraps its result in a cache entry.
    async fn sign(
        &self,
        request: &IssueRequest,
        policy: &RetryPolicy,
    ) -> std::result::Result<SignedUrlEntry, SigningError> {
        let content_type = content_type_for(&request.path);
        let sign_request = SignRequest {
            bucket: request.bucket.clone(),
            key: request.path.clone(),
            operation: request.operation,
            expiry_secs: request.expiry_secs,
            response_content_type: (request.operation == Operation::Get)
                .then(|| content_type.clone()),
        };

        let issued_at = self.clock.now();
        let signed = policy.run(|| self.signer.sign(&sign_request)).await?;

        Ok(SignedUrlEntry {
            url: signed.url,
            path: request.path.clone(),
            content_type,
            issued_at,
            expires_at: signed.expires_at,
            from_cache: false,
        })
    }

    /// Entries already inside the safety buffer would never be served.
    fn is_cacheable(&self, entry: &SignedUrlEntry) -> bool {
        entry.is_fresh(self.clock.now(), self.cache.settings().safety_buffer)
    }
}

/// Content type hint guessed from the path's extension.
pub fn content_type_for(path: &str) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string()
}
