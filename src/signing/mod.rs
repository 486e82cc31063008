//! Signing Module
//!
//! The storage signing primitive: given a bucket, object key, operation and
//! expiry, produce an opaque signed URL. The S3-compatible implementation
//! lives in the `s3_store` submodule.

mod retry;
mod s3_store;

pub use retry::RetryPolicy;
pub use s3_store::{S3Settings, S3Signer};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::cache::Operation;

// == Signing Error ==
/// Failure reported by the signing primitive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SigningError {
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Upstream asked us to slow down
    #[error("Upstream rate limited: {0}")]
    RateLimited(String),

    #[error("Signing failed: {0}")]
    Upstream(String),
}

impl SigningError {
    /// Only rate-limit failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SigningError::RateLimited(_))
    }
}

// == Sign Request ==
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignRequest {
    pub bucket: String,
    pub key: String,
    pub operation: Operation,
    pub expiry_secs: u32,
    /// Content type the storage should report when the URL is fetched
    pub response_content_type: Option<String>,
}

// == Signed URL ==
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrl {
    pub url: String,
    /// Expiry of the signature as computed by the signer
    pub expires_at: DateTime<Utc>,
}

// == URL Signer ==
#[async_trait]
pub trait UrlSigner: Send + Sync {
    async fn sign(&self, request: &SignRequest) -> Result<SignedUrl, SigningError>;
}
