//! S3-compatible signing primitive.
//!
//! Works against AWS S3, MinIO, Cloudflare R2 and other S3 APIs through
//! rust-s3's presigning.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, Region};
use tracing::debug;

use super::{SignRequest, SignedUrl, SigningError, UrlSigner};
use crate::cache::{Clock, Operation};

/// Connection details for the object store.
#[derive(Debug, Clone)]
pub struct S3Settings {
    /// Custom endpoint; AWS regional endpoint when `None`
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    /// HEAD the object before signing a download URL
    pub verify_exists: bool,
}

impl S3Settings {
    fn region(&self) -> Region {
        let endpoint = self
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", self.region));
        Region::Custom {
            region: self.region.clone(),
            endpoint,
        }
    }
}

// == S3 Signer ==
pub struct S3Signer {
    region: Region,
    credentials: Credentials,
    verify_exists: bool,
    clock: Arc<dyn Clock>,
}

impl S3Signer {
    pub fn new(settings: &S3Settings, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let credentials = Credentials::new(
            Some(&settings.access_key),
            Some(&settings.secret_key),
            None,
            None,
            None,
        )?;

        Ok(Self {
            region: settings.region(),
            credentials,
            verify_exists: settings.verify_exists,
            clock,
        })
    }

    fn bucket(&self, name: &str) -> Result<Box<Bucket>, SigningError> {
        Bucket::new(name, self.region.clone(), self.credentials.clone())
            .map(|bucket| bucket.with_path_style())
            .map_err(|e| SigningError::Upstream(format!("bucket '{}': {}", name, e)))
    }

    async fn ensure_exists(&self, bucket: &Bucket, key: &str) -> Result<(), SigningError> {
        let (_, status) = bucket
            .head_object(key)
            .await
            .map_err(|e| classify(e, key))?;
        status_to_result(status, key)
    }
}

/// Maps an HTTP status from the object store onto the signing taxonomy.
fn status_to_result(status: u16, key: &str) -> Result<(), SigningError> {
    match status {
        200..=299 => Ok(()),
        404 => Err(SigningError::NotFound(key.to_string())),
        429 | 503 => Err(SigningError::RateLimited(format!("HTTP {}", status))),
        other => Err(SigningError::Upstream(format!("HTTP {} for {}", other, key))),
    }
}

fn classify(error: S3Error, key: &str) -> SigningError {
    match error {
        S3Error::HttpFailWithBody(status, body) => match status_to_result(status, key) {
            Err(SigningError::RateLimited(_)) => SigningError::RateLimited(body),
            Err(e) => e,
            Ok(()) => SigningError::Upstream(body),
        },
        other => SigningError::Upstream(other.to_string()),
    }
}

#[async_trait]
impl UrlSigner for S3Signer {
    async fn sign(&self, request: &SignRequest) -> Result<SignedUrl, SigningError> {
        let bucket = self.bucket(&request.bucket)?;
        let key = request.key.as_str();

        let url = match request.operation {
            Operation::Get => {
                if self.verify_exists {
                    self.ensure_exists(&bucket, key).await?;
                }
                let queries = request.response_content_type.as_ref().map(|ct| {
                    HashMap::from([("response-content-type".to_string(), ct.clone())])
                });
                bucket
                    .presign_get(key, request.expiry_secs, queries)
                    .await
            }
            Operation::Put => {
                bucket
                    .presign_put(key, request.expiry_secs, None, None)
                    .await
            }
            Operation::Delete => bucket.presign_delete(key, request.expiry_secs).await,
        }
        .map_err(|e| classify(e, key))?;

        let expires_at = self.clock.now() + Duration::seconds(i64::from(request.expiry_secs));
        debug!(bucket = %request.bucket, key = %key, operation = %request.operation, "signed URL generated");

        Ok(SignedUrl { url, expires_at })
    }
}
