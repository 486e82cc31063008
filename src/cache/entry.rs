//! Cache Entry Module
//!
//! The cached payload of one issued signed URL.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::tier::{TierError, TierResult};

// == Signed URL Entry ==
/// A signed URL together with its validity window.
///
/// `expires_at` is always the expiry reported by the signer. Entries are never
/// mutated after being written; a stale entry is deleted and replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrlEntry {
    /// The issued URL
    pub url: String,
    /// Object path the URL points at
    pub path: String,
    /// Content type hint for the object
    pub content_type: String,
    /// When the signature was produced
    pub issued_at: DateTime<Utc>,
    /// When the signature stops being valid
    pub expires_at: DateTime<Utc>,
    /// Whether this copy was served from the cache
    #[serde(default)]
    pub from_cache: bool,
}

impl SignedUrlEntry {
    // == Remaining ==
    /// Time left before the signature expires. Negative once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }

    // == Is Fresh ==
    /// Whether the entry may still be served.
    ///
    /// Boundary condition: an entry whose remaining validity equals the
    /// buffer is already stale.
    pub fn is_fresh(&self, now: DateTime<Utc>, safety_buffer: Duration) -> bool {
        self.remaining(now) > safety_buffer
    }

    /// Copy handed to callers on a cache hit.
    pub fn served_from_cache(mut self) -> Self {
        self.from_cache = true;
        self
    }

    // == Codec ==
    /// Serializes the entry for storage in a tier. Stored form is always
    /// `fromCache: false`.
    pub fn encode(&self) -> TierResult<String> {
        let stored = Self {
            from_cache: false,
            ..self.clone()
        };
        serde_json::to_string(&stored).map_err(|e| TierError::Codec(e.to_string()))
    }

    pub fn decode(raw: &str) -> TierResult<Self> {
        serde_json::from_str(raw).map_err(|e| TierError::Codec(e.to_string()))
    }
}

#[cfg(test)]
pub(crate) fn sample_entry(path: &str, now: DateTime<Utc>, valid_secs: i64) -> SignedUrlEntry {
    SignedUrlEntry {
        url: format!("https://storage.test/{}?X-Amz-Signature=abc", path),
        path: path.to_string(),
        content_type: "application/octet-stream".to_string(),
        issued_at: now,
        expires_at: now + Duration::seconds(valid_secs),
        from_cache: false,
    }
}
