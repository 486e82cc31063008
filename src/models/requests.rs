//! Request DTOs for the HTTP API
//!
//! Bodies and query strings accepted by the URL endpoints. Bucket and expiry
//! are optional and fall back to configured defaults in the handlers.

use serde::Deserialize;

use crate::cache::Operation;

/// Largest number of paths accepted in one batch request.
pub const MAX_BATCH_PATHS: usize = 500;

/// Request body for POST /urls
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueUrlRequest {
    pub operation: Operation,
    #[serde(default)]
    pub bucket: Option<String>,
    pub path: String,
    /// Signature validity in seconds
    #[serde(default)]
    pub expires_in: Option<u32>,
}

/// Request body for POST /urls/batch
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUrlRequest {
    pub operation: Operation,
    #[serde(default)]
    pub bucket: Option<String>,
    pub paths: Vec<String>,
    #[serde(default)]
    pub expires_in: Option<u32>,
}

impl BatchUrlRequest {
    /// Returns an error message if the batch itself is unusable.
    pub fn validate(&self) -> Option<String> {
        if self.paths.is_empty() {
            return Some("Paths cannot be empty".to_string());
        }
        if self.paths.len() > MAX_BATCH_PATHS {
            return Some(format!(
                "Batch exceeds maximum of {} paths",
                MAX_BATCH_PATHS
            ));
        }
        None
    }
}

/// Query for DELETE /cache
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateQuery {
    #[serde(default)]
    pub bucket: Option<String>,
    pub path: String,
}

/// Query for DELETE /cache/pattern
#[derive(Debug, Clone, Deserialize)]
pub struct PatternQuery {
    pub contains: String,
}
