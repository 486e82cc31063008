//! Response DTOs for the HTTP API
//!
//! Defines the structure of outgoing HTTP response bodies.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::{ServiceStats, SignedUrlEntry};
use crate::issuer::{BatchReport, InvalidationReport};

/// Response body for POST /urls and each successful batch item
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedUrl {
    pub url: String,
    pub path: String,
    pub content_type: String,
    pub expires_at: DateTime<Utc>,
    pub from_cache: bool,
}

impl From<SignedUrlEntry> for IssuedUrl {
    fn from(entry: SignedUrlEntry) -> Self {
        Self {
            url: entry.url,
            path: entry.path,
            content_type: entry.content_type,
            expires_at: entry.expires_at,
            from_cache: entry.from_cache,
        }
    }
}

/// One path's outcome in a batch response
#[derive(Debug, Clone, Serialize)]
pub struct BatchItemResponse {
    pub path: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<IssuedUrl>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response body for POST /urls/batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchUrlResponse {
    pub results: Vec<BatchItemResponse>,
    pub succeeded: usize,
    pub failed: usize,
}

impl From<BatchReport> for BatchUrlResponse {
    fn from(report: BatchReport) -> Self {
        let succeeded = report.succeeded();
        let failed = report.failed();
        let results = report
            .items
            .into_iter()
            .map(|item| match item.result {
                Ok(entry) => BatchItemResponse {
                    path: item.path,
                    success: true,
                    data: Some(entry.into()),
                    error: None,
                },
                Err(e) => BatchItemResponse {
                    path: item.path,
                    success: false,
                    data: None,
                    error: Some(e.to_string()),
                },
            })
            .collect();

        Self {
            results,
            succeeded,
            failed,
        }
    }
}

/// Response body for DELETE /cache
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    pub bucket: String,
    pub path: String,
    pub invalidated: bool,
}

/// Response body for DELETE /cache/pattern
#[derive(Debug, Clone, Serialize)]
pub struct PatternInvalidateResponse {
    pub pattern: String,
    pub deleted: usize,
}

impl From<InvalidationReport> for PatternInvalidateResponse {
    fn from(report: InvalidationReport) -> Self {
        Self {
            pattern: report.pattern,
            deleted: report.deleted,
        }
    }
}

/// Response body for GET /stats
pub type StatsResponse = ServiceStats;

/// Response body for GET /health
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always "healthy"; the local tier alone keeps the service usable
    pub status: String,
    pub timestamp: DateTime<Utc>,
    /// Distributed tier status: "connected" or "disconnected"
    pub distributed: String,
}

impl HealthResponse {
    pub fn healthy(distributed: &str) -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: Utc::now(),
            distributed: distributed.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::issuer::BatchItem;

    fn entry() -> SignedUrlEntry {
        let now = Utc::now();
        SignedUrlEntry {
            url: "https://storage.test/a.jpg?sig=1".to_string(),
            path: "a.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            issued_at: now,
            expires_at: now + chrono::Duration::seconds(3600),
            from_cache: true,
        }
    }

    #[test]
    fn test_issued_url_serialization() {
        let json = serde_json::to_value(IssuedUrl::from(entry())).unwrap();
        assert_eq!(json["contentType"], "image/jpeg");
        assert_eq!(json["fromCache"], true);
        assert!(json.get("issuedAt").is_none());
    }

    #[test]
    fn test_batch_response_shape() {
        let report = BatchReport {
            items: vec![
                BatchItem {
                    path: "a.jpg".to_string(),
                    result: Ok(entry()),
                },
                BatchItem {
                    path: "b.jpg".to_string(),
                    result: Err(ServiceError::InvalidInput("bad path".to_string())),
                },
            ],
        };

        let json = serde_json::to_value(BatchUrlResponse::from(report)).unwrap();
        assert_eq!(json["succeeded"], 1);
        assert_eq!(json["failed"], 1);
        assert_eq!(json["results"][0]["success"], true);
        assert!(json["results"][0].get("error").is_none());
        assert_eq!(json["results"][1]["success"], false);
        assert!(json["results"][1].get("data").is_none());
        assert!(json["results"][1]["error"].as_str().unwrap().contains("bad path"));
    }

    #[test]
    fn test_health_response() {
        let health = HealthResponse::healthy("disconnected");
        assert_eq!(health.status, "healthy");
        assert_eq!(health.distributed, "disconnected");
    }
}
