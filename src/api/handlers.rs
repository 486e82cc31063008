//! API Handlers
//!
//! HTTP request handlers for each endpoint. Handlers only translate between
//! DTOs and the issuer; all policy lives below this layer.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};

use crate::error::{Result, ServiceError};
use crate::issuer::{IssueRequest, UrlIssuer};
use crate::models::{
    BatchUrlRequest, BatchUrlResponse, HealthResponse, InvalidateQuery, InvalidateResponse,
    IssueUrlRequest, IssuedUrl, PatternInvalidateResponse, PatternQuery, StatsResponse,
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub issuer: Arc<UrlIssuer>,
    /// Bucket used when a request names none
    pub default_bucket: String,
    /// Signature validity used when a request gives none
    pub default_expiry: u32,
}

impl AppState {
    pub fn new(issuer: Arc<UrlIssuer>, default_bucket: impl Into<String>, default_expiry: u32) -> Self {
        Self {
            issuer,
            default_bucket: default_bucket.into(),
            default_expiry,
        }
    }

    fn bucket_or_default(&self, bucket: Option<String>) -> String {
        bucket.unwrap_or_else(|| self.default_bucket.clone())
    }
}

/// Handler for POST /urls
pub async fn issue_handler(
    State(state): State<AppState>,
    Json(req): Json<IssueUrlRequest>,
) -> Result<Json<IssuedUrl>> {
    let request = IssueRequest {
        operation: req.operation,
        bucket: state.bucket_or_default(req.bucket),
        path: req.path,
        expiry_secs: req.expires_in.unwrap_or(state.default_expiry),
    };

    let entry = state.issuer.issue(&request).await?;
    Ok(Json(entry.into()))
}

/// Handler for POST /urls/batch
///
/// Always answers 200 once the batch itself is well-formed; per-path
/// failures are reported inside the body.
pub async fn batch_handler(
    State(state): State<AppState>,
    Json(req): Json<BatchUrlRequest>,
) -> Result<Json<BatchUrlResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(ServiceError::InvalidInput(error_msg));
    }

    let bucket = state.bucket_or_default(req.bucket);
    let expiry = req.expires_in.unwrap_or(state.default_expiry);
    let requests = req
        .paths
        .into_iter()
        .map(|path| IssueRequest::new(req.operation, bucket.clone(), path, expiry))
        .collect();

    let report = state.issuer.issue_batch(requests).await;
    Ok(Json(report.into()))
}

/// Handler for DELETE /cache?bucket=&path=
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Query(query): Query<InvalidateQuery>,
) -> Result<Json<InvalidateResponse>> {
    let bucket = state.bucket_or_default(query.bucket);
    state.issuer.invalidate(&bucket, &query.path).await?;

    Ok(Json(InvalidateResponse {
        bucket,
        path: query.path,
        invalidated: true,
    }))
}

/// Handler for DELETE /cache/pattern?contains=
pub async fn invalidate_pattern_handler(
    State(state): State<AppState>,
    Query(query): Query<PatternQuery>,
) -> Result<Json<PatternInvalidateResponse>> {
    let report = state.issuer.invalidate_by_pattern(&query.contains).await?;
    Ok(Json(report.into()))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(state.issuer.stats().await)
}

/// Handler for GET /health
///
/// Healthy whenever the process answers; a missing distributed tier only
/// degrades performance.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::healthy(
        state.issuer.cache().distributed_status(),
    ))
}
