//! Request and Response models for the HTTP API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{
    BatchUrlRequest, InvalidateQuery, IssueUrlRequest, PatternQuery, MAX_BATCH_PATHS,
};
pub use responses::{
    BatchItemResponse, BatchUrlResponse, HealthResponse, InvalidateResponse,
    IssuedUrl, PatternInvalidateResponse, StatsResponse,
};
