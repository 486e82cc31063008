//! Error types for the signed-URL service
//!
//! Provides unified error handling using thiserror. Cache tier failures
//! never reach this type; they are absorbed inside the cache service.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::signing::SigningError;

// == Service Error Enum ==
/// Failure returned to callers of the issuance flow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Malformed operation, bucket, path or expiry. Rejected before any
    /// cache or signing call.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The signing primitive failed
    #[error(transparent)]
    Signing(#[from] SigningError),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ServiceError::Signing(SigningError::NotFound(_)) => StatusCode::NOT_FOUND,
            ServiceError::Signing(SigningError::RateLimited(_)) => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::Signing(SigningError::Upstream(_)) => StatusCode::BAD_GATEWAY,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the service.
pub type Result<T> = std::result::Result<T, ServiceError>;
