//! API Module
//!
//! HTTP handlers and routing for the signed-URL REST API.
//!
//! # Endpoints
//! - `POST /urls` - Issue one signed URL
//! - `POST /urls/batch` - Issue signed URLs for many paths
//! - `DELETE /cache` - Invalidate cached URLs for one object
//! - `DELETE /cache/pattern` - Invalidate cached URLs by substring
//! - `GET /stats` - Cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
