//! Presign Cache - a caching layer for storage signed URLs
//!
//! Serves previously issued signed URLs from a local LRU/TTL tier and an
//! optional shared Redis tier, signing new ones only when no fresh copy exists.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod issuer;
pub mod models;
pub mod signing;
pub mod tasks;

pub use api::{create_router, AppState};
pub use config::Config;
pub use issuer::UrlIssuer;
pub use tasks::{spawn_health_check, spawn_sweep_task};
