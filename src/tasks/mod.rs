//! Background Tasks Module
//!
//! Periodic work that runs alongside the HTTP server.
//!
//! # Tasks
//! - Sweep: removes expired entries from the local tier
//! - Health check: keeps the distributed tier's connection state current

mod health;
mod sweep;

pub use health::spawn_health_check;
pub use sweep::spawn_sweep_task;
