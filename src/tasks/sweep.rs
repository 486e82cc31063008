//! Expiry Sweep Task
//!
//! Background task that periodically removes expired entries from the local
//! tier, so entries nobody reads again do not sit in memory until evicted.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::LocalCache;

/// Spawns a background task that sweeps expired entries every `interval`.
///
/// # Returns
/// A JoinHandle for the spawned task, aborted during graceful shutdown.
///
/// # Example
/// ```ignore
/// let handle = spawn_sweep_task(local.clone(), Duration::from_secs(120));
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_sweep_task(local: LocalCache, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            interval_secs = interval.as_secs(),
            "Starting local tier expiry sweep"
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = local.cleanup_expired().await;
            if removed > 0 {
                info!("Expiry sweep: removed {} expired entries", removed);
            } else {
                debug!("Expiry sweep: no expired entries found");
            }
        }
    })
}
