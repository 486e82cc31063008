//! Distributed Tier Health Probe
//!
//! Pings a connected tier and restarts reconnection for a parked one.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::RedisTier;

/// Spawns a task calling [`RedisTier::check_health`] every `interval`.
pub fn spawn_health_check(tier: RedisTier, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            interval_secs = interval.as_secs(),
            "Starting distributed tier health check"
        );

        loop {
            tokio::time::sleep(interval).await;
            tier.check_health().await;
            debug!(status = tier.status(), "Health check complete");
        }
    })
}
