//! Presign Cache server binary.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use presign_cache::cache::{CacheService, CacheTier, Clock, LocalCache, RedisTier, SystemClock};
use presign_cache::signing::S3Signer;
use presign_cache::{create_router, spawn_health_check, spawn_sweep_task, AppState, Config, UrlIssuer};

/// Main entry point for the signed-URL cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load and validate configuration from environment variables
/// 3. Build the local tier and, if configured, connect the Redis tier
/// 4. Start the expiry sweep and health check tasks
/// 5. Serve HTTP until SIGINT/SIGTERM, then stop tasks and the cache
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "presign_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Presign Cache Server");

    let config = Config::from_env();
    config.validate().context("invalid configuration")?;
    info!(
        "Configuration loaded: max_entries={}, cache_ttl={}s, safety_buffer={}s, port={}, redis={}",
        config.max_entries,
        config.cache_ttl,
        config.safety_buffer,
        config.server_port,
        config.redis_url.is_some()
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let local = LocalCache::new(config.max_entries, clock.clone());

    let mut handles = vec![spawn_sweep_task(
        local.clone(),
        Duration::from_secs(config.sweep_interval),
    )];

    let distributed: Option<Arc<dyn CacheTier>> = match &config.redis_url {
        Some(url) => {
            let tier = RedisTier::new(url, config.redis_settings())
                .context("failed to configure Redis tier")?;
            if tier.connect().await {
                info!("Redis tier connected");
            }
            handles.push(spawn_health_check(
                tier.clone(),
                Duration::from_secs(config.health_interval),
            ));
            Some(Arc::new(tier) as Arc<dyn CacheTier>)
        }
        None => {
            info!("REDIS_URL not set, running with the local tier only");
            None
        }
    };

    let cache = Arc::new(CacheService::new(
        local,
        distributed,
        clock.clone(),
        config.cache_settings(),
    ));
    let signer = S3Signer::new(&config.s3_settings(), clock.clone())
        .context("failed to configure storage signer")?;
    let issuer = Arc::new(UrlIssuer::new(
        cache.clone(),
        Arc::new(signer),
        clock,
        config.issuer_settings(),
    ));

    let state = AppState::new(issuer, config.default_bucket.clone(), config.default_expiry);
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(handles))
        .await
        .context("server error")?;

    cache.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then aborts background tasks.
async fn shutdown_signal(handles: Vec<JoinHandle<()>>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    for handle in &handles {
        handle.abort();
    }
    warn!("Background tasks aborted");
}
