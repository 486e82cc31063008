//! Distributed Tier Module
//!
//! Redis-backed cache tier shared between service instances. Any I/O failure
//! drops the tier to `Disconnected` and hands reconnection to a background
//! task; callers never wait for it.

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisError, RedisResult};
use tracing::{debug, info, warn};

use crate::cache::key::CACHE_KEY_PREFIX;
use crate::cache::tier::{CacheTier, TierError, TierResult, TierWrite};

/// Keys requested per SCAN round trip.
const SCAN_COUNT: u32 = 200;

// == Connection State ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            2 => ConnectionState::Connected,
            1 => ConnectionState::Connecting,
            _ => ConnectionState::Disconnected,
        }
    }
}

// == Reconnect Policy ==
/// Bounded exponential backoff for re-establishing the connection.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Attempts before parking in `Disconnected`
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    /// Delay after the given zero-based failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Settings for [`RedisTier`].
#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub reconnect: ReconnectPolicy,
    /// Upper bound on any single command or connection attempt
    pub operation_timeout: Duration,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            operation_timeout: Duration::from_secs(1),
        }
    }
}

struct Inner {
    client: Client,
    connection: RwLock<Option<MultiplexedConnection>>,
    state: AtomicU8,
    settings: RedisSettings,
}

// == Redis Tier ==
/// Distributed cache tier. Clones share one connection and state machine.
#[derive(Clone)]
pub struct RedisTier {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RedisTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisTier")
            .field("state", &self.state())
            .finish()
    }
}

impl RedisTier {
    /// Creates a disconnected tier for `url`. Only parses the URL.
    pub fn new(url: &str, settings: RedisSettings) -> TierResult<Self> {
        let client = Client::open(url)
            .map_err(|e| TierError::Unavailable(format!("invalid Redis URL: {}", e)))?;

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                connection: RwLock::new(None),
                state: AtomicU8::new(ConnectionState::Disconnected as u8),
                settings,
            }),
        })
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub fn status(&self) -> &'static str {
        match self.state() {
            ConnectionState::Connected => "connected",
            _ => "disconnected",
        }
    }

    // == Connect ==
    /// Startup handshake: one attempt inline, then background retries if it
    /// failed. Returns whether the tier is connected.
    pub async fn connect(&self) -> bool {
        if !self.transition(ConnectionState::Disconnected, ConnectionState::Connecting) {
            return self.state() == ConnectionState::Connected;
        }

        match self.try_connect().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Redis unavailable at startup, continuing with local tier");
                self.set_state(ConnectionState::Disconnected);
                self.reconnect();
                false
            }
        }
    }

    // == Reconnect ==
    /// Starts background reconnection unless already connected or connecting.
    pub fn reconnect(&self) {
        if !self.transition(ConnectionState::Disconnected, ConnectionState::Connecting) {
            return;
        }

        let tier = self.clone();
        tokio::spawn(async move {
            let policy = tier.inner.settings.reconnect.clone();
            for attempt in 0..policy.max_attempts {
                match tier.try_connect().await {
                    Ok(()) => {
                        info!(attempt = attempt + 1, "Redis connection established");
                        return;
                    }
                    Err(e) => {
                        let delay = policy.delay_for(attempt);
                        debug!(
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Redis reconnect attempt failed"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }

            tier.set_state(ConnectionState::Disconnected);
            warn!(
                attempts = policy.max_attempts,
                "Redis reconnect budget exhausted, parking until next health check"
            );
        });
    }

    // == Probe ==
    /// Health check: PING when connected, restart reconnection when parked.
    pub async fn check_health(&self) {
        match self.state() {
            ConnectionState::Connected => {
                if let Ok(mut conn) = self.connection() {
                    let cmd = redis::cmd("PING");
                    let pong: TierResult<String> = self.run(cmd.query_async(&mut conn)).await;
                    if let Err(e) = pong {
                        warn!(error = %e, "Redis health check failed");
                    }
                }
            }
            ConnectionState::Disconnected => self.reconnect(),
            ConnectionState::Connecting => {}
        }
    }

    async fn try_connect(&self) -> TierResult<()> {
        let timeout = self.inner.settings.operation_timeout;
        let mut conn = tokio::time::timeout(
            timeout,
            self.inner.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| TierError::Timeout(timeout.as_millis() as u64))?
        .map_err(|e| TierError::Unavailable(e.to_string()))?;

        let cmd = redis::cmd("PING");
        let _: String = tokio::time::timeout(timeout, cmd.query_async(&mut conn))
            .await
            .map_err(|_| TierError::Timeout(timeout.as_millis() as u64))?
            .map_err(|e| TierError::Unavailable(e.to_string()))?;

        *self
            .inner
            .connection
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(conn);
        self.set_state(ConnectionState::Connected);
        Ok(())
    }

    fn connection(&self) -> TierResult<MultiplexedConnection> {
        if self.state() != ConnectionState::Connected {
            return Err(TierError::Unavailable("Redis not connected".to_string()));
        }
        self.inner
            .connection
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| TierError::Unavailable("Redis not connected".to_string()))
    }

    /// Runs one command under the operation timeout. Connection-level
    /// failures drop the tier to `Disconnected`.
    async fn run<T, F>(&self, command: F) -> TierResult<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        let timeout = self.inner.settings.operation_timeout;
        match tokio::time::timeout(timeout, command).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                if is_connection_error(&e) {
                    self.mark_disconnected(&e.to_string());
                }
                Err(TierError::Unavailable(e.to_string()))
            }
            Err(_) => {
                self.mark_disconnected("operation timed out");
                Err(TierError::Timeout(timeout.as_millis() as u64))
            }
        }
    }

    fn mark_disconnected(&self, reason: &str) {
        if self.transition(ConnectionState::Connected, ConnectionState::Disconnected) {
            self.inner
                .connection
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .take();
            warn!(reason = %reason, "Redis connection lost, falling back to local tier");
            self.reconnect();
        }
    }

    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.inner
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn set_state(&self, state: ConnectionState) {
        self.inner.state.store(state as u8, Ordering::Release);
    }

    /// SCANs the namespace for `pattern` and deletes what it finds.
    async fn scan_delete(&self, pattern: &str, substring: Option<&str>) -> TierResult<usize> {
        let mut conn = self.connection()?;
        let namespace = format!("{}:", CACHE_KEY_PREFIX);
        let mut cursor: u64 = 0;
        let mut deleted = 0usize;

        loop {
            let mut cmd = redis::cmd("SCAN");
            cmd.arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT);
            let (next, keys): (u64, Vec<String>) = self.run(cmd.query_async(&mut conn)).await?;

            let doomed: Vec<String> = keys
                .into_iter()
                .filter(|key| key.starts_with(&namespace))
                .filter(|key| substring.map_or(true, |s| key.contains(s)))
                .collect();

            if !doomed.is_empty() {
                let removed: usize = self.run(conn.del(&doomed)).await?;
                deleted += removed;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(deleted)
    }
}

fn is_connection_error(e: &RedisError) -> bool {
    e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
}

/// Escapes Redis glob metacharacters so `substring` matches literally.
fn escape_glob(substring: &str) -> String {
    let mut escaped = String::with_capacity(substring.len());
    for c in substring.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\' | '^') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl CacheTier for RedisTier {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn is_available(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    async fn get(&self, key: &str) -> TierResult<Option<String>> {
        let mut conn = self.connection()?;
        self.run(conn.get(key)).await
    }

    async fn get_many(&self, keys: &[String]) -> TierResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection()?;
        let mut cmd = redis::cmd("MGET");
        cmd.arg(keys);
        self.run(cmd.query_async(&mut conn)).await
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> TierResult<()> {
        let mut conn = self.connection()?;
        self.run(conn.set_ex(key, value, ttl_secs.max(1))).await
    }

    async fn set_many(&self, items: &[TierWrite]) -> TierResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection()?;
        let mut pipe = redis::pipe();
        for (key, value, ttl) in items {
            pipe.cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg((*ttl).max(1))
                .ignore();
        }
        self.run(pipe.query_async(&mut conn)).await
    }

    async fn delete(&self, key: &str) -> TierResult<()> {
        let mut conn = self.connection()?;
        self.run(conn.del(key)).await
    }

    async fn delete_matching(&self, substring: &str) -> TierResult<usize> {
        let pattern = format!("*{}*", escape_glob(substring));
        self.scan_delete(&pattern, Some(substring)).await
    }

    async fn flush_all(&self) -> TierResult<()> {
        let pattern = format!("{}:*", CACHE_KEY_PREFIX);
        let removed = self.scan_delete(&pattern, None).await?;
        info!(removed, "flushed Redis cache namespace");
        Ok(())
    }
}
