//! Configuration Module
//!
//! Loads service configuration from environment variables once at startup.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::{CacheSettings, RedisSettings, ReconnectPolicy};
use crate::error::{Result, ServiceError};
use crate::issuer::{IssuerSettings, MAX_EXPIRY_SECS};
use crate::signing::{RetryPolicy, S3Settings};

/// Service configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// TTL in seconds for cache writes
    pub cache_ttl: u64,
    /// Maximum number of entries the local tier can hold
    pub max_entries: usize,
    /// Active expiry sweep interval in seconds
    pub sweep_interval: u64,
    /// Seconds before expiry after which a cached URL is no longer served
    pub safety_buffer: u64,
    /// Distributed tier address; `None` runs local-only
    pub redis_url: Option<String>,
    pub redis_max_retries: u32,
    pub redis_retry_base_ms: u64,
    pub redis_retry_max_ms: u64,
    /// Per-operation I/O timeout for the distributed tier
    pub redis_timeout_ms: u64,
    /// Health check interval in seconds
    pub health_interval: u64,
    pub default_bucket: String,
    /// Signature validity used when a request omits one, in seconds
    pub default_expiry: u32,
    pub batch_wave_size: usize,
    pub batch_wave_delay_ms: u64,
    pub retry_max_attempts: u32,
    pub retry_base_ms: u64,
    pub s3_endpoint: Option<String>,
    pub s3_region: String,
    pub s3_access_key: String,
    pub s3_secret_key: String,
    pub s3_verify_exists: bool,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// Unset or unparsable variables fall back to their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            server_port: env_or("SERVER_PORT", defaults.server_port),
            cache_ttl: env_or("CACHE_TTL", defaults.cache_ttl),
            max_entries: env_or("MAX_ENTRIES", defaults.max_entries),
            sweep_interval: env_or("SWEEP_INTERVAL", defaults.sweep_interval),
            safety_buffer: env_or("SAFETY_BUFFER", defaults.safety_buffer),
            redis_url: env_opt("REDIS_URL"),
            redis_max_retries: env_or("REDIS_MAX_RETRIES", defaults.redis_max_retries),
            redis_retry_base_ms: env_or("REDIS_RETRY_BASE_MS", defaults.redis_retry_base_ms),
            redis_retry_max_ms: env_or("REDIS_RETRY_MAX_MS", defaults.redis_retry_max_ms),
            redis_timeout_ms: env_or("REDIS_TIMEOUT_MS", defaults.redis_timeout_ms),
            health_interval: env_or("HEALTH_INTERVAL", defaults.health_interval),
            default_bucket: env_opt("DEFAULT_BUCKET").unwrap_or(defaults.default_bucket),
            default_expiry: env_or("DEFAULT_EXPIRY", defaults.default_expiry),
            batch_wave_size: env_or("BATCH_WAVE_SIZE", defaults.batch_wave_size),
            batch_wave_delay_ms: env_or("BATCH_WAVE_DELAY_MS", defaults.batch_wave_delay_ms),
            retry_max_attempts: env_or("RETRY_MAX_ATTEMPTS", defaults.retry_max_attempts),
            retry_base_ms: env_or("RETRY_BASE_MS", defaults.retry_base_ms),
            s3_endpoint: env_opt("S3_ENDPOINT"),
            s3_region: env_opt("S3_REGION").unwrap_or(defaults.s3_region),
            s3_access_key: env_opt("S3_ACCESS_KEY").unwrap_or_default(),
            s3_secret_key: env_opt("S3_SECRET_KEY").unwrap_or_default(),
            s3_verify_exists: env_or("S3_VERIFY_EXISTS", defaults.s3_verify_exists),
        }
    }

    /// Rejects values the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(ServiceError::InvalidInput(
                "MAX_ENTRIES must be greater than zero".to_string(),
            ));
        }
        if self.cache_ttl == 0 {
            return Err(ServiceError::InvalidInput(
                "CACHE_TTL must be greater than zero".to_string(),
            ));
        }
        if self.batch_wave_size == 0 {
            return Err(ServiceError::InvalidInput(
                "BATCH_WAVE_SIZE must be greater than zero".to_string(),
            ));
        }
        if self.sweep_interval == 0 {
            return Err(ServiceError::InvalidInput(
                "SWEEP_INTERVAL must be greater than zero".to_string(),
            ));
        }
        if self.health_interval == 0 {
            return Err(ServiceError::InvalidInput(
                "HEALTH_INTERVAL must be greater than zero".to_string(),
            ));
        }
        // A buffer at least as long as the longest signature would never serve
        if self.safety_buffer >= u64::from(MAX_EXPIRY_SECS) {
            return Err(ServiceError::InvalidInput(format!(
                "SAFETY_BUFFER must be less than {} seconds",
                MAX_EXPIRY_SECS
            )));
        }
        Ok(())
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            ttl_secs: self.cache_ttl,
            safety_buffer: chrono::Duration::seconds(
                self.safety_buffer.min(u64::from(MAX_EXPIRY_SECS)) as i64,
            ),
        }
    }

    pub fn redis_settings(&self) -> RedisSettings {
        RedisSettings {
            reconnect: ReconnectPolicy {
                max_attempts: self.redis_max_retries,
                base_delay: Duration::from_millis(self.redis_retry_base_ms),
                max_delay: Duration::from_millis(self.redis_retry_max_ms),
            },
            operation_timeout: Duration::from_millis(self.redis_timeout_ms),
        }
    }

    pub fn issuer_settings(&self) -> IssuerSettings {
        IssuerSettings {
            cache_ttl_secs: self.cache_ttl,
            wave_size: self.batch_wave_size,
            wave_delay: Duration::from_millis(self.batch_wave_delay_ms),
            batch_retry: RetryPolicy {
                max_attempts: self.retry_max_attempts.max(1),
                base_delay: Duration::from_millis(self.retry_base_ms),
                ..RetryPolicy::default()
            },
        }
    }

    pub fn s3_settings(&self) -> S3Settings {
        S3Settings {
            endpoint: self.s3_endpoint.clone(),
            region: self.s3_region.clone(),
            access_key: self.s3_access_key.clone(),
            secret_key: self.s3_secret_key.clone(),
            verify_exists: self.s3_verify_exists,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            cache_ttl: 3000,
            max_entries: 1000,
            sweep_interval: 120,
            safety_buffer: 300,
            redis_url: None,
            redis_max_retries: 5,
            redis_retry_base_ms: 100,
            redis_retry_max_ms: 5000,
            redis_timeout_ms: 1000,
            health_interval: 30,
            default_bucket: "uploads".to_string(),
            default_expiry: 3600,
            batch_wave_size: 10,
            batch_wave_delay_ms: 100,
            retry_max_attempts: 3,
            retry_base_ms: 200,
            s3_endpoint: None,
            s3_region: "us-east-1".to_string(),
            s3_access_key: String::new(),
            s3_secret_key: String::new(),
            s3_verify_exists: false,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Reads a variable, treating empty values as unset.
fn env_opt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
