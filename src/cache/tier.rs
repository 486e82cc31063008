//! Cache Tier Module
//!
//! The interface both cache tiers implement. The service only talks to the
//! distributed tier through this trait.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

// == Tier Error ==
/// Failure inside a cache tier. Never surfaced past the cache service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TierError {
    /// Tier unreachable, disconnected, or returned an I/O error
    #[error("Tier unavailable: {0}")]
    Unavailable(String),

    /// Operation exceeded its I/O timeout
    #[error("Tier operation timed out after {0}ms")]
    Timeout(u64),

    /// Stored payload could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(String),
}

pub type TierResult<T> = std::result::Result<T, TierError>;

// == Tier Kind ==
/// Which tier answered a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TierKind {
    Local,
    Distributed,
}

/// One prepared write: key, encoded value, TTL in seconds.
pub type TierWrite = (String, String, u64);

// == Cache Tier ==
#[async_trait]
pub trait CacheTier: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether operations are currently expected to succeed.
    fn is_available(&self) -> bool;

    async fn get(&self, key: &str) -> TierResult<Option<String>>;

    /// Looks up several keys; the result is index-aligned with `keys`.
    async fn get_many(&self, keys: &[String]) -> TierResult<Vec<Option<String>>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get(key).await?);
        }
        Ok(values)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> TierResult<()>;

    async fn set_many(&self, items: &[TierWrite]) -> TierResult<()> {
        for (key, value, ttl) in items {
            self.set(key, value, *ttl).await?;
        }
        Ok(())
    }

    /// Removes a key. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> TierResult<()>;

    /// Removes every key containing `substring`, returning how many went.
    async fn delete_matching(&self, substring: &str) -> TierResult<usize>;

    async fn flush_all(&self) -> TierResult<()>;
}
