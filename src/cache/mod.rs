//! Cache Module
//!
//! Two-tier signed-URL cache: a bounded in-process tier with TTL and LRU
//! eviction, an optional Redis tier, and the service that coordinates them.

pub mod clock;
mod distributed;
mod entry;
mod key;
mod local;
mod lru;
mod service;
mod stats;
mod tier;


// Re-export public types
pub use clock::{Clock, ManualClock, SystemClock};
pub use distributed::{ConnectionState, ReconnectPolicy, RedisSettings, RedisTier};
pub use entry::SignedUrlEntry;
pub use key::{CacheKey, Operation, CACHE_KEY_PREFIX};
pub use local::{LocalCache, LocalStore};
pub use lru::LruIndex;
pub use service::{BatchWrite, CacheHit, CacheService, CacheSettings, DEFAULT_SAFETY_BUFFER_SECS};
pub use stats::{CacheStats, ServiceStats};
pub use tier::{CacheTier, TierError, TierKind, TierResult, TierWrite};
