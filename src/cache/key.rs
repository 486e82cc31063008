//! Cache Key Module
//!
//! Derives deterministic cache keys from a storage operation, bucket and
//! object path.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Namespace shared by every key this service writes.
pub const CACHE_KEY_PREFIX: &str = "presign";

// == Operation ==
/// Storage operation a signed URL grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    #[serde(alias = "read")]
    Get,
    #[serde(alias = "write", alias = "upload")]
    Put,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 3] = [Operation::Get, Operation::Put, Operation::Delete];

    /// Form used inside cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Get => "get",
            Operation::Put => "put",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "get" | "read" => Ok(Operation::Get),
            "put" | "write" | "upload" => Ok(Operation::Put),
            "delete" => Ok(Operation::Delete),
            other => Err(ServiceError::InvalidInput(format!(
                "Unsupported operation '{}'",
                other
            ))),
        }
    }
}

// == Cache Key ==
/// Opaque key identifying one `(operation, bucket, path)` tuple.
///
/// Only the path appears verbatim; credentials and signatures never do.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives the key for a tuple. Equal tuples always give equal keys.
    pub fn derive(operation: Operation, bucket: &str, path: &str) -> Self {
        Self(format!(
            "{}:{}:{}:{}",
            CACHE_KEY_PREFIX,
            operation.as_str(),
            bucket,
            path
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
