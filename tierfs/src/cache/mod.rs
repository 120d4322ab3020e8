//! Cache tier.
//!
//! Responsibilities:
//! - Keep copies of backing-store files on fast local storage, one payload
//!   file per flattened path key.
//! - Enforce one admission/eviction policy per instance, chosen at startup:
//!   unbounded pass-through, a byte budget, or an LRU bound on entry count.
//!
//! Failures here are never fatal to a read. `NotFound` and `Refused` are
//! ordinary outcomes and the VFS layer always has the backing store to fall
//! back on.
//!
//! Submodules:
//! - `disk`: payload files on the cache directory
//! - `passthrough`, `size`, `lru`: the three policies

pub mod disk;
pub mod lru;
pub mod passthrough;
pub mod size;

use crate::config::ConfigError;
use crate::pathkey::FlatKey;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub use self::lru::LruCache;
pub use self::passthrough::PassThroughCache;
pub use self::size::SizeBoundedCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("not found in cache")]
    NotFound,

    #[error("cache refused the file")]
    Refused,

    #[error("cache IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum CachePolicy {
    /// Cache everything, never evict.
    #[value(name = "passthrough", alias = "default")]
    PassThrough,
    /// Admit until a byte budget is spent.
    #[value(name = "size")]
    SizeBounded,
    /// Keep at most N entries, evicting the least recently used.
    #[value(name = "lru")]
    Lru,
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CachePolicy::PassThrough => "passthrough",
            CachePolicy::SizeBounded => "size",
            CachePolicy::Lru => "lru",
        };
        f.write_str(s)
    }
}

/// Policy plus its limits, as resolved from configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum CacheConfig {
    #[default]
    PassThrough,
    SizeBounded { byte_limit: u64 },
    Lru { capacity: usize, debug: bool },
}

impl CacheConfig {
    pub fn policy(&self) -> CachePolicy {
        match self {
            CacheConfig::PassThrough => CachePolicy::PassThrough,
            CacheConfig::SizeBounded { .. } => CachePolicy::SizeBounded,
            CacheConfig::Lru { .. } => CachePolicy::Lru,
        }
    }
}

/// Read-through cache contract.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Fetch the payload stored under `key`.
    ///
    /// Returns [`CacheError::NotFound`] when the key is not cached. Any other
    /// error is treated by callers as a miss.
    async fn get(&self, key: &FlatKey) -> Result<Bytes, CacheError>;

    /// Store `data` under `key`, writing the payload file with `mode`.
    ///
    /// Returns [`CacheError::Refused`] when the policy declines the entry.
    async fn put(&self, key: &FlatKey, data: &[u8], mode: u32) -> Result<(), CacheError>;

    fn policy(&self) -> CachePolicy;
}

/// Build the cache selected by `config`, storing payloads under `dir`.
pub fn build_cache(dir: &Path, config: &CacheConfig) -> Result<Arc<dyn Cache>, ConfigError> {
    let cache: Arc<dyn Cache> = match *config {
        CacheConfig::PassThrough => Arc::new(PassThroughCache::new(dir)),
        CacheConfig::SizeBounded { byte_limit } => Arc::new(SizeBoundedCache::new(dir, byte_limit)),
        CacheConfig::Lru { capacity, debug } => Arc::new(LruCache::new(dir, capacity, debug)?),
    };
    tracing::info!(policy = %cache.policy(), dir = %dir.display(), "cache tier ready");
    Ok(cache)
}
