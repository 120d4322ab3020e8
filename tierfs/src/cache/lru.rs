//! Entry-count bounded cache with least-recently-used eviction.
//!
//! Both `get` and `put` touch a key, so even reads take the exclusive lock.
//! The eviction queue and the membership index are the same `lru::LruCache`,
//! which keeps each key at most once.

use super::disk::DiskTier;
use super::{Cache, CacheError, CachePolicy};
use crate::config::ConfigError;
use crate::pathkey::FlatKey;
use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache as LruQueue;
use std::num::NonZeroUsize;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub struct LruCache {
    disk: DiskTier,
    capacity: NonZeroUsize,
    debug: bool,
    // key -> payload length
    queue: Mutex<LruQueue<FlatKey, u64>>,
}

impl LruCache {
    /// Create an LRU cache holding at most `capacity` payloads.
    ///
    /// A zero capacity is rejected: it would silently cache nothing.
    /// With `debug` set the queue is logged after every change.
    pub fn new<P: AsRef<Path>>(dir: P, capacity: usize, debug: bool) -> Result<Self, ConfigError> {
        let capacity = NonZeroUsize::new(capacity).ok_or(ConfigError::ZeroLruCapacity)?;
        Ok(Self {
            disk: DiskTier::new(dir),
            capacity,
            debug,
            queue: Mutex::new(LruQueue::new(capacity)),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Cached keys from least to most recently used.
    pub async fn members(&self) -> Vec<FlatKey> {
        let queue = self.queue.lock().await;
        queue.iter().rev().map(|(k, _)| k.clone()).collect()
    }

    fn dump(&self, queue: &LruQueue<FlatKey, u64>) {
        if !self.debug {
            return;
        }
        let order: Vec<&str> = queue.iter().rev().map(|(k, _)| k.as_str()).collect();
        debug!(
            len = queue.len(),
            capacity = self.capacity.get(),
            "lru queue (lru -> mru): {order:?}"
        );
    }
}

#[async_trait]
impl Cache for LruCache {
    async fn get(&self, key: &FlatKey) -> Result<Bytes, CacheError> {
        let mut queue = self.queue.lock().await;
        // `get` moves the key to the MRU end.
        if queue.get(key).is_none() {
            return Err(CacheError::NotFound);
        }
        let res = self.disk.read(key).await;
        if matches!(res, Err(CacheError::NotFound)) {
            warn!(%key, "cached payload vanished from disk, dropping entry");
            queue.pop(key);
        }
        self.dump(&queue);
        res
    }

    async fn put(&self, key: &FlatKey, data: &[u8], mode: u32) -> Result<(), CacheError> {
        let mut queue = self.queue.lock().await;
        self.disk.write(key, data, mode).await?;
        // `push` hands back the old entry when the key was already cached,
        // otherwise the evicted LRU entry if the queue was full.
        if let Some((evicted, _)) = queue.push(key.clone(), data.len() as u64) {
            if evicted != *key {
                debug!(%evicted, "evicting least recently used entry");
                if let Err(e) = self.disk.remove(&evicted).await {
                    warn!(%evicted, "failed to delete evicted payload: {e}");
                }
            }
        }
        debug!(%key, len = data.len(), "cached");
        self.dump(&queue);
        Ok(())
    }

    fn policy(&self) -> CachePolicy {
        CachePolicy::Lru
    }
}
