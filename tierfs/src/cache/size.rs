//! Byte-budget cache.
//!
//! Admission is check-then-write: a put that would push the admitted total
//! past the budget is refused outright, with no eviction to make room. The
//! total is never decremented, so once the budget is spent the cache refuses
//! everything for the rest of the process.

use super::disk::DiskTier;
use super::{Cache, CacheError, CachePolicy};
use crate::pathkey::FlatKey;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::path::Path;
use tokio::sync::RwLock;

#[derive(Default)]
struct Admitted {
    keys: HashSet<FlatKey>,
    bytes: u64,
}

pub struct SizeBoundedCache {
    disk: DiskTier,
    byte_limit: u64,
    state: RwLock<Admitted>,
}

impl SizeBoundedCache {
    pub fn new<P: AsRef<Path>>(dir: P, byte_limit: u64) -> Self {
        Self {
            disk: DiskTier::new(dir),
            byte_limit,
            state: RwLock::new(Admitted::default()),
        }
    }

    pub fn byte_limit(&self) -> u64 {
        self.byte_limit
    }

    /// Total bytes admitted so far.
    pub async fn admitted_bytes(&self) -> u64 {
        self.state.read().await.bytes
    }
}

#[async_trait]
impl Cache for SizeBoundedCache {
    async fn get(&self, key: &FlatKey) -> Result<Bytes, CacheError> {
        let state = self.state.read().await;
        // Only payloads admitted by this process count, stale files in the
        // directory are ignored.
        if !state.keys.contains(key) {
            return Err(CacheError::NotFound);
        }
        self.disk.read(key).await
    }

    async fn put(&self, key: &FlatKey, data: &[u8], mode: u32) -> Result<(), CacheError> {
        let mut state = self.state.write().await;
        let len = data.len() as u64;
        if state.bytes.saturating_add(len) > self.byte_limit {
            tracing::debug!(
                %key,
                len,
                admitted = state.bytes,
                limit = self.byte_limit,
                "over budget, refusing"
            );
            return Err(CacheError::Refused);
        }
        self.disk.write(key, data, mode).await?;
        state.keys.insert(key.clone());
        state.bytes += len;
        tracing::debug!(%key, len, admitted = state.bytes, "cached");
        Ok(())
    }

    fn policy(&self) -> CachePolicy {
        CachePolicy::SizeBounded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathkey::flatten;

    #[tokio::test]
    async fn test_size_bounded_admission() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = SizeBoundedCache::new(tmp.path(), 64);
        let big = flatten("big.bin").unwrap();
        let mid = flatten("dir/mid.bin").unwrap();
        let late = flatten("dir/late.bin").unwrap();

        // 72 > 64: refused and never a hit.
        assert!(matches!(
            cache.put(&big, &[1u8; 72], 0o444).await,
            Err(CacheError::Refused)
        ));
        assert!(matches!(cache.get(&big).await, Err(CacheError::NotFound)));
        assert!(!tmp.path().join("big.bin").exists());

        cache.put(&mid, &[2u8; 54], 0o444).await.unwrap();
        assert_eq!(cache.get(&mid).await.unwrap().len(), 54);

        // 54 + 47 > 64.
        assert!(matches!(
            cache.put(&late, &[3u8; 47], 0o444).await,
            Err(CacheError::Refused)
        ));
        assert!(matches!(cache.get(&late).await, Err(CacheError::NotFound)));
        assert_eq!(cache.admitted_bytes().await, 54);
    }

    #[tokio::test]
    async fn test_size_bounded_exact_fit_then_stays_full() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = SizeBoundedCache::new(tmp.path(), 10);
        let a = flatten("a").unwrap();
        let b = flatten("b").unwrap();
        cache.put(&a, &[0u8; 10], 0o444).await.unwrap();
        assert_eq!(cache.admitted_bytes().await, cache.byte_limit());

        // Removing the payload behind the cache's back frees nothing.
        std::fs::remove_file(tmp.path().join("a")).unwrap();
        assert!(matches!(cache.get(&a).await, Err(CacheError::NotFound)));
        assert!(matches!(
            cache.put(&b, &[0u8; 1], 0o444).await,
            Err(CacheError::Refused)
        ));
        // Empty payloads still fit.
        cache.put(&b, &[], 0o444).await.unwrap();
    }

    #[tokio::test]
    async fn test_size_bounded_ignores_unadmitted_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("stale"), b"old").unwrap();
        let cache = SizeBoundedCache::new(tmp.path(), 64);
        let key = flatten("stale").unwrap();
        assert!(matches!(cache.get(&key).await, Err(CacheError::NotFound)));
    }

    #[tokio::test]
    async fn test_size_bounded_concurrent_puts_respect_budget() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = std::sync::Arc::new(SizeBoundedCache::new(tmp.path(), 100));
        let mut tasks = Vec::new();
        for i in 0..20 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move {
                let key = flatten(&format!("f{i}")).unwrap();
                cache.put(&key, &[0u8; 15], 0o444).await.is_ok()
            }));
        }
        let mut accepted = 0u64;
        for t in tasks {
            if t.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 6);
        assert_eq!(cache.admitted_bytes().await, 90);
    }
}
