//! Unbounded cache: every file read is kept, nothing is evicted.

use super::disk::DiskTier;
use super::{Cache, CacheError, CachePolicy};
use crate::pathkey::FlatKey;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;

pub struct PassThroughCache {
    disk: DiskTier,
}

impl PassThroughCache {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            disk: DiskTier::new(dir),
        }
    }
}

#[async_trait]
impl Cache for PassThroughCache {
    async fn get(&self, key: &FlatKey) -> Result<Bytes, CacheError> {
        // No bookkeeping: whatever sits in the directory is a hit.
        self.disk.read(key).await
    }

    async fn put(&self, key: &FlatKey, data: &[u8], mode: u32) -> Result<(), CacheError> {
        self.disk.write(key, data, mode).await?;
        tracing::debug!(%key, len = data.len(), "cached");
        Ok(())
    }

    fn policy(&self) -> CachePolicy {
        CachePolicy::PassThrough
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathkey::flatten;

    #[tokio::test]
    async fn test_passthrough_put_then_get() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = PassThroughCache::new(tmp.path());
        let key = flatten("project-1/main.py").unwrap();

        assert!(matches!(cache.get(&key).await, Err(CacheError::NotFound)));
        cache.put(&key, b"print('hi')", 0o444).await.unwrap();
        assert_eq!(&cache.get(&key).await.unwrap()[..], b"print('hi')");
    }

    #[tokio::test]
    async fn test_passthrough_never_evicts() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = PassThroughCache::new(tmp.path());
        let keys: Vec<FlatKey> = (0..32)
            .map(|i| flatten(&format!("d/f{i}")).unwrap())
            .collect();
        for k in &keys {
            cache.put(k, &[7u8; 1024], 0o444).await.unwrap();
        }
        for k in &keys {
            assert_eq!(cache.get(k).await.unwrap().len(), 1024);
        }
    }

    #[tokio::test]
    async fn test_passthrough_write_failure_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = PassThroughCache::new(tmp.path().join("missing"));
        let key = flatten("a").unwrap();
        assert!(matches!(
            cache.put(&key, b"x", 0o444).await,
            Err(CacheError::Io(_))
        ));
    }
}
