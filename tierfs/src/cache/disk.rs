//! Payload files of the cache tier, one file per flattened key.

use super::CacheError;
use crate::pathkey::{FlatKey, MARKER};
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::{fs, io::AsyncWriteExt};

pub struct DiskTier {
    root: PathBuf,
    // Distinguishes temp files of concurrent writers of the same key.
    tmp_seq: AtomicU64,
}

impl DiskTier {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            tmp_seq: AtomicU64::new(0),
        }
    }

    pub fn path_for(&self, key: &FlatKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    /// Temp file for an in-flight write of `key`. The name starts with the
    /// marker, which no flattened key can, so it never shadows a payload.
    fn tmp_path_for(&self, key: &FlatKey) -> PathBuf {
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        self.root.join(format!("{MARKER}{seq}{MARKER}{key}.tmp"))
    }

    /// Read a payload. A missing file maps to [`CacheError::NotFound`].
    pub async fn read(&self, key: &FlatKey) -> Result<Bytes, CacheError> {
        match fs::read(self.path_for(key)).await {
            Ok(buf) => Ok(Bytes::from(buf)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(CacheError::NotFound),
            Err(e) => Err(CacheError::Io(e)),
        }
    }

    /// Write a payload with the given permission bits.
    ///
    /// The data lands in a temp file first and is renamed into place, so
    /// readers never observe a partial payload and an existing read-only
    /// payload can still be replaced.
    pub async fn write(&self, key: &FlatKey, data: &[u8], mode: u32) -> std::io::Result<()> {
        let tmp = self.tmp_path_for(key);
        let res = async {
            let mut opts = fs::OpenOptions::new();
            opts.write(true).create(true).truncate(true);
            #[cfg(unix)]
            opts.mode(mode);
            #[cfg(not(unix))]
            let _ = mode;
            let mut f = opts.open(&tmp).await?;
            f.write_all(data).await?;
            f.flush().await?;
            fs::rename(&tmp, self.path_for(key)).await
        }
        .await;
        if res.is_err() {
            let _ = fs::remove_file(&tmp).await;
        }
        res
    }

    /// Delete a payload. Deleting a missing payload is not an error.
    pub async fn remove(&self, key: &FlatKey) -> std::io::Result<()> {
        match fs::remove_file(self.path_for(key)).await {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
