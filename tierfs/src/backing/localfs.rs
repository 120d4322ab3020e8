//! Local directory backing store with injected read latency.

use super::{BackingStore, DirEntryMeta, EntryMeta, FileType};
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{debug, warn};

pub struct LocalBackingStore {
    root: PathBuf,
    latency: Duration,
    reads: AtomicU64,
}

impl LocalBackingStore {
    pub fn new<P: AsRef<Path>>(root: P, latency: Duration) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            latency,
            reads: AtomicU64::new(0),
        }
    }

    /// Number of `read_all` calls served so far, successful or not.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    fn path_for(&self, path: &str) -> PathBuf {
        let rel = path.trim_start_matches('/');
        if rel.is_empty() {
            self.root.clone()
        } else {
            self.root.join(rel)
        }
    }
}

#[async_trait]
impl BackingStore for LocalBackingStore {
    async fn stat(&self, path: &str) -> io::Result<EntryMeta> {
        let meta = fs::metadata(self.path_for(path)).await?;
        let kind = if meta.is_dir() {
            FileType::Dir
        } else {
            FileType::File
        };
        #[cfg(unix)]
        let perm = {
            use std::os::unix::fs::PermissionsExt;
            meta.permissions().mode() & 0o7777
        };
        #[cfg(not(unix))]
        let perm = if meta.permissions().readonly() { 0o555 } else { 0o755 };
        Ok(EntryMeta {
            kind,
            size: meta.len(),
            perm,
            mtime: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        })
    }

    async fn read_all(&self, path: &str) -> io::Result<Bytes> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        debug!(path, latency_ms = self.latency.as_millis() as u64, "backing store read");
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let buf = fs::read(self.path_for(path)).await?;
        Ok(Bytes::from(buf))
    }

    async fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntryMeta>> {
        let mut rd = fs::read_dir(self.path_for(path)).await?;
        let mut out = Vec::new();
        while let Some(entry) = rd.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                warn!(dir = path, name = ?entry.file_name(), "skipping non UTF-8 name");
                continue;
            };
            let file_type = entry.file_type().await?;
            let kind = if file_type.is_symlink() {
                // Links are resolved like `stat` does. Links to directories are
                // left out so the walk cannot loop.
                match fs::metadata(entry.path()).await {
                    Ok(target) if target.is_dir() => {
                        warn!(dir = path, name, "skipping symlink to directory");
                        continue;
                    }
                    Ok(_) => FileType::File,
                    Err(e) => {
                        warn!(dir = path, name, "skipping dangling symlink: {e}");
                        continue;
                    }
                }
            } else if file_type.is_dir() {
                FileType::Dir
            } else {
                FileType::File
            };
            out.push(DirEntryMeta { name, kind });
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }
}
