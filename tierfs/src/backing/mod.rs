//! Backing store accessor
//!
//! Responsibilities:
//! - Read authoritative attributes, directory listings and file bytes from
//!   the source-of-truth tree (typically an NFS mount).
//! - Model the cost of remote access by delaying every content read.
//!
//! The accessor is read-only. Errors are plain `io::Error`s; callers map
//! `ErrorKind::NotFound` and friends to POSIX categories.
//!
//! Submodules:
//! - `localfs`: accessor over a local directory
pub mod localfs;

use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::time::SystemTime;

pub use localfs::LocalBackingStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileType {
    File,
    Dir,
}

/// Attributes of one backing-store entry.
#[derive(Clone, Debug)]
pub struct EntryMeta {
    pub kind: FileType,
    pub size: u64,
    pub perm: u32,
    pub mtime: SystemTime,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntryMeta {
    pub name: String,
    pub kind: FileType,
}

/// Paths are relative to the store root; `""` names the root itself.
#[async_trait]
pub trait BackingStore: Send + Sync {
    async fn stat(&self, path: &str) -> io::Result<EntryMeta>;

    /// Read a whole file, paying the modeled access latency.
    async fn read_all(&self, path: &str) -> io::Result<Bytes>;

    /// List a directory, sorted by name.
    async fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntryMeta>>;
}
