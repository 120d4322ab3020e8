//! Read-only filesystem over the startup namespace, with a read-through cache.

use super::{DirEntry, FsError, NodeAttr};
use crate::backing::{BackingStore, FileType};
use crate::cache::{Cache, CacheError};
use crate::pathkey::{FlatKey, flatten};
use crate::tree::{BuildError, InodeAllocator, Node, Tree, build_tree};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, error, warn};

/// An open file. The content is fetched by the first read on the handle and
/// every later read slices the same buffer.
struct OpenFile {
    ino: u64,
    data: OnceCell<Bytes>,
}

pub struct TierFs {
    tree: Arc<Tree>,
    cache: Arc<dyn Cache>,
    store: Arc<dyn BackingStore>,
    handles: Mutex<HashMap<u64, Arc<OpenFile>>>,
    next_fh: AtomicU64,
}

impl TierFs {
    pub fn new(tree: Tree, cache: Arc<dyn Cache>, store: Arc<dyn BackingStore>) -> Self {
        Self {
            tree: Arc::new(tree),
            cache,
            store,
            handles: Mutex::new(HashMap::new()),
            next_fh: AtomicU64::new(1),
        }
    }

    /// Walk `store` with a fresh inode allocator and wrap the result.
    ///
    /// Returns once the whole namespace is built; no request can be served
    /// before that.
    pub async fn build(
        store: Arc<dyn BackingStore>,
        cache: Arc<dyn Cache>,
    ) -> Result<Self, BuildError> {
        let inodes = InodeAllocator::new();
        let tree = build_tree(store.as_ref(), &inodes).await?;
        Ok(Self::new(tree, cache, store))
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn root_ino(&self) -> u64 {
        self.tree.node(self.tree.root()).ino
    }

    fn node(&self, ino: u64) -> Result<&Node, FsError> {
        self.tree.node_by_ino(ino).ok_or(FsError::NotFound)
    }

    /// Inode of the directory containing `ino`; the root is its own parent.
    pub fn parent_ino(&self, ino: u64) -> Option<u64> {
        let id = self.tree.by_ino(ino)?;
        let parent = self.tree.parent(id).unwrap_or(id);
        Some(self.tree.node(parent).ino)
    }

    /// Attributes of `ino`. Size, type and mtime always come from the
    /// backing store, identity and permissions from the node.
    pub async fn getattr(&self, ino: u64) -> Result<NodeAttr, FsError> {
        let node = self.node(ino)?;
        let meta = self.store.stat(&node.path).await?;
        Ok(NodeAttr {
            ino: node.ino,
            size: meta.size,
            kind: meta.kind,
            perm: node.perm,
            mtime: meta.mtime,
        })
    }

    /// Look `name` up in the directory `parent`.
    ///
    /// Only immediate children are considered, as POSIX lookup requires.
    pub async fn lookup(&self, parent: u64, name: &str) -> Result<NodeAttr, FsError> {
        let dir = self.tree.by_ino(parent).ok_or(FsError::NotFound)?;
        if !self.tree.node(dir).is_dir() {
            return Err(FsError::NotDir);
        }
        let child = self.tree.child_by_name(dir, name).ok_or(FsError::NotFound)?;
        self.getattr(self.tree.node(child).ino).await
    }

    pub fn readdir(&self, ino: u64) -> Result<Vec<DirEntry>, FsError> {
        let id = self.tree.by_ino(ino).ok_or(FsError::NotFound)?;
        if !self.tree.node(id).is_dir() {
            return Err(FsError::NotDir);
        }
        Ok(self
            .tree
            .children(id)
            .iter()
            .map(|&c| {
                let n = self.tree.node(c);
                DirEntry {
                    name: n.name.clone(),
                    ino: n.ino,
                    kind: n.kind,
                }
            })
            .collect())
    }

    /// Open `ino` for reading and return the new file handle. Only read-only
    /// opens of files succeed.
    pub async fn open(&self, ino: u64, flags: u32) -> Result<u64, FsError> {
        let node = self.node(ino)?;
        if node.is_dir() {
            return Err(FsError::IsDir);
        }
        if (flags as i32) & libc::O_ACCMODE != libc::O_RDONLY {
            debug!(ino, flags, "refusing non read-only open");
            return Err(FsError::AccessDenied);
        }
        let fh = self.next_fh.fetch_add(1, Ordering::Relaxed);
        let file = Arc::new(OpenFile {
            ino,
            data: OnceCell::new(),
        });
        self.handles.lock().await.insert(fh, file);
        debug!(ino, fh, "opened");
        Ok(fh)
    }

    /// Drop the buffer held by `fh`. Releasing an unknown handle is a no-op.
    pub async fn release(&self, fh: u64) {
        if self.handles.lock().await.remove(&fh).is_some() {
            debug!(fh, "released");
        }
    }

    /// Number of handles currently open.
    pub async fn open_handles(&self) -> usize {
        self.handles.lock().await.len()
    }

    pub fn opendir(&self, ino: u64) -> Result<(), FsError> {
        if self.node(ino)?.is_dir() {
            Ok(())
        } else {
            Err(FsError::NotDir)
        }
    }

    /// Read the whole content of `ino` through the cache.
    ///
    /// A cache hit never touches the backing store. On a miss the content is
    /// read from the backing store and offered to the cache; whatever the
    /// cache answers, the read itself succeeds. Only a failing backing-store
    /// read fails the request.
    pub async fn read_all(&self, ino: u64) -> Result<Bytes, FsError> {
        let node = self.node(ino)?;
        let meta = self.store.stat(&node.path).await?;
        if meta.kind == FileType::Dir || node.is_dir() {
            return Err(FsError::IsDir);
        }

        let key = match flatten(&node.path) {
            Ok(k) => Some(k),
            Err(e) => {
                warn!(path = %node.path, "file is not cacheable: {e}");
                None
            }
        };

        if let Some(key) = &key {
            if let Some(data) = self.cache_get(key).await {
                return Ok(data);
            }
        }

        let data = self.store.read_all(&node.path).await.map_err(|e| {
            error!(path = %node.path, "backing store read failed: {e}");
            FsError::Io(e)
        })?;

        if let Some(key) = &key {
            self.cache_put(key, &data, node.perm).await;
        }
        Ok(data)
    }

    /// Read up to `size` bytes at `offset` through the open handle `fh`.
    /// Reading past the end yields an empty buffer.
    ///
    /// The whole file is fetched once per handle, so a sequential read in
    /// many chunks costs one read-through even when the cache refuses it.
    pub async fn read(&self, fh: u64, offset: u64, size: u32) -> Result<Bytes, FsError> {
        let file = self
            .handles
            .lock()
            .await
            .get(&fh)
            .cloned()
            .ok_or(FsError::BadHandle)?;
        let data = file
            .data
            .get_or_try_init(|| self.read_all(file.ino))
            .await?;
        let len = data.len() as u64;
        if offset >= len {
            return Ok(Bytes::new());
        }
        let end = offset.saturating_add(size as u64).min(len);
        Ok(data.slice(offset as usize..end as usize))
    }

    async fn cache_get(&self, key: &FlatKey) -> Option<Bytes> {
        match self.cache.get(key).await {
            Ok(data) => {
                debug!(%key, len = data.len(), "cache hit");
                Some(data)
            }
            Err(CacheError::NotFound) => {
                debug!(%key, "cache miss");
                None
            }
            Err(e) => {
                warn!(%key, "cache read failed, falling back to backing store: {e}");
                None
            }
        }
    }

    async fn cache_put(&self, key: &FlatKey, data: &[u8], mode: u32) {
        match self.cache.put(key, data, mode).await {
            Ok(()) => {}
            Err(CacheError::Refused) => {
                debug!(%key, len = data.len(), policy = %self.cache.policy(), "cache refused file");
            }
            Err(e) => warn!(%key, "failed to populate cache: {e}"),
        }
    }
}
