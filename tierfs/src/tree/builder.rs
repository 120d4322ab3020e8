//! Startup walk of the backing store.
//!
//! The walk is a single-threaded pre-order traversal: a directory's node
//! always exists before any of its entries are visited, and entries are
//! visited in name order, so inode numbers are deterministic for a given
//! tree.

use super::{InodeAllocator, NodeId, Tree};
use crate::backing::{BackingStore, DirEntryMeta, FileType};
use std::collections::HashMap;
use std::io;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("backing store root does not exist")]
    RootNotFound,

    #[error("backing store root is not a directory")]
    RootNotDir,

    #[error("parent `{parent}` of `{path}` was not built before its entry")]
    OrphanEntry { path: String, parent: String },

    #[error("backing store IO error: {0}")]
    Io(#[from] io::Error),
}

fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

fn name_of(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

/// Walk `store` and build the namespace, numbering nodes from `inodes`.
///
/// A directory that cannot be listed keeps its node but loses its subtree.
/// A missing or non-directory root, an unreadable root, or an entry whose
/// parent was not built is fatal.
pub async fn build_tree(
    store: &dyn BackingStore,
    inodes: &InodeAllocator,
) -> Result<Tree, BuildError> {
    let root = match store.stat("").await {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(BuildError::RootNotFound),
        Err(e) => return Err(e.into()),
    };
    if root.kind != FileType::Dir {
        return Err(BuildError::RootNotDir);
    }

    let mut tree = Tree::with_root(inodes.next());
    // Directories built so far, by relative path.
    let mut dirs: HashMap<String, NodeId> = HashMap::from([(String::new(), tree.root())]);

    // (relative path, kind) still to visit; popped in name order.
    let mut pending: Vec<(String, FileType)> = Vec::new();
    push_entries(&mut pending, "", store.read_dir("").await?);

    let mut skipped = 0usize;
    while let Some((path, kind)) = pending.pop() {
        let parent_path = parent_of(&path);
        let Some(&parent) = dirs.get(parent_path) else {
            return Err(BuildError::OrphanEntry {
                parent: parent_path.to_string(),
                path,
            });
        };

        let name = name_of(&path).to_string();
        let id = tree.insert_child(parent, name, path.clone(), inodes.next(), kind);
        if kind != FileType::Dir {
            continue;
        }
        dirs.insert(path.clone(), id);

        match store.read_dir(&path).await {
            Ok(children) => push_entries(&mut pending, &path, children),
            Err(e) => {
                warn!(path = %path, "error listing directory, skipping subtree: {e}");
                skipped += 1;
            }
        }
    }

    info!(
        nodes = tree.len(),
        skipped_dirs = skipped,
        "namespace built from backing store"
    );
    debug!("namespace:\n{}", tree.dump());
    Ok(tree)
}

fn push_entries(pending: &mut Vec<(String, FileType)>, dir: &str, entries: Vec<DirEntryMeta>) {
    // Reversed so the smallest name is popped first.
    pending.extend(entries.into_iter().rev().map(|e| (join(dir, &e.name), e.kind)));
}
