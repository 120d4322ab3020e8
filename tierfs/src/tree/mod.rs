//! In-memory namespace
//!
//! The whole backing-store tree is walked once at startup and kept as an
//! arena of [`Node`]s. Nodes refer to each other by [`NodeId`], so parent and
//! child links carry no ownership. After the build the tree is immutable and
//! shared between request handlers without locking.
//!
//! Submodules:
//! - `inode`: inode number allocation
//! - `builder`: startup walk of the backing store
pub mod builder;
pub mod inode;

use crate::backing::FileType;
use std::collections::HashMap;
use std::fmt::Write;

pub use builder::{BuildError, build_tree};
pub use inode::{InodeAllocator, ROOT_INO};

/// Permission bits given to every file.
pub const FILE_PERM: u32 = 0o444;
/// Permission bits given to every directory.
pub const DIR_PERM: u32 = 0o555;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Clone, Debug)]
pub struct Node {
    pub name: String,
    /// Path relative to the backing-store root, `""` for the root.
    pub path: String,
    pub ino: u64,
    pub perm: u32,
    pub kind: FileType,
    pub parent: Option<NodeId>,
    /// `None` for files.
    pub children: Option<Vec<NodeId>>,
}

impl Node {
    fn new(name: String, path: String, ino: u64, kind: FileType, parent: Option<NodeId>) -> Self {
        let (perm, children) = match kind {
            FileType::Dir => (DIR_PERM, Some(Vec::new())),
            FileType::File => (FILE_PERM, None),
        };
        Self {
            name,
            path,
            ino,
            perm,
            kind,
            parent,
            children,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileType::Dir
    }
}

#[derive(Debug)]
pub struct Tree {
    nodes: Vec<Node>,
    by_ino: HashMap<u64, NodeId>,
}

impl Tree {
    fn with_root(ino: u64) -> Self {
        let root = Node::new(String::new(), String::new(), ino, FileType::Dir, None);
        Self {
            nodes: vec![root],
            by_ino: HashMap::from([(ino, NodeId(0))]),
        }
    }

    /// Append a node under `parent`. Only the builder mutates the tree.
    fn insert_child(
        &mut self,
        parent: NodeId,
        name: String,
        path: String,
        ino: u64,
        kind: FileType,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(name, path, ino, kind, Some(parent)));
        self.by_ino.insert(ino, id);
        if let Some(children) = self.nodes[parent.0].children.as_mut() {
            children.push(id);
        }
        id
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn by_ino(&self, ino: u64) -> Option<NodeId> {
        self.by_ino.get(&ino).copied()
    }

    pub fn node_by_ino(&self, ino: u64) -> Option<&Node> {
        self.by_ino(ino).map(|id| self.node(id))
    }

    /// Children in build order; empty for files.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).children.as_deref().unwrap_or(&[])
    }

    /// Look `name` up among the immediate children of `dir`.
    pub fn child_by_name(&self, dir: NodeId, name: &str) -> Option<NodeId> {
        self.children(dir)
            .iter()
            .copied()
            .find(|&c| self.node(c).name == name)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// Human readable listing, one node per line, indented by depth.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let mut stack = vec![(self.root(), 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let n = self.node(id);
            let name = if n.parent.is_none() { "/" } else { &n.name };
            let _ = match &n.children {
                Some(c) => writeln!(
                    out,
                    "{:indent$}{name}[{}] (Dir: {} children)",
                    "",
                    n.ino,
                    c.len(),
                    indent = depth * 2
                ),
                None => writeln!(out, "{:indent$}{name}[{}] (File)", "", n.ino, indent = depth * 2),
            };
            for &c in self.children(id).iter().rev() {
                stack.push((c, depth + 1));
            }
        }
        out
    }
}
