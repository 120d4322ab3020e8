use std::sync::atomic::{AtomicU64, Ordering};

/// Inode of the mount root, fixed by the FUSE protocol.
pub const ROOT_INO: u64 = 1;

/// Hands out unique, monotonically increasing inode numbers.
///
/// One allocator is created per filesystem instance and passed to the tree
/// builder; the first number it returns is [`ROOT_INO`].
#[derive(Debug)]
pub struct InodeAllocator {
    next: AtomicU64,
}

impl InodeAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(ROOT_INO),
        }
    }

    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of inodes handed out so far.
    pub fn allocated(&self) -> u64 {
        self.next.load(Ordering::Relaxed) - ROOT_INO
    }
}

impl Default for InodeAllocator {
    fn default() -> Self {
        Self::new()
    }
}
