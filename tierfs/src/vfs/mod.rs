//! VFS layer (virtual filesystem)
//!
//! Responsibilities:
//! - Serve attribute lookup, directory listing, lookup-by-name, open and
//!   read for the nodes of the in-memory tree.
//! - Run the read-through protocol: cache first, backing store on a miss,
//!   then populate the cache.
//! - Report failures as POSIX categories the FUSE adapter turns into errno.
//!
//! Submodules:
//! - `fs`: the filesystem object and its operations
pub mod fs;

use crate::backing::FileType;
use std::io;
use std::time::SystemTime;
use thiserror::Error;

pub use fs::TierFs;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("no such file or directory")]
    NotFound,

    #[error("is a directory")]
    IsDir,

    #[error("not a directory")]
    NotDir,

    #[error("permission denied")]
    AccessDenied,

    #[error("bad file handle")]
    BadHandle,

    #[error("IO error: {0}")]
    Io(#[source] io::Error),
}

impl FsError {
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound => libc::ENOENT,
            FsError::IsDir => libc::EISDIR,
            FsError::NotDir => libc::ENOTDIR,
            FsError::AccessDenied => libc::EACCES,
            FsError::BadHandle => libc::EBADF,
            FsError::Io(_) => libc::EIO,
        }
    }
}

impl From<io::Error> for FsError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => FsError::NotFound,
            io::ErrorKind::PermissionDenied => FsError::AccessDenied,
            _ => FsError::Io(e),
        }
    }
}

#[derive(Clone, Debug)]
pub struct NodeAttr {
    pub ino: u64,
    pub size: u64,
    pub kind: FileType,
    pub perm: u32,
    pub mtime: SystemTime,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub ino: u64,
    pub kind: FileType,
}
