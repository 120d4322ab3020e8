//! FUSE adapter
//!
//! Implements rfuse3's raw `Filesystem` for [`TierFs`], translating kernel
//! requests into VFS calls and [`FsError`]s into errno replies. The mount is
//! read-only: every mutating request falls through to rfuse3's default
//! `ENOSYS` reply.
//!
//! Submodules:
//! - `mount`: mounting helpers
pub mod mount;

use crate::backing::FileType;
use crate::vfs::{FsError, NodeAttr, TierFs};
use futures_util::stream::{self, Stream};
use rfuse3::Result as FuseResult;
use rfuse3::raw::Filesystem;
use rfuse3::raw::Request;
use rfuse3::raw::reply::{
    DirectoryEntry, DirectoryEntryPlus, FileAttr, ReplyAttr, ReplyData, ReplyDirectory,
    ReplyDirectoryPlus, ReplyEntry, ReplyInit, ReplyOpen, ReplyStatFs,
};
use rfuse3::{FileType as FuseFileType, Timestamp};
use std::ffi::{OsStr, OsString};
use std::num::NonZeroU32;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

/// Attribute and entry validity handed to the kernel.
const TTL: Duration = Duration::from_secs(1);

/// `FOPEN_KEEP_CACHE` from the FUSE protocol: keep the page cache across opens.
const FOPEN_KEEP_CACHE: u32 = 1 << 1;

const MAX_WRITE: u32 = 128 * 1024;

impl From<FsError> for rfuse3::Errno {
    fn from(e: FsError) -> Self {
        e.errno().into()
    }
}

impl Filesystem for TierFs {
    type DirEntryStream<'a>
        = Pin<Box<dyn Stream<Item = FuseResult<DirectoryEntry>> + Send + 'a>>
    where
        Self: 'a;

    type DirEntryPlusStream<'a>
        = Pin<Box<dyn Stream<Item = FuseResult<DirectoryEntryPlus>> + Send + 'a>>
    where
        Self: 'a;

    async fn init(&self, _req: Request) -> FuseResult<ReplyInit> {
        let max_write = NonZeroU32::new(MAX_WRITE).ok_or(libc::EINVAL)?;
        debug!(nodes = self.tree().len(), "fuse session initialised");
        Ok(ReplyInit { max_write })
    }

    async fn destroy(&self, _req: Request) {
        debug!("fuse session destroyed");
    }

    async fn lookup(&self, req: Request, parent: u64, name: &OsStr) -> FuseResult<ReplyEntry> {
        let Some(name) = name.to_str() else {
            return Err(libc::ENOENT.into());
        };
        let attr = TierFs::lookup(self, parent, name).await?;
        Ok(ReplyEntry {
            ttl: TTL,
            attr: to_fuse_attr(&attr, &req),
            generation: 0,
        })
    }

    async fn getattr(
        &self,
        req: Request,
        ino: u64,
        _fh: Option<u64>,
        _flags: u32,
    ) -> FuseResult<ReplyAttr> {
        let attr = TierFs::getattr(self, ino).await?;
        Ok(ReplyAttr {
            ttl: TTL,
            attr: to_fuse_attr(&attr, &req),
        })
    }

    async fn access(&self, _req: Request, ino: u64, mask: u32) -> FuseResult<()> {
        self.ensure_exists(ino)?;
        if mask as i32 & libc::W_OK != 0 {
            return Err(libc::EROFS.into());
        }
        Ok(())
    }

    async fn open(&self, _req: Request, ino: u64, flags: u32) -> FuseResult<ReplyOpen> {
        let fh = TierFs::open(self, ino, flags).await?;
        Ok(ReplyOpen {
            fh,
            flags: FOPEN_KEEP_CACHE,
        })
    }

    async fn opendir(&self, _req: Request, ino: u64, _flags: u32) -> FuseResult<ReplyOpen> {
        TierFs::opendir(self, ino)?;
        Ok(ReplyOpen { fh: 0, flags: 0 })
    }

    async fn read(
        &self,
        _req: Request,
        _ino: u64,
        fh: u64,
        offset: u64,
        size: u32,
    ) -> FuseResult<ReplyData> {
        let data = TierFs::read(self, fh, offset, size).await?;
        Ok(ReplyData { data })
    }

    async fn readdir<'a>(
        &'a self,
        _req: Request,
        ino: u64,
        _fh: u64,
        offset: i64,
    ) -> FuseResult<ReplyDirectory<Self::DirEntryStream<'a>>> {
        let children = TierFs::readdir(self, ino)?;
        let parent = self.parent_ino(ino).unwrap_or(ino);

        let mut all = Vec::with_capacity(children.len() + 2);
        all.push((ino, FuseFileType::Directory, OsString::from(".")));
        all.push((parent, FuseFileType::Directory, OsString::from("..")));
        all.extend(
            children
                .into_iter()
                .map(|e| (e.ino, to_fuse_kind(e.kind), OsString::from(e.name))),
        );

        let entries: Vec<_> = all
            .into_iter()
            .enumerate()
            .skip(offset.max(0) as usize)
            .map(|(i, (inode, kind, name))| {
                Ok(DirectoryEntry {
                    inode,
                    kind,
                    name,
                    offset: i as i64 + 1,
                })
            })
            .collect();
        let entries: Self::DirEntryStream<'a> = Box::pin(stream::iter(entries));
        Ok(ReplyDirectory { entries })
    }

    async fn readdirplus<'a>(
        &'a self,
        req: Request,
        ino: u64,
        _fh: u64,
        offset: u64,
        _lock_owner: u64,
    ) -> FuseResult<ReplyDirectoryPlus<Self::DirEntryPlusStream<'a>>> {
        let children = TierFs::readdir(self, ino)?;
        let parent = self.parent_ino(ino).unwrap_or(ino);

        let mut all = Vec::with_capacity(children.len() + 2);
        all.push((ino, OsString::from(".")));
        all.push((parent, OsString::from("..")));
        all.extend(
            children
                .into_iter()
                .map(|e| (e.ino, OsString::from(e.name))),
        );

        let mut entries = Vec::with_capacity(all.len());
        for (i, (inode, name)) in all.into_iter().enumerate().skip(offset as usize) {
            // An entry that vanished from the backing store is left out.
            let attr = match TierFs::getattr(self, inode).await {
                Ok(a) => a,
                Err(FsError::NotFound) => continue,
                Err(e) => return Err(e.into()),
            };
            entries.push(Ok(DirectoryEntryPlus {
                inode,
                generation: 0,
                kind: to_fuse_kind(attr.kind),
                name,
                offset: i as i64 + 1,
                attr: to_fuse_attr(&attr, &req),
                entry_ttl: TTL,
                attr_ttl: TTL,
            }));
        }
        let entries: Self::DirEntryPlusStream<'a> = Box::pin(stream::iter(entries));
        Ok(ReplyDirectoryPlus { entries })
    }

    async fn statfs(&self, _req: Request, _ino: u64) -> FuseResult<ReplyStatFs> {
        Ok(ReplyStatFs {
            blocks: 0,
            bfree: 0,
            bavail: 0,
            files: self.tree().len() as u64,
            ffree: 0,
            bsize: 4096,
            namelen: 255,
            frsize: 4096,
        })
    }

    async fn release(
        &self,
        _req: Request,
        _inode: u64,
        fh: u64,
        _flags: u32,
        _lock_owner: u64,
        _flush: bool,
    ) -> FuseResult<()> {
        TierFs::release(self, fh).await;
        Ok(())
    }

    async fn flush(
        &self,
        _req: Request,
        _inode: u64,
        _fh: u64,
        _lock_owner: u64,
    ) -> FuseResult<()> {
        Ok(())
    }

    async fn releasedir(
        &self,
        _req: Request,
        _inode: u64,
        _fh: u64,
        _flags: u32,
    ) -> FuseResult<()> {
        Ok(())
    }

    // Nodes live for the whole mount; lookup counts need no bookkeeping.
    async fn forget(&self, _req: Request, _inode: u64, _nlookup: u64) {}

    async fn batch_forget(&self, _req: Request, _inodes: &[(u64, u64)]) {}

    async fn interrupt(&self, _req: Request, _unique: u64) -> FuseResult<()> {
        Ok(())
    }
}

impl TierFs {
    fn ensure_exists(&self, ino: u64) -> Result<(), FsError> {
        self.tree()
            .node_by_ino(ino)
            .map(|_| ())
            .ok_or(FsError::NotFound)
    }
}

fn to_fuse_kind(kind: FileType) -> FuseFileType {
    match kind {
        FileType::Dir => FuseFileType::Directory,
        FileType::File => FuseFileType::RegularFile,
    }
}

fn to_fuse_attr(attr: &NodeAttr, req: &Request) -> FileAttr {
    let mtime = Timestamp::from(attr.mtime);
    FileAttr {
        ino: attr.ino,
        size: attr.size,
        blocks: attr.size.div_ceil(512),
        atime: mtime,
        mtime,
        ctime: mtime,
        #[cfg(target_os = "macos")]
        crtime: mtime,
        kind: to_fuse_kind(attr.kind),
        perm: attr.perm as u16,
        nlink: match attr.kind {
            FileType::Dir => 2,
            FileType::File => 1,
        },
        uid: req.uid,
        gid: req.gid,
        rdev: 0,
        #[cfg(target_os = "macos")]
        flags: 0,
        blksize: 4096,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(to_fuse_kind(FileType::Dir), FuseFileType::Directory);
        assert_eq!(to_fuse_kind(FileType::File), FuseFileType::RegularFile);
    }
}
