//! TierFS: a read-only FUSE filesystem that mirrors a slow backing tree and
//! serves file content through a faster local cache tier.
pub mod backing;
pub mod cache;
pub mod config;
pub mod fuse;
pub mod pathkey;
pub mod tree;
pub mod vfs;
