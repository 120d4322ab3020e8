//! Mount helpers for starting/stopping FUSE
//!
//! Notes:
//! - Only supported on Linux, through unprivileged mounts via fusermount3.
//! - These helpers are thin wrappers over rfuse3 raw Session APIs.

use std::path::Path;

use crate::vfs::TierFs;

/// Read-only mount options owned by the calling user.
#[cfg(target_os = "linux")]
fn mount_options(allow_other: bool) -> rfuse3::MountOptions {
    let uid = unsafe { libc::getuid() };
    let gid = unsafe { libc::getgid() };

    let mut mo = rfuse3::MountOptions::default();
    mo.fs_name("tierfs")
        .read_only(true)
        .force_readdir_plus(true)
        .uid(uid)
        .gid(gid);
    if allow_other {
        mo.allow_other(true);
    }
    mo
}

/// Mount `fs` on the given empty directory. The returned handle resolves when
/// the filesystem is unmounted.
#[cfg(target_os = "linux")]
pub async fn mount_tierfs(
    fs: TierFs,
    mount_point: impl AsRef<Path>,
    allow_other: bool,
) -> std::io::Result<rfuse3::raw::MountHandle> {
    let mount_point = mount_point.as_ref();
    let session = rfuse3::raw::Session::new(mount_options(allow_other));
    let handle = session.mount_with_unprivileged(fs, mount_point).await?;
    tracing::info!(mountpoint = %mount_point.display(), "tierfs mounted");
    Ok(handle)
}

/// Fallback stub for non-Linux targets.
#[cfg(not(target_os = "linux"))]
pub async fn mount_tierfs(
    _fs: TierFs,
    _mount_point: impl AsRef<Path>,
    _allow_other: bool,
) -> std::io::Result<rfuse3::raw::MountHandle> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "FUSE mount is only supported on Linux in this build",
    ))
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use crate::backing::LocalBackingStore;
    use crate::cache::LruCache;
    use std::fs;
    use std::sync::Arc;
    use std::time::Duration;

    // Needs /dev/fuse and fusermount3; enabled with TIERFS_FUSE_TEST=1.
    #[tokio::test(flavor = "multi_thread")]
    async fn smoke_mount_and_read() {
        if std::env::var("TIERFS_FUSE_TEST").ok().as_deref() != Some("1") {
            eprintln!("skip fuse mount test: set TIERFS_FUSE_TEST=1 to enable");
            return;
        }

        let nfs = tempfile::tempdir().unwrap();
        let ssd = tempfile::tempdir().unwrap();
        fs::create_dir_all(nfs.path().join("project-1/lib")).unwrap();
        fs::write(nfs.path().join("project-1/main.py"), b"print('hi')\n").unwrap();
        fs::write(nfs.path().join("project-1/lib/util.py"), b"x = 1\n").unwrap();

        let store = Arc::new(LocalBackingStore::new(nfs.path(), Duration::ZERO));
        let cache = Arc::new(LruCache::new(ssd.path(), 2, false).unwrap());
        let tierfs = TierFs::build(store, cache).await.unwrap();

        let mnt = tempfile::tempdir().unwrap();
        let mnt_path = mnt.path().to_path_buf();
        let handle = match mount_tierfs(tierfs, &mnt_path, false).await {
            Ok(h) => h,
            Err(e) => {
                eprintln!("skip fuse test: mount failed: {e}");
                return;
            }
        };
        tokio::time::sleep(Duration::from_millis(500)).await;

        let main_py = mnt_path.join("project-1/main.py");
        let (first, second) = tokio::task::spawn_blocking(move || {
            (fs::read(&main_py).unwrap(), fs::read(&main_py).unwrap())
        })
        .await
        .unwrap();
        assert_eq!(first, b"print('hi')\n");
        assert_eq!(first, second);
        assert!(ssd.path().join("project-1$main.py").is_file());

        let listing_dir = mnt_path.join("project-1");
        let mut names = tokio::task::spawn_blocking(move || {
            fs::read_dir(listing_dir)
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
        })
        .await
        .unwrap();
        names.sort();
        assert_eq!(names, vec!["lib", "main.py"]);

        let write_target = mnt_path.join("project-1/main.py");
        let write = tokio::task::spawn_blocking(move || {
            fs::OpenOptions::new().write(true).open(write_target)
        })
        .await
        .unwrap();
        assert!(write.is_err());

        if let Err(e) = handle.unmount().await {
            eprintln!("unmount error: {e}");
        }
    }
}
