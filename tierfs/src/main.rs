use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tierfs::backing::{BackingStore, LocalBackingStore};
use tierfs::cache::build_cache;
use tierfs::config::{Args, Config};
use tierfs::fuse::mount::mount_tierfs;
use tierfs::vfs::TierFs;
use tokio::signal;
use tokio::signal::unix::{SignalKind, signal as unix_signal};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn shutdown_signal() -> std::io::Result<()> {
    let mut term = unix_signal(SignalKind::terminate())?;
    tokio::select! {
        res = signal::ctrl_c() => res,
        _ = term.recv() => Ok(()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.debug);

    let config = Config::try_from(args).context("invalid configuration")?;
    info!(
        backing = %config.backing_dir.display(),
        cache_dir = %config.cache_dir.display(),
        mountpoint = %config.mountpoint.display(),
        policy = %config.cache.policy(),
        latency_ms = config.latency.as_millis() as u64,
        "starting tierfs"
    );

    let cache =
        build_cache(&config.cache_dir, &config.cache).context("failed to set up cache tier")?;
    let store: Arc<dyn BackingStore> =
        Arc::new(LocalBackingStore::new(&config.backing_dir, config.latency));

    // No request is served before the whole namespace is built.
    let fs = TierFs::build(store, cache).await.with_context(|| {
        format!(
            "failed to build namespace from {}",
            config.backing_dir.display()
        )
    })?;

    let mut mount_handle = mount_tierfs(fs, &config.mountpoint, config.allow_other)
        .await
        .with_context(|| format!("failed to mount on {}", config.mountpoint.display()))?;

    let handle = &mut mount_handle;
    tokio::select! {
        res = handle => {
            res.context("fuse session failed")?;
            info!("filesystem unmounted");
        }
        res = shutdown_signal() => {
            res.context("failed to listen for shutdown signals")?;
            info!("shutdown requested, unmounting");
            mount_handle.unmount().await.context("failed to unmount")?;
        }
    }
    Ok(())
}
