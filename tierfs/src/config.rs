use crate::cache::{CacheConfig, CachePolicy};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("LRU cache capacity must be greater than zero")]
    ZeroLruCapacity,

    #[error("{what} `{}` does not exist", .path.display())]
    MissingDirectory { what: &'static str, path: PathBuf },

    #[error("{what} `{}` exists but is not a directory", .path.display())]
    NotADirectory { what: &'static str, path: PathBuf },

    #[error("{}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("\n"))]
    Many(Vec<ConfigError>),
}

#[derive(Parser, Debug)]
#[command(name = "tierfs", version, about = "Read-only FUSE filesystem with a tiered read-through cache", long_about = None)]
pub struct Args {
    /// Empty directory to mount the filesystem on
    #[arg(long, env = "TIERFS_MOUNTPOINT", default_value = "./mnt/all-projects")]
    pub mountpoint: PathBuf,

    /// Authoritative (slow) source directory, e.g. an NFS mount
    #[arg(long, env = "TIERFS_BACKING_DIR", default_value = "./nfs")]
    pub backing_dir: PathBuf,

    /// Fast local directory holding cached payloads
    #[arg(long, env = "TIERFS_CACHE_DIR", default_value = "./ssd")]
    pub cache_dir: PathBuf,

    /// Cache policy
    #[arg(long, env = "TIERFS_CACHE", value_enum, default_value_t = CachePolicy::PassThrough)]
    pub cache: CachePolicy,

    /// Byte budget of the size-bounded cache (`--cache size`)
    #[arg(long, env = "TIERFS_SIZE_LIMIT", default_value_t = 128)]
    pub size_limit: u64,

    /// Entry capacity of the LRU cache (`--cache lru`)
    #[arg(long, env = "TIERFS_LRU_CAPACITY", default_value_t = 2)]
    pub lru_capacity: usize,

    /// Log the LRU queue after every change (`--cache lru`)
    #[arg(long, env = "TIERFS_LRU_DEBUG")]
    pub lru_debug: bool,

    /// Latency injected into every backing-store read, in milliseconds
    #[arg(long, env = "TIERFS_LATENCY_MS", default_value_t = 1000)]
    pub latency_ms: u64,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(long, env = "TIERFS_DEBUG")]
    pub debug: bool,

    /// Pass `allow_other` to the mount
    #[arg(long)]
    pub allow_other: bool,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub mountpoint: PathBuf,
    pub backing_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub cache: CacheConfig,
    pub latency: Duration,
    pub debug: bool,
    pub allow_other: bool,
}

impl Args {
    pub fn cache_config(&self) -> CacheConfig {
        match self.cache {
            CachePolicy::PassThrough => CacheConfig::PassThrough,
            CachePolicy::SizeBounded => CacheConfig::SizeBounded {
                byte_limit: self.size_limit,
            },
            CachePolicy::Lru => CacheConfig::Lru {
                capacity: self.lru_capacity,
                debug: self.lru_debug,
            },
        }
    }
}

impl TryFrom<Args> for Config {
    type Error = ConfigError;

    /// Validate every directory and limit, reporting all problems at once.
    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let mut errors = Vec::new();
        for (what, path) in [
            ("mount point", &args.mountpoint),
            ("backing directory", &args.backing_dir),
            ("cache directory", &args.cache_dir),
        ] {
            if let Err(e) = check_dir(what, path) {
                errors.push(e);
            }
        }
        let cache = args.cache_config();
        if matches!(cache, CacheConfig::Lru { capacity: 0, .. }) {
            errors.push(ConfigError::ZeroLruCapacity);
        }
        match errors.len() {
            0 => {}
            1 => return Err(errors.remove(0)),
            _ => return Err(ConfigError::Many(errors)),
        }

        Ok(Config {
            mountpoint: args.mountpoint,
            backing_dir: args.backing_dir,
            cache_dir: args.cache_dir,
            cache,
            latency: Duration::from_millis(args.latency_ms),
            debug: args.debug,
            allow_other: args.allow_other,
        })
    }
}

fn check_dir(what: &'static str, path: &Path) -> Result<(), ConfigError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(ConfigError::NotADirectory {
            what,
            path: path.to_path_buf(),
        }),
        Err(_) => Err(ConfigError::MissingDirectory {
            what,
            path: path.to_path_buf(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_in(root: &Path, extra: &[&str]) -> Args {
        for d in ["mnt", "nfs", "ssd"] {
            std::fs::create_dir_all(root.join(d)).unwrap();
        }
        let mut argv = vec![
            "tierfs".to_string(),
            format!("--mountpoint={}", root.join("mnt").display()),
            format!("--backing-dir={}", root.join("nfs").display()),
            format!("--cache-dir={}", root.join("ssd").display()),
        ];
        argv.extend(extra.iter().map(|s| s.to_string()));
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults_select_passthrough() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = Config::try_from(args_in(tmp.path(), &[])).unwrap();
        assert_eq!(cfg.cache, CacheConfig::PassThrough);
        assert_eq!(cfg.latency, Duration::from_secs(1));
        assert!(!cfg.debug);
    }

    #[test]
    fn test_policy_flags() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = Config::try_from(args_in(
            tmp.path(),
            &["--cache", "size", "--size-limit", "64"],
        ))
        .unwrap();
        assert_eq!(cfg.cache, CacheConfig::SizeBounded { byte_limit: 64 });

        let cfg = Config::try_from(args_in(
            tmp.path(),
            &["--cache", "lru", "--lru-capacity", "5", "--lru-debug", "--latency-ms", "0"],
        ))
        .unwrap();
        assert_eq!(
            cfg.cache,
            CacheConfig::Lru {
                capacity: 5,
                debug: true
            }
        );
        assert_eq!(cfg.latency, Duration::ZERO);
    }

    #[test]
    fn test_zero_lru_capacity_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Config::try_from(args_in(tmp.path(), &["--cache", "lru", "--lru-capacity", "0"]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ZeroLruCapacity));
    }

    #[test]
    fn test_missing_directories_are_all_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let mut args = args_in(tmp.path(), &[]);
        args.backing_dir = tmp.path().join("nope");
        args.cache_dir = tmp.path().join("mnt").join("file");
        std::fs::write(&args.cache_dir, b"").unwrap();
        match Config::try_from(args).unwrap_err() {
            ConfigError::Many(errs) => {
                assert_eq!(errs.len(), 2);
                assert!(matches!(errs[0], ConfigError::MissingDirectory { .. }));
                assert!(matches!(errs[1], ConfigError::NotADirectory { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
