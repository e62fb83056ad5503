//! PAL trait and platform-specific implementations.

#![allow(missing_docs)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, SqmError};

/// Filesystem statistics for a path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FsStats {
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub available_bytes: u64,
    pub is_readonly: bool,
}

impl FsStats {
    /// Bytes in use, as `df` counts them (total minus free, including reserved blocks).
    #[must_use]
    pub const fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.free_bytes)
    }

    /// Integer percent used, truncated: `used / (used + available)`.
    ///
    /// Returns 0 when the filesystem reports no usable capacity.
    #[must_use]
    pub fn used_pct(&self) -> u8 {
        let used = u128::from(self.used_bytes());
        let denom = used + u128::from(self.available_bytes);
        if denom == 0 {
            return 0;
        }
        let pct = (used * 100 / denom).min(100);
        u8::try_from(pct).unwrap_or(100)
    }
}

/// OS abstraction used by the probe and the health check.
pub trait Platform: Send + Sync {
    fn fs_stats(&self, path: &Path) -> Result<FsStats>;
    fn command_available(&self, name: &str) -> bool;
}

/// Unix implementation using `statvfs` and a `PATH` search.
#[cfg(unix)]
#[derive(Debug, Default)]
pub struct UnixPlatform;

#[cfg(unix)]
impl UnixPlatform {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
impl Platform for UnixPlatform {
    #[allow(clippy::useless_conversion)]
    fn fs_stats(&self, path: &Path) -> Result<FsStats> {
        match path.try_exists() {
            Ok(true) => {}
            Ok(false) => {
                return Err(SqmError::PathNotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(error) => {
                return Err(SqmError::FsStats {
                    path: path.to_path_buf(),
                    details: error.to_string(),
                });
            }
        }

        let stat = nix::sys::statvfs::statvfs(path).map_err(|error| match error {
            nix::errno::Errno::ENOENT => SqmError::PathNotFound {
                path: path.to_path_buf(),
            },
            other => SqmError::FsStats {
                path: path.to_path_buf(),
                details: other.to_string(),
            },
        })?;
        let fragment = u64::from(stat.fragment_size());
        Ok(FsStats {
            total_bytes: u64::from(stat.blocks()).saturating_mul(fragment),
            free_bytes: u64::from(stat.blocks_free()).saturating_mul(fragment),
            available_bytes: u64::from(stat.blocks_available()).saturating_mul(fragment),
            is_readonly: stat.flags().contains(nix::sys::statvfs::FsFlags::ST_RDONLY),
        })
    }

    fn command_available(&self, name: &str) -> bool {
        which_binary(name).is_some()
    }
}

/// In-memory mock implementation for deterministic tests.
///
/// Stats can be swapped between polls; an optional stall delays every
/// `fs_stats` call to exercise probe timeouts.
#[derive(Debug, Default)]
pub struct MockPlatform {
    stats: RwLock<HashMap<PathBuf, FsStats>>,
    commands: RwLock<HashSet<String>>,
    stall: RwLock<Option<Duration>>,
    stats_calls: AtomicUsize,
}

impl MockPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_stats(self, path: impl Into<PathBuf>, stats: FsStats) -> Self {
        self.set_stats(path, stats);
        self
    }

    #[must_use]
    pub fn with_command(self, name: &str) -> Self {
        self.commands.write().insert(name.to_string());
        self
    }

    #[must_use]
    pub fn with_stall(self, delay: Duration) -> Self {
        *self.stall.write() = Some(delay);
        self
    }

    pub fn set_stats(&self, path: impl Into<PathBuf>, stats: FsStats) {
        self.stats.write().insert(path.into(), stats);
    }

    pub fn remove_stats(&self, path: &Path) {
        self.stats.write().remove(path);
    }

    pub fn set_stall(&self, delay: Option<Duration>) {
        *self.stall.write() = delay;
    }

    /// Number of `fs_stats` calls made so far.
    pub fn stats_calls(&self) -> usize {
        self.stats_calls.load(Ordering::SeqCst)
    }
}

impl Platform for MockPlatform {
    fn fs_stats(&self, path: &Path) -> Result<FsStats> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        let stall = *self.stall.read();
        if let Some(delay) = stall {
            std::thread::sleep(delay);
        }
        self.stats
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| SqmError::PathNotFound {
                path: path.to_path_buf(),
            })
    }

    fn command_available(&self, name: &str) -> bool {
        self.commands.read().contains(name)
    }
}

/// Detect active platform implementation.
pub fn detect_platform() -> Result<Arc<dyn Platform>> {
    #[cfg(unix)]
    {
        Ok(Arc::new(UnixPlatform::new()))
    }
    #[cfg(not(unix))]
    {
        Err(SqmError::UnsupportedPlatform {
            details: "only Unix-like systems are currently implemented".to_string(),
        })
    }
}

/// Locate an executable by name on `PATH`.
pub fn which_binary(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(total: u64, free: u64, available: u64) -> FsStats {
        FsStats {
            total_bytes: total,
            free_bytes: free,
            available_bytes: available,
            is_readonly: false,
        }
    }

    #[test]
    fn used_pct_truncates() {
        // 85.9% used.
        assert_eq!(stats(1_000, 141, 141).used_pct(), 85);
        assert_eq!(stats(1_000, 150, 150).used_pct(), 85);
    }

    #[test]
    fn used_pct_counts_reserved_blocks_like_df() {
        // 100 reserved blocks: used=500, avail=400 -> 55%.
        assert_eq!(stats(1_000, 500, 400).used_pct(), 55);
    }

    #[test]
    fn used_pct_empty_filesystem_is_zero() {
        assert_eq!(stats(0, 0, 0).used_pct(), 0);
    }

    #[test]
    fn used_pct_never_exceeds_hundred() {
        assert_eq!(stats(u64::MAX, 0, 0).used_pct(), 100);
    }

    #[test]
    fn mock_platform_reports_missing_path() {
        let platform = MockPlatform::new();
        let err = platform
            .fs_stats(Path::new("/mnt/storage"))
            .expect_err("missing path should fail");
        assert!(matches!(err, SqmError::PathNotFound { .. }));
    }

    #[test]
    fn mock_platform_stats_can_change() {
        let platform = MockPlatform::new().with_stats("/mnt/storage", stats(100, 50, 50));
        assert_eq!(
            platform
                .fs_stats(Path::new("/mnt/storage"))
                .expect("stats")
                .used_pct(),
            50
        );
        platform.set_stats("/mnt/storage", stats(100, 10, 10));
        assert_eq!(
            platform
                .fs_stats(Path::new("/mnt/storage"))
                .expect("stats")
                .used_pct(),
            90
        );
        platform.remove_stats(Path::new("/mnt/storage"));
        assert!(platform.fs_stats(Path::new("/mnt/storage")).is_err());
    }

    #[test]
    fn mock_platform_commands() {
        let platform = MockPlatform::new().with_command("az");
        assert!(platform.command_available("az"));
        assert!(!platform.command_available("curl"));
    }

    #[cfg(unix)]
    #[test]
    fn unix_platform_reads_tempdir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let stats = UnixPlatform::new()
            .fs_stats(dir.path())
            .expect("statvfs on tempdir");
        assert!(stats.total_bytes > 0);
        assert!(stats.used_pct() <= 100);
    }

    #[cfg(unix)]
    #[test]
    fn unix_platform_missing_path_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = UnixPlatform::new()
            .fs_stats(&dir.path().join("does-not-exist"))
            .expect_err("missing path should fail");
        assert!(matches!(err, SqmError::PathNotFound { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn which_binary_finds_sh() {
        assert!(which_binary("sh").is_some());
        assert!(which_binary("definitely-not-a-real-binary-sqm").is_none());
    }
}
