//! Usage probe: one bounded `statvfs` read turned into a [`UsageSample`].

#![allow(missing_docs)]
#![allow(clippy::cast_precision_loss)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, SqmError};
use crate::platform::pal::{FsStats, Platform};

/// Point-in-time utilization of the monitored path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSample {
    pub percent_used: u8,
    pub used_human: String,
    pub available_human: String,
    pub total_human: String,
    #[serde(default)]
    pub read_only: bool,
}

impl UsageSample {
    #[must_use]
    pub fn from_stats(stats: &FsStats) -> Self {
        Self {
            percent_used: stats.used_pct(),
            used_human: human_bytes(stats.used_bytes()),
            available_human: human_bytes(stats.available_bytes),
            total_human: human_bytes(stats.total_bytes),
            read_only: stats.is_readonly,
        }
    }

    /// One-line capacity summary carried in the dispatch payload.
    #[must_use]
    pub fn details(&self) -> String {
        format!(
            "Used: {}, Available: {}, Total: {}",
            self.used_human, self.available_human, self.total_human
        )
    }
}

/// Reads utilization for a single path through the platform layer.
///
/// A wedged mount (stale NFS/SMB handle) can block `statvfs` forever, so the
/// read runs on a helper thread and is abandoned after `timeout`. At most one
/// reader is in flight per probe: while an abandoned read is still blocked,
/// later samples report `ProbeTimeout` without spawning another thread.
#[derive(Clone)]
pub struct UsageProbe {
    platform: Arc<dyn Platform>,
    timeout: Duration,
    stalled: Arc<Mutex<Option<Receiver<Result<FsStats>>>>>,
}

impl UsageProbe {
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>, timeout: Duration) -> Self {
        Self {
            platform,
            timeout,
            stalled: Arc::new(Mutex::new(None)),
        }
    }

    pub fn sample(&self, path: &Path) -> Result<UsageSample> {
        let stats = self.stats_with_timeout(path)?;
        Ok(UsageSample::from_stats(&stats))
    }

    fn stats_with_timeout(&self, path: &Path) -> Result<FsStats> {
        let mut stalled = self.stalled.lock();

        // Give the abandoned read one more window; its stale result is dropped.
        if let Some(pending) = stalled.as_ref() {
            match pending.recv_timeout(self.timeout) {
                Ok(_) | Err(RecvTimeoutError::Disconnected) => *stalled = None,
                Err(RecvTimeoutError::Timeout) => return Err(self.timed_out(path)),
            }
        }

        let (tx, rx) = bounded::<Result<FsStats>>(1);
        let platform = Arc::clone(&self.platform);
        let owned: PathBuf = path.to_path_buf();

        thread::Builder::new()
            .name("sqm-statvfs".to_string())
            .spawn(move || {
                let _ = tx.send(platform.fs_stats(&owned));
            })
            .map_err(|error| SqmError::Runtime {
                details: format!("failed to spawn stats reader: {error}"),
            })?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                *stalled = Some(rx);
                Err(self.timed_out(path))
            }
            Err(RecvTimeoutError::Disconnected) => Err(SqmError::FsStats {
                path: path.to_path_buf(),
                details: "stats reader exited without a result".to_string(),
            }),
        }
    }

    fn timed_out(&self, path: &Path) -> SqmError {
        SqmError::ProbeTimeout {
            path: path.to_path_buf(),
            timeout: self.timeout,
        }
    }
}

/// Human-readable byte size in binary units.
#[must_use]
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} EB")
}
