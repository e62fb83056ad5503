//! Cooldown gate: suppresses repeat increase requests within a window.
//!
//! The last-triggered timestamp lives behind a [`CooldownStore`] so the
//! daemon persists it on disk while tests keep it in memory.

#![allow(missing_docs)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, SqmError};

/// Persistence for the single cooldown timestamp.
pub trait CooldownStore: Send + Sync {
    /// Stored timestamp, `None` when there is no record.
    fn load(&self) -> Result<Option<SystemTime>>;
    /// Replace any stored timestamp with `at`.
    fn store(&self, at: SystemTime) -> Result<()>;
    /// Remove the record. Succeeds when there is nothing to remove.
    fn clear(&self) -> Result<()>;
}

/// On-disk cooldown record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CooldownRecord {
    pub triggered_at_unix_secs: u64,
    /// Same instant, RFC 3339, for operators reading the file.
    pub triggered_at: String,
}

impl CooldownRecord {
    fn from_time(at: SystemTime) -> Self {
        let secs = unix_secs(at);
        Self {
            triggered_at_unix_secs: secs,
            triggered_at: DateTime::<Utc>::from(at)
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        }
    }

    fn to_time(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.triggered_at_unix_secs)
    }
}

/// JSON file store, written with write-then-rename.
#[derive(Debug, Clone)]
pub struct FileCooldownStore {
    path: PathBuf,
}

impl FileCooldownStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CooldownStore for FileCooldownStore {
    fn load(&self) -> Result<Option<SystemTime>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(SqmError::io(&self.path, error)),
        };
        let record: CooldownRecord =
            serde_json::from_str(&raw).map_err(|error| SqmError::Serialization {
                context: "cooldown record",
                details: format!("{}: {error}", self.path.display()),
            })?;
        Ok(Some(record.to_time()))
    }

    fn store(&self, at: SystemTime) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|error| SqmError::io(parent, error))?;
        }

        let tmp_path = self.path.with_extension("tmp");
        let data = serde_json::to_vec_pretty(&CooldownRecord::from_time(at))?;
        fs::write(&tmp_path, data).map_err(|error| SqmError::io(&tmp_path, error))?;
        fs::rename(&tmp_path, &self.path).map_err(|error| SqmError::io(&self.path, error))?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(SqmError::io(&self.path, error)),
        }
    }
}

/// In-memory store. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemoryCooldownStore {
    slot: Arc<Mutex<Option<SystemTime>>>,
}

impl MemoryCooldownStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current slot contents without going through the gate.
    #[must_use]
    pub fn peek(&self) -> Option<SystemTime> {
        *self.slot.lock()
    }
}

impl CooldownStore for MemoryCooldownStore {
    fn load(&self) -> Result<Option<SystemTime>> {
        Ok(*self.slot.lock())
    }

    fn store(&self, at: SystemTime) -> Result<()> {
        *self.slot.lock() = Some(at);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.slot.lock() = None;
        Ok(())
    }
}

/// Idle until [`CooldownGate::arm`]; cooling until the window elapses or
/// [`CooldownGate::clear`] runs.
#[derive(Clone)]
pub struct CooldownGate {
    store: Arc<dyn CooldownStore>,
    window: Duration,
}

impl CooldownGate {
    #[must_use]
    pub fn new(store: Arc<dyn CooldownStore>, window: Duration) -> Self {
        Self { store, window }
    }

    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    pub fn is_active(&self) -> bool {
        self.is_active_at(SystemTime::now())
    }

    /// Whether a notification was sent less than `window` before `now`.
    ///
    /// An expired or corrupt record is removed. A record that cannot be read
    /// right now (permissions, I/O) is left in place and counts as active, so
    /// a passing fault never re-opens the gate. A record from the future
    /// counts as age zero.
    pub fn is_active_at(&self, now: SystemTime) -> bool {
        match self.store.load() {
            Ok(None) => false,
            Ok(Some(at)) => {
                let age = now.duration_since(at).unwrap_or(Duration::ZERO);
                if age < self.window {
                    true
                } else {
                    self.discard("expired");
                    false
                }
            }
            Err(error) if error.is_retryable() => {
                eprintln!("[SQM-COOLDOWN] cooldown record unreadable, gate stays closed: {error}");
                true
            }
            Err(error) => {
                eprintln!("[SQM-COOLDOWN] corrupt cooldown record treated as absent: {error}");
                self.discard("corrupt");
                false
            }
        }
    }

    /// Time left in the window at `now`, without touching the store.
    pub fn remaining_at(&self, now: SystemTime) -> Result<Option<Duration>> {
        Ok(self.store.load()?.and_then(|at| {
            let age = now.duration_since(at).unwrap_or(Duration::ZERO);
            self.window.checked_sub(age).filter(|left| !left.is_zero())
        }))
    }

    pub fn arm(&self) -> Result<()> {
        self.arm_at(SystemTime::now())
    }

    pub fn arm_at(&self, now: SystemTime) -> Result<()> {
        self.store.store(now)
    }

    pub fn clear(&self) -> Result<()> {
        self.store.clear()
    }

    fn discard(&self, why: &str) {
        if let Err(error) = self.store.clear() {
            eprintln!("[SQM-COOLDOWN] failed to remove {why} cooldown record: {error}");
        }
    }
}

fn unix_secs(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}
