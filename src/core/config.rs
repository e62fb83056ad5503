//! Configuration: a fixed set of named environment parameters with defaults.

#![allow(missing_docs)]

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::core::errors::{Result, SqmError};

pub const ENV_MOUNT_PATH: &str = "SQM_MOUNT_PATH";
pub const ENV_THRESHOLD_PCT: &str = "SQM_THRESHOLD_PCT";
pub const ENV_POLL_INTERVAL_SECS: &str = "SQM_POLL_INTERVAL_SECS";
pub const ENV_COOLDOWN_SECS: &str = "SQM_COOLDOWN_SECS";
pub const ENV_HEALTH_CHECK_INTERVAL_SECS: &str = "SQM_HEALTH_CHECK_INTERVAL_SECS";
pub const ENV_COMMAND_TIMEOUT_SECS: &str = "SQM_COMMAND_TIMEOUT_SECS";
pub const ENV_PROBE_TIMEOUT_SECS: &str = "SQM_PROBE_TIMEOUT_SECS";
pub const ENV_COOLDOWN_FILE: &str = "SQM_COOLDOWN_FILE";
pub const ENV_LOG_FILE: &str = "SQM_LOG_FILE";
pub const ENV_LOG_FALLBACK_FILE: &str = "SQM_LOG_FALLBACK_FILE";
pub const ENV_STORAGE_ACCOUNT: &str = "SQM_STORAGE_ACCOUNT";
pub const ENV_STORAGE_ACCOUNT_KEY: &str = "SQM_STORAGE_ACCOUNT_KEY";
pub const ENV_FILE_SHARE: &str = "SQM_FILE_SHARE";
pub const ENV_CONTAINER_NAME: &str = "SQM_CONTAINER_NAME";
pub const ENV_GITHUB_OWNER: &str = "SQM_GITHUB_OWNER";
pub const ENV_GITHUB_REPO: &str = "SQM_GITHUB_REPO";
pub const ENV_GITHUB_TOKEN: &str = "SQM_GITHUB_TOKEN";
pub const ENV_DISPATCH_EVENT_TYPE: &str = "SQM_DISPATCH_EVENT_TYPE";
pub const ENV_GITHUB_API_URL: &str = "SQM_GITHUB_API_URL";

/// Health checks run once every this many poll intervals unless
/// `SQM_HEALTH_CHECK_INTERVAL_SECS` overrides it.
pub const HEALTH_CHECK_EVERY_POLLS: u64 = 60;

/// Full monitor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub paths: PathsConfig,
    pub storage: StorageConfig,
    pub dispatch: DispatchConfig,
}

/// Polling, threshold, and timing knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorConfig {
    pub mount_path: PathBuf,
    pub threshold_pct: u8,
    pub poll_interval_secs: u64,
    pub cooldown_secs: u64,
    pub health_check_interval_secs: u64,
    pub command_timeout_secs: u64,
    pub probe_timeout_secs: u64,
}

/// Files the monitor reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathsConfig {
    pub cooldown_file: PathBuf,
    pub log_file: PathBuf,
    /// Used when the primary log cannot be opened, e.g. a full disk.
    pub log_fallback_file: Option<PathBuf>,
}

/// Cloud storage identity used by the quota query and the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageConfig {
    pub account: String,
    pub account_key: Option<Secret>,
    pub file_share: String,
    pub container_name: String,
}

/// Repository dispatch endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchConfig {
    pub api_url: String,
    pub owner: String,
    pub repo: String,
    pub token: Secret,
    pub event_type: String,
}

/// Credential string that never shows up in `Debug` or serialized output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str("***")
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            mount_path: PathBuf::from("/mnt/storage"),
            threshold_pct: 80,
            poll_interval_secs: 60,
            cooldown_secs: 300,
            health_check_interval_secs: 60 * HEALTH_CHECK_EVERY_POLLS,
            command_timeout_secs: 30,
            probe_timeout_secs: 10,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!(
                    "[SQM-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths"
                );
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        Self {
            cooldown_file: env::temp_dir().join("sqm-cooldown.json"),
            log_file: home_dir
                .join(".local")
                .join("share")
                .join("sqm")
                .join("activity.jsonl"),
            log_fallback_file: None,
        }
    }
}

impl MonitorConfig {
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    #[must_use]
    pub const fn cooldown_window(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    #[must_use]
    pub const fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl DispatchConfig {
    /// Full URL of the repository dispatch endpoint.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!(
            "{}/repos/{}/{}/dispatches",
            self.api_url.trim_end_matches('/'),
            self.owner,
            self.repo
        )
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(env_var)
    }

    /// Load configuration from an arbitrary variable lookup.
    ///
    /// Empty or whitespace-only values count as unset. Every missing required
    /// variable is reported at once.
    pub fn from_lookup<F>(mut lookup: F) -> Result<Self>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut get = |name: &str| {
            lookup(name)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        let mut monitor = MonitorConfig::default();
        if let Some(raw) = get(ENV_MOUNT_PATH) {
            monitor.mount_path = PathBuf::from(raw);
        }
        if let Some(raw) = get(ENV_THRESHOLD_PCT) {
            monitor.threshold_pct = parse_env(ENV_THRESHOLD_PCT, &raw)?;
        }
        if let Some(raw) = get(ENV_POLL_INTERVAL_SECS) {
            monitor.poll_interval_secs = parse_env(ENV_POLL_INTERVAL_SECS, &raw)?;
        }
        if let Some(raw) = get(ENV_COOLDOWN_SECS) {
            monitor.cooldown_secs = parse_env(ENV_COOLDOWN_SECS, &raw)?;
        }
        monitor.health_check_interval_secs = match get(ENV_HEALTH_CHECK_INTERVAL_SECS) {
            Some(raw) => parse_env(ENV_HEALTH_CHECK_INTERVAL_SECS, &raw)?,
            None => monitor
                .poll_interval_secs
                .saturating_mul(HEALTH_CHECK_EVERY_POLLS),
        };
        if let Some(raw) = get(ENV_COMMAND_TIMEOUT_SECS) {
            monitor.command_timeout_secs = parse_env(ENV_COMMAND_TIMEOUT_SECS, &raw)?;
        }
        if let Some(raw) = get(ENV_PROBE_TIMEOUT_SECS) {
            monitor.probe_timeout_secs = parse_env(ENV_PROBE_TIMEOUT_SECS, &raw)?;
        }

        let mut paths = PathsConfig::default();
        if let Some(raw) = get(ENV_COOLDOWN_FILE) {
            paths.cooldown_file = PathBuf::from(raw);
        }
        if let Some(raw) = get(ENV_LOG_FILE) {
            paths.log_file = PathBuf::from(raw);
        }
        paths.log_fallback_file = get(ENV_LOG_FALLBACK_FILE).map(PathBuf::from);

        let mut missing = Vec::new();
        let mut required = |name: &'static str| {
            get(name).unwrap_or_else(|| {
                missing.push(name);
                String::new()
            })
        };
        let account = required(ENV_STORAGE_ACCOUNT);
        let file_share = required(ENV_FILE_SHARE);
        let container_name = required(ENV_CONTAINER_NAME);
        let owner = required(ENV_GITHUB_OWNER);
        let repo = required(ENV_GITHUB_REPO);
        let token = required(ENV_GITHUB_TOKEN);
        if !missing.is_empty() {
            return Err(SqmError::MissingConfig { names: missing });
        }

        let storage = StorageConfig {
            account,
            account_key: get(ENV_STORAGE_ACCOUNT_KEY).map(Secret::new),
            file_share,
            container_name,
        };
        let dispatch = DispatchConfig {
            api_url: get(ENV_GITHUB_API_URL)
                .unwrap_or_else(|| "https://api.github.com".to_string()),
            owner,
            repo,
            token: Secret::new(token),
            event_type: get(ENV_DISPATCH_EVENT_TYPE)
                .unwrap_or_else(|| "storage-quota-increase".to_string()),
        };

        let cfg = Self {
            monitor,
            paths,
            storage,
            dispatch,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config (secrets redacted) for logging.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn validate(&self) -> Result<()> {
        if self.monitor.threshold_pct > 100 {
            return Err(SqmError::InvalidConfig {
                details: format!(
                    "{ENV_THRESHOLD_PCT} must be in [0, 100], got {}",
                    self.monitor.threshold_pct
                ),
            });
        }

        for (name, value) in [
            (ENV_POLL_INTERVAL_SECS, self.monitor.poll_interval_secs),
            (
                ENV_HEALTH_CHECK_INTERVAL_SECS,
                self.monitor.health_check_interval_secs,
            ),
            (ENV_COMMAND_TIMEOUT_SECS, self.monitor.command_timeout_secs),
            (ENV_PROBE_TIMEOUT_SECS, self.monitor.probe_timeout_secs),
        ] {
            if value == 0 {
                return Err(SqmError::InvalidConfig {
                    details: format!("{name} must be greater than 0"),
                });
            }
        }

        if !self.dispatch.api_url.starts_with("http://")
            && !self.dispatch.api_url.starts_with("https://")
        {
            return Err(SqmError::InvalidConfig {
                details: format!(
                    "{ENV_GITHUB_API_URL} must be an http(s) URL, got {:?}",
                    self.dispatch.api_url
                ),
            });
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok()
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    raw.parse::<T>().map_err(|error| SqmError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}
