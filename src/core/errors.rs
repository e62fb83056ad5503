//! SQM-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, SqmError>;

/// Top-level error type for the storage quota monitor.
#[derive(Debug, Error)]
pub enum SqmError {
    #[error("[SQM-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[SQM-1002] missing required configuration: {}", names.join(", "))]
    MissingConfig { names: Vec<&'static str> },

    #[error("[SQM-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[SQM-1101] unsupported platform: {details}")]
    UnsupportedPlatform { details: String },

    #[error("[SQM-2001] monitored path not found: {path}")]
    PathNotFound { path: PathBuf },

    #[error("[SQM-2002] filesystem stats failure for {path}: {details}")]
    FsStats { path: PathBuf, details: String },

    #[error("[SQM-2003] filesystem stats for {path} timed out after {}s", timeout.as_secs())]
    ProbeTimeout { path: PathBuf, timeout: Duration },

    #[error("[SQM-2101] quota query failed: {details}")]
    QuotaQuery { details: String },

    #[error("[SQM-2102] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[SQM-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[SQM-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl SqmError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "SQM-1001",
            Self::MissingConfig { .. } => "SQM-1002",
            Self::ConfigParse { .. } => "SQM-1003",
            Self::UnsupportedPlatform { .. } => "SQM-1101",
            Self::PathNotFound { .. } => "SQM-2001",
            Self::FsStats { .. } => "SQM-2002",
            Self::ProbeTimeout { .. } => "SQM-2003",
            Self::QuotaQuery { .. } => "SQM-2101",
            Self::Serialization { .. } => "SQM-2102",
            Self::Io { .. } => "SQM-3002",
            Self::Runtime { .. } => "SQM-3900",
        }
    }

    /// Whether retrying on a later cycle might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PathNotFound { .. }
                | Self::FsStats { .. }
                | Self::ProbeTimeout { .. }
                | Self::QuotaQuery { .. }
                | Self::Io { .. }
                | Self::Runtime { .. }
        )
    }

    /// Whether this error belongs to the startup configuration class.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. } | Self::MissingConfig { .. } | Self::ConfigParse { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for SqmError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<SqmError> {
        vec![
            SqmError::InvalidConfig {
                details: String::new(),
            },
            SqmError::MissingConfig { names: Vec::new() },
            SqmError::ConfigParse {
                context: "",
                details: String::new(),
            },
            SqmError::UnsupportedPlatform {
                details: String::new(),
            },
            SqmError::PathNotFound {
                path: PathBuf::new(),
            },
            SqmError::FsStats {
                path: PathBuf::new(),
                details: String::new(),
            },
            SqmError::ProbeTimeout {
                path: PathBuf::new(),
                timeout: Duration::from_secs(1),
            },
            SqmError::QuotaQuery {
                details: String::new(),
            },
            SqmError::Serialization {
                context: "",
                details: String::new(),
            },
            SqmError::Io {
                path: PathBuf::new(),
                source: std::io::Error::other("test"),
            },
            SqmError::Runtime {
                details: String::new(),
            },
        ]
    }

    #[test]
    fn error_codes_are_unique() {
        let errors = all_variants();
        let codes: Vec<&str> = errors.iter().map(SqmError::code).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(
            codes.len(),
            unique.len(),
            "error codes must be unique: {codes:?}"
        );
    }

    #[test]
    fn display_includes_code() {
        for err in all_variants() {
            let msg = err.to_string();
            assert!(
                msg.contains(err.code()),
                "display should contain error code {}: {msg}",
                err.code()
            );
        }
    }

    #[test]
    fn missing_config_lists_every_name() {
        let err = SqmError::MissingConfig {
            names: vec!["SQM_GITHUB_TOKEN", "SQM_FILE_SHARE"],
        };
        let msg = err.to_string();
        assert!(msg.contains("SQM_GITHUB_TOKEN, SQM_FILE_SHARE"), "{msg}");
    }

    #[test]
    fn config_errors_are_not_retryable() {
        for err in all_variants().into_iter().filter(SqmError::is_config) {
            assert!(!err.is_retryable(), "{} should not be retryable", err.code());
        }
    }

    #[test]
    fn transient_errors_are_retryable() {
        assert!(
            SqmError::PathNotFound {
                path: PathBuf::from("/mnt/storage")
            }
            .is_retryable()
        );
        assert!(
            SqmError::QuotaQuery {
                details: "az exited 1".to_string()
            }
            .is_retryable()
        );
        assert!(
            !SqmError::UnsupportedPlatform {
                details: String::new()
            }
            .is_retryable()
        );
    }

    #[test]
    fn io_convenience_constructor() {
        let err = SqmError::io(
            "/tmp/sqm-cooldown.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.code(), "SQM-3002");
        assert!(err.to_string().contains("/tmp/sqm-cooldown.json"));
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: SqmError = json_err.into();
        assert_eq!(err.code(), "SQM-2102");
    }
}
