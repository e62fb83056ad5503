//! Quota providers: where the current share quota comes from.

#![allow(missing_docs)]

use std::process::Command;
use std::time::Duration;

use crate::core::config::{Secret, StorageConfig};
use crate::core::errors::{Result, SqmError};
use crate::platform::command::{CommandFailure, run_with_timeout};

/// Share quota in whole gigabytes.
pub type QuotaGb = u64;

/// Source of the current provisioned quota.
pub trait QuotaProvider: Send + Sync {
    /// Query the present quota of the configured share.
    fn query_quota(&self) -> Result<QuotaGb>;

    /// Name of the external tool the provider depends on, for health checks.
    fn tool(&self) -> &str;
}

/// Reads the quota through the Azure CLI:
/// `az storage share show --account-name A --name S --query quota --output tsv`.
///
/// The account key, when configured, is handed to the child through
/// `AZURE_STORAGE_KEY` so it never appears in the process list.
#[derive(Debug, Clone)]
pub struct AzCliQuotaProvider {
    program: String,
    account: String,
    account_key: Option<Secret>,
    share: String,
    timeout: Duration,
}

impl AzCliQuotaProvider {
    #[must_use]
    pub fn new(storage: &StorageConfig, timeout: Duration) -> Self {
        Self {
            program: "az".to_string(),
            account: storage.account.clone(),
            account_key: storage.account_key.clone(),
            share: storage.file_share.clone(),
            timeout,
        }
    }

    /// Use a different executable (a wrapper script, or a stub in tests).
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args([
            "storage",
            "share",
            "show",
            "--account-name",
            &self.account,
            "--name",
            &self.share,
            "--query",
            "quota",
            "--output",
            "tsv",
        ]);
        if let Some(key) = &self.account_key {
            cmd.env("AZURE_STORAGE_KEY", key.expose());
        }
        cmd
    }
}

impl QuotaProvider for AzCliQuotaProvider {
    fn query_quota(&self) -> Result<QuotaGb> {
        let output = run_with_timeout(&mut self.command(), None, self.timeout).map_err(
            |failure| {
                let details = match failure {
                    CommandFailure::Spawn(error) => {
                        format!("could not run {}: {error}", self.program)
                    }
                    other => format!("{} {other}", self.program),
                };
                SqmError::QuotaQuery { details }
            },
        )?;

        if !output.success() {
            return Err(SqmError::QuotaQuery {
                details: format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    output.stderr.trim()
                ),
            });
        }

        parse_quota_output(&output.stdout)
    }

    fn tool(&self) -> &str {
        &self.program
    }
}

/// Parse the single-value TSV output of the quota query.
pub fn parse_quota_output(stdout: &str) -> Result<QuotaGb> {
    let value = stdout.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        return Err(SqmError::QuotaQuery {
            details: "provider returned no quota value".to_string(),
        });
    }
    value.parse::<QuotaGb>().map_err(|error| SqmError::QuotaQuery {
        details: format!("unparsable quota {value:?}: {error}"),
    })
}
