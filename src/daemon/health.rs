//! Periodic health checks and the timer that schedules them.

#![allow(missing_docs)]

use std::path::Path;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::monitor::usage::UsageProbe;
use crate::platform::pal::Platform;
use crate::quota::client::QuotaClient;

/// Wall-clock cadence independent of how many cycles ran. First firing is
/// immediate.
#[derive(Debug, Clone)]
pub struct RecurringTimer {
    interval: Duration,
    next_due: Option<Instant>,
}

impl RecurringTimer {
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        self.next_due.is_none_or(|due| now >= due)
    }

    /// Returns `true` and schedules the next firing if the timer is due.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        if !self.is_due(now) {
            return false;
        }
        self.next_due = Some(now + self.interval);
        true
    }
}

/// Outcome of a single named check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub name: &'static str,
    pub ok: bool,
    pub details: String,
}

/// Structured result of one health check pass. Informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub checks: Vec<CheckResult>,
}

impl HealthReport {
    fn from_checks(checks: Vec<CheckResult>) -> Self {
        Self {
            healthy: checks.iter().all(|check| check.ok),
            checks,
        }
    }

    /// `name=ok|FAIL` pairs, plus the details of failed checks.
    #[must_use]
    pub fn summary(&self) -> String {
        self.checks
            .iter()
            .map(|check| {
                if check.ok {
                    format!("{}=ok", check.name)
                } else {
                    format!("{}=FAIL ({})", check.name, check.details)
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Quota tool on `PATH`, monitored path reachable, quota retrievable.
pub fn run_health_check(
    platform: &dyn Platform,
    probe: &UsageProbe,
    client: &QuotaClient,
    path: &Path,
) -> HealthReport {
    let tool = client.tool();
    let tool_check = if platform.command_available(tool) {
        CheckResult {
            name: "quota_tool",
            ok: true,
            details: format!("{tool} found"),
        }
    } else {
        CheckResult {
            name: "quota_tool",
            ok: false,
            details: format!("{tool} not found on PATH"),
        }
    };

    let path_check = match probe.sample(path) {
        Ok(sample) => CheckResult {
            name: "mount_path",
            ok: true,
            details: format!(
                "{} reachable, {}% used{}",
                path.display(),
                sample.percent_used,
                if sample.read_only { ", read-only" } else { "" }
            ),
        },
        Err(error) => CheckResult {
            name: "mount_path",
            ok: false,
            details: error.to_string(),
        },
    };

    let quota_check = match client.lookup_quota() {
        Ok(quota) => CheckResult {
            name: "quota",
            ok: true,
            details: format!("{quota} GB"),
        },
        Err(error) => CheckResult {
            name: "quota",
            ok: false,
            details: error.to_string(),
        },
    };

    HealthReport::from_checks(vec![tool_check, path_check, quota_check])
}
