//! Activity logging: every monitor event goes to the JSONL log and is echoed
//! as a tagged human line on stderr.
//!
//! The monitor loop is single-threaded, so the logger is owned by the loop and
//! writes synchronously. Nothing here returns an error: the JSONL writer
//! degrades on its own and the stderr echo is best-effort.

#![allow(missing_docs)]

use std::io::{self, Write};

use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

/// Events the monitor emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityEvent {
    MonitorStarted {
        version: String,
        config_hash: String,
        path: String,
        threshold_pct: u8,
    },
    MonitorStopped {
        reason: String,
        uptime_secs: u64,
        cooldown_cleared: bool,
    },
    UsageSampled {
        path: String,
        usage_pct: u8,
        threshold_pct: u8,
        details: String,
    },
    UsageUnavailable {
        path: String,
        error_code: Option<String>,
        error_message: String,
    },
    ThresholdExceeded {
        path: String,
        usage_pct: u8,
        threshold_pct: u8,
    },
    CooldownSuppressed {
        usage_pct: u8,
        threshold_pct: u8,
    },
    QuotaUnavailable {
        error_code: String,
        error_message: String,
    },
    DispatchSent {
        current_quota: u64,
        new_quota: u64,
        usage_pct: u8,
    },
    DispatchFailed {
        current_quota: u64,
        new_quota: u64,
        status: Option<u16>,
        body: String,
    },
    HealthChecked {
        healthy: bool,
        summary: String,
    },
    Error {
        code: String,
        message: String,
    },
}

/// Sink for [`ActivityEvent`]s.
pub struct ActivityLogger {
    jsonl: JsonlWriter,
    echo: bool,
}

impl ActivityLogger {
    /// Log to `config.path` (with its fallback chain) and echo to stderr.
    #[must_use]
    pub fn open(config: JsonlConfig) -> Self {
        Self {
            jsonl: JsonlWriter::open(config),
            echo: true,
        }
    }

    /// Drop JSONL output; optionally keep the stderr echo.
    #[must_use]
    pub fn stderr_only(echo: bool) -> Self {
        Self {
            jsonl: JsonlWriter::discard(),
            echo,
        }
    }

    /// Disable the stderr echo (used by tests and one-shot commands).
    #[must_use]
    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }

    pub fn log(&mut self, event: &ActivityEvent) {
        let entry = event_to_log_entry(event);
        self.jsonl.write_entry(&entry);
        if self.echo {
            let _ = writeln!(io::stderr(), "{}", human_line(event));
        }
    }

    /// Flush and fsync the JSONL file; called on shutdown.
    pub fn sync(&mut self) {
        self.jsonl.fsync();
    }

    /// Degradation state of the underlying JSONL writer.
    pub fn state(&self) -> &str {
        self.jsonl.state()
    }
}

fn event_to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::MonitorStarted {
            version,
            config_hash,
            path,
            threshold_pct,
        } => {
            let mut e = LogEntry::new(EventType::MonitorStart, Severity::Info);
            e.path = Some(path.clone());
            e.threshold_pct = Some(*threshold_pct);
            e.details = Some(format!("version={version} config_hash={config_hash}"));
            e.ok = Some(true);
            e
        }
        ActivityEvent::MonitorStopped {
            reason,
            uptime_secs,
            cooldown_cleared,
        } => {
            let mut e = LogEntry::new(EventType::MonitorStop, Severity::Info);
            e.details = Some(format!(
                "reason={reason} uptime={uptime_secs}s cooldown_cleared={cooldown_cleared}"
            ));
            e.ok = Some(*cooldown_cleared);
            e
        }
        ActivityEvent::UsageSampled {
            path,
            usage_pct,
            threshold_pct,
            details,
        } => {
            let mut e = LogEntry::new(EventType::UsageSample, Severity::Info);
            e.path = Some(path.clone());
            e.usage_pct = Some(*usage_pct);
            e.threshold_pct = Some(*threshold_pct);
            e.details = Some(details.clone());
            e
        }
        ActivityEvent::UsageUnavailable {
            path,
            error_code,
            error_message,
        } => {
            let mut e = LogEntry::new(EventType::UsageUnavailable, Severity::Warning);
            e.path = Some(path.clone());
            e.error_code.clone_from(error_code);
            e.details = Some(error_message.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::ThresholdExceeded {
            path,
            usage_pct,
            threshold_pct,
        } => {
            let mut e = LogEntry::new(EventType::ThresholdExceeded, Severity::Warning);
            e.path = Some(path.clone());
            e.usage_pct = Some(*usage_pct);
            e.threshold_pct = Some(*threshold_pct);
            e
        }
        ActivityEvent::CooldownSuppressed {
            usage_pct,
            threshold_pct,
        } => {
            let mut e = LogEntry::new(EventType::CooldownSuppressed, Severity::Info);
            e.usage_pct = Some(*usage_pct);
            e.threshold_pct = Some(*threshold_pct);
            e
        }
        ActivityEvent::QuotaUnavailable {
            error_code,
            error_message,
        } => {
            let mut e = LogEntry::new(EventType::QuotaUnavailable, Severity::Critical);
            e.error_code = Some(error_code.clone());
            e.details = Some(error_message.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::DispatchSent {
            current_quota,
            new_quota,
            usage_pct,
        } => {
            let mut e = LogEntry::new(EventType::DispatchSent, Severity::Info);
            e.current_quota = Some(*current_quota);
            e.new_quota = Some(*new_quota);
            e.usage_pct = Some(*usage_pct);
            e.http_status = Some(204);
            e.ok = Some(true);
            e
        }
        ActivityEvent::DispatchFailed {
            current_quota,
            new_quota,
            status,
            body,
        } => {
            let mut e = LogEntry::new(EventType::DispatchFailed, Severity::Critical);
            e.current_quota = Some(*current_quota);
            e.new_quota = Some(*new_quota);
            e.http_status = *status;
            e.details = Some(body.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::HealthChecked { healthy, summary } => {
            let severity = if *healthy {
                Severity::Info
            } else {
                Severity::Warning
            };
            let mut e = LogEntry::new(EventType::HealthCheck, severity);
            e.details = Some(summary.clone());
            e.ok = Some(*healthy);
            e
        }
        ActivityEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Critical);
            e.error_code = Some(code.clone());
            e.details = Some(message.clone());
            e.ok = Some(false);
            e
        }
    }
}

fn human_line(event: &ActivityEvent) -> String {
    match event {
        ActivityEvent::MonitorStarted {
            version,
            path,
            threshold_pct,
            ..
        } => format!(
            "[SQM-MONITOR] started v{version}: watching {path} (threshold {threshold_pct}%)"
        ),
        ActivityEvent::MonitorStopped {
            reason,
            uptime_secs,
            cooldown_cleared,
        } => format!(
            "[SQM-MONITOR] stopped ({reason}) after {uptime_secs}s, cooldown cleared: {cooldown_cleared}"
        ),
        ActivityEvent::UsageSampled {
            path,
            usage_pct,
            details,
            ..
        } => format!("[SQM-MONITOR] {path}: {usage_pct}% used ({details})"),
        ActivityEvent::UsageUnavailable {
            path,
            error_message,
            ..
        } => format!("[SQM-MONITOR] could not determine usage for {path}: {error_message}"),
        ActivityEvent::ThresholdExceeded {
            path,
            usage_pct,
            threshold_pct,
        } => format!("[SQM-MONITOR] {path} at {usage_pct}% exceeds threshold {threshold_pct}%"),
        ActivityEvent::CooldownSuppressed { usage_pct, .. } => format!(
            "[SQM-MONITOR] cooldown active, skipping quota increase request at {usage_pct}%"
        ),
        ActivityEvent::QuotaUnavailable { error_message, .. } => {
            format!("[SQM-QUOTA] could not retrieve current quota: {error_message}")
        }
        ActivityEvent::DispatchSent {
            current_quota,
            new_quota,
            ..
        } => format!(
            "[SQM-DISPATCH] requested quota increase {current_quota}GB -> {new_quota}GB"
        ),
        ActivityEvent::DispatchFailed { status, body, .. } => match status {
            Some(code) => format!("[SQM-DISPATCH] dispatch rejected with HTTP {code}: {body}"),
            None => format!("[SQM-DISPATCH] dispatch not delivered: {body}"),
        },
        ActivityEvent::HealthChecked { healthy, summary } => {
            let verdict = if *healthy { "healthy" } else { "degraded" };
            format!("[SQM-HEALTH] {verdict}: {summary}")
        }
        ActivityEvent::Error { code, message } => format!("[SQM-MONITOR] {code}: {message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn read_lines(path: &std::path::Path) -> Vec<serde_json::Value> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn dispatch_failure_records_status_and_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity.jsonl");
        let mut logger = ActivityLogger::open(JsonlConfig::for_path(path.clone())).quiet();

        logger.log(&ActivityEvent::DispatchFailed {
            current_quota: 100,
            new_quota: 150,
            status: Some(401),
            body: "Bad credentials".to_string(),
        });

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["event"], "dispatch_failed");
        assert_eq!(lines[0]["severity"], "critical");
        assert_eq!(lines[0]["http_status"], 401);
        assert_eq!(lines[0]["details"], "Bad credentials");
        assert_eq!(lines[0]["ok"], false);
    }

    #[test]
    fn transport_failure_has_no_status() {
        let entry = event_to_log_entry(&ActivityEvent::DispatchFailed {
            current_quota: 10,
            new_quota: 15,
            status: None,
            body: "curl: (7) connection refused".to_string(),
        });
        assert!(entry.http_status.is_none());
        assert!(human_line(&ActivityEvent::DispatchFailed {
            current_quota: 10,
            new_quota: 15,
            status: None,
            body: "refused".to_string(),
        })
        .contains("not delivered"));
    }

    #[test]
    fn sample_entry_carries_usage_and_threshold() {
        let entry = event_to_log_entry(&ActivityEvent::UsageSampled {
            path: "/mnt/storage".to_string(),
            usage_pct: 85,
            threshold_pct: 80,
            details: "Used: 85.0 GB, Available: 15.0 GB, Total: 100.0 GB".to_string(),
        });
        assert_eq!(entry.event, EventType::UsageSample);
        assert_eq!(entry.usage_pct, Some(85));
        assert_eq!(entry.threshold_pct, Some(80));
        assert_eq!(entry.path.as_deref(), Some("/mnt/storage"));
    }

    #[test]
    fn unhealthy_check_is_a_warning() {
        let entry = event_to_log_entry(&ActivityEvent::HealthChecked {
            healthy: false,
            summary: "quota tool missing".to_string(),
        });
        assert_eq!(entry.severity, Severity::Warning);
        assert_eq!(entry.ok, Some(false));
    }

    #[test]
    fn human_lines_are_tagged() {
        let line = human_line(&ActivityEvent::ThresholdExceeded {
            path: "/mnt/storage".to_string(),
            usage_pct: 85,
            threshold_pct: 80,
        });
        assert!(line.starts_with("[SQM-MONITOR]"));
        assert!(line.contains("85%"));
    }

    #[test]
    fn stderr_only_logger_discards_jsonl() {
        let mut logger = ActivityLogger::stderr_only(false);
        assert_eq!(logger.state(), "discard");
        logger.log(&ActivityEvent::Error {
            code: "SQM-3900".to_string(),
            message: "boom".to_string(),
        });
    }
}
