//! Repository dispatch: the structured event that asks an external workflow
//! to carry out a quota increase, and the transport that delivers it.

#![allow(missing_docs)]

use std::fmt;
use std::process::Command;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::config::{DispatchConfig, Secret, StorageConfig};
use crate::platform::command::run_with_timeout;
use crate::quota::provider::QuotaGb;

/// HTTP status the dispatch endpoint returns on acceptance.
pub const DISPATCH_ACCEPTED: u16 = 204;

/// Value of `client_payload.triggered_by` for every monitor-originated event.
pub const TRIGGERED_BY: &str = "automated_monitoring";

/// Extra time granted to the curl child beyond its own `--max-time`.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// `client_payload` of the dispatch. Numeric values are sent as strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub current_quota: String,
    pub new_quota: String,
    pub usage_percent: String,
    pub container_name: String,
    pub storage_account: String,
    pub file_share: String,
    pub triggered_by: String,
    pub timestamp: String,
    pub storage_details: String,
}

impl NotificationPayload {
    #[must_use]
    pub fn new(
        storage: &StorageConfig,
        current: QuotaGb,
        proposed: QuotaGb,
        usage_percent: u8,
        storage_details: &str,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            current_quota: current.to_string(),
            new_quota: proposed.to_string(),
            usage_percent: usage_percent.to_string(),
            container_name: storage.container_name.clone(),
            storage_account: storage.account.clone(),
            file_share: storage.file_share.clone(),
            triggered_by: TRIGGERED_BY.to_string(),
            timestamp: at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            storage_details: storage_details.to_string(),
        }
    }
}

/// Request body of `POST /repos/{owner}/{repo}/dispatches`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchEvent {
    pub event_type: String,
    pub client_payload: NotificationPayload,
}

/// A dispatch that was not accepted.
///
/// `status` is `None` when no HTTP response was received (connection
/// refused, DNS failure, timeout); `body` then carries the transport error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchFailure {
    pub status: Option<u16>,
    pub body: String,
}

impl DispatchFailure {
    fn transport(details: impl Into<String>) -> Self {
        Self {
            status: None,
            body: details.into(),
        }
    }
}

impl fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(code) => write!(f, "HTTP {code}: {}", self.body),
            None => write!(f, "transport failure: {}", self.body),
        }
    }
}

impl std::error::Error for DispatchFailure {}

/// Delivers a [`DispatchEvent`]. Implementations never retry.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, event: &DispatchEvent) -> Result<(), DispatchFailure>;
}

/// Sends dispatches with `curl`.
///
/// The bearer token is fed to curl on stdin (`--header @-`) so it does not
/// show up in the process list. Success is exactly HTTP 204.
#[derive(Clone)]
pub struct CurlDispatcher {
    program: String,
    endpoint: String,
    token: Secret,
    timeout: Duration,
}

impl CurlDispatcher {
    #[must_use]
    pub fn new(config: &DispatchConfig, timeout: Duration) -> Self {
        Self {
            program: "curl".to_string(),
            endpoint: config.endpoint(),
            token: config.token.clone(),
            timeout,
        }
    }

    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn command(&self, body: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--silent")
            .arg("--show-error")
            .arg("--max-time")
            .arg(self.timeout.as_secs().max(1).to_string())
            .arg("--request")
            .arg("POST")
            .arg("--header")
            .arg("Accept: application/vnd.github+json")
            .arg("--header")
            .arg("Content-Type: application/json")
            .arg("--header")
            .arg("@-")
            .arg("--data-binary")
            .arg(body)
            .arg("--write-out")
            .arg("\n%{http_code}")
            .arg(&self.endpoint);
        cmd
    }
}

impl fmt::Debug for CurlDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurlDispatcher")
            .field("program", &self.program)
            .field("endpoint", &self.endpoint)
            .field("token", &self.token)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Dispatcher for CurlDispatcher {
    fn dispatch(&self, event: &DispatchEvent) -> Result<(), DispatchFailure> {
        let body = serde_json::to_string(event)
            .map_err(|error| DispatchFailure::transport(format!("encode payload: {error}")))?;
        let auth = format!("Authorization: Bearer {}\n", self.token.expose());

        let output = run_with_timeout(
            &mut self.command(&body),
            Some(auth.as_bytes()),
            self.timeout + KILL_GRACE,
        )
        .map_err(|failure| DispatchFailure::transport(format!("{}: {failure}", self.program)))?;

        if !output.success() {
            let stderr = output.stderr.trim();
            let details = if stderr.is_empty() {
                format!("{} exited with {}", self.program, output.status)
            } else {
                stderr.to_string()
            };
            return Err(DispatchFailure::transport(details));
        }

        let (response_body, status) = split_write_out(&output.stdout);
        match status {
            Some(DISPATCH_ACCEPTED) => Ok(()),
            Some(code) => Err(DispatchFailure {
                status: Some(code),
                body: response_body.trim().to_string(),
            }),
            None => Err(DispatchFailure::transport(format!(
                "no HTTP status in response: {}",
                output.stdout.trim()
            ))),
        }
    }
}

/// Split curl output produced with `--write-out "\n%{http_code}"` into the
/// response body and the status code. Code `000` means no response.
fn split_write_out(stdout: &str) -> (&str, Option<u16>) {
    let trimmed = stdout.trim_end_matches(['\r', '\n']);
    let (body, code) = trimmed.rsplit_once('\n').unwrap_or(("", trimmed));
    let status = code.trim().parse::<u16>().ok().filter(|code| *code != 0);
    (body, status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn storage() -> StorageConfig {
        StorageConfig {
            account: "acct".to_string(),
            account_key: None,
            file_share: "share".to_string(),
            container_name: "app".to_string(),
        }
    }

    fn dispatch_config() -> DispatchConfig {
        DispatchConfig {
            api_url: "http://127.0.0.1:9".to_string(),
            owner: "octo".to_string(),
            repo: "infra".to_string(),
            token: Secret::new("ghp_secret"),
            event_type: "storage-quota-increase".to_string(),
        }
    }

    fn sample_event() -> DispatchEvent {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        DispatchEvent {
            event_type: "storage-quota-increase".to_string(),
            client_payload: NotificationPayload::new(
                &storage(),
                100,
                150,
                85,
                "Used: 85.0 GB, Available: 15.0 GB, Total: 100.0 GB",
                at,
            ),
        }
    }

    #[test]
    fn payload_serializes_numbers_as_strings() {
        let json = serde_json::to_value(sample_event()).unwrap();
        assert_eq!(json["event_type"], "storage-quota-increase");
        let payload = &json["client_payload"];
        assert_eq!(payload["current_quota"], "100");
        assert_eq!(payload["new_quota"], "150");
        assert_eq!(payload["usage_percent"], "85");
        assert_eq!(payload["container_name"], "app");
        assert_eq!(payload["storage_account"], "acct");
        assert_eq!(payload["file_share"], "share");
        assert_eq!(payload["triggered_by"], "automated_monitoring");
        assert_eq!(payload["timestamp"], "2024-01-01T00:00:00Z");
        assert_eq!(
            payload["storage_details"],
            "Used: 85.0 GB, Available: 15.0 GB, Total: 100.0 GB"
        );
    }

    #[test]
    fn write_out_parsing() {
        assert_eq!(split_write_out("\n204"), ("", Some(204)));
        assert_eq!(
            split_write_out("{\"message\":\"Bad credentials\"}\n401"),
            ("{\"message\":\"Bad credentials\"}", Some(401))
        );
        assert_eq!(split_write_out("line1\nline2\n500\n"), ("line1\nline2", Some(500)));
        assert_eq!(split_write_out("\n000"), ("", None));
        assert_eq!(split_write_out(""), ("", None));
    }

    #[test]
    fn failure_display() {
        let http = DispatchFailure {
            status: Some(500),
            body: "oops".to_string(),
        };
        assert_eq!(http.to_string(), "HTTP 500: oops");
        assert!(
            DispatchFailure::transport("refused")
                .to_string()
                .starts_with("transport failure")
        );
    }

    #[test]
    fn debug_redacts_token() {
        let dispatcher = CurlDispatcher::new(&dispatch_config(), Duration::from_secs(5));
        let debug = format!("{dispatcher:?}");
        assert!(!debug.contains("ghp_secret"));
        assert_eq!(
            dispatcher.endpoint(),
            "http://127.0.0.1:9/repos/octo/infra/dispatches"
        );
    }

    #[test]
    fn missing_curl_is_transport_failure() {
        let dispatcher = CurlDispatcher::new(&dispatch_config(), Duration::from_secs(1))
            .with_program("definitely-not-a-real-binary-sqm");
        let err = dispatcher.dispatch(&sample_event()).unwrap_err();
        assert_eq!(err.status, None);
    }

    #[cfg(unix)]
    mod stub {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::path::Path;

        fn write_stub(dir: &Path, body: &str) -> String {
            let path = dir.join("curl-stub");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.to_string_lossy().into_owned()
        }

        #[test]
        fn accepted_on_204_and_token_read_from_stdin() {
            let dir = tempfile::tempdir().unwrap();
            let stdin_log = dir.path().join("stdin");
            let argv_log = dir.path().join("argv");
            let stub = write_stub(
                dir.path(),
                &format!(
                    "cat > {}\necho \"$@\" > {}\nprintf '\\n204'",
                    stdin_log.display(),
                    argv_log.display()
                ),
            );
            let dispatcher = CurlDispatcher::new(&dispatch_config(), Duration::from_secs(5))
                .with_program(stub);

            dispatcher.dispatch(&sample_event()).unwrap();

            let stdin = std::fs::read_to_string(&stdin_log).unwrap();
            assert_eq!(stdin, "Authorization: Bearer ghp_secret\n");
            let argv = std::fs::read_to_string(&argv_log).unwrap();
            assert!(!argv.contains("ghp_secret"));
            assert!(argv.contains("/repos/octo/infra/dispatches"));
        }

        #[test]
        fn non_204_is_failure_with_body() {
            let dir = tempfile::tempdir().unwrap();
            let stub = write_stub(
                dir.path(),
                "cat > /dev/null\nprintf '{\"message\":\"Bad credentials\"}\\n401'",
            );
            let dispatcher = CurlDispatcher::new(&dispatch_config(), Duration::from_secs(5))
                .with_program(stub);

            let err = dispatcher.dispatch(&sample_event()).unwrap_err();
            assert_eq!(err.status, Some(401));
            assert!(err.body.contains("Bad credentials"));
        }

        #[test]
        fn other_2xx_is_not_success() {
            let dir = tempfile::tempdir().unwrap();
            let stub = write_stub(dir.path(), "cat > /dev/null\nprintf '{}\\n200'");
            let dispatcher = CurlDispatcher::new(&dispatch_config(), Duration::from_secs(5))
                .with_program(stub);

            let err = dispatcher.dispatch(&sample_event()).unwrap_err();
            assert_eq!(err.status, Some(200));
        }

        #[test]
        fn curl_error_exit_is_transport_failure() {
            let dir = tempfile::tempdir().unwrap();
            let stub = write_stub(
                dir.path(),
                "cat > /dev/null\necho 'curl: (7) Failed to connect' >&2\nprintf '\\n000'\nexit 7",
            );
            let dispatcher = CurlDispatcher::new(&dispatch_config(), Duration::from_secs(5))
                .with_program(stub);

            let err = dispatcher.dispatch(&sample_event()).unwrap_err();
            assert_eq!(err.status, None);
            assert!(err.body.contains("Failed to connect"));
        }
    }
}
