//! Subprocess execution with a hard deadline.
//!
//! Every external collaborator (the cloud CLI, `curl`) runs through
//! [`run_with_timeout`]: the child is polled with `try_wait` and killed once
//! the deadline passes.

#![allow(missing_docs)]

use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};

/// How often a running child is polled for exit.
const POLL_STEP: Duration = Duration::from_millis(25);

/// Minimum time left to collect output from a child that exited at the deadline.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Captured result of a finished subprocess.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Why a bounded subprocess did not produce output.
#[derive(Debug)]
pub enum CommandFailure {
    /// The program could not be started (usually: not installed).
    Spawn(std::io::Error),
    /// The deadline passed; the child was killed.
    TimedOut(Duration),
    /// Waiting on or reading from the child failed.
    Io(std::io::Error),
}

impl std::fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawn(e) => write!(f, "failed to start: {e}"),
            Self::TimedOut(limit) => write!(f, "timed out after {}s", limit.as_secs()),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

/// Run `command` to completion or kill it after `timeout`.
///
/// `stdin` is written in full and then closed. Stdout and stderr are drained
/// on helper threads so a chatty child cannot block on a full pipe.
pub fn run_with_timeout(
    command: &mut Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
) -> Result<CommandOutput, CommandFailure> {
    command
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn().map_err(CommandFailure::Spawn)?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        // A child that exits without reading stdin yields EPIPE; its exit
        // status carries the real outcome.
        let _ = pipe.write_all(input);
    }

    let stdout_reader = child.stdout.take().map(spawn_drain);
    let stderr_reader = child.stderr.take().map(spawn_drain);

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CommandFailure::TimedOut(timeout));
            }
            Ok(None) => thread::sleep(POLL_STEP),
            Err(error) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CommandFailure::Io(error));
            }
        }
    };

    // A background grandchild can hold the pipes open after the child exits;
    // the deadline still bounds how long we wait for EOF.
    let drain_deadline = deadline.max(Instant::now() + DRAIN_GRACE);
    let stdout = collect_drain(stdout_reader, drain_deadline)
        .ok_or(CommandFailure::TimedOut(timeout))?;
    let stderr = collect_drain(stderr_reader, drain_deadline)
        .ok_or(CommandFailure::TimedOut(timeout))?;

    Ok(CommandOutput {
        status,
        stdout,
        stderr,
    })
}

fn spawn_drain<R: Read + Send + 'static>(mut pipe: R) -> Receiver<String> {
    let (tx, rx) = bounded(1);
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    rx
}

/// `None` when the pipe is still open at `deadline`.
fn collect_drain(reader: Option<Receiver<String>>, deadline: Instant) -> Option<String> {
    let Some(rx) = reader else {
        return Some(String::new());
    };
    match rx.recv_deadline(deadline) {
        Ok(output) => Some(output),
        Err(RecvTimeoutError::Disconnected) => Some(String::new()),
        Err(RecvTimeoutError::Timeout) => None,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_and_status() {
        let out = run_with_timeout(
            Command::new("sh").args(["-c", "echo 100; echo warn >&2"]),
            None,
            Duration::from_secs(5),
        )
        .expect("sh should run");
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "100");
        assert_eq!(out.stderr.trim(), "warn");
    }

    #[test]
    fn feeds_stdin() {
        let out = run_with_timeout(
            &mut Command::new("cat"),
            Some(b"Authorization: Bearer t\n"),
            Duration::from_secs(5),
        )
        .expect("cat should run");
        assert_eq!(out.stdout, "Authorization: Bearer t\n");
    }

    #[test]
    fn non_zero_exit_is_reported_not_failed() {
        let out = run_with_timeout(
            Command::new("sh").args(["-c", "exit 3"]),
            None,
            Duration::from_secs(5),
        )
        .expect("sh should run");
        assert_eq!(out.status.code(), Some(3));
    }

    #[test]
    fn slow_child_is_killed() {
        let start = Instant::now();
        let err = run_with_timeout(
            Command::new("sleep").arg("5"),
            None,
            Duration::from_millis(200),
        )
        .expect_err("sleep should time out");
        assert!(matches!(err, CommandFailure::TimedOut(_)));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn lingering_grandchild_does_not_outlive_deadline() {
        let start = Instant::now();
        let err = run_with_timeout(
            Command::new("sh").args(["-c", "sleep 5 & echo 100"]),
            None,
            Duration::from_millis(300),
        )
        .expect_err("held pipe should hit the deadline");
        assert!(matches!(err, CommandFailure::TimedOut(_)));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn missing_program_is_spawn_failure() {
        let err = run_with_timeout(
            &mut Command::new("definitely-not-a-real-binary-sqm"),
            None,
            Duration::from_secs(1),
        )
        .expect_err("spawn should fail");
        assert!(matches!(err, CommandFailure::Spawn(_)));
    }
}
