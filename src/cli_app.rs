//! CLI definition and command dispatch for `sqm`.

use std::io::{self, IsTerminal, Write};
use std::sync::Arc;
use std::time::SystemTime;

use clap::{Parser, Subcommand};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use storage_quota_monitor::core::config::Config;
use storage_quota_monitor::core::errors::SqmError;
use storage_quota_monitor::daemon::cooldown::{CooldownGate, CooldownStore, FileCooldownStore};
use storage_quota_monitor::daemon::health::run_health_check;
use storage_quota_monitor::daemon::loop_main::MonitorLoop;
use storage_quota_monitor::daemon::signals::SignalHandler;
use storage_quota_monitor::monitor::usage::UsageProbe;
use storage_quota_monitor::platform::pal::detect_platform;
use storage_quota_monitor::quota::client::QuotaClient;

/// Storage quota monitor: requests a share quota increase when a mounted
/// share fills past a threshold.
#[derive(Debug, Parser)]
#[command(
    name = "sqm",
    author,
    version,
    about = "Storage Quota Monitor - requests quota increases before a share fills up",
    long_about = "Configuration is read from SQM_* environment variables. \
                  Without a subcommand the monitor loop runs until SIGINT/SIGTERM."
)]
pub struct Cli {
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Subcommand to execute (default: daemon).
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Command {
    /// Run the monitor loop (default).
    Daemon,
    /// Run the health checks once and exit non-zero if any fail.
    Check,
    /// Show the current usage sample and cooldown state.
    Status,
    /// Remove the cooldown record so the next breach notifies again.
    ResetCooldown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Missing or invalid configuration.
    #[error("{0}")]
    Config(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 1,
            Self::Runtime(_) | Self::Json(_) | Self::Io(_) => 2,
        }
    }
}

impl From<SqmError> for CliError {
    fn from(error: SqmError) -> Self {
        if error.is_config() {
            Self::Config(error.to_string())
        } else {
            Self::Runtime(error.to_string())
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    let config = Config::from_env()?;

    match cli.command.unwrap_or(Command::Daemon) {
        Command::Daemon => run_daemon(config),
        Command::Check => run_check(cli, &config),
        Command::Status => run_status(cli, &config),
        Command::ResetCooldown => run_reset_cooldown(cli, &config),
    }
}

fn run_daemon(config: Config) -> Result<(), CliError> {
    let signals = SignalHandler::install()?;
    let mut monitor = MonitorLoop::init(config)?;
    let summary = monitor.run(&signals);
    eprintln!(
        "[SQM-MONITOR] shutdown complete (cycles={}, dispatches={})",
        summary.cycles, summary.dispatches
    );
    Ok(())
}

fn run_check(cli: &Cli, config: &Config) -> Result<(), CliError> {
    let platform = detect_platform()?;
    let probe = UsageProbe::new(Arc::clone(&platform), config.monitor.probe_timeout());
    let client = QuotaClient::from_config(config);
    let report = run_health_check(
        platform.as_ref(),
        &probe,
        &client,
        &config.monitor.mount_path,
    );

    match output_mode(cli) {
        OutputMode::Human => {
            let mut stdout = io::stdout().lock();
            for check in &report.checks {
                let mark = if check.ok {
                    "ok".green()
                } else {
                    "FAIL".red().bold()
                };
                writeln!(stdout, "{:<12} {mark}  {}", check.name, check.details)?;
            }
        }
        OutputMode::Json => {
            let mut payload = serde_json::to_value(&report)?;
            payload["command"] = json!("check");
            write_json_line(&payload)?;
        }
    }

    if report.healthy {
        Ok(())
    } else {
        Err(CliError::Runtime("health check failed".to_string()))
    }
}

fn run_status(cli: &Cli, config: &Config) -> Result<(), CliError> {
    let platform = detect_platform()?;
    let probe = UsageProbe::new(platform, config.monitor.probe_timeout());
    let gate = CooldownGate::new(
        Arc::new(FileCooldownStore::new(config.paths.cooldown_file.clone())),
        config.monitor.cooldown_window(),
    );

    let sample = probe.sample(&config.monitor.mount_path);
    let remaining = gate.remaining_at(SystemTime::now());
    let threshold = config.monitor.threshold_pct;

    match output_mode(cli) {
        OutputMode::Human => {
            let mut stdout = io::stdout().lock();
            writeln!(
                stdout,
                "path:       {}",
                config.monitor.mount_path.display()
            )?;
            match &sample {
                Ok(sample) => {
                    let pct = format!("{}%", sample.percent_used);
                    let pct = if sample.percent_used > threshold {
                        pct.red().bold()
                    } else {
                        pct.green()
                    };
                    writeln!(stdout, "usage:      {pct} (threshold {threshold}%)")?;
                    writeln!(stdout, "capacity:   {}", sample.details())?;
                }
                Err(error) => writeln!(stdout, "usage:      {}", error.to_string().yellow())?,
            }
            match &remaining {
                Ok(Some(left)) => writeln!(
                    stdout,
                    "cooldown:   {} ({}s remaining)",
                    "active".yellow(),
                    left.as_secs()
                )?,
                Ok(None) => writeln!(stdout, "cooldown:   idle")?,
                Err(error) => writeln!(stdout, "cooldown:   {}", error.to_string().yellow())?,
            }
        }
        OutputMode::Json => {
            let usage = match &sample {
                Ok(sample) => serde_json::to_value(sample)?,
                Err(error) => json!({ "error": error.to_string(), "code": error.code() }),
            };
            let cooldown = match &remaining {
                Ok(left) => json!({
                    "active": left.is_some(),
                    "remaining_secs": left.map(|d| d.as_secs()),
                }),
                Err(error) => json!({ "error": error.to_string(), "code": error.code() }),
            };
            write_json_line(&json!({
                "command": "status",
                "path": config.monitor.mount_path.to_string_lossy(),
                "threshold_pct": threshold,
                "usage": usage,
                "cooldown": cooldown,
                "cooldown_file": config.paths.cooldown_file.to_string_lossy(),
            }))?;
        }
    }
    Ok(())
}

fn run_reset_cooldown(cli: &Cli, config: &Config) -> Result<(), CliError> {
    let store = FileCooldownStore::new(config.paths.cooldown_file.clone());
    store.clear()?;
    match output_mode(cli) {
        OutputMode::Human => {
            writeln!(
                io::stdout(),
                "cooldown cleared: {}",
                store.path().display()
            )?;
        }
        OutputMode::Json => write_json_line(&json!({
            "command": "reset-cooldown",
            "cooldown_file": store.path().to_string_lossy(),
            "cleared": true,
        }))?,
    }
    Ok(())
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("SQM_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_daemon() {
        let cli = Cli::try_parse_from(["sqm"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn parses_subcommands_and_global_flags() {
        let cases = [
            vec!["sqm", "daemon"],
            vec!["sqm", "check", "--json"],
            vec!["sqm", "--no-color", "status"],
            vec!["sqm", "reset-cooldown"],
        ];
        for case in cases {
            let parsed = Cli::try_parse_from(case.clone());
            assert!(parsed.is_ok(), "failed to parse case: {case:?}");
        }
        assert!(Cli::try_parse_from(["sqm", "scan"]).is_err());
    }

    #[test]
    fn output_mode_resolution_honors_precedence() {
        assert_eq!(
            resolve_output_mode(true, Some("human"), true),
            OutputMode::Json
        );
        assert_eq!(
            resolve_output_mode(false, Some("json"), true),
            OutputMode::Json
        );
        assert_eq!(
            resolve_output_mode(false, Some("human"), false),
            OutputMode::Human
        );
        assert_eq!(resolve_output_mode(false, None, true), OutputMode::Human);
        assert_eq!(resolve_output_mode(false, None, false), OutputMode::Json);
    }

    #[test]
    fn exit_codes_follow_contract() {
        assert_eq!(CliError::Config(String::new()).exit_code(), 1);
        assert_eq!(CliError::Runtime(String::new()).exit_code(), 2);

        let missing: CliError = SqmError::MissingConfig {
            names: vec!["SQM_GITHUB_TOKEN"],
        }
        .into();
        assert_eq!(missing.exit_code(), 1);

        let io_failure: CliError = SqmError::io("/tmp/x", io::Error::other("boom")).into();
        assert_eq!(io_failure.exit_code(), 2);
    }
}
