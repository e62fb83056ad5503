//! Main monitoring loop: sample usage, evaluate the threshold, gate on the
//! cooldown, request a quota increase, sleep, repeat.
//!
//! The loop is sequential. Every external call it makes is bounded by a
//! timeout, and the inter-cycle sleep returns as soon as shutdown is
//! requested.

#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Instant;

use crate::core::config::Config;
use crate::core::errors::Result;
use crate::daemon::cooldown::{CooldownGate, FileCooldownStore};
use crate::daemon::health::{HealthReport, RecurringTimer, run_health_check};
use crate::daemon::signals::SignalHandler;
use crate::logger::activity::{ActivityEvent, ActivityLogger};
use crate::logger::jsonl::JsonlConfig;
use crate::monitor::usage::UsageProbe;
use crate::platform::pal::{Platform, detect_platform};
use crate::quota::client::QuotaClient;
use crate::quota::provider::QuotaGb;

/// What a single cycle decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The sample failed or reported 0%; no threshold evaluation.
    UsageUnavailable,
    BelowThreshold {
        usage_pct: u8,
    },
    /// Over threshold but a recent notification is still cooling down.
    Suppressed {
        usage_pct: u8,
    },
    /// Over threshold but the current quota could not be read.
    QuotaUnknown {
        usage_pct: u8,
    },
    Dispatched {
        usage_pct: u8,
        current: QuotaGb,
        proposed: QuotaGb,
    },
    DispatchFailed {
        usage_pct: u8,
        status: Option<u16>,
    },
}

impl CycleOutcome {
    /// Whether this cycle sent an accepted increase request.
    #[must_use]
    pub const fn dispatched(&self) -> bool {
        matches!(self, Self::Dispatched { .. })
    }
}

/// Totals reported when the loop returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub cycles: u64,
    pub dispatches: u64,
    pub health_checks: u64,
    pub cooldown_cleared: bool,
}

pub struct MonitorLoop {
    config: Config,
    platform: Arc<dyn Platform>,
    probe: UsageProbe,
    client: QuotaClient,
    gate: CooldownGate,
    logger: ActivityLogger,
    health_timer: RecurringTimer,
    start_time: Instant,
}

impl MonitorLoop {
    /// Assemble a loop from explicit collaborators.
    #[must_use]
    pub fn new(
        config: Config,
        platform: Arc<dyn Platform>,
        client: QuotaClient,
        gate: CooldownGate,
        logger: ActivityLogger,
    ) -> Self {
        let probe = UsageProbe::new(Arc::clone(&platform), config.monitor.probe_timeout());
        let health_timer = RecurringTimer::new(config.monitor.health_check_interval());
        Self {
            config,
            platform,
            probe,
            client,
            gate,
            logger,
            health_timer,
            start_time: Instant::now(),
        }
    }

    /// Production wiring: host platform, Azure CLI + curl, file-backed
    /// cooldown, JSONL activity log.
    pub fn init(config: Config) -> Result<Self> {
        let platform = detect_platform()?;
        let client = QuotaClient::from_config(&config);
        let gate = CooldownGate::new(
            Arc::new(FileCooldownStore::new(config.paths.cooldown_file.clone())),
            config.monitor.cooldown_window(),
        );
        let logger = ActivityLogger::open(
            JsonlConfig::for_path(config.paths.log_file.clone())
                .with_fallback(config.paths.log_fallback_file.clone()),
        );
        Ok(Self::new(config, platform, client, gate, logger))
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub const fn gate(&self) -> &CooldownGate {
        &self.gate
    }

    /// Run until `cancel` requests shutdown, then clear the cooldown and return.
    pub fn run(&mut self, cancel: &SignalHandler) -> RunSummary {
        let mut summary = RunSummary::default();
        self.log_start();

        loop {
            if cancel.should_shutdown() {
                break;
            }

            if self.health_timer.fire_if_due(Instant::now()) {
                self.health_check();
                summary.health_checks += 1;
            }

            let outcome = self.run_cycle();
            summary.cycles += 1;
            if outcome.dispatched() {
                summary.dispatches += 1;
            }

            if cancel.wait(self.config.monitor.poll_interval()) {
                break;
            }
        }

        summary.cooldown_cleared = self.shutdown("signal");
        summary
    }

    /// One poll: sample, threshold, cooldown, quota, dispatch.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        let path = self.config.monitor.mount_path.clone();
        let path_str = path.display().to_string();
        let threshold = self.config.monitor.threshold_pct;

        let sample = match self.probe.sample(&path) {
            Ok(sample) => sample,
            Err(error) => {
                self.logger.log(&ActivityEvent::UsageUnavailable {
                    path: path_str,
                    error_code: Some(error.code().to_string()),
                    error_message: error.to_string(),
                });
                return CycleOutcome::UsageUnavailable;
            }
        };

        // statvfs on a detached or not-yet-mounted share can report zero usage.
        if sample.percent_used == 0 {
            self.logger.log(&ActivityEvent::UsageUnavailable {
                path: path_str,
                error_code: None,
                error_message: "reported 0% usage, treating as indeterminate".to_string(),
            });
            return CycleOutcome::UsageUnavailable;
        }

        let usage_pct = sample.percent_used;
        let details = sample.details();
        self.logger.log(&ActivityEvent::UsageSampled {
            path: path_str.clone(),
            usage_pct,
            threshold_pct: threshold,
            details: details.clone(),
        });

        if usage_pct <= threshold {
            return CycleOutcome::BelowThreshold { usage_pct };
        }

        self.logger.log(&ActivityEvent::ThresholdExceeded {
            path: path_str,
            usage_pct,
            threshold_pct: threshold,
        });

        if self.gate.is_active() {
            self.logger.log(&ActivityEvent::CooldownSuppressed {
                usage_pct,
                threshold_pct: threshold,
            });
            return CycleOutcome::Suppressed { usage_pct };
        }

        let current = match self.client.lookup_quota() {
            Ok(current) => current,
            Err(error) => {
                self.logger.log(&ActivityEvent::QuotaUnavailable {
                    error_code: error.code().to_string(),
                    error_message: error.to_string(),
                });
                return CycleOutcome::QuotaUnknown { usage_pct };
            }
        };
        let proposed = QuotaClient::propose_increase(current);

        match self.client.notify(current, proposed, usage_pct, &details) {
            Ok(()) => {
                self.logger.log(&ActivityEvent::DispatchSent {
                    current_quota: current,
                    new_quota: proposed,
                    usage_pct,
                });
                if let Err(error) = self.gate.arm() {
                    self.logger.log(&ActivityEvent::Error {
                        code: error.code().to_string(),
                        message: format!("failed to persist cooldown: {error}"),
                    });
                }
                CycleOutcome::Dispatched {
                    usage_pct,
                    current,
                    proposed,
                }
            }
            Err(failure) => {
                self.logger.log(&ActivityEvent::DispatchFailed {
                    current_quota: current,
                    new_quota: proposed,
                    status: failure.status,
                    body: failure.body.clone(),
                });
                CycleOutcome::DispatchFailed {
                    usage_pct,
                    status: failure.status,
                }
            }
        }
    }

    /// Run and log one health check pass.
    pub fn health_check(&mut self) -> HealthReport {
        let report = run_health_check(
            self.platform.as_ref(),
            &self.probe,
            &self.client,
            &self.config.monitor.mount_path,
        );
        self.logger.log(&ActivityEvent::HealthChecked {
            healthy: report.healthy,
            summary: report.summary(),
        });
        report
    }

    fn log_start(&mut self) {
        let config_hash = self.config.stable_hash().unwrap_or_default();
        self.logger.log(&ActivityEvent::MonitorStarted {
            version: env!("CARGO_PKG_VERSION").to_string(),
            config_hash,
            path: self.config.monitor.mount_path.display().to_string(),
            threshold_pct: self.config.monitor.threshold_pct,
        });
    }

    /// Clear the cooldown record and log the stop. Returns whether the clear
    /// succeeded.
    fn shutdown(&mut self, reason: &str) -> bool {
        let uptime_secs = self.start_time.elapsed().as_secs();

        let cooldown_cleared = match self.gate.clear() {
            Ok(()) => true,
            Err(error) => {
                self.logger.log(&ActivityEvent::Error {
                    code: error.code().to_string(),
                    message: format!("failed to clear cooldown on shutdown: {error}"),
                });
                false
            }
        };

        self.logger.log(&ActivityEvent::MonitorStopped {
            reason: reason.to_string(),
            uptime_secs,
            cooldown_cleared,
        });
        self.logger.sync();
        cooldown_cleared
    }
}
