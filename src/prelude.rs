//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use storage_quota_monitor::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{Result, SqmError};

// Platform
pub use crate::platform::pal::{FsStats, Platform, detect_platform};

// Monitor
pub use crate::monitor::usage::{UsageProbe, UsageSample};

// Quota
pub use crate::quota::client::QuotaClient;
pub use crate::quota::dispatch::{DispatchFailure, Dispatcher, NotificationPayload};
pub use crate::quota::provider::{QuotaGb, QuotaProvider};

// Daemon
pub use crate::daemon::cooldown::{
    CooldownGate, CooldownStore, FileCooldownStore, MemoryCooldownStore,
};
pub use crate::daemon::health::{HealthReport, RecurringTimer};
#[cfg(feature = "daemon")]
pub use crate::daemon::loop_main::{CycleOutcome, MonitorLoop};
#[cfg(feature = "daemon")]
pub use crate::daemon::signals::SignalHandler;
