#![forbid(unsafe_code)]

//! Storage Quota Monitor (sqm) — watches utilization of a mounted cloud file
//! share and asks an external workflow to raise the share quota before it
//! fills up.
//!
//! One sequential loop ties four pieces together:
//! 1. **Usage probe** — bounded `statvfs` read turned into a percent-used sample
//! 2. **Quota client** — reads the current quota and sends the increase request
//! 3. **Cooldown gate** — suppresses repeat requests within a window
//! 4. **Monitor loop** — polling, threshold evaluation, periodic health checks
//!
//! # Library usage
//!
//! ```rust,no_run
//! use storage_quota_monitor::prelude::*;
//! ```

pub mod prelude;

pub mod core;
pub mod daemon;
pub mod logger;
pub mod monitor;
pub mod platform;
pub mod quota;
