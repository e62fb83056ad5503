//! Daemon subsystem: main monitoring loop, cooldown gate, health checks, and
//! signal handling.

pub mod cooldown;
pub mod health;
#[cfg(feature = "daemon")]
pub mod loop_main;
#[cfg(feature = "daemon")]
pub mod signals;
