//! Platform abstraction: filesystem stats, executable lookup, bounded subprocesses.

pub mod command;
pub mod pal;
