//! Filesystem monitoring: bounded usage sampling for the watched mount.

pub mod usage;
