//! Signal handling: SIGTERM/SIGINT request a graceful shutdown.
//!
//! A watcher thread owns the `signal-hook` iterator. On a signal it sets the
//! shared flag and pokes a channel so the monitor loop's inter-cycle sleep
//! returns at once instead of running out the poll interval.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use crate::core::errors::{Result, SqmError};

/// Cancellation handle shared between the signal watcher and the loop.
#[derive(Clone)]
pub struct SignalHandler {
    shutdown_flag: Arc<AtomicBool>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl SignalHandler {
    /// Handler not connected to OS signals; shutdown only via
    /// [`Self::request_shutdown`].
    #[must_use]
    pub fn detached() -> Self {
        let (wake_tx, wake_rx) = bounded(1);
        Self {
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            wake_tx,
            wake_rx,
        }
    }

    /// Handler wired to SIGINT and SIGTERM.
    pub fn install() -> Result<Self> {
        let handler = Self::detached();
        let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(|error| SqmError::Runtime {
            details: format!("failed to register signal handlers: {error}"),
        })?;

        let watcher = handler.clone();
        thread::Builder::new()
            .name("sqm-signals".to_string())
            .spawn(move || {
                if let Some(signal) = signals.forever().next() {
                    eprintln!("[SQM-SIGNAL] received signal {signal}, shutting down");
                    watcher.request_shutdown();
                }
            })
            .map_err(|error| SqmError::Runtime {
                details: format!("failed to spawn signal watcher: {error}"),
            })?;

        Ok(handler)
    }

    pub fn should_shutdown(&self) -> bool {
        self.shutdown_flag.load(Ordering::Relaxed)
    }

    /// Programmatically request shutdown and wake any waiter.
    pub fn request_shutdown(&self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
        // A full channel already holds a pending wakeup.
        let _ = self.wake_tx.try_send(());
    }

    /// Sleep up to `timeout`. Returns `true` if shutdown was requested.
    pub fn wait(&self, timeout: Duration) -> bool {
        if self.should_shutdown() {
            return true;
        }
        match self.wake_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                self.should_shutdown()
            }
        }
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::detached()
    }
}

// ──────────────────── tests ────────────────────
