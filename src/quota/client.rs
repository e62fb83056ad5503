//! Quota client: reads the current quota, computes the increase, and sends
//! the increase request. It never resizes anything itself.

#![allow(missing_docs)]

use std::sync::Arc;

use chrono::Utc;

use crate::core::config::{Config, StorageConfig};
use crate::core::errors::Result;
use crate::quota::dispatch::{
    CurlDispatcher, DispatchEvent, DispatchFailure, Dispatcher, NotificationPayload,
};
use crate::quota::provider::{AzCliQuotaProvider, QuotaGb, QuotaProvider};

#[derive(Clone)]
pub struct QuotaClient {
    provider: Arc<dyn QuotaProvider>,
    dispatcher: Arc<dyn Dispatcher>,
    storage: StorageConfig,
    event_type: String,
}

impl QuotaClient {
    #[must_use]
    pub fn new(
        provider: Arc<dyn QuotaProvider>,
        dispatcher: Arc<dyn Dispatcher>,
        storage: StorageConfig,
        event_type: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            dispatcher,
            storage,
            event_type: event_type.into(),
        }
    }

    /// Client backed by the Azure CLI and curl, both bounded by the command timeout.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let timeout = config.monitor.command_timeout();
        Self::new(
            Arc::new(AzCliQuotaProvider::new(&config.storage, timeout)),
            Arc::new(CurlDispatcher::new(&config.dispatch, timeout)),
            config.storage.clone(),
            config.dispatch.event_type.clone(),
        )
    }

    /// Present quota of the share, or `None` if it cannot be determined.
    ///
    /// Same query as [`Self::lookup_quota`] with the failure reason dropped.
    #[must_use]
    pub fn current_quota(&self) -> Option<QuotaGb> {
        self.lookup_quota().ok()
    }

    /// Present quota of the share. Any provider failure (tool missing,
    /// non-zero exit, timeout, unparsable output) is an `Err` carrying the
    /// reason, which the monitor loop and the health check log. `Err` here is
    /// exactly the `None` case of [`Self::current_quota`].
    pub fn lookup_quota(&self) -> Result<QuotaGb> {
        self.provider.query_quota()
    }

    /// Proposed new quota: half as much again, truncated.
    #[must_use]
    pub const fn propose_increase(current: QuotaGb) -> QuotaGb {
        current.saturating_add(current / 2)
    }

    /// Send the increase request. Exactly one attempt.
    pub fn notify(
        &self,
        current: QuotaGb,
        proposed: QuotaGb,
        usage_percent: u8,
        storage_details: &str,
    ) -> std::result::Result<(), DispatchFailure> {
        let event = DispatchEvent {
            event_type: self.event_type.clone(),
            client_payload: NotificationPayload::new(
                &self.storage,
                current,
                proposed,
                usage_percent,
                storage_details,
                Utc::now(),
            ),
        };
        self.dispatcher.dispatch(&event)
    }

    /// Name of the external quota tool, for health checks.
    #[must_use]
    pub fn tool(&self) -> &str {
        self.provider.tool()
    }
}
