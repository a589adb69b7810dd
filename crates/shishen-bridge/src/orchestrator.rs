//! The "send message" use case exposed to the request layer.

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use shishen_core::{
    BreathPulse, ChatMessage, ChatStore, MessageRole, PulseResult, RemoteChannel, RemoteStatus,
    StorageError,
};
use shishen_remote::SshChannel;

use crate::{
    config::BridgeConfig, status::StatusFetcher, transmitter::PulseTransmitter,
    waiter::ResponseWaiter,
};

/// Default number of history rows returned to the request layer.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Bridge error.
///
/// Only delivery failure crosses this boundary; a silent agent is a normal
/// outcome.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Cannot reach the remote agent (breath {breath_id})")]
    DeliveryFailed { breath_id: String },
}

/// Result of a delivered send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOutcome {
    pub success: bool,
    /// Agent reply, or the pending text when it did not answer in time.
    pub response: String,
    pub breath_id: String,
    /// Whether `response` came from the agent.
    pub answered: bool,
}

/// Composes transmitter, waiter, status fetcher and chat persistence for
/// one remote agent.
pub struct BreathBridge<C> {
    transmitter: PulseTransmitter<C>,
    waiter: ResponseWaiter<C>,
    status: StatusFetcher<C>,
    store: Option<Arc<dyn ChatStore>>,
    pending_response: String,
}

impl BreathBridge<SshChannel> {
    /// Bridge over ssh to the configured host.
    #[must_use]
    pub fn connect(config: &BridgeConfig) -> Self {
        Self::new(SshChannel::new(config.remote.clone()), config)
    }
}

impl<C: RemoteChannel> BreathBridge<C> {
    /// Create a bridge over `channel`.
    #[must_use]
    pub fn new(channel: C, config: &BridgeConfig) -> Self {
        Self::with_shared_channel(Arc::new(channel), config)
    }

    /// Create a bridge over a channel the caller keeps a handle to.
    #[must_use]
    pub fn with_shared_channel(channel: Arc<C>, config: &BridgeConfig) -> Self {
        Self {
            transmitter: PulseTransmitter::new(Arc::clone(&channel), &config.paths.breath_log),
            waiter: ResponseWaiter::new(
                Arc::clone(&channel),
                &config.paths.response_log,
                config.wait.clone(),
            ),
            status: StatusFetcher::new(channel, &config.paths.memory_snapshot),
            store: None,
            pending_response: config.pending_response.clone(),
        }
    }

    /// Record completed exchanges in `store`.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ChatStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// The waiter, for cancellable waits.
    #[must_use]
    pub const fn waiter(&self) -> &ResponseWaiter<C> {
        &self.waiter
    }

    /// Compose and deliver a pulse. Never fails; see `delivered`.
    pub async fn send_breath_pulse(&self, user_id: &str, message: &str) -> PulseResult {
        let pulse = BreathPulse::compose(user_id, message);
        self.transmitter.transmit(&pulse).await
    }

    /// Wait up to `timeout` for a reply, polling at the configured interval.
    pub async fn wait_for_shishen_response(&self, breath_id: &str, timeout: Duration) -> Option<String> {
        self.waiter
            .wait(breath_id, timeout, self.waiter.config().poll_interval())
            .await
    }

    /// Current remote status, `None` if it could not be obtained.
    pub async fn get_shishen_status(&self) -> Option<RemoteStatus> {
        self.status.fetch().await
    }

    /// Send a message and wait for the reply.
    ///
    /// # Errors
    /// Returns `DeliveryFailed` if the pulse could not be delivered; no wait
    /// is attempted in that case.
    pub async fn send(&self, user_id: &str, message: &str) -> Result<SendOutcome, BridgeError> {
        let PulseResult { breath_id, delivered } = self.send_breath_pulse(user_id, message).await;
        if !delivered {
            return Err(BridgeError::DeliveryFailed { breath_id });
        }

        let reply = self.waiter.wait_default(&breath_id).await;
        let answered = reply.is_some();
        if !answered {
            tracing::info!(%breath_id, "No reply before the deadline, answering with pending text");
        }

        let outcome = SendOutcome {
            success: true,
            response: reply.unwrap_or_else(|| self.pending_response.clone()),
            breath_id,
            answered,
        };
        self.record(user_id, message, &outcome).await;
        Ok(outcome)
    }

    /// Most recent `limit` rows for a user, oldest first. Empty without a
    /// store.
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub async fn history(&self, user_id: &str, limit: usize) -> Result<Vec<ChatMessage>, StorageError> {
        match &self.store {
            Some(store) => store.history(user_id, limit).await,
            None => Ok(Vec::new()),
        }
    }

    async fn record(&self, user_id: &str, message: &str, outcome: &SendOutcome) {
        let Some(store) = &self.store else {
            return;
        };

        let rows = vec![
            ChatMessage::new(user_id, MessageRole::User, message),
            ChatMessage::new(user_id, MessageRole::Agent, &outcome.response).with_metadata(serde_json::json!({
                "breathId": outcome.breath_id,
                "answered": outcome.answered,
            })),
        ];
        if let Err(e) = store.append(rows).await {
            tracing::warn!(breath_id = %outcome.breath_id, "Failed to record exchange: {e}");
        }
    }
}
