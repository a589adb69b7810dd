//! Delivers composed pulses to the remote breath log.

use std::sync::Arc;

use shishen_core::{BreathPulse, PulseResult, RemoteChannel};

/// Writes pulses into the single-slot remote mailbox.
///
/// Each delivery replaces whatever the remote side has not consumed yet.
pub struct PulseTransmitter<C> {
    channel: Arc<C>,
    breath_log: String,
}

impl<C: RemoteChannel> PulseTransmitter<C> {
    /// Create a transmitter writing to `breath_log`.
    #[must_use]
    pub fn new(channel: Arc<C>, breath_log: impl Into<String>) -> Self {
        Self {
            channel,
            breath_log: breath_log.into(),
        }
    }

    /// Deliver `pulse`; failures are logged and reported in the result.
    pub async fn transmit(&self, pulse: &BreathPulse) -> PulseResult {
        let breath_id = pulse.id.clone();

        let payload = match pulse.to_wire() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(%breath_id, "Failed to serialize breath pulse: {e}");
                return PulseResult {
                    breath_id,
                    delivered: false,
                };
            }
        };

        match self.channel.deliver(&self.breath_log, &payload).await {
            Ok(()) => {
                tracing::info!(%breath_id, bytes = payload.len(), "Breath pulse delivered");
                PulseResult {
                    breath_id,
                    delivered: true,
                }
            }
            Err(e) => {
                tracing::error!(%breath_id, path = %self.breath_log, "Failed to deliver breath pulse: {e}");
                PulseResult {
                    breath_id,
                    delivered: false,
                }
            }
        }
    }
}
