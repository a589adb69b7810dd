//! Reads the remote memory snapshot.

use std::sync::Arc;

use shishen_core::{RemoteChannel, RemoteStatus};

/// Maps the remote memory snapshot to a `RemoteStatus`.
pub struct StatusFetcher<C> {
    channel: Arc<C>,
    memory_snapshot: String,
}

impl<C: RemoteChannel> StatusFetcher<C> {
    #[must_use]
    pub fn new(channel: Arc<C>, memory_snapshot: impl Into<String>) -> Self {
        Self {
            channel,
            memory_snapshot: memory_snapshot.into(),
        }
    }

    /// Current status, or `None` if the snapshot could not be read or parsed.
    pub async fn fetch(&self) -> Option<RemoteStatus> {
        let bytes = match self.channel.fetch_file(&self.memory_snapshot).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %self.memory_snapshot, "Failed to fetch memory snapshot: {e}");
                return None;
            }
        };

        match RemoteStatus::from_snapshot(&bytes) {
            Ok(status) => Some(status),
            Err(e) => {
                tracing::warn!(path = %self.memory_snapshot, "Malformed memory snapshot: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shishen_core::testing::ScriptedChannel;

    const SNAPSHOT: &str = "/opt/shishen/shishen-unified-memory.json";

    #[tokio::test]
    async fn test_missing_fields_get_defaults() {
        let channel = Arc::new(ScriptedChannel::new().with_file(r#"{"energy": 55}"#));
        let status = StatusFetcher::new(channel, SNAPSHOT).fetch().await.unwrap();

        assert_eq!(status.energy, 55);
        assert_eq!(status.emotion, "curiosity");
        assert_eq!(status.self_understanding, 99);
        assert_eq!(status.world_connection, 37);
    }

    #[tokio::test]
    async fn test_malformed_snapshot_is_none() {
        let channel = Arc::new(ScriptedChannel::new().with_file(r#"{"energy": 55, "emotion": "#));
        assert!(StatusFetcher::new(channel, SNAPSHOT).fetch().await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_none() {
        let channel = Arc::new(ScriptedChannel::new());
        let fetcher = StatusFetcher::new(Arc::clone(&channel), SNAPSHOT);

        assert!(fetcher.fetch().await.is_none());
        assert_eq!(channel.fetch_calls(), 1);
    }
}
