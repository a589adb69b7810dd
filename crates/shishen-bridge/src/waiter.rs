//! Polls the remote response log for a reply.

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shishen_core::{RemoteChannel, TransportError};
use tokio::{sync::oneshot, time::Instant};

/// How a response-log line is tied to a pulse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Correlation {
    /// Any non-empty last line is the reply. Concurrent sends can see each
    /// other's replies.
    #[default]
    LatestLine,
    /// Only a JSON line carrying the pulse's breath id is the reply.
    MatchBreathId,
}

/// Wait settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub correlation: Correlation,
    /// Lines scanned per poll in `match-breath-id` mode.
    pub scan_depth: usize,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            poll_interval_ms: 2_000,
            correlation: Correlation::default(),
            scan_depth: 20,
        }
    }
}

impl WaitConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Best-effort reply lookup with a deadline.
///
/// `None` means "no answer yet"; transport failures during polling are
/// indistinguishable from silence.
pub struct ResponseWaiter<C> {
    channel: Arc<C>,
    response_log: String,
    config: WaitConfig,
}

impl<C: RemoteChannel> ResponseWaiter<C> {
    /// Create a waiter reading `response_log`.
    #[must_use]
    pub fn new(channel: Arc<C>, response_log: impl Into<String>, config: WaitConfig) -> Self {
        Self {
            channel,
            response_log: response_log.into(),
            config,
        }
    }

    /// Configured settings.
    #[must_use]
    pub const fn config(&self) -> &WaitConfig {
        &self.config
    }

    /// Wait with the configured timeout and poll interval.
    pub async fn wait_default(&self, breath_id: &str) -> Option<String> {
        self.wait(breath_id, self.config.timeout(), self.config.poll_interval())
            .await
    }

    /// Poll until a reply shows up or `timeout` has elapsed.
    ///
    /// Returns no later than `timeout + poll_interval` after the call, even
    /// if a poll stalls. Dropping the future stops polling.
    pub async fn wait(&self, breath_id: &str, timeout: Duration, poll_interval: Duration) -> Option<String> {
        let started = Instant::now();
        let hard_deadline = started + timeout + poll_interval;
        let mut polls = 0u32;

        while started.elapsed() < timeout {
            polls += 1;
            match tokio::time::timeout_at(hard_deadline, self.poll(breath_id)).await {
                Ok(Ok(Some(reply))) => {
                    tracing::debug!(breath_id, polls, "Response observed");
                    return Some(reply);
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    tracing::warn!(breath_id, "Failed to poll response log: {e}");
                }
                Err(_) => {
                    tracing::warn!(breath_id, "Response poll stalled past the deadline");
                    return None;
                }
            }
            if started.elapsed() >= timeout {
                break;
            }
            tokio::time::sleep_until((Instant::now() + poll_interval).min(hard_deadline)).await;
        }

        tracing::debug!(breath_id, polls, "No response before the deadline");
        None
    }

    /// Like [`wait_default`](Self::wait_default), but gives up as soon as
    /// `cancel` fires or its sender is dropped.
    pub async fn wait_until_cancelled(&self, breath_id: &str, cancel: oneshot::Receiver<()>) -> Option<String> {
        tokio::select! {
            reply = self.wait_default(breath_id) => reply,
            _ = cancel => {
                tracing::debug!(breath_id, "Response wait cancelled");
                None
            }
        }
    }

    async fn poll(&self, breath_id: &str) -> Result<Option<String>, TransportError> {
        match self.config.correlation {
            Correlation::LatestLine => {
                let line = self.channel.tail_latest(&self.response_log).await?;
                let line = line.trim();
                Ok((!line.is_empty()).then(|| line.to_string()))
            }
            Correlation::MatchBreathId => {
                let lines = self
                    .channel
                    .tail_recent(&self.response_log, self.config.scan_depth)
                    .await?;
                Ok(lines
                    .into_iter()
                    .rev()
                    .find(|line| entry_breath_id(line).as_deref() == Some(breath_id)))
            }
        }
    }
}

/// Breath id carried by a response-log entry, if it is JSON and has one.
fn entry_breath_id(line: &str) -> Option<String> {
    let value: Value = serde_json::from_str(line).ok()?;
    ["breathId", "breath_id", "id"]
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_str))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shishen_core::testing::{ScriptedChannel, TailStep};

    const LOG: &str = "/opt/shishen/messages-to-manus.jsonl";

    fn waiter(channel: &Arc<ScriptedChannel>, correlation: Correlation) -> ResponseWaiter<ScriptedChannel> {
        let config = WaitConfig {
            correlation,
            ..WaitConfig::default()
        };
        ResponseWaiter::new(Arc::clone(channel), LOG, config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_non_empty_line_wins() {
        let channel = Arc::new(ScriptedChannel::new().with_tail_steps([
            TailStep::Line(String::new()),
            TailStep::Line("   ".to_string()),
            TailStep::Line("  hi there \n".to_string()),
        ]));
        let waiter = waiter(&channel, Correlation::LatestLine);
        let started = Instant::now();

        let reply = waiter
            .wait("42-1", Duration::from_secs(30), Duration::from_secs(2))
            .await;

        assert_eq!(reply.as_deref(), Some("hi there"));
        assert_eq!(channel.tail_calls(), 3);
        assert!(started.elapsed() >= Duration::from_secs(4));
        assert!(started.elapsed() < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_do_not_move_the_deadline() {
        let channel = Arc::new(
            ScriptedChannel::new().with_tail_steps([TailStep::Fail, TailStep::Fail, TailStep::Fail]),
        );
        let waiter = waiter(&channel, Correlation::LatestLine);
        let started = Instant::now();

        let reply = waiter
            .wait("42-1", Duration::from_secs(6), Duration::from_secs(2))
            .await;

        assert!(reply.is_none());
        assert_eq!(channel.tail_calls(), 3);
        assert!(started.elapsed() >= Duration::from_secs(6));
        assert!(started.elapsed() < Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_poll_is_cut_at_hard_deadline() {
        let channel = Arc::new(ScriptedChannel::new().stalled_tail());
        let waiter = waiter(&channel, Correlation::LatestLine);
        let started = Instant::now();

        let reply = waiter
            .wait("42-1", Duration::from_secs(4), Duration::from_secs(2))
            .await;

        assert!(reply.is_none());
        assert!(started.elapsed() <= Duration::from_secs(6));
        assert!(started.elapsed() >= Duration::from_secs(4));
        assert_eq!(channel.tail_calls(), 1);
    }

    /// Every poll takes `delay` and finds nothing.
    struct SlowChannel {
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl RemoteChannel for SlowChannel {
        async fn deliver(&self, _path: &str, _payload: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }

        async fn tail_latest(&self, _path: &str) -> Result<String, TransportError> {
            tokio::time::sleep(self.delay).await;
            Ok(String::new())
        }

        async fn fetch_file(&self, _path: &str) -> Result<bytes::Bytes, TransportError> {
            tokio::time::sleep(self.delay).await;
            Ok(bytes::Bytes::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_polls_never_overshoot_the_bound() {
        for delay_ms in [500, 1_900, 2_500, 3_900] {
            let channel = Arc::new(SlowChannel {
                delay: Duration::from_millis(delay_ms),
            });
            let waiter = ResponseWaiter::new(channel, LOG, WaitConfig::default());
            let started = Instant::now();

            let reply = waiter
                .wait("42-1", Duration::from_secs(4), Duration::from_secs(2))
                .await;
            let elapsed = started.elapsed();

            assert!(reply.is_none());
            assert!(elapsed >= Duration::from_secs(4), "{delay_ms}ms polls: {elapsed:?}");
            assert!(elapsed <= Duration::from_secs(6), "{delay_ms}ms polls: {elapsed:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_match_mode_skips_foreign_replies() {
        let channel = Arc::new(ScriptedChannel::new());
        channel.append_response(r#"{"breathId":"42-1","text":"for you"}"#);
        channel.append_response("plain text from someone");
        channel.append_response(r#"{"breath_id":"7-9","text":"not for you"}"#);
        let waiter = waiter(&channel, Correlation::MatchBreathId);

        let reply = waiter
            .wait("42-1", Duration::from_secs(4), Duration::from_secs(2))
            .await;
        assert_eq!(reply.as_deref(), Some(r#"{"breathId":"42-1","text":"for you"}"#));

        let none = waiter
            .wait("99-1", Duration::from_secs(4), Duration::from_secs(2))
            .await;
        assert!(none.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_ends_wait_early() {
        let channel = Arc::new(ScriptedChannel::new());
        let waiter = waiter(&channel, Correlation::LatestLine);
        let (tx, rx) = oneshot::channel();
        let started = Instant::now();

        let wait = waiter.wait_until_cancelled("42-1", rx);
        let cancel = async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            let _ = tx.send(());
        };
        let (reply, ()) = tokio::join!(wait, cancel);

        assert!(reply.is_none());
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_entry_breath_id() {
        assert_eq!(entry_breath_id(r#"{"breathId":"a-1"}"#).as_deref(), Some("a-1"));
        assert_eq!(entry_breath_id(r#"{"id":"a-2","text":"x"}"#).as_deref(), Some("a-2"));
        assert_eq!(entry_breath_id(r#"{"breathId":5}"#), None);
        assert_eq!(entry_breath_id("hi there"), None);
    }
}
