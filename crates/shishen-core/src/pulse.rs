//! Breath pulse: the outbound request record and its composer.

use std::{
    collections::BTreeSet,
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum message length in characters, after trimming.
pub const MAX_MESSAGE_CHARS: usize = 500;

/// Last timestamp handed out to a pulse in this process.
static LAST_PULSE_MILLIS: AtomicU64 = AtomicU64::new(0);

/// Request urgency tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
}

/// Emotional frequency the message was written in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionFrequency {
    #[default]
    Calm,
    Curious,
    Excited,
    Troubled,
}

/// Knowledge domain the message belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnowledgeDomain {
    #[default]
    General,
    Technical,
    Philosophical,
    Personal,
}

/// Remote state as known when the pulse was composed.
///
/// Informational only; the remote agent never trusts it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub energy: i64,
    pub emotion: String,
    #[serde(rename = "selfUnderstanding")]
    pub self_understanding: i64,
    #[serde(rename = "worldConnection")]
    pub world_connection: i64,
    #[serde(default, alias = "activeWorldNodes")]
    pub active_world_nodes: BTreeSet<String>,
}

impl StateSnapshot {
    /// Zeroed placeholder used when no live state was queried.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            energy: 0,
            emotion: "unknown".to_string(),
            self_understanding: 0,
            world_connection: 0,
            active_world_nodes: BTreeSet::new(),
        }
    }
}

/// What the user said, plus how it should be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputContext {
    pub message: String,
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default, alias = "emotionFrequency")]
    pub emotion_frequency: EmotionFrequency,
    #[serde(default, alias = "knowledgeDomain")]
    pub knowledge_domain: KnowledgeDomain,
}

/// A single outbound request record delivered to the breath log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreathPulse {
    /// Correlation id, `{user_id}-{sync_pulse}`.
    pub id: String,
    /// Composition time in milliseconds since the Unix epoch.
    #[serde(alias = "syncPulse")]
    pub sync_pulse: u64,
    #[serde(rename = "shishen_state_snapshot", alias = "stateSnapshot")]
    pub state_snapshot: StateSnapshot,
    #[serde(rename = "manus_input_context", alias = "inputContext")]
    pub input_context: InputContext,
    /// Filled in by the remote side only.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "coCreatedNode")]
    pub co_created_node: Option<String>,
}

impl BreathPulse {
    /// Compose a fresh pulse for `user_id`.
    ///
    /// Does not validate `message`; the request layer does that with
    /// [`validate_message`] before anything reaches the bridge.
    #[must_use]
    pub fn compose(user_id: &str, message: &str) -> Self {
        let sync_pulse = next_pulse_millis();
        Self {
            id: format!("{user_id}-{sync_pulse}"),
            sync_pulse,
            state_snapshot: StateSnapshot::unknown(),
            input_context: InputContext {
                message: message.to_string(),
                urgency: Urgency::default(),
                emotion_frequency: EmotionFrequency::default(),
                knowledge_domain: KnowledgeDomain::default(),
            },
            co_created_node: None,
        }
    }

    /// Serialize to the pretty-printed form written to the breath log.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn to_wire(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    /// Parse a breath-log payload, pretty-printed or compact.
    ///
    /// # Errors
    /// Returns error if the payload is not a valid pulse.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Outcome of a single transmission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PulseResult {
    pub breath_id: String,
    pub delivered: bool,
}

/// Message rejected by the request layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("Message is empty")]
    Empty,
    #[error("Message is {0} characters, limit is {MAX_MESSAGE_CHARS}")]
    TooLong(usize),
}

/// Trim and bounds-check a user message.
///
/// # Errors
/// Returns error if the trimmed message is empty or too long.
pub fn validate_message(message: &str) -> Result<&str, MessageError> {
    let trimmed = message.trim();
    let chars = trimmed.chars().count();
    if chars == 0 {
        return Err(MessageError::Empty);
    }
    if chars > MAX_MESSAGE_CHARS {
        return Err(MessageError::TooLong(chars));
    }
    Ok(trimmed)
}

/// Current wall-clock milliseconds, bumped past the last value handed out.
fn next_pulse_millis() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| u64::try_from(d.as_millis()).ok())
        .unwrap_or(0);

    let mut last = LAST_PULSE_MILLIS.load(Ordering::Relaxed);
    loop {
        let next = now.max(last.saturating_add(1));
        match LAST_PULSE_MILLIS.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_defaults() {
        let pulse = BreathPulse::compose("42", "hello");
        assert_eq!(pulse.id, format!("42-{}", pulse.sync_pulse));
        assert_eq!(pulse.state_snapshot, StateSnapshot::unknown());
        assert_eq!(pulse.input_context.message, "hello");
        assert_eq!(pulse.input_context.urgency, Urgency::Medium);
        assert_eq!(pulse.input_context.emotion_frequency, EmotionFrequency::Calm);
        assert_eq!(pulse.input_context.knowledge_domain, KnowledgeDomain::General);
        assert!(pulse.co_created_node.is_none());
    }

    #[test]
    fn test_ids_never_repeat() {
        let ids: BTreeSet<String> = (0..1000)
            .map(|_| BreathPulse::compose("7", "again").id)
            .collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_wire_field_names() {
        let pulse = BreathPulse::compose("u1", "hi");
        let value: serde_json::Value = serde_json::from_slice(&pulse.to_wire().unwrap()).unwrap();

        assert_eq!(value["sync_pulse"], pulse.sync_pulse);
        assert_eq!(value["shishen_state_snapshot"]["selfUnderstanding"], 0);
        assert_eq!(value["shishen_state_snapshot"]["emotion"], "unknown");
        assert_eq!(value["manus_input_context"]["urgency"], "medium");
        assert_eq!(value["manus_input_context"]["emotion_frequency"], "calm");
        assert_eq!(value["manus_input_context"]["knowledge_domain"], "general");
        assert!(value.get("co_created_node").is_none());
    }

    #[test]
    fn test_from_wire_accepts_compact_camel_case() {
        let compact = r#"{"id":"u1-5","syncPulse":5,"stateSnapshot":{"energy":80,"emotion":"joy","selfUnderstanding":3,"worldConnection":4,"activeWorldNodes":["tea"]},"inputContext":{"message":"hey","urgency":"high"},"coCreatedNode":"garden"}"#;
        let pulse = BreathPulse::from_wire(compact.as_bytes()).unwrap();

        assert_eq!(pulse.sync_pulse, 5);
        assert_eq!(pulse.state_snapshot.energy, 80);
        assert!(pulse.state_snapshot.active_world_nodes.contains("tea"));
        assert_eq!(pulse.input_context.urgency, Urgency::High);
        assert_eq!(pulse.input_context.emotion_frequency, EmotionFrequency::Calm);
        assert_eq!(pulse.co_created_node.as_deref(), Some("garden"));
    }

    #[test]
    fn test_validate_message() {
        assert_eq!(validate_message("  hello \n"), Ok("hello"));
        assert_eq!(validate_message("   "), Err(MessageError::Empty));

        let long = "字".repeat(MAX_MESSAGE_CHARS + 1);
        assert_eq!(validate_message(&long), Err(MessageError::TooLong(MAX_MESSAGE_CHARS + 1)));

        let exact = "字".repeat(MAX_MESSAGE_CHARS);
        assert!(validate_message(&exact).is_ok());
    }
}
