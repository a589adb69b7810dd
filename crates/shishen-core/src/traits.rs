//! Core traits for the remote transport and chat persistence.

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Program not found: {0}")]
    ProgramNotFound(String),
    #[error("Connection to {host} failed: {message}")]
    Connection { host: String, message: String },
    #[error("Remote command {program} failed (exit {code:?}): {stderr}")]
    Remote {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid remote path: {0}")]
    InvalidPath(String),
}

/// Capability set over the authenticated remote host.
///
/// The only abstraction that knows about hosts and credentials. Nothing
/// here retries; callers own retry policy.
#[async_trait]
pub trait RemoteChannel: Send + Sync {
    /// Copy `payload` to `path` on the remote host, replacing it.
    async fn deliver(&self, path: &str, payload: &[u8]) -> Result<(), TransportError>;

    /// Last non-empty line of a remote file, trimmed; empty if there is none.
    async fn tail_latest(&self, path: &str) -> Result<String, TransportError>;

    /// Full contents of a remote file.
    async fn fetch_file(&self, path: &str) -> Result<Bytes, TransportError>;

    /// Last `lines` non-empty lines of a remote file, oldest first.
    async fn tail_recent(&self, path: &str, lines: usize) -> Result<Vec<String>, TransportError> {
        let contents = self.fetch_file(path).await?;
        Ok(last_lines(&contents, lines))
    }
}

#[async_trait]
impl<T: RemoteChannel + ?Sized> RemoteChannel for Arc<T> {
    async fn deliver(&self, path: &str, payload: &[u8]) -> Result<(), TransportError> {
        (**self).deliver(path, payload).await
    }

    async fn tail_latest(&self, path: &str) -> Result<String, TransportError> {
        (**self).tail_latest(path).await
    }

    async fn fetch_file(&self, path: &str) -> Result<Bytes, TransportError> {
        (**self).fetch_file(path).await
    }

    async fn tail_recent(&self, path: &str, lines: usize) -> Result<Vec<String>, TransportError> {
        (**self).tail_recent(path, lines).await
    }
}

/// Split `contents` into lines and keep the last `count` non-empty ones.
#[must_use]
pub fn last_lines(contents: &[u8], count: usize) -> Vec<String> {
    let text = String::from_utf8_lossy(contents);
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].iter().map(|l| (*l).to_string()).collect()
}

/// Author of a chat row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// The human side.
    User,
    /// The remote agent.
    Agent,
}

/// Persisted chat row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub user_id: String,
    pub role: MessageRole,
    pub content: String,
    pub metadata: Option<Value>,
    /// Creation timestamp (Unix epoch seconds).
    pub created_at: i64,
}

impl ChatMessage {
    /// Create a row stamped with the current time.
    #[must_use]
    pub fn new(user_id: impl Into<String>, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            role,
            content: content.into(),
            metadata: None,
            created_at: now(),
        }
    }

    /// Attach metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| i64::try_from(d.as_secs()).ok())
        .unwrap_or(0)
}

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Persistence collaborator for chat history.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Append rows in order.
    async fn append(&self, messages: Vec<ChatMessage>) -> Result<(), StorageError>;

    /// Most recent `limit` rows for a user, oldest first.
    async fn history(&self, user_id: &str, limit: usize) -> Result<Vec<ChatMessage>, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_lines_skips_blank_and_keeps_order() {
        let log = b"{\"breathId\":\"a\"}\n\nsecond\r\n  third  \n\n";
        assert_eq!(last_lines(log, 2), vec!["second", "third"]);
        assert_eq!(last_lines(log, 10).len(), 3);
        assert!(last_lines(b"", 3).is_empty());
        assert!(last_lines(log, 0).is_empty());
    }

    #[test]
    fn test_chat_message_serialization() {
        let msg = ChatMessage::new("42", MessageRole::Agent, "hi there")
            .with_metadata(serde_json::json!({ "breathId": "42-1" }));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "agent");
        assert_eq!(json["userId"], "42");
        assert_eq!(json["metadata"]["breathId"], "42-1");
        assert!(json["createdAt"].as_i64().unwrap() > 0);
    }
}
