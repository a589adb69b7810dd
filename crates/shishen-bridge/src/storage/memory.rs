//! In-memory chat storage.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use shishen_core::{ChatMessage, ChatStore, StorageError};

/// In-memory storage implementation.
///
/// Useful for development and single-process deployments.
/// Data is lost on restart.
#[derive(Default)]
pub struct MemoryChatStore {
    rows: RwLock<HashMap<String, Vec<ChatMessage>>>,
}

impl MemoryChatStore {
    /// Create a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn append(&self, messages: Vec<ChatMessage>) -> Result<(), StorageError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?;

        for message in messages {
            rows.entry(message.user_id.clone()).or_default().push(message);
        }

        Ok(())
    }

    async fn history(&self, user_id: &str, limit: usize) -> Result<Vec<ChatMessage>, StorageError> {
        let rows = self
            .rows
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?;

        let Some(user_rows) = rows.get(user_id) else {
            return Ok(Vec::new());
        };
        let start = user_rows.len().saturating_sub(limit);
        Ok(user_rows[start..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shishen_core::MessageRole;

    #[tokio::test]
    async fn test_history_is_per_user_and_bounded() {
        let store = MemoryChatStore::new();
        for i in 0..5 {
            tokio_test::assert_ok!(
                store
                    .append(vec![ChatMessage::new("42", MessageRole::User, format!("msg {i}"))])
                    .await
            );
        }
        tokio_test::assert_ok!(
            store
                .append(vec![ChatMessage::new("7", MessageRole::User, "other")])
                .await
        );

        let history = store.history("42", 3).await.unwrap();
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["msg 2", "msg 3", "msg 4"]);

        assert_eq!(store.history("7", 50).await.unwrap().len(), 1);
        assert!(store.history("nobody", 50).await.unwrap().is_empty());
    }
}
