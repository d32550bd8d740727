//! In-memory persistence for development and testing
//!
//! Keeps all data in process memory. Suitable for development, tests or a
//! single-node deployment that can afford to lose history on restart.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::traits::*;
use crate::error::{RelayError, Result};

#[derive(Default)]
struct Inner {
    messages: HashMap<String, StoredMessage>,
    conversation_messages: HashMap<String, Vec<String>>, // conversation_id -> message ids, oldest first
    read_markers: HashMap<(String, String), ReadMarker>,
}

#[derive(Default)]
pub struct MemoryMessageStore {
    inner: RwLock<Inner>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn message_count(&self) -> usize {
        self.inner.read().await.messages.len()
    }

    pub async fn read_marker(&self, conversation_id: &str, reader_id: &str) -> Option<ReadMarker> {
        self.inner
            .read()
            .await
            .read_markers
            .get(&(conversation_id.to_string(), reader_id.to_string()))
            .cloned()
    }
}

#[async_trait]
impl MessagePersistence for MemoryMessageStore {
    async fn store_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        content: MessageContent,
    ) -> Result<StoredMessage> {
        let message = StoredMessage {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            content,
            timestamp: Utc::now(),
        };

        let mut inner = self.inner.write().await;
        inner.messages.insert(message.id.clone(), message.clone());
        inner
            .conversation_messages
            .entry(message.conversation_id.clone())
            .or_default()
            .push(message.id.clone());

        Ok(message)
    }

    async fn get_message(&self, message_id: &str) -> Result<Option<StoredMessage>> {
        Ok(self.inner.read().await.messages.get(message_id).cloned())
    }

    async fn get_conversation_messages(&self, conversation_id: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        let inner = self.inner.read().await;
        let Some(ids) = inner.conversation_messages.get(conversation_id) else {
            return Ok(Vec::new());
        };

        let start = ids.len().saturating_sub(limit);
        Ok(ids[start..]
            .iter()
            .filter_map(|id| inner.messages.get(id))
            .cloned()
            .collect())
    }

    async fn delete_message(&self, message_id: &str, requested_by: &str) -> Result<StoredMessage> {
        let mut inner = self.inner.write().await;

        match inner.messages.get(message_id) {
            None => return Err(RelayError::NotFound(format!("message {}", message_id))),
            Some(message) if message.sender_id != requested_by => return Err(RelayError::Forbidden),
            Some(_) => {}
        }

        let message = inner
            .messages
            .remove(message_id)
            .ok_or_else(|| RelayError::NotFound(format!("message {}", message_id)))?;
        if let Some(ids) = inner.conversation_messages.get_mut(&message.conversation_id) {
            ids.retain(|id| id != message_id);
        }

        Ok(message)
    }

    async fn mark_read(&self, conversation_id: &str, reader_id: &str) -> Result<ReadMarker> {
        let mut inner = self.inner.write().await;
        let last_message_id = inner
            .conversation_messages
            .get(conversation_id)
            .and_then(|ids| ids.last().cloned());

        let marker = ReadMarker {
            conversation_id: conversation_id.to_string(),
            reader_id: reader_id.to_string(),
            last_message_id,
            read_at: Utc::now(),
        };
        inner.read_markers.insert(
            (conversation_id.to_string(), reader_id.to_string()),
            marker.clone(),
        );

        Ok(marker)
    }
}
