//! Persistence interface consumed by the relay
//!
//! The relay never owns message history. It hands validated input to a
//! `MessagePersistence` implementation and routes whatever that returns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Body of a stored message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: String },
    Voice { audio_ref: String, duration_seconds: u32 },
}

/// A message as recorded by the persistence collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: MessageContent,
    pub timestamp: DateTime<Utc>,
}

/// Read position of a participant in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadMarker {
    pub conversation_id: String,
    pub reader_id: String,
    /// Newest message covered by the marker, if the conversation has any
    pub last_message_id: Option<String>,
    pub read_at: DateTime<Utc>,
}

#[async_trait]
pub trait MessagePersistence: Send + Sync {
    /// Store a new message and return the stored record
    async fn store_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        content: MessageContent,
    ) -> Result<StoredMessage>;

    async fn get_message(&self, message_id: &str) -> Result<Option<StoredMessage>>;

    /// Newest `limit` messages of a conversation, oldest first
    async fn get_conversation_messages(&self, conversation_id: &str, limit: usize) -> Result<Vec<StoredMessage>>;

    /// Delete a message on behalf of `requested_by`.
    ///
    /// Returns the removed record; fails with `NotFound` for unknown ids and
    /// `Forbidden` when the requester is not the author.
    async fn delete_message(&self, message_id: &str, requested_by: &str) -> Result<StoredMessage>;

    /// Move the reader's marker to the newest message of the conversation
    async fn mark_read(&self, conversation_id: &str, reader_id: &str) -> Result<ReadMarker>;
}
