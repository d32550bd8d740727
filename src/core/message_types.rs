//! Wire frames exchanged over the client transport

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::message::{EventPayload, MessageEvent};
use crate::error::RelayError;

/// Client-to-server frames
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Present an identity claim on an already open connection
    #[serde(rename = "authenticate")]
    Authenticate { token: String },

    #[serde(rename = "join_conversation")]
    JoinConversation { conversation_id: String },

    #[serde(rename = "leave_conversation")]
    LeaveConversation { conversation_id: String },

    /// Send a text message
    #[serde(rename = "send_message")]
    SendMessage {
        conversation_id: String,
        content: String,
    },

    /// Send a voice message; the audio itself is uploaded elsewhere
    #[serde(rename = "send_voice_message")]
    SendVoiceMessage {
        conversation_id: String,
        audio_ref: String,
        duration_seconds: u32,
    },

    #[serde(rename = "set_typing")]
    SetTyping {
        conversation_id: String,
        is_typing: bool,
    },

    #[serde(rename = "mark_read")]
    MarkRead { conversation_id: String },

    #[serde(rename = "delete_message")]
    DeleteMessage { message_id: String },

    /// Drop the identity but keep the connection open
    #[serde(rename = "logout")]
    Logout,
}

/// Server-to-client frames
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Connection established
    #[serde(rename = "connected")]
    Connected {
        connection_id: String,
        authenticated: bool,
    },

    #[serde(rename = "authenticated")]
    Authenticated { participant_id: String },

    #[serde(rename = "logged_out")]
    LoggedOut,

    #[serde(rename = "joined")]
    Joined { conversation_id: String },

    #[serde(rename = "left")]
    Left { conversation_id: String },

    /// Conversation event fanned out by the router
    #[serde(rename = "event")]
    Event {
        conversation_id: String,
        actor_id: String,
        event: EventPayload,
        timestamp: DateTime<Utc>,
    },

    /// Error message, only ever sent to the connection that caused it
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl ServerMessage {
    pub fn event(event: &MessageEvent, timestamp: DateTime<Utc>) -> Self {
        ServerMessage::Event {
            conversation_id: event.conversation_id.clone(),
            actor_id: event.actor_id.clone(),
            event: event.payload.clone(),
            timestamp,
        }
    }

    pub fn error(err: &RelayError) -> Self {
        ServerMessage::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}
