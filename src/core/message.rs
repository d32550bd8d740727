use serde::{Deserialize, Serialize};

use crate::core::callbacks::EventCategory;

pub type ConversationId = String;
pub type ParticipantId = String;

/// What happened in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    TextSent {
        message_id: String,
        content: String,
    },
    VoiceSent {
        message_id: String,
        audio_ref: String,
        duration_seconds: u32,
    },
    TypingChanged {
        is_typing: bool,
    },
    MessageDeleted {
        message_id: String,
    },
    ReadReceipt {
        reader_id: String,
    },
}

/// A transient event routed to a conversation's subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub conversation_id: ConversationId,
    pub actor_id: ParticipantId,
    pub payload: EventPayload,
}

impl MessageEvent {
    pub fn new(conversation_id: impl Into<String>, actor_id: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            actor_id: actor_id.into(),
            payload,
        }
    }

    pub fn text(
        conversation_id: impl Into<String>,
        actor_id: impl Into<String>,
        message_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(
            conversation_id,
            actor_id,
            EventPayload::TextSent {
                message_id: message_id.into(),
                content: content.into(),
            },
        )
    }

    pub fn voice(
        conversation_id: impl Into<String>,
        actor_id: impl Into<String>,
        message_id: impl Into<String>,
        audio_ref: impl Into<String>,
        duration_seconds: u32,
    ) -> Self {
        Self::new(
            conversation_id,
            actor_id,
            EventPayload::VoiceSent {
                message_id: message_id.into(),
                audio_ref: audio_ref.into(),
                duration_seconds,
            },
        )
    }

    pub fn typing(conversation_id: impl Into<String>, actor_id: impl Into<String>, is_typing: bool) -> Self {
        Self::new(conversation_id, actor_id, EventPayload::TypingChanged { is_typing })
    }

    pub fn deleted(
        conversation_id: impl Into<String>,
        actor_id: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Self {
        Self::new(
            conversation_id,
            actor_id,
            EventPayload::MessageDeleted {
                message_id: message_id.into(),
            },
        )
    }

    pub fn read(conversation_id: impl Into<String>, reader_id: impl Into<String>) -> Self {
        let reader_id = reader_id.into();
        Self::new(
            conversation_id,
            reader_id.clone(),
            EventPayload::ReadReceipt { reader_id },
        )
    }

    /// Events the actor should not receive back
    pub fn suppresses_echo(&self) -> bool {
        matches!(
            self.payload,
            EventPayload::TypingChanged { .. } | EventPayload::ReadReceipt { .. }
        )
    }

    /// Local handler category, if the event has one
    pub fn category(&self) -> Option<EventCategory> {
        match self.payload {
            EventPayload::TextSent { .. } => Some(EventCategory::NewMessage),
            EventPayload::VoiceSent { .. } => Some(EventCategory::NewVoiceMessage),
            EventPayload::TypingChanged { .. } => Some(EventCategory::Typing),
            EventPayload::MessageDeleted { .. } => Some(EventCategory::Deletion),
            EventPayload::ReadReceipt { .. } => None,
        }
    }
}
