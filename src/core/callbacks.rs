//! In-process reactions to conversation events
//!
//! At most one handler exists per (conversation, category); registering again
//! replaces the previous handler. A handler registered on behalf of a
//! participant is released when that participant goes away; other handlers
//! stay until unregistered. Handlers run synchronously on the publishing task
//! and must not publish into the same conversation.

use dashmap::DashMap;
use std::sync::Arc;

use crate::core::message::{ConversationId, MessageEvent, ParticipantId};

/// Event kinds a local handler can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    NewMessage,
    NewVoiceMessage,
    Typing,
    Deletion,
}

pub type LocalHandler = Arc<dyn Fn(&MessageEvent) + Send + Sync>;

struct Registration {
    owner: Option<ParticipantId>,
    handler: LocalHandler,
}

#[derive(Default)]
pub struct CallbackDispatch {
    handlers: DashMap<(ConversationId, EventCategory), Registration>,
}

impl CallbackDispatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a handler that lives until unregistered; returns `true` if it
    /// replaced an existing one
    pub fn register<F>(&self, conversation_id: &str, category: EventCategory, handler: F) -> bool
    where
        F: Fn(&MessageEvent) + Send + Sync + 'static,
    {
        self.install(None, conversation_id, category, Arc::new(handler))
    }

    /// Install a handler owned by a participant; it is dropped by
    /// [`release_owner`](Self::release_owner) unless replaced first
    pub fn register_for<F>(&self, owner: &str, conversation_id: &str, category: EventCategory, handler: F) -> bool
    where
        F: Fn(&MessageEvent) + Send + Sync + 'static,
    {
        self.install(Some(owner.to_string()), conversation_id, category, Arc::new(handler))
    }

    fn install(
        &self,
        owner: Option<ParticipantId>,
        conversation_id: &str,
        category: EventCategory,
        handler: LocalHandler,
    ) -> bool {
        let replaced = self
            .handlers
            .insert(
                (conversation_id.to_string(), category),
                Registration {
                    owner: owner.clone(),
                    handler,
                },
            )
            .is_some();
        log::debug!(
            "Registered {:?} handler for conversation {} (owner: {:?}, replaced: {})",
            category,
            conversation_id,
            owner,
            replaced
        );
        replaced
    }

    pub fn unregister(&self, conversation_id: &str, category: EventCategory) -> bool {
        self.handlers
            .remove(&(conversation_id.to_string(), category))
            .is_some()
    }

    pub fn handler_for(&self, conversation_id: &str, category: EventCategory) -> Option<LocalHandler> {
        self.handlers
            .get(&(conversation_id.to_string(), category))
            .map(|r| r.handler.clone())
    }

    /// Drop every handler registered on behalf of `owner`
    pub fn release_owner(&self, owner: &str) -> usize {
        let before = self.handlers.len();
        self.handlers
            .retain(|_, registration| registration.owner.as_deref() != Some(owner));
        before.saturating_sub(self.handlers.len())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
