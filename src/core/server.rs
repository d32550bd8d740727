//! Integrated server service that coordinates connections, conversations and delivery

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::auth::IdentityVerifier;
use crate::cache::CacheLayer;
use crate::config::RateLimitConfig;
use crate::constants::{MAX_FRAME_SIZE, MAX_MESSAGE_LENGTH, MAX_VOICE_DURATION_SECS};
use crate::core::callbacks::{CallbackDispatch, EventCategory};
use crate::core::clock::{system_clock, SharedClock};
use crate::core::connection::Connection;
use crate::core::message::{MessageEvent, ParticipantId};
use crate::core::message_types::{ClientMessage, ServerMessage};
use crate::core::rate_limiter::RateLimiter;
use crate::core::registry::{AuthOutcome, ConnectionRegistry};
use crate::core::router::{DeliveryReport, MessageRouter};
use crate::error::{RelayError, Result};
use crate::storage::{MessageContent, MessagePersistence, StoredMessage};

/// Integrated server service: validates client operations, hands them to the
/// persistence collaborator and fans the results out.
pub struct ServerManager {
    registry: Arc<ConnectionRegistry>,
    callbacks: Arc<CallbackDispatch>,
    limiter: Arc<RateLimiter>,
    router: MessageRouter,
    cache: Arc<CacheLayer>,
    persistence: Arc<dyn MessagePersistence>,
    identity: Arc<dyn IdentityVerifier>,
}

impl ServerManager {
    /// Create a new server manager
    pub fn new(
        cache: Arc<CacheLayer>,
        persistence: Arc<dyn MessagePersistence>,
        identity: Arc<dyn IdentityVerifier>,
        rate_limits: RateLimitConfig,
    ) -> Self {
        Self::with_clock(cache, persistence, identity, rate_limits, system_clock())
    }

    /// Create with an explicit time source for rate windows
    pub fn with_clock(
        cache: Arc<CacheLayer>,
        persistence: Arc<dyn MessagePersistence>,
        identity: Arc<dyn IdentityVerifier>,
        rate_limits: RateLimitConfig,
        clock: SharedClock,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let callbacks = Arc::new(CallbackDispatch::new());
        let limiter = Arc::new(RateLimiter::new(cache.clone(), clock, rate_limits));
        let router = MessageRouter::new(registry.clone(), callbacks.clone(), limiter.clone());

        Self {
            registry,
            callbacks,
            limiter,
            router,
            cache,
            persistence,
            identity,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn callbacks(&self) -> &Arc<CallbackDispatch> {
        &self.callbacks
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn cache(&self) -> &Arc<CacheLayer> {
        &self.cache
    }

    /// Register a freshly accepted, anonymous connection
    pub fn connect(&self, sender: mpsc::UnboundedSender<ServerMessage>) -> Connection {
        self.registry.register(sender)
    }

    /// Verify an identity claim and bind the connection to it
    pub async fn authenticate(&self, connection_id: &str, token: &str) -> Result<ParticipantId> {
        let participant_id = self.identity.verify(token).await?;

        if let AuthOutcome::Attached {
            previous_identity, ..
        } = self.registry.authenticate(connection_id, &participant_id)?
        {
            if let Some(previous) = previous_identity {
                self.callbacks.release_owner(&previous);
            }
            log::info!("Connection {} authenticated as {}", connection_id, participant_id);
        }
        Ok(participant_id)
    }

    /// Install a local handler on behalf of the connection's participant.
    /// It is released when that participant logs out or disconnects.
    pub fn register_handler<F>(
        &self,
        connection_id: &str,
        conversation_id: &str,
        category: EventCategory,
        handler: F,
    ) -> Result<bool>
    where
        F: Fn(&MessageEvent) + Send + Sync + 'static,
    {
        let participant_id = self.registry.participant_of(connection_id)?;
        validate_id("conversation_id", conversation_id)?;
        Ok(self
            .callbacks
            .register_for(&participant_id, conversation_id, category, handler))
    }

    pub async fn join_conversation(&self, connection_id: &str, conversation_id: &str) -> Result<()> {
        let participant_id = self.registry.participant_of(connection_id)?;
        validate_id("conversation_id", conversation_id)?;
        self.registry.join(conversation_id, &participant_id)?;
        Ok(())
    }

    pub async fn leave_conversation(&self, connection_id: &str, conversation_id: &str) -> Result<()> {
        let participant_id = self.registry.participant_of(connection_id)?;
        self.registry.leave(conversation_id, &participant_id);
        Ok(())
    }

    pub async fn send_message(&self, connection_id: &str, conversation_id: &str, content: &str) -> Result<StoredMessage> {
        let participant_id = self.registry.participant_of(connection_id)?;
        validate_id("conversation_id", conversation_id)?;
        let text = validate_text(content)?;

        let message = self
            .persistence
            .store_message(conversation_id, &participant_id, MessageContent::Text { text })
            .await?;
        self.router.notify_message(&message).await;
        Ok(message)
    }

    pub async fn send_voice_message(
        &self,
        connection_id: &str,
        conversation_id: &str,
        audio_ref: &str,
        duration_seconds: u32,
    ) -> Result<StoredMessage> {
        let participant_id = self.registry.participant_of(connection_id)?;
        validate_id("conversation_id", conversation_id)?;
        validate_voice(audio_ref, duration_seconds)?;

        let message = self
            .persistence
            .store_message(
                conversation_id,
                &participant_id,
                MessageContent::Voice {
                    audio_ref: audio_ref.trim().to_string(),
                    duration_seconds,
                },
            )
            .await?;
        self.router.notify_voice_message(&message).await;
        Ok(message)
    }

    /// Typing state is transient; it is never persisted
    pub async fn set_typing(&self, connection_id: &str, conversation_id: &str, is_typing: bool) -> Result<DeliveryReport> {
        let participant_id = self.registry.participant_of(connection_id)?;
        validate_id("conversation_id", conversation_id)?;
        Ok(self
            .router
            .notify_typing(conversation_id, &participant_id, is_typing)
            .await)
    }

    pub async fn mark_read(&self, connection_id: &str, conversation_id: &str) -> Result<()> {
        let participant_id = self.registry.participant_of(connection_id)?;
        validate_id("conversation_id", conversation_id)?;

        self.persistence.mark_read(conversation_id, &participant_id).await?;
        self.router.notify_read(conversation_id, &participant_id).await;
        Ok(())
    }

    pub async fn delete_message(&self, connection_id: &str, message_id: &str) -> Result<()> {
        let participant_id = self.registry.participant_of(connection_id)?;
        validate_id("message_id", message_id)?;

        let removed = self.persistence.delete_message(message_id, &participant_id).await?;
        self.router
            .notify_deleted(&removed.conversation_id, &removed.id, &participant_id)
            .await;
        Ok(())
    }

    /// Drop the connection's identity; the transport stays open
    pub fn logout(&self, connection_id: &str) -> Result<()> {
        let participant_id = self.registry.participant_of(connection_id).ok();
        let left = self.registry.logout(connection_id)?;
        if let Some(participant_id) = participant_id {
            self.callbacks.release_owner(&participant_id);
        }
        log::info!("Connection {} logged out, left {} conversations", connection_id, left.len());
        Ok(())
    }

    /// Remove a closed connection from every conversation, synchronously
    pub fn disconnect(&self, connection_id: &str) {
        if let Some((participant_id, left)) = self.registry.disconnect(connection_id) {
            let released = self.callbacks.release_owner(&participant_id);
            log::info!(
                "Participant {} disconnected, left {} conversations, released {} handlers",
                participant_id,
                left.len(),
                released
            );
        }
    }

    /// Parse one inbound text frame and run it.
    ///
    /// Returns the acknowledgement frame for the sender, if the operation has one.
    pub async fn handle_client_frame(&self, connection_id: &str, raw: &str) -> Result<Option<ServerMessage>> {
        if raw.len() > MAX_FRAME_SIZE {
            return Err(RelayError::MessageTooLarge(raw.len()));
        }
        let frame: ClientMessage = serde_json::from_str(raw)?;
        log::trace!("Frame from {}: {:?}", connection_id, frame);

        match frame {
            ClientMessage::Authenticate { token } => {
                let participant_id = self.authenticate(connection_id, &token).await?;
                Ok(Some(ServerMessage::Authenticated { participant_id }))
            }
            ClientMessage::JoinConversation { conversation_id } => {
                self.join_conversation(connection_id, &conversation_id).await?;
                Ok(Some(ServerMessage::Joined { conversation_id }))
            }
            ClientMessage::LeaveConversation { conversation_id } => {
                self.leave_conversation(connection_id, &conversation_id).await?;
                Ok(Some(ServerMessage::Left { conversation_id }))
            }
            ClientMessage::SendMessage {
                conversation_id,
                content,
            } => {
                self.send_message(connection_id, &conversation_id, &content).await?;
                Ok(None)
            }
            ClientMessage::SendVoiceMessage {
                conversation_id,
                audio_ref,
                duration_seconds,
            } => {
                self.send_voice_message(connection_id, &conversation_id, &audio_ref, duration_seconds)
                    .await?;
                Ok(None)
            }
            ClientMessage::SetTyping {
                conversation_id,
                is_typing,
            } => {
                self.set_typing(connection_id, &conversation_id, is_typing).await?;
                Ok(None)
            }
            ClientMessage::MarkRead { conversation_id } => {
                self.mark_read(connection_id, &conversation_id).await?;
                Ok(None)
            }
            ClientMessage::DeleteMessage { message_id } => {
                self.delete_message(connection_id, &message_id).await?;
                Ok(None)
            }
            ClientMessage::Logout => {
                self.logout(connection_id)?;
                Ok(Some(ServerMessage::LoggedOut))
            }
        }
    }

    /// Get connection count
    pub fn connection_count(&self) -> usize {
        self.registry.connection_count()
    }

    /// Release every connection. Cached state is left as is.
    pub fn shutdown(&self) {
        let closed = self.registry.clear();
        log::info!("Released {} connections", closed.len());
    }
}

fn validate_id(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RelayError::ValidationError(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn validate_text(content: &str) -> Result<String> {
    let text = content.trim();
    if text.is_empty() {
        return Err(RelayError::ValidationError("message must not be empty".to_string()));
    }
    if text.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(RelayError::ValidationError(format!(
            "message exceeds {} characters",
            MAX_MESSAGE_LENGTH
        )));
    }
    Ok(text.to_string())
}

fn validate_voice(audio_ref: &str, duration_seconds: u32) -> Result<()> {
    if audio_ref.trim().is_empty() {
        return Err(RelayError::ValidationError("audio reference must not be empty".to_string()));
    }
    if duration_seconds == 0 || duration_seconds > MAX_VOICE_DURATION_SECS {
        return Err(RelayError::ValidationError(format!(
            "voice message duration must be between 1 and {} seconds",
            MAX_VOICE_DURATION_SECS
        )));
    }
    Ok(())
}

// Shared reference to server manager
pub type SharedServerManager = Arc<ServerManager>;
