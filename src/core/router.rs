//! Per-conversation fan-out of message events
//!
//! Events published for one conversation are delivered to every subscriber
//! in publish order. Delivery is at-most-once: a subscriber whose connection
//! is gone simply misses the event.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::core::callbacks::CallbackDispatch;
use crate::core::key_lock::KeyedLocks;
use crate::core::message::{EventPayload, MessageEvent};
use crate::core::message_types::ServerMessage;
use crate::core::rate_limiter::RateLimiter;
use crate::core::registry::ConnectionRegistry;
use crate::storage::{MessageContent, StoredMessage};

/// What happened to a single published event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    /// Frames queued on live connections
    pub delivered: usize,
    /// Subscribers without a live connection, or whose connection closed mid-send
    pub missed: usize,
    /// The conversation's local handler ran
    pub handled_locally: bool,
    /// Dropped by the typing throttle before fan-out
    pub throttled: bool,
}

pub struct MessageRouter {
    registry: Arc<ConnectionRegistry>,
    callbacks: Arc<CallbackDispatch>,
    limiter: Arc<RateLimiter>,
    typing_limit: u32,
    typing_window: Duration,
    ordering: KeyedLocks,
}

impl MessageRouter {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        callbacks: Arc<CallbackDispatch>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        let typing_limit = limiter.defaults().typing_limit;
        let typing_window = limiter.defaults().typing_window;
        Self {
            registry,
            callbacks,
            limiter,
            typing_limit,
            typing_window,
            ordering: KeyedLocks::new(),
        }
    }

    /// Route one event to the conversation's subscribers and local handler
    pub async fn publish(&self, event: MessageEvent) -> DeliveryReport {
        if let EventPayload::TypingChanged { .. } = event.payload {
            let identifier = format!("typing:{}:{}", event.actor_id, event.conversation_id);
            let decision = self
                .limiter
                .check_rate_limit(&identifier, self.typing_limit, self.typing_window)
                .await;
            if !decision.allowed {
                log::debug!(
                    "Dropping typing update from {} in {}: throttled",
                    event.actor_id,
                    event.conversation_id
                );
                return DeliveryReport {
                    throttled: true,
                    ..DeliveryReport::default()
                };
            }
        }

        // Held across the whole fan-out; nothing below awaits
        let _order = self.ordering.lock(&event.conversation_id).await;
        self.fan_out(&event)
    }

    fn fan_out(&self, event: &MessageEvent) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let subscribers = self.registry.subscribers_of(&event.conversation_id);
        if subscribers.is_empty() {
            log::debug!("No subscribers for conversation {}", event.conversation_id);
        }

        let frame = ServerMessage::event(event, Utc::now());
        let skip_actor = event.suppresses_echo();

        for participant_id in subscribers {
            if skip_actor && participant_id == event.actor_id {
                continue;
            }

            match self.registry.connection_of(&participant_id) {
                Some(connection) if connection.send(frame.clone()) => report.delivered += 1,
                Some(_) => report.missed += 1,
                None => {
                    log::debug!(
                        "Delivery miss: {} has no live connection for {}",
                        participant_id,
                        event.conversation_id
                    );
                    report.missed += 1;
                }
            }
        }

        if let Some(category) = event.category() {
            if let Some(handler) = self.callbacks.handler_for(&event.conversation_id, category) {
                handler(event);
                report.handled_locally = true;
            }
        }

        log::trace!(
            "Published {:?} in {}: {} delivered, {} missed",
            event.category(),
            event.conversation_id,
            report.delivered,
            report.missed
        );
        report
    }

    /// Fan out a freshly stored message, text or voice
    pub async fn notify_message(&self, message: &StoredMessage) -> DeliveryReport {
        let event = match &message.content {
            MessageContent::Text { text } => {
                MessageEvent::text(&message.conversation_id, &message.sender_id, &message.id, text)
            }
            MessageContent::Voice {
                audio_ref,
                duration_seconds,
            } => MessageEvent::voice(
                &message.conversation_id,
                &message.sender_id,
                &message.id,
                audio_ref,
                *duration_seconds,
            ),
        };
        self.publish(event).await
    }

    pub async fn notify_voice_message(&self, message: &StoredMessage) -> DeliveryReport {
        self.notify_message(message).await
    }

    pub async fn notify_typing(&self, conversation_id: &str, actor_id: &str, is_typing: bool) -> DeliveryReport {
        self.publish(MessageEvent::typing(conversation_id, actor_id, is_typing))
            .await
    }

    pub async fn notify_deleted(&self, conversation_id: &str, message_id: &str, deleted_by: &str) -> DeliveryReport {
        self.publish(MessageEvent::deleted(conversation_id, deleted_by, message_id))
            .await
    }

    pub async fn notify_read(&self, conversation_id: &str, reader_id: &str) -> DeliveryReport {
        self.publish(MessageEvent::read(conversation_id, reader_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheLayer, MemoryStore, TtlPolicy};
    use crate::config::RateLimitConfig;
    use crate::core::callbacks::EventCategory;
    use crate::core::clock::system_clock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    fn router() -> (MessageRouter, Arc<ConnectionRegistry>, Arc<CallbackDispatch>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let callbacks = Arc::new(CallbackDispatch::new());
        let cache = Arc::new(CacheLayer::new(Arc::new(MemoryStore::new(100)), TtlPolicy::default(), ""));
        let limiter = Arc::new(RateLimiter::new(cache, system_clock(), RateLimitConfig::default()));
        (
            MessageRouter::new(registry.clone(), callbacks.clone(), limiter),
            registry,
            callbacks,
        )
    }

    #[tokio::test]
    async fn test_local_handler_runs_once_per_publish() {
        let (router, registry, callbacks) = router();
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = registry.register(tx);
        registry.authenticate(&conn.id, "alice").unwrap();
        registry.join("c1", "alice").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        callbacks.register("c1", EventCategory::NewMessage, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let report = router.publish(MessageEvent::text("c1", "bob", "m1", "hi")).await;
        assert_eq!(report.delivered, 1);
        assert!(report.handled_locally);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Read receipts have no local category
        let report = router.publish(MessageEvent::read("c1", "bob")).await;
        assert!(!report.handled_locally);
    }

    #[tokio::test]
    async fn test_unknown_conversation_is_a_quiet_no_op() {
        let (router, _registry, _callbacks) = router();
        let report = router.publish(MessageEvent::text("nowhere", "bob", "m1", "hi")).await;
        assert_eq!(report, DeliveryReport::default());
    }
}
