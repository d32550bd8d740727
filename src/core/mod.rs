//! Core functionality for the relay: connections, conversations and delivery

pub mod callbacks;
pub mod clock;
pub mod connection;
pub mod key_lock;
pub mod message;
pub mod message_types;
pub mod rate_limiter;
pub mod registry;
pub mod router;
pub mod server;

// Re-export main components for convenience
pub use callbacks::{CallbackDispatch, EventCategory, LocalHandler};
pub use clock::{system_clock, Clock, ManualClock, SharedClock, SystemClock};
pub use connection::{Connection, ConnectionId};
pub use message::{ConversationId, EventPayload, MessageEvent, ParticipantId};
pub use message_types::{ClientMessage, ServerMessage};
pub use rate_limiter::{RateLimitDecision, RateLimiter};
pub use registry::{AuthOutcome, ConnectionRegistry, ConnectionState};
pub use router::{DeliveryReport, MessageRouter};
pub use server::{ServerManager, SharedServerManager};
