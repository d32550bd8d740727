//! Persistence collaborator interface and the in-memory implementation

pub mod memory;
pub mod traits;

pub use memory::MemoryMessageStore;
pub use traits::{MessageContent, MessagePersistence, ReadMarker, StoredMessage};
