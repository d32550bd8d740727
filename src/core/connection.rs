//! Client connection handles
//! Handles the outbound side of a live transport connection

use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::core::message_types::ServerMessage;

pub type ConnectionId = String;

/// Represents the outbound half of a single client connection.
///
/// Cloning is cheap; all clones feed the same writer task.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub sender: mpsc::UnboundedSender<ServerMessage>,
    pub connected_at: Instant,
}

impl Connection {
    /// Create a new connection with a unique ID
    pub fn new(sender: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), sender)
    }

    pub fn with_id(id: ConnectionId, sender: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            id,
            sender,
            connected_at: Instant::now(),
        }
    }

    /// Queue a frame for this connection.
    ///
    /// A closed connection is not an error for the caller; the miss is logged
    /// and `false` returned.
    pub fn send(&self, frame: ServerMessage) -> bool {
        match self.sender.send(frame) {
            Ok(_) => true,
            Err(_) => {
                log::debug!("Delivery miss: connection {} already closed", self.id);
                false
            }
        }
    }

    /// Calculate the connection duration
    pub fn connection_duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
