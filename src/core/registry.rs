//! Live connection, identity and conversation membership tracking
//!
//! Three maps are kept consistent with each other:
//! - connections: every open connection and whether it carries an identity
//! - participants: the live connection of each authenticated participant
//! - rooms: the subscriber set of each conversation
//!
//! A participant never appears in a room set unless it also has a live
//! connection. Removal of a participant happens before its room sets are
//! cleaned, so a concurrent fan-out may see a stale member but never reaches
//! a connection that is no longer registered.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use crate::core::connection::{Connection, ConnectionId};
use crate::core::message::{ConversationId, ParticipantId};
use crate::core::message_types::ServerMessage;
use crate::error::{RelayError, Result};

/// Identity state of a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Anonymous,
    Authenticated(ParticipantId),
}

/// Result of attaching an identity to a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Connection already carried this identity
    Unchanged,
    /// Identity attached, with whatever the connection or participant lost
    Attached {
        previous_identity: Option<ParticipantId>,
        left_conversations: Vec<ConversationId>,
        /// Older connection of the same participant that was demoted
        superseded_connection: Option<ConnectionId>,
    },
}

struct ConnectionEntry {
    connection: Connection,
    state: ConnectionState,
}

struct ParticipantEntry {
    connection: Connection,
    rooms: HashSet<ConversationId>,
}

#[derive(Default)]
struct RoomMembers {
    members: HashSet<ParticipantId>,
    /// Set once the room has been emptied and detached from the map
    retired: bool,
}

type RoomHandle = Arc<Mutex<RoomMembers>>;

fn lock_room(room: &RoomHandle) -> MutexGuard<'_, RoomMembers> {
    room.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ConnectionEntry>,
    participants: DashMap<ParticipantId, ParticipantEntry>,
    rooms: DashMap<ConversationId, RoomHandle>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly accepted, not yet authenticated connection
    pub fn register(&self, sender: mpsc::UnboundedSender<ServerMessage>) -> Connection {
        let connection = Connection::new(sender);
        self.connections.insert(
            connection.id.clone(),
            ConnectionEntry {
                connection: connection.clone(),
                state: ConnectionState::Anonymous,
            },
        );
        log::debug!("Registered connection {}", connection.id);
        connection
    }

    pub fn state_of(&self, connection_id: &str) -> Option<ConnectionState> {
        self.connections.get(connection_id).map(|entry| entry.state.clone())
    }

    /// Participant bound to a connection, or `Unauthorized`
    pub fn participant_of(&self, connection_id: &str) -> Result<ParticipantId> {
        match self.state_of(connection_id) {
            Some(ConnectionState::Authenticated(participant_id)) => Ok(participant_id),
            Some(ConnectionState::Anonymous) => Err(RelayError::Unauthorized),
            None => Err(RelayError::ConnectionNotFound(connection_id.to_string())),
        }
    }

    /// Attach an identity to a connection.
    ///
    /// Re-authenticating with the same identity is a no-op. A different
    /// identity drops every membership of the previous one. If the participant
    /// is already live on another connection, the newer connection takes over
    /// and the older one goes back to anonymous.
    pub fn authenticate(&self, connection_id: &str, participant_id: &str) -> Result<AuthOutcome> {
        let (connection, previous) = {
            let entry = self
                .connections
                .get(connection_id)
                .ok_or_else(|| RelayError::ConnectionNotFound(connection_id.to_string()))?;
            match &entry.state {
                ConnectionState::Authenticated(current) if current == participant_id => {
                    return Ok(AuthOutcome::Unchanged);
                }
                ConnectionState::Authenticated(current) => (entry.connection.clone(), Some(current.clone())),
                ConnectionState::Anonymous => (entry.connection.clone(), None),
            }
        };

        let left_conversations = match &previous {
            Some(previous_id) => self.detach_participant(previous_id, connection_id),
            None => Vec::new(),
        };

        let superseded = match self.participants.entry(participant_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                let old = std::mem::replace(&mut occupied.get_mut().connection, connection);
                Some(old.id)
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(ParticipantEntry {
                    connection,
                    rooms: HashSet::new(),
                });
                None
            }
        };

        if let Some(old_id) = &superseded {
            if let Some(mut old) = self.connections.get_mut(old_id) {
                old.state = ConnectionState::Anonymous;
                old.connection.send(ServerMessage::LoggedOut);
            }
            log::info!(
                "Participant {} moved from connection {} to {}",
                participant_id,
                old_id,
                connection_id
            );
        }

        match self.connections.get_mut(connection_id) {
            Some(mut entry) => entry.state = ConnectionState::Authenticated(participant_id.to_string()),
            None => {
                // Closed while we were attaching; undo the participant binding
                self.detach_participant(participant_id, connection_id);
                return Err(RelayError::ConnectionNotFound(connection_id.to_string()));
            }
        }

        Ok(AuthOutcome::Attached {
            previous_identity: previous,
            left_conversations,
            superseded_connection: superseded,
        })
    }

    /// Drop the identity of a connection but keep it open.
    /// Returns the conversations the participant left.
    pub fn logout(&self, connection_id: &str) -> Result<Vec<ConversationId>> {
        let participant_id = {
            let mut entry = self
                .connections
                .get_mut(connection_id)
                .ok_or_else(|| RelayError::ConnectionNotFound(connection_id.to_string()))?;
            match std::mem::replace(&mut entry.state, ConnectionState::Anonymous) {
                ConnectionState::Authenticated(participant_id) => participant_id,
                ConnectionState::Anonymous => return Ok(Vec::new()),
            }
        };

        Ok(self.detach_participant(&participant_id, connection_id))
    }

    /// Forget a connection and every membership it carried.
    /// Returns the identity it was bound to and the conversations it left.
    pub fn disconnect(&self, connection_id: &str) -> Option<(ParticipantId, Vec<ConversationId>)> {
        let (_, entry) = self.connections.remove(connection_id)?;
        log::debug!(
            "Connection {} removed after {:?}",
            connection_id,
            entry.connection.connection_duration()
        );

        match entry.state {
            ConnectionState::Authenticated(participant_id) => {
                let left = self.detach_participant(&participant_id, connection_id);
                Some((participant_id, left))
            }
            ConnectionState::Anonymous => None,
        }
    }

    /// Remove `participant_id` if it is still bound to `connection_id`, then
    /// clean its room sets.
    fn detach_participant(&self, participant_id: &str, connection_id: &str) -> Vec<ConversationId> {
        let Some((_, entry)) = self
            .participants
            .remove_if(participant_id, |_, entry| entry.connection.id == connection_id)
        else {
            return Vec::new();
        };

        let mut left = Vec::with_capacity(entry.rooms.len());
        for conversation_id in entry.rooms {
            self.remove_member(&conversation_id, participant_id, false);
            left.push(conversation_id);
        }
        left
    }

    /// Drop one member from a room. With `update_participant`, the
    /// participant's own room set is edited under the same room lock that
    /// `join` holds, so the two sets never disagree.
    fn remove_member(&self, conversation_id: &str, participant_id: &str, update_participant: bool) -> bool {
        loop {
            let Some(room) = self.rooms.get(conversation_id).map(|r| r.clone()) else {
                return false;
            };

            let (removed, emptied) = {
                let mut members = lock_room(&room);
                if members.retired {
                    // A replacement room may already hold the member
                    drop(members);
                    self.retire_room(conversation_id, &room);
                    continue;
                }
                if update_participant {
                    if let Some(mut participant) = self.participants.get_mut(participant_id) {
                        participant.rooms.remove(conversation_id);
                    }
                }
                let removed = members.members.remove(participant_id);
                let emptied = members.members.is_empty();
                if emptied {
                    members.retired = true;
                }
                (removed, emptied)
            };

            if emptied {
                self.retire_room(conversation_id, &room);
            }
            return removed;
        }
    }

    fn retire_room(&self, conversation_id: &str, room: &RoomHandle) {
        self.rooms
            .remove_if(conversation_id, |_, current| Arc::ptr_eq(current, room));
    }

    /// Subscribe a live participant to a conversation.
    /// Returns `false` if it was already subscribed.
    pub fn join(&self, conversation_id: &str, participant_id: &str) -> Result<bool> {
        loop {
            let room = self
                .rooms
                .entry(conversation_id.to_string())
                .or_insert_with(RoomHandle::default)
                .clone();

            let mut members = lock_room(&room);
            if members.retired {
                drop(members);
                self.retire_room(conversation_id, &room);
                continue;
            }

            let mut participant = self
                .participants
                .get_mut(participant_id)
                .ok_or(RelayError::Unauthorized)?;
            participant.rooms.insert(conversation_id.to_string());
            let inserted = members.members.insert(participant_id.to_string());

            if inserted {
                log::debug!("Participant {} joined conversation {}", participant_id, conversation_id);
            }
            return Ok(inserted);
        }
    }

    /// Unsubscribe a participant. Leaving a conversation it is not in is a no-op.
    pub fn leave(&self, conversation_id: &str, participant_id: &str) -> bool {
        let removed = self.remove_member(conversation_id, participant_id, true);
        if removed {
            log::debug!("Participant {} left conversation {}", participant_id, conversation_id);
        }
        removed
    }

    /// Snapshot of a conversation's subscribers
    pub fn subscribers_of(&self, conversation_id: &str) -> Vec<ParticipantId> {
        let Some(room) = self.rooms.get(conversation_id).map(|r| r.clone()) else {
            return Vec::new();
        };
        let members = lock_room(&room);
        members.members.iter().cloned().collect()
    }

    /// Live connection of a participant
    pub fn connection_of(&self, participant_id: &str) -> Option<Connection> {
        self.participants
            .get(participant_id)
            .map(|entry| entry.connection.clone())
    }

    pub fn conversations_of(&self, participant_id: &str) -> Vec<ConversationId> {
        self.participants
            .get(participant_id)
            .map(|entry| entry.rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_member(&self, conversation_id: &str, participant_id: &str) -> bool {
        self.rooms
            .get(conversation_id)
            .map(|r| r.clone())
            .map(|room| lock_room(&room).members.contains(participant_id))
            .unwrap_or(false)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn conversation_count(&self) -> usize {
        self.rooms.len()
    }

    /// Drop every connection; returns the ids that were open
    pub fn clear(&self) -> Vec<ConnectionId> {
        let ids: Vec<ConnectionId> = self.connections.iter().map(|e| e.key().clone()).collect();
        for id in &ids {
            self.disconnect(id);
        }
        ids
    }
}
