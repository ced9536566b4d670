//! Domain entities.

use serde::Serialize;

use super::value_object::{MessageContent, MessageId, RoomId, Timestamp, UserId};

/// Verified identity attached to a connection or HTTP request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub user_id: UserId,
    pub username: String,
}

impl Principal {
    pub fn new(user_id: UserId, username: String) -> Self {
        Self { user_id, username }
    }
}

/// Registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
}

impl From<&Principal> for UserProfile {
    fn from(principal: &Principal) -> Self {
        Self {
            id: principal.user_id.clone(),
            username: principal.username.clone(),
        }
    }
}

/// Persisted chat (room) record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRoom {
    pub id: RoomId,
    /// Empty for direct (1:1) chats.
    pub name: String,
    pub participants: Vec<UserProfile>,
    pub created_at: Timestamp,
}

impl ChatRoom {
    pub fn has_participant(&self, user_id: &UserId) -> bool {
        self.participants.iter().any(|p| &p.id == user_id)
    }
}

/// Persisted chat message.
///
/// `id` and `timestamp` are assigned by the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender: String,
    pub content: MessageContent,
    pub timestamp: Timestamp,
}

/// Message returned by a full-text search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageHit {
    pub room_id: RoomId,
    pub sender: String,
    pub content: String,
}
