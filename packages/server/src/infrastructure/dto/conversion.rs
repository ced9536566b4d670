//! Conversion logic between DTOs and domain entities.

use hiroba_shared::time::timestamp_to_rfc3339;

use crate::{
    domain::{ChatMessage, ChatRoom, MessageHit, UserProfile},
    fanout::RoomActivity,
    infrastructure::dto::{
        broker::{BroadcastEnvelope, Origin},
        http, websocket,
    },
};

// ========================================
// Domain Entity → Broker DTO
// ========================================

impl BroadcastEnvelope {
    /// Envelope for a persisted message.
    pub fn from_message(message: &ChatMessage, origin: Option<Origin>) -> Self {
        Self {
            id: message.id.value(),
            chat_id: message.room_id.value(),
            sender: message.sender.clone(),
            content: message.content.as_str().to_string(),
            timestamp: message.timestamp.value(),
            origin,
        }
    }
}

// ========================================
// Broker DTO → WebSocket DTO
// ========================================

impl From<&BroadcastEnvelope> for websocket::OutgoingChatMessage {
    fn from(envelope: &BroadcastEnvelope) -> Self {
        Self {
            r#type: websocket::MessageType::Chat,
            id: envelope.id,
            chat_id: envelope.chat_id,
            sender: envelope.sender.clone(),
            content: envelope.content.clone(),
            timestamp: envelope.timestamp,
        }
    }
}

// ========================================
// Domain Entity → HTTP DTO
// ========================================

impl From<UserProfile> for http::ParticipantDto {
    fn from(user: UserProfile) -> Self {
        Self {
            id: user.id.into_string(),
            username: user.username,
        }
    }
}

impl From<UserProfile> for http::UserDto {
    fn from(user: UserProfile) -> Self {
        Self {
            id: user.id.into_string(),
            username: user.username,
        }
    }
}

impl From<ChatRoom> for http::ChatSummaryDto {
    fn from(room: ChatRoom) -> Self {
        Self {
            id: room.id.value(),
            name: room.name,
            created_at: timestamp_to_rfc3339(room.created_at.value()),
            participants: room.participants.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<ChatMessage> for http::MessageDto {
    fn from(message: ChatMessage) -> Self {
        Self {
            id: message.id.value(),
            sender: message.sender,
            content: message.content.into_string(),
            timestamp: timestamp_to_rfc3339(message.timestamp.value()),
        }
    }
}

impl From<MessageHit> for http::MessageHitDto {
    fn from(hit: MessageHit) -> Self {
        Self {
            chat_id: hit.room_id.value(),
            sender: hit.sender,
            content: hit.content,
        }
    }
}

impl From<RoomActivity> for http::RoomActivityDto {
    fn from(activity: RoomActivity) -> Self {
        Self {
            chat_id: activity.room_id.value(),
            connections: activity.connections,
            relay_active: activity.relay_active,
        }
    }
}
