//! HTTP API request/response DTOs.

use serde::{Deserialize, Serialize};

/// Default number of messages returned by the history endpoint.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Upper bound for the history `limit` parameter.
pub const MAX_HISTORY_LIMIT: usize = 500;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateChatRequest {
    #[serde(rename = "userId")]
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateChatResponse {
    pub message: String,
    pub chat_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantDto {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSummaryDto {
    pub id: i64,
    pub name: String,
    /// RFC 3339 (UTC)
    pub created_at: String,
    pub participants: Vec<ParticipantDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDto {
    pub id: i64,
    pub sender: String,
    pub content: String,
    /// RFC 3339 (UTC)
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageHitDto {
    pub chat_id: i64,
    pub sender: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDto {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

impl HistoryQuery {
    /// Requested limit, defaulted and capped.
    pub fn effective_limit(&self, default_limit: usize) -> usize {
        self.limit
            .unwrap_or(default_limit)
            .clamp(1, MAX_HISTORY_LIMIT)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    pub query: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserSearchQuery {
    pub username: String,
}

/// One room of the local registry (debug endpoint).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomActivityDto {
    pub chat_id: i64,
    pub connections: usize,
    pub relay_active: bool,
}
