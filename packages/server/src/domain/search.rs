//! Full-text search boundary.

use async_trait::async_trait;

use super::{MessageHit, RoomId, SearchError, UserProfile};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Index a persisted message. Best effort: callers only log failures.
    async fn index_message(
        &self,
        room_id: RoomId,
        sender: &str,
        content: &str,
    ) -> Result<(), SearchError>;

    /// Messages of `room_id` matching any term of `query`.
    async fn search_messages(
        &self,
        query: &str,
        room_id: RoomId,
    ) -> Result<Vec<MessageHit>, SearchError>;

    async fn index_user(&self, user: &UserProfile) -> Result<(), SearchError>;

    /// Users whose username starts with `prefix` (case-insensitive).
    async fn search_users(&self, prefix: &str) -> Result<Vec<UserProfile>, SearchError>;
}
