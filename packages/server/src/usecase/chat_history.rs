//! UseCase: 履歴取得・メッセージ検索・ユーザー検索

use std::sync::Arc;

use crate::domain::{
    ChatMessage, ChatRepository, MessageHit, Principal, RoomId, SearchIndex, UserProfile,
};

use super::error::ChatQueryError;

/// 参加者でなければ Forbidden
async fn ensure_participant(
    repository: &dyn ChatRepository,
    caller: &Principal,
    room_id: RoomId,
) -> Result<(), ChatQueryError> {
    let is_participant = repository
        .is_participant(&caller.user_id, room_id)
        .await
        .map_err(ChatQueryError::Repository)?;
    if !is_participant {
        return Err(ChatQueryError::Forbidden {
            user_id: caller.user_id.clone(),
            room_id,
        });
    }
    Ok(())
}

/// チャット履歴の取得（新しい順）
pub struct GetChatHistoryUseCase {
    repository: Arc<dyn ChatRepository>,
}

impl GetChatHistoryUseCase {
    pub fn new(repository: Arc<dyn ChatRepository>) -> Self {
        Self { repository }
    }

    /// # Returns
    ///
    /// * `Err(ChatQueryError::NoMessages)` - メッセージが 1 件も無い場合
    pub async fn execute(
        &self,
        caller: &Principal,
        room_id: RoomId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, ChatQueryError> {
        ensure_participant(self.repository.as_ref(), caller, room_id).await?;

        let messages = self
            .repository
            .history(room_id, limit)
            .await
            .map_err(ChatQueryError::Repository)?;
        if messages.is_empty() {
            return Err(ChatQueryError::NoMessages(room_id));
        }
        Ok(messages)
    }
}

/// チャット内のメッセージ検索
pub struct SearchMessagesUseCase {
    repository: Arc<dyn ChatRepository>,
    search: Arc<dyn SearchIndex>,
}

impl SearchMessagesUseCase {
    pub fn new(repository: Arc<dyn ChatRepository>, search: Arc<dyn SearchIndex>) -> Self {
        Self { repository, search }
    }

    pub async fn execute(
        &self,
        caller: &Principal,
        room_id: RoomId,
        query: &str,
    ) -> Result<Vec<MessageHit>, ChatQueryError> {
        ensure_participant(self.repository.as_ref(), caller, room_id).await?;
        Ok(self.search.search_messages(query, room_id).await?)
    }
}

/// ユーザー名の前方一致検索
pub struct SearchUsersUseCase {
    search: Arc<dyn SearchIndex>,
}

impl SearchUsersUseCase {
    pub fn new(search: Arc<dyn SearchIndex>) -> Self {
        Self { search }
    }

    pub async fn execute(&self, prefix: &str) -> Result<Vec<UserProfile>, ChatQueryError> {
        Ok(self.search.search_users(prefix).await?)
    }
}
