//! UseCase: ユーザー登録・チャット作成・チャット一覧
//!
//! HTTP API から使われるユースケース群。

use std::sync::Arc;

use crate::domain::{
    ChatRepository, ChatRoom, IdentityVerifier, Principal, RepositoryError, SearchIndex,
    UserId, UserProfile,
};

use super::error::ChatQueryError;

/// 認証済みユーザーの登録
///
/// トークンを検証し、ユーザーを upsert する。初めて見るユーザーは検索インデックスにも登録する。
pub struct RegisterUserUseCase {
    identity: Arc<dyn IdentityVerifier>,
    repository: Arc<dyn ChatRepository>,
    search: Arc<dyn SearchIndex>,
}

impl RegisterUserUseCase {
    pub fn new(
        identity: Arc<dyn IdentityVerifier>,
        repository: Arc<dyn ChatRepository>,
        search: Arc<dyn SearchIndex>,
    ) -> Self {
        Self {
            identity,
            repository,
            search,
        }
    }

    pub async fn execute(&self, credential: &str) -> Result<Principal, ChatQueryError> {
        let principal = self.identity.verify(credential).await?;

        let is_new = self
            .repository
            .upsert_user(&principal)
            .await
            .map_err(ChatQueryError::Repository)?;
        if is_new {
            tracing::info!("New user '{}' registered", principal.username);
            if let Err(e) = self.search.index_user(&UserProfile::from(&principal)).await {
                tracing::warn!("Failed to index user '{}': {}", principal.username, e);
            }
        }

        Ok(principal)
    }
}

/// ダイレクトチャットの作成（既存ならそれを返す）
pub struct CreateDirectChatUseCase {
    repository: Arc<dyn ChatRepository>,
}

impl CreateDirectChatUseCase {
    pub fn new(repository: Arc<dyn ChatRepository>) -> Self {
        Self { repository }
    }

    pub async fn execute(
        &self,
        caller: &Principal,
        other_user_id: String,
    ) -> Result<ChatRoom, ChatQueryError> {
        let other =
            UserId::new(other_user_id).map_err(|e| ChatQueryError::InvalidRequest(e.to_string()))?;

        self.repository
            .create_or_get_direct_room(&caller.user_id, &other)
            .await
            .map_err(|e| match e {
                RepositoryError::UserNotFound(_) | RepositoryError::InvalidParticipants(_) => {
                    ChatQueryError::InvalidRequest(e.to_string())
                }
                other => ChatQueryError::Repository(other),
            })
    }
}

/// 参加しているチャットの一覧
pub struct ListChatsUseCase {
    repository: Arc<dyn ChatRepository>,
}

impl ListChatsUseCase {
    pub fn new(repository: Arc<dyn ChatRepository>) -> Self {
        Self { repository }
    }

    pub async fn execute(&self, caller: &Principal) -> Result<Vec<ChatRoom>, ChatQueryError> {
        self.repository
            .list_rooms_for(&caller.user_id)
            .await
            .map_err(ChatQueryError::Repository)
    }
}
