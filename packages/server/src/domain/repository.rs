//! Repository trait 定義
//!
//! ドメイン層が必要とする永続化のインターフェースを定義します。
//! 具体的な実装は Infrastructure 層が提供します（依存性の逆転）。

use async_trait::async_trait;

use super::{
    ChatMessage, ChatRoom, MessageContent, Principal, RepositoryError, RoomId, UserId,
};

/// Chat Repository trait
///
/// ユーザー・チャット・メッセージの永続化を担当するコラボレーター。
/// UseCase 層はこの trait に依存し、Infrastructure 層の具体的な実装には依存しない。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatRepository: Send + Sync {
    /// ユーザーを登録（既存なら username を更新）
    ///
    /// 新規登録だった場合は `true` を返す。
    async fn upsert_user(&self, principal: &Principal) -> Result<bool, RepositoryError>;

    /// メッセージを永続化し、ID とタイムスタンプを採番したメッセージを返す
    async fn append_message(
        &self,
        room_id: RoomId,
        sender: &Principal,
        content: &MessageContent,
    ) -> Result<ChatMessage, RepositoryError>;

    /// チャットの履歴を新しい順に最大 `limit` 件取得
    async fn history(&self, room_id: RoomId, limit: usize)
    -> Result<Vec<ChatMessage>, RepositoryError>;

    /// ユーザーが参加しているチャット一覧を取得
    async fn list_rooms_for(&self, user_id: &UserId) -> Result<Vec<ChatRoom>, RepositoryError>;

    /// ユーザーがチャットの参加者かどうか
    async fn is_participant(&self, user_id: &UserId, room_id: RoomId)
    -> Result<bool, RepositoryError>;

    /// 2 人のダイレクトチャットを作成（既に存在すればそれを返す）
    ///
    /// 引数の順序に関わらず同じチャットを返す。
    async fn create_or_get_direct_room(
        &self,
        user_a: &UserId,
        user_b: &UserId,
    ) -> Result<ChatRoom, RepositoryError>;
}
