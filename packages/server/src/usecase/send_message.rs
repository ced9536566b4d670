//! UseCase: メッセージ送信処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - SendMessageUseCase::execute() メソッド
//! - 検証 → 永続化 → インデックス登録（バックグラウンド）→ broker への publish
//!
//! ### なぜこのテストが必要か
//! - 永続化に失敗したメッセージが誰にも配信されないことを保証
//! - インデックス登録の失敗が送信を妨げないことを確認
//!
//! ### どのような状況を想定しているか
//! - 正常系：メッセージが永続化され、ルームのトピックに publish される
//! - 異常系：空メッセージ、永続化失敗、publish 失敗
//! - エッジケース：インデックス登録の失敗

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    domain::{ChatMessage, ChatRepository, MessageBroker, MessageContent, SearchIndex, room_topic},
    fanout::ConnectionHandle,
    infrastructure::dto::broker::{BroadcastEnvelope, Origin},
};

use super::error::SendMessageError;

/// メッセージ送信のユースケース
pub struct SendMessageUseCase {
    /// Repository（データアクセス層の抽象化）
    repository: Arc<dyn ChatRepository>,
    /// SearchIndex（全文検索の抽象化）
    search: Arc<dyn SearchIndex>,
    /// MessageBroker（インスタンス間の配信）
    broker: Arc<dyn MessageBroker>,
    instance_id: Uuid,
}

impl SendMessageUseCase {
    /// 新しい SendMessageUseCase を作成
    pub fn new(
        repository: Arc<dyn ChatRepository>,
        search: Arc<dyn SearchIndex>,
        broker: Arc<dyn MessageBroker>,
        instance_id: Uuid,
    ) -> Self {
        Self {
            repository,
            search,
            broker,
            instance_id,
        }
    }

    /// メッセージ送信を実行
    ///
    /// # Arguments
    ///
    /// * `sender` - 送信元の接続（送信者は接続の Principal から決まる）
    /// * `content` - クライアントから受け取った本文
    ///
    /// # Returns
    ///
    /// * `Ok(ChatMessage)` - 永続化され publish されたメッセージ
    /// * `Err(SendMessageError)` - 送信失敗（送信者にだけ通知する）
    pub async fn execute(
        &self,
        sender: &ConnectionHandle,
        content: String,
    ) -> Result<ChatMessage, SendMessageError> {
        let room_id = sender.room_id();

        // 1. 本文の検証
        let content = MessageContent::new(content)?;

        // 2. 永続化（ID とタイムスタンプが採番される）
        let message = self
            .repository
            .append_message(room_id, sender.principal(), &content)
            .await
            .map_err(SendMessageError::Persistence)?;

        // 3. インデックス登録（失敗はログのみ）
        let search = self.search.clone();
        let indexed = message.clone();
        tokio::spawn(async move {
            if let Err(e) = search
                .index_message(indexed.room_id, &indexed.sender, indexed.content.as_str())
                .await
            {
                tracing::warn!("Failed to index message {}: {}", indexed.id, e);
            }
        });

        // 4. ルームのトピックに publish
        let origin = Origin {
            instance_id: self.instance_id,
            connection_id: sender.id().value(),
        };
        let payload = BroadcastEnvelope::from_message(&message, Some(origin))
            .encode()
            .map_err(|e| SendMessageError::Encode(e.to_string()))?;
        let receivers = self.broker.publish(&room_topic(room_id), payload).await?;

        tracing::debug!(
            "Message {} from '{}' published to chat {} ({} relays)",
            message.id,
            message.sender,
            room_id,
            receivers
        );
        Ok(message)
    }
}
