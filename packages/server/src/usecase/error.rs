//! UseCase 層のエラー型

use thiserror::Error;

use super::lifecycle::ConnectionState;
use crate::{
    domain::{AuthError, BrokerError, RepositoryError, RoomId, SearchError, UserId, ValueObjectError},
    fanout::close_code,
};

/// 接続確立（ハンドシェイク）のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),

    #[error("user '{user_id}' is not a participant of chat {room_id}")]
    NotParticipant { user_id: UserId, room_id: RoomId },

    #[error("membership lookup failed: {0}")]
    MembershipLookup(RepositoryError),

    #[error("room relay could not be started: {0}")]
    Broker(#[from] BrokerError),

    #[error("invalid lifecycle transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },
}

impl ConnectError {
    /// WebSocket のクローズコード
    pub fn close_code(&self) -> u16 {
        match self {
            Self::Authentication(_) | Self::NotParticipant { .. } => close_code::POLICY_VIOLATION,
            Self::MembershipLookup(_) | Self::InvalidTransition { .. } => {
                close_code::INTERNAL_ERROR
            }
            Self::Broker(_) => close_code::TRY_AGAIN_LATER,
        }
    }

    /// クローズフレームに載せる短い理由（内部の詳細は含めない）
    pub fn close_reason(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "unauthorized",
            Self::NotParticipant { .. } => "not a participant of this chat",
            Self::MembershipLookup(_) | Self::InvalidTransition { .. } => "internal error",
            Self::Broker(_) => "chat temporarily unavailable",
        }
    }
}

/// メッセージ送信のエラー
///
/// いずれも送信者にだけ通知され、接続は維持される。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendMessageError {
    #[error("invalid message: {0}")]
    InvalidContent(#[from] ValueObjectError),

    #[error("message could not be saved: {0}")]
    Persistence(RepositoryError),

    #[error("message could not be encoded: {0}")]
    Encode(String),

    #[error("message could not be published: {0}")]
    Publish(#[from] BrokerError),
}

impl SendMessageError {
    /// クライアントに返すエラーコード
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidContent(_) => "invalid_content",
            Self::Persistence(_) => "persistence_failed",
            Self::Encode(_) => "encode_failed",
            Self::Publish(_) => "publish_failed",
        }
    }
}

/// HTTP API のユースケースのエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatQueryError {
    #[error("unauthorized: {0}")]
    Unauthorized(#[from] AuthError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("user '{user_id}' is not a participant of chat {room_id}")]
    Forbidden { user_id: UserId, room_id: RoomId },

    #[error("no messages in chat {0}")]
    NoMessages(RoomId),

    #[error("repository error: {0}")]
    Repository(RepositoryError),

    #[error("search error: {0}")]
    Search(#[from] SearchError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_close_codes() {
        // テスト項目: 接続エラーごとに適切なクローズコードが選ばれる
        // given (前提条件):
        let not_participant = ConnectError::NotParticipant {
            user_id: UserId::new("u1".to_string()).unwrap(),
            room_id: RoomId::new(1),
        };

        // when (操作):
        let codes = (
            ConnectError::Authentication(AuthError::MissingCredential).close_code(),
            not_participant.close_code(),
            ConnectError::MembershipLookup(RepositoryError::Unavailable("db".into()))
                .close_code(),
            ConnectError::Broker(BrokerError::SubscriptionClosed("t".into())).close_code(),
        );

        // then (期待する結果):
        assert_eq!(codes, (1008, 1008, 1011, 1013));
    }

    #[test]
    fn test_send_message_error_codes() {
        // テスト項目: 送信エラーがクライアント向けのコードに変換される
        // given (前提条件):
        let persistence = SendMessageError::Persistence(RepositoryError::Unavailable("db".into()));
        let publish = SendMessageError::Publish(BrokerError::PublishFailed {
            topic: "chat_channel:1".into(),
            reason: "down".into(),
        });

        // when (操作):
        let codes = (persistence.code(), publish.code());

        // then (期待する結果):
        assert_eq!(codes, ("persistence_failed", "publish_failed"));
    }
}
