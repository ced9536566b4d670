//! UseCase: 参加者接続処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - ConnectParticipantUseCase の各遷移（authenticate, authorize, activate）
//! - ハンドシェイク全体を実行する execute()
//!
//! ### なぜこのテストが必要か
//! - 認証・認可に失敗した接続が Room Registry に一切現れないことを保証
//! - 最初の参加者だけが relay を起動することを確認
//!
//! ### どのような状況を想定しているか
//! - 正常系：参加者が接続し Active になる
//! - 異常系：トークン不正、非参加者、参加者確認の失敗
//! - エッジケース：遷移順序の誤り

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    config::SenderEcho,
    domain::{AuthError, ChatRepository, IdentityVerifier, MessageBroker, Principal, RoomId},
    fanout::{ConnectionHandle, JoinOutcome, PusherChannel, RelayContext, RoomRegistry, start_relay},
};

use super::{
    error::ConnectError,
    lifecycle::{ConnectionLifecycle, ConnectionState},
};

/// 参加者接続のユースケース
pub struct ConnectParticipantUseCase {
    /// IdentityVerifier（認証の抽象化）
    identity: Arc<dyn IdentityVerifier>,
    /// Repository（参加者確認に使用）
    repository: Arc<dyn ChatRepository>,
    /// MessageBroker（relay の購読先）
    broker: Arc<dyn MessageBroker>,
    /// ローカル接続の Registry
    registry: Arc<RoomRegistry>,
    echo: SenderEcho,
    instance_id: Uuid,
}

impl ConnectParticipantUseCase {
    /// 新しい ConnectParticipantUseCase を作成
    pub fn new(
        identity: Arc<dyn IdentityVerifier>,
        repository: Arc<dyn ChatRepository>,
        broker: Arc<dyn MessageBroker>,
        registry: Arc<RoomRegistry>,
        echo: SenderEcho,
        instance_id: Uuid,
    ) -> Self {
        Self {
            identity,
            repository,
            broker,
            registry,
            echo,
            instance_id,
        }
    }

    /// `Connecting` 状態のライフサイクルを作成
    pub fn begin(&self, room_id: RoomId) -> ConnectionLifecycle {
        ConnectionLifecycle::new(room_id, self.registry.clone())
    }

    /// `Connecting → Authenticated`
    pub async fn authenticate(
        &self,
        lifecycle: &mut ConnectionLifecycle,
        credential: Option<&str>,
    ) -> Result<Principal, ConnectError> {
        let result = match credential {
            Some(credential) => self.identity.verify(credential).await,
            None => Err(AuthError::MissingCredential),
        };
        let principal = match result {
            Ok(principal) => principal,
            Err(e) => {
                lifecycle.reject();
                return Err(e.into());
            }
        };

        lifecycle.mark_authenticated(principal.clone())?;
        Ok(principal)
    }

    /// `Authenticated → Authorized`
    ///
    /// 参加者でなければ `NotParticipant`、確認自体の失敗は `MembershipLookup`。
    pub async fn authorize(&self, lifecycle: &mut ConnectionLifecycle) -> Result<(), ConnectError> {
        let room_id = lifecycle.room_id();
        let Some(user_id) = lifecycle.principal().map(|p| p.user_id.clone()) else {
            return Err(ConnectError::InvalidTransition {
                from: lifecycle.state(),
                to: ConnectionState::Authorized,
            });
        };

        match self.repository.is_participant(&user_id, room_id).await {
            Ok(true) => lifecycle.mark_authorized(),
            Ok(false) => {
                lifecycle.reject();
                Err(ConnectError::NotParticipant { user_id, room_id })
            }
            Err(e) => {
                lifecycle.reject();
                Err(ConnectError::MembershipLookup(e))
            }
        }
    }

    /// `Authorized → Active`
    ///
    /// Room Registry に参加する。最初の参加者なら relay を起動する。
    pub async fn activate(
        &self,
        lifecycle: &mut ConnectionLifecycle,
        sender: PusherChannel,
    ) -> Result<ConnectionHandle, ConnectError> {
        let room_id = lifecycle.room_id();
        let principal = match (lifecycle.state(), lifecycle.principal()) {
            (ConnectionState::Authorized, Some(principal)) => principal.clone(),
            (from, _) => {
                return Err(ConnectError::InvalidTransition {
                    from,
                    to: ConnectionState::Active,
                });
            }
        };

        let handle = ConnectionHandle::new(room_id, principal, sender);
        let ctx = RelayContext {
            room_id,
            registry: self.registry.clone(),
            broker: self.broker.clone(),
            echo: self.echo,
            instance_id: self.instance_id,
        };

        match self.registry.join(handle.clone(), || start_relay(ctx)).await {
            Ok(outcome) => {
                if outcome == JoinOutcome::RelayStarted {
                    tracing::info!("First local member of chat {}, relay started", room_id);
                }
            }
            Err(e) => {
                lifecycle.reject();
                return Err(e.into());
            }
        }

        lifecycle.mark_active(handle.clone())?;
        Ok(handle)
    }

    /// ハンドシェイク全体を実行し、`Active` なライフサイクルを返す
    ///
    /// # Returns
    ///
    /// * `Ok((ConnectionLifecycle, ConnectionHandle))` - 接続成功
    /// * `Err(ConnectError)` - 接続失敗（Registry には何も残らない）
    pub async fn execute(
        &self,
        room_id: RoomId,
        credential: Option<&str>,
        sender: PusherChannel,
    ) -> Result<(ConnectionLifecycle, ConnectionHandle), ConnectError> {
        let mut lifecycle = self.begin(room_id);
        self.authenticate(&mut lifecycle, credential).await?;
        self.authorize(&mut lifecycle).await?;
        let handle = self.activate(&mut lifecycle, sender).await?;
        Ok((lifecycle, handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{MockChatRepository, MockIdentityVerifier, RepositoryError, UserId},
        infrastructure::{broker::InMemoryBroker, repository::InMemoryChatRepository},
    };
    use tokio::sync::mpsc;

    struct Fixture {
        repository: Arc<InMemoryChatRepository>,
        broker: Arc<InMemoryBroker>,
        registry: Arc<RoomRegistry>,
        room_id: RoomId,
    }

    fn principal(id: &str, name: &str) -> Principal {
        Principal::new(UserId::new(id.to_string()).unwrap(), name.to_string())
    }

    /// alice と bob のダイレクトチャットを持つ環境を作る
    async fn create_fixture() -> Fixture {
        let repository = Arc::new(InMemoryChatRepository::new());
        let alice = principal("u-alice", "alice");
        let bob = principal("u-bob", "bob");
        repository.upsert_user(&alice).await.unwrap();
        repository.upsert_user(&bob).await.unwrap();
        repository
            .upsert_user(&principal("u-carol", "carol"))
            .await
            .unwrap();
        let room = repository
            .create_or_get_direct_room(&alice.user_id, &bob.user_id)
            .await
            .unwrap();

        Fixture {
            repository,
            broker: Arc::new(InMemoryBroker::default()),
            registry: Arc::new(RoomRegistry::new()),
            room_id: room.id,
        }
    }

    /// トークン文字列をそのまま user id とみなす検証器
    fn token_is_user_id() -> MockIdentityVerifier {
        let mut identity = MockIdentityVerifier::new();
        identity.expect_verify().returning(|token| {
            let name = token.trim_start_matches("u-").to_string();
            UserId::new(token.to_string())
                .map(|id| Principal::new(id, name))
                .map_err(|e| AuthError::InvalidIdentity(e.to_string()))
        });
        identity
    }

    fn create_usecase(
        fixture: &Fixture,
        identity: MockIdentityVerifier,
        repository: Arc<dyn ChatRepository>,
    ) -> ConnectParticipantUseCase {
        ConnectParticipantUseCase::new(
            Arc::new(identity),
            repository,
            fixture.broker.clone(),
            fixture.registry.clone(),
            SenderEcho::Include,
            Uuid::new_v4(),
        )
    }

    #[tokio::test]
    async fn test_connect_participant_success() {
        // テスト項目: 参加者が接続すると Active になり、relay が起動する
        // given (前提条件):
        let fixture = create_fixture().await;
        let usecase = create_usecase(&fixture, token_is_user_id(), fixture.repository.clone());
        let (tx, _rx) = mpsc::unbounded_channel();

        // when (操作):
        let (lifecycle, handle) = usecase
            .execute(fixture.room_id, Some("u-alice"), tx)
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(lifecycle.state(), ConnectionState::Active);
        assert_eq!(handle.principal().username, "alice");
        assert_eq!(fixture.registry.connection_count(fixture.room_id).await, 1);
        assert!(fixture.registry.has_relay(fixture.room_id).await);
        assert_eq!(
            fixture
                .broker
                .subscriber_count(&crate::domain::room_topic(fixture.room_id))
                .await,
            1
        );
    }

    #[tokio::test]
    async fn test_second_participant_shares_relay() {
        // テスト項目: 2 人目の参加者は既存の relay を共有する
        // given (前提条件):
        let fixture = create_fixture().await;
        let usecase = create_usecase(&fixture, token_is_user_id(), fixture.repository.clone());
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let _alice = usecase
            .execute(fixture.room_id, Some("u-alice"), tx1)
            .await
            .unwrap();

        // when (操作):
        let _bob = usecase
            .execute(fixture.room_id, Some("u-bob"), tx2)
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(fixture.registry.connection_count(fixture.room_id).await, 2);
        assert_eq!(
            fixture
                .broker
                .subscriber_count(&crate::domain::room_topic(fixture.room_id))
                .await,
            1
        );
    }

    #[tokio::test]
    async fn test_connect_without_token_is_rejected() {
        // テスト項目: トークンが無い接続は 1008 で拒否され Registry に現れない
        // given (前提条件):
        let fixture = create_fixture().await;
        let mut identity = MockIdentityVerifier::new();
        identity.expect_verify().never();
        let usecase = create_usecase(&fixture, identity, fixture.repository.clone());
        let (tx, _rx) = mpsc::unbounded_channel();

        // when (操作):
        let result = usecase.execute(fixture.room_id, None, tx).await;

        // then (期待する結果):
        let error = result.err().unwrap();
        assert_eq!(
            error,
            ConnectError::Authentication(AuthError::MissingCredential)
        );
        assert_eq!(error.close_code(), 1008);
        assert_eq!(fixture.registry.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_connect_with_invalid_token_is_rejected() {
        // テスト項目: 検証に失敗したトークンは 1008 で拒否される
        // given (前提条件):
        let fixture = create_fixture().await;
        let mut identity = MockIdentityVerifier::new();
        identity
            .expect_verify()
            .returning(|_| Err(AuthError::InvalidToken("bad signature".to_string())));
        let usecase = create_usecase(&fixture, identity, fixture.repository.clone());
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut lifecycle = usecase.begin(fixture.room_id);

        // when (操作):
        let result = usecase.authenticate(&mut lifecycle, Some("forged")).await;

        // then (期待する結果):
        assert!(matches!(result, Err(ConnectError::Authentication(_))));
        assert_eq!(lifecycle.state(), ConnectionState::Closed);
        assert!(usecase.activate(&mut lifecycle, tx).await.is_err());
        assert_eq!(fixture.registry.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_non_participant_is_rejected() {
        // テスト項目: チャットの参加者でないユーザーは 1008 で拒否される
        // given (前提条件):
        let fixture = create_fixture().await;
        let usecase = create_usecase(&fixture, token_is_user_id(), fixture.repository.clone());
        let (tx, _rx) = mpsc::unbounded_channel();

        // when (操作):
        let result = usecase.execute(fixture.room_id, Some("u-carol"), tx).await;

        // then (期待する結果):
        let error = result.err().unwrap();
        assert!(matches!(error, ConnectError::NotParticipant { .. }));
        assert_eq!(error.close_code(), 1008);
        assert!(fixture.registry.snapshot(fixture.room_id).await.is_empty());
    }

    #[tokio::test]
    async fn test_membership_lookup_failure() {
        // テスト項目: 参加者確認に失敗した場合は 1011 で拒否される
        // given (前提条件):
        let fixture = create_fixture().await;
        let mut repository = MockChatRepository::new();
        repository
            .expect_is_participant()
            .returning(|_, _| Err(RepositoryError::Unavailable("db down".to_string())));
        let usecase = create_usecase(&fixture, token_is_user_id(), Arc::new(repository));
        let (tx, _rx) = mpsc::unbounded_channel();

        // when (操作):
        let result = usecase.execute(fixture.room_id, Some("u-alice"), tx).await;

        // then (期待する結果):
        let error = result.err().unwrap();
        assert!(matches!(error, ConnectError::MembershipLookup(_)));
        assert_eq!(error.close_code(), 1011);
        assert_eq!(fixture.registry.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_activate_before_authorize_is_invalid() {
        // テスト項目: 認可前の activate は不正な遷移になる
        // given (前提条件):
        let fixture = create_fixture().await;
        let usecase = create_usecase(&fixture, token_is_user_id(), fixture.repository.clone());
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut lifecycle = usecase.begin(fixture.room_id);
        usecase
            .authenticate(&mut lifecycle, Some("u-alice"))
            .await
            .unwrap();

        // when (操作):
        let result = usecase.activate(&mut lifecycle, tx).await;

        // then (期待する結果):
        assert_eq!(
            result.err(),
            Some(ConnectError::InvalidTransition {
                from: ConnectionState::Authenticated,
                to: ConnectionState::Active,
            })
        );
        assert_eq!(fixture.registry.room_count().await, 0);
    }
}
