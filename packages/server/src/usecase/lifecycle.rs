//! 接続のライフサイクル
//!
//! `Connecting → Authenticated → Authorized → Active → Closed`
//!
//! どの状態からも `Closed` に遷移できる。`Active` から `Closed` に遷移した
//! ときだけ Room Registry からの leave が（ちょうど 1 回）実行される。

use std::sync::Arc;

use crate::{
    domain::{Principal, RoomId},
    fanout::{ConnectionHandle, LeaveOutcome, RoomRegistry},
};

use super::error::ConnectError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Authenticated,
    Authorized,
    Active,
    Closed,
}

/// 1 接続分の状態機械
#[derive(Debug)]
pub struct ConnectionLifecycle {
    state: ConnectionState,
    room_id: RoomId,
    principal: Option<Principal>,
    handle: Option<ConnectionHandle>,
    registry: Arc<RoomRegistry>,
}

impl ConnectionLifecycle {
    pub fn new(room_id: RoomId, registry: Arc<RoomRegistry>) -> Self {
        Self {
            state: ConnectionState::Connecting,
            room_id,
            principal: None,
            handle: None,
            registry,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// `Active` の間だけ存在する接続ハンドル
    pub fn handle(&self) -> Option<&ConnectionHandle> {
        self.handle.as_ref()
    }

    fn transition(
        &mut self,
        expected: ConnectionState,
        next: ConnectionState,
    ) -> Result<(), ConnectError> {
        if self.state != expected {
            return Err(ConnectError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(
            "Connection on chat {}: {:?} -> {:?}",
            self.room_id,
            self.state,
            next
        );
        self.state = next;
        Ok(())
    }

    pub(crate) fn mark_authenticated(&mut self, principal: Principal) -> Result<(), ConnectError> {
        self.transition(ConnectionState::Connecting, ConnectionState::Authenticated)?;
        self.principal = Some(principal);
        Ok(())
    }

    pub(crate) fn mark_authorized(&mut self) -> Result<(), ConnectError> {
        self.transition(ConnectionState::Authenticated, ConnectionState::Authorized)
    }

    /// Registry への join が完了した後に呼ぶ
    pub(crate) fn mark_active(&mut self, handle: ConnectionHandle) -> Result<(), ConnectError> {
        self.transition(ConnectionState::Authorized, ConnectionState::Active)?;
        self.handle = Some(handle);
        Ok(())
    }

    /// `Active` になる前に失敗した場合の遷移（Registry には触れない）
    pub(crate) fn reject(&mut self) {
        if self.state != ConnectionState::Active {
            self.state = ConnectionState::Closed;
        }
    }

    /// `Closed` に遷移する
    ///
    /// `Active` だった場合は leave を実行してその結果を返す。2 回目以降は何もしない。
    pub async fn close(&mut self) -> Option<LeaveOutcome> {
        let previous = std::mem::replace(&mut self.state, ConnectionState::Closed);
        let handle = self.handle.take()?;
        if previous != ConnectionState::Active {
            return None;
        }

        handle.mark_closed();
        let outcome = self.registry.leave(self.room_id, handle.id()).await;
        tracing::info!(
            "Connection {} ({}) closed on chat {}: {:?}",
            handle.id(),
            handle.principal().username,
            self.room_id,
            outcome
        );
        Some(outcome)
    }
}

impl Drop for ConnectionLifecycle {
    fn drop(&mut self) {
        if self.state != ConnectionState::Active {
            return;
        }
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.state = ConnectionState::Closed;
        handle.mark_closed();

        // タスクが中断された場合でも leave を実行する
        let registry = self.registry.clone();
        let room_id = self.room_id;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    registry.leave(room_id, handle.id()).await;
                });
            }
            Err(_) => tracing::warn!(
                "Connection {} dropped outside the runtime, leave skipped",
                handle.id()
            ),
        }
    }
}
