//! Locally connected client handles.
//!
//! A `ConnectionHandle` is what the room registry stores and what relay tasks
//! push frames into. The socket itself stays with its handler; the handle only
//! carries the outbound channel drained by that handler's writer task and a
//! shutdown token that asks the handler to stop.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::{Principal, RoomId};

/// WebSocket close codes used by the server.
pub mod close_code {
    /// Server is shutting down.
    pub const GOING_AWAY: u16 = 1001;
    /// Authentication or authorization failed.
    pub const POLICY_VIOLATION: u16 = 1008;
    /// Unexpected server-side failure.
    pub const INTERNAL_ERROR: u16 = 1011;
    /// Room relay failed; the client should connect again.
    pub const TRY_AGAIN_LATER: u16 = 1013;
}

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Item queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Text frame (JSON).
    Text(String),
    /// Close the socket with the given code. Nothing is written after it.
    Close { code: u16, reason: String },
}

/// Outbound channel of one connection.
pub type PusherChannel = mpsc::UnboundedSender<Outbound>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("connection {0} is closed")]
    Closed(ConnectionId),
}

/// Handle to one Active connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    room_id: RoomId,
    principal: Principal,
    sender: PusherChannel,
    shutdown: CancellationToken,
}

impl ConnectionHandle {
    pub fn new(room_id: RoomId, principal: Principal, sender: PusherChannel) -> Self {
        Self {
            id: ConnectionId::next(),
            room_id,
            principal,
            sender,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Token cancelled once the connection must stop.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_alive(&self) -> bool {
        !self.shutdown.is_cancelled() && !self.sender.is_closed()
    }

    /// Queue a text frame.
    pub fn push(&self, frame: &str) -> Result<(), DeliveryError> {
        if self.shutdown.is_cancelled() {
            return Err(DeliveryError::Closed(self.id));
        }
        self.sender
            .send(Outbound::Text(frame.to_string()))
            .map_err(|_| DeliveryError::Closed(self.id))
    }

    /// Ask the handler to close the socket with `code`.
    ///
    /// Frames queued before this call are still written.
    pub fn close(&self, code: u16, reason: &str) {
        if self.shutdown.is_cancelled() {
            return;
        }
        let _ = self.sender.send(Outbound::Close {
            code,
            reason: reason.to_string(),
        });
        self.shutdown.cancel();
    }

    /// Stop the connection without a close frame (writer already gone).
    pub fn mark_closed(&self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UserId;

    fn handle() -> (ConnectionHandle, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let principal = Principal::new(UserId::new("u1".to_string()).unwrap(), "alice".into());
        (ConnectionHandle::new(RoomId::new(1), principal, tx), rx)
    }

    #[test]
    fn test_connection_ids_are_unique() {
        // テスト項目: 接続 ID はプロセス内で一意に採番される
        // given (前提条件):
        let (first, _rx1) = handle();
        let (second, _rx2) = handle();

        // when (操作):
        let ids = (first.id(), second.id());

        // then (期待する結果):
        assert_ne!(ids.0, ids.1);
    }

    #[test]
    fn test_push_after_receiver_dropped_fails() {
        // テスト項目: 書き込み側が終了した接続への push は失敗する
        // given (前提条件):
        let (handle, rx) = handle();
        drop(rx);

        // when (操作):
        let result = handle.push("{}");

        // then (期待する結果):
        assert_eq!(result, Err(DeliveryError::Closed(handle.id())));
        assert!(!handle.is_alive());
    }

    #[test]
    fn test_close_queues_close_frame_after_pending_text() {
        // テスト項目: close は既に積まれたフレームの後ろに Close を積み、以降の push を拒否する
        // given (前提条件):
        let (handle, mut rx) = handle();
        handle.push("first").unwrap();

        // when (操作):
        handle.close(close_code::TRY_AGAIN_LATER, "relay lost");
        handle.close(close_code::GOING_AWAY, "ignored");
        let late = handle.push("late");

        // then (期待する結果):
        assert_eq!(rx.try_recv().unwrap(), Outbound::Text("first".to_string()));
        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::Close {
                code: close_code::TRY_AGAIN_LATER,
                reason: "relay lost".to_string(),
            }
        );
        assert!(rx.try_recv().is_err());
        assert!(late.is_err());
        assert!(handle.shutdown_token().is_cancelled());
    }
}
