//! Room registry: who is connected locally, and which rooms have a relay.
//!
//! Every room has its own slot guarded by an async mutex. The outer map lock
//! is held only long enough to find or create a slot, so traffic in one room
//! never waits on another. A slot is retired (and removed from the map) when
//! its last connection leaves or when its relay evicts it; a joiner holding a
//! stale slot sees the flag and retries on a fresh one.
//!
//! Invariant for every live slot: `relay.is_some() == !connections.is_empty()`.

use std::{
    collections::{BTreeMap, HashMap},
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::{
    sync::{Mutex, OwnedMutexGuard},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use super::connection::{ConnectionHandle, ConnectionId};
use crate::domain::{BrokerError, RoomId};

static NEXT_RELAY_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one relay task instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelayId(u64);

impl RelayId {
    pub fn next() -> Self {
        Self(NEXT_RELAY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Running relay task of a room.
#[derive(Debug)]
pub struct RelayHandle {
    id: RelayId,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl RelayHandle {
    pub fn new(id: RelayId, token: CancellationToken, task: JoinHandle<()>) -> Self {
        Self { id, token, task }
    }

    pub fn id(&self) -> RelayId {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the relay and wait until it has released its subscription.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!("Relay task ended abnormally: {}", e);
        }
    }
}

/// Result of [`RoomRegistry::join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// First local connection; the relay was started.
    RelayStarted,
    /// Added to a room whose relay was already running.
    Joined,
    /// The connection was already a member.
    AlreadyJoined,
}

/// Result of [`RoomRegistry::leave`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    NotMember,
    Left { remaining: usize },
    /// Last connection left; relay stopped and entry removed.
    RoomClosed,
}

/// Point-in-time state of one local room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomActivity {
    pub room_id: RoomId,
    pub connections: usize,
    pub relay_active: bool,
}

#[derive(Debug, Default)]
struct RoomSlot {
    connections: BTreeMap<ConnectionId, ConnectionHandle>,
    relay: Option<RelayHandle>,
    retired: bool,
}

type SharedSlot = Arc<Mutex<RoomSlot>>;

#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: Mutex<HashMap<RoomId, SharedSlot>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    async fn existing_slot(&self, room_id: RoomId) -> Option<SharedSlot> {
        self.rooms.lock().await.get(&room_id).cloned()
    }

    /// Lock the live slot of `room_id`, creating it if needed.
    async fn lock_live_slot(&self, room_id: RoomId) -> (SharedSlot, OwnedMutexGuard<RoomSlot>) {
        loop {
            let slot = {
                let mut rooms = self.rooms.lock().await;
                rooms.entry(room_id).or_default().clone()
            };
            let guard = slot.clone().lock_owned().await;
            if !guard.retired {
                return (slot, guard);
            }
            tracing::debug!("Chat {} slot retired while waiting, retrying", room_id);
        }
    }

    /// Remove the map entry of `room_id` if it still points at `slot`.
    async fn remove_entry(&self, room_id: RoomId, slot: &SharedSlot) {
        let mut rooms = self.rooms.lock().await;
        if rooms
            .get(&room_id)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
        {
            rooms.remove(&room_id);
        }
    }

    /// Add `handle` to its room.
    ///
    /// When the room has no relay, `start_relay` is awaited inside the room's
    /// critical section before the connection is inserted, so the relay is
    /// subscribed by the time the connection becomes visible to fan-out. If it
    /// fails, nothing is inserted and an empty slot is discarded.
    pub async fn join<F, Fut>(
        &self,
        handle: ConnectionHandle,
        start_relay: F,
    ) -> Result<JoinOutcome, BrokerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RelayHandle, BrokerError>>,
    {
        let room_id = handle.room_id();
        let (slot, mut guard) = self.lock_live_slot(room_id).await;

        if guard.connections.contains_key(&handle.id()) {
            return Ok(JoinOutcome::AlreadyJoined);
        }

        let outcome = if guard.relay.is_none() {
            match start_relay().await {
                Ok(relay) => {
                    guard.relay = Some(relay);
                    JoinOutcome::RelayStarted
                }
                Err(e) => {
                    if guard.connections.is_empty() {
                        guard.retired = true;
                        self.remove_entry(room_id, &slot).await;
                    }
                    return Err(e);
                }
            }
        } else {
            JoinOutcome::Joined
        };

        tracing::info!(
            "Connection {} ({}) joined chat {} ({:?})",
            handle.id(),
            handle.principal().username,
            room_id,
            outcome
        );
        guard.connections.insert(handle.id(), handle);
        Ok(outcome)
    }

    /// Remove a connection from its room.
    ///
    /// The last leave stops the relay (waiting for it to unsubscribe) and
    /// removes the room entry.
    pub async fn leave(&self, room_id: RoomId, connection_id: ConnectionId) -> LeaveOutcome {
        let Some(slot) = self.existing_slot(room_id).await else {
            return LeaveOutcome::NotMember;
        };
        let mut guard = slot.lock().await;

        if guard.retired || guard.connections.remove(&connection_id).is_none() {
            return LeaveOutcome::NotMember;
        }
        tracing::info!("Connection {} left chat {}", connection_id, room_id);

        if !guard.connections.is_empty() {
            return LeaveOutcome::Left {
                remaining: guard.connections.len(),
            };
        }

        if let Some(relay) = guard.relay.take() {
            relay.stop().await;
        }
        guard.retired = true;
        self.remove_entry(room_id, &slot).await;
        tracing::info!("Chat {} has no local connections, relay stopped", room_id);
        LeaveOutcome::RoomClosed
    }

    /// Current members of `room_id`.
    pub async fn snapshot(&self, room_id: RoomId) -> Vec<ConnectionHandle> {
        let Some(slot) = self.existing_slot(room_id).await else {
            return Vec::new();
        };
        let guard = slot.lock().await;
        if guard.retired {
            return Vec::new();
        }
        guard.connections.values().cloned().collect()
    }

    /// Tear down a room on behalf of its failing relay.
    ///
    /// Only the relay that owns the entry can evict it. Returns the removed
    /// connections so the caller can close them.
    pub async fn evict(&self, room_id: RoomId, relay_id: RelayId) -> Vec<ConnectionHandle> {
        let Some(slot) = self.existing_slot(room_id).await else {
            return Vec::new();
        };
        let mut guard = slot.lock().await;
        if guard.retired || guard.relay.as_ref().map(RelayHandle::id) != Some(relay_id) {
            return Vec::new();
        }

        // The caller is the relay itself; its handle is only detached.
        guard.relay = None;
        guard.retired = true;
        let evicted: Vec<ConnectionHandle> =
            std::mem::take(&mut guard.connections).into_values().collect();
        self.remove_entry(room_id, &slot).await;
        tracing::warn!(
            "Chat {} evicted by its relay, {} connections dropped",
            room_id,
            evicted.len()
        );
        evicted
    }

    /// Ask every local connection to close. Each connection leaves on its own.
    pub async fn close_all(&self, code: u16, reason: &str) -> usize {
        let slots: Vec<SharedSlot> = self.rooms.lock().await.values().cloned().collect();
        let mut closed = 0;
        for slot in slots {
            let guard = slot.lock().await;
            for handle in guard.connections.values() {
                handle.close(code, reason);
                closed += 1;
            }
        }
        tracing::info!("Requested close of {} connections", closed);
        closed
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    pub async fn connection_count(&self, room_id: RoomId) -> usize {
        self.snapshot(room_id).await.len()
    }

    pub async fn has_relay(&self, room_id: RoomId) -> bool {
        match self.existing_slot(room_id).await {
            Some(slot) => slot.lock().await.relay.is_some(),
            None => false,
        }
    }

    pub async fn overview(&self) -> Vec<RoomActivity> {
        let slots: Vec<(RoomId, SharedSlot)> = self
            .rooms
            .lock()
            .await
            .iter()
            .map(|(room_id, slot)| (*room_id, slot.clone()))
            .collect();

        let mut rooms = Vec::with_capacity(slots.len());
        for (room_id, slot) in slots {
            let guard = slot.lock().await;
            if guard.retired {
                continue;
            }
            rooms.push(RoomActivity {
                room_id,
                connections: guard.connections.len(),
                relay_active: guard.relay.as_ref().is_some_and(|r| !r.is_finished()),
            });
        }
        rooms.sort_by_key(|room| room.room_id);
        rooms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Principal, UserId};
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;

    fn handle(room: i64, user: &str) -> ConnectionHandle {
        let (tx, _rx) = mpsc::unbounded_channel();
        let principal = Principal::new(UserId::new(user.to_string()).unwrap(), user.to_string());
        ConnectionHandle::new(RoomId::new(room), principal, tx)
    }

    /// Relay that idles until cancelled and counts how often it was started.
    fn idle_relay(
        starts: Arc<AtomicUsize>,
    ) -> impl Future<Output = Result<RelayHandle, BrokerError>> {
        async move {
            starts.fetch_add(1, Ordering::SeqCst);
            let token = CancellationToken::new();
            let cancelled = token.clone();
            let task = tokio::spawn(async move { cancelled.cancelled().await });
            Ok(RelayHandle::new(RelayId::next(), token, task))
        }
    }

    #[tokio::test]
    async fn test_first_join_starts_relay_once() {
        // テスト項目: 最初の join だけが relay を起動し、2 人目は既存の relay に参加する
        // given (前提条件):
        let registry = RoomRegistry::new();
        let starts = Arc::new(AtomicUsize::new(0));
        let alice = handle(42, "alice");
        let bob = handle(42, "bob");

        // when (操作):
        let first = registry
            .join(alice.clone(), || idle_relay(starts.clone()))
            .await
            .unwrap();
        let second = registry
            .join(bob, || idle_relay(starts.clone()))
            .await
            .unwrap();
        let again = registry
            .join(alice, || idle_relay(starts.clone()))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(first, JoinOutcome::RelayStarted);
        assert_eq!(second, JoinOutcome::Joined);
        assert_eq!(again, JoinOutcome::AlreadyJoined);
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(registry.connection_count(RoomId::new(42)).await, 2);
        assert!(registry.has_relay(RoomId::new(42)).await);
    }

    #[tokio::test]
    async fn test_last_leave_stops_relay_and_removes_entry() {
        // テスト項目: 最後の leave で relay が停止し、ルームのエントリが削除される
        // given (前提条件):
        let registry = RoomRegistry::new();
        let starts = Arc::new(AtomicUsize::new(0));
        let alice = handle(42, "alice");
        let bob = handle(42, "bob");
        registry
            .join(alice.clone(), || idle_relay(starts.clone()))
            .await
            .unwrap();
        registry
            .join(bob.clone(), || idle_relay(starts.clone()))
            .await
            .unwrap();

        // when (操作):
        let bob_left = registry.leave(RoomId::new(42), bob.id()).await;
        let alice_left = registry.leave(RoomId::new(42), alice.id()).await;

        // then (期待する結果):
        assert_eq!(bob_left, LeaveOutcome::Left { remaining: 1 });
        assert_eq!(alice_left, LeaveOutcome::RoomClosed);
        assert_eq!(registry.room_count().await, 0);
        assert!(!registry.has_relay(RoomId::new(42)).await);
    }

    #[tokio::test]
    async fn test_leave_is_idempotent() {
        // テスト項目: 同じ接続の 2 回目の leave や未知の接続の leave は何もしない
        // given (前提条件):
        let registry = RoomRegistry::new();
        let starts = Arc::new(AtomicUsize::new(0));
        let alice = handle(1, "alice");
        let bob = handle(1, "bob");
        registry
            .join(alice.clone(), || idle_relay(starts.clone()))
            .await
            .unwrap();
        registry
            .join(bob.clone(), || idle_relay(starts.clone()))
            .await
            .unwrap();

        // when (操作):
        let first = registry.leave(RoomId::new(1), bob.id()).await;
        let second = registry.leave(RoomId::new(1), bob.id()).await;
        let unknown_room = registry.leave(RoomId::new(2), alice.id()).await;

        // then (期待する結果):
        assert_eq!(first, LeaveOutcome::Left { remaining: 1 });
        assert_eq!(second, LeaveOutcome::NotMember);
        assert_eq!(unknown_room, LeaveOutcome::NotMember);
        assert_eq!(registry.connection_count(RoomId::new(1)).await, 1);
        assert!(registry.has_relay(RoomId::new(1)).await);
    }

    #[tokio::test]
    async fn test_failed_relay_start_leaves_no_entry() {
        // テスト項目: relay の起動に失敗した場合、接続は登録されずエントリも残らない
        // given (前提条件):
        let registry = RoomRegistry::new();
        let alice = handle(7, "alice");

        // when (操作):
        let result = registry
            .join(alice, || async {
                Err(BrokerError::SubscribeFailed {
                    topic: "chat_channel:7".to_string(),
                    reason: "broker down".to_string(),
                })
            })
            .await;

        // then (期待する結果):
        assert!(matches!(result, Err(BrokerError::SubscribeFailed { .. })));
        assert_eq!(registry.room_count().await, 0);
        assert!(registry.snapshot(RoomId::new(7)).await.is_empty());
    }

    #[tokio::test]
    async fn test_rejoin_after_room_closed_starts_new_relay() {
        // テスト項目: ルームが閉じた後の join では新しい relay が起動する
        // given (前提条件):
        let registry = RoomRegistry::new();
        let starts = Arc::new(AtomicUsize::new(0));
        let alice = handle(3, "alice");
        registry
            .join(alice.clone(), || idle_relay(starts.clone()))
            .await
            .unwrap();
        registry.leave(RoomId::new(3), alice.id()).await;

        // when (操作):
        let outcome = registry
            .join(handle(3, "alice"), || idle_relay(starts.clone()))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(outcome, JoinOutcome::RelayStarted);
        assert_eq!(starts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_evict_requires_owning_relay() {
        // テスト項目: エントリを所有する relay だけが evict でき、全接続が返される
        // given (前提条件):
        let registry = RoomRegistry::new();
        let token = CancellationToken::new();
        let owner = RelayId::next();
        let task = tokio::spawn(async {});
        let alice = handle(5, "alice");
        registry
            .join(alice.clone(), || async move {
                Ok(RelayHandle::new(owner, token, task))
            })
            .await
            .unwrap();
        registry
            .join(handle(5, "bob"), || async {
                Err(BrokerError::SubscriptionClosed("unused".to_string()))
            })
            .await
            .unwrap();

        // when (操作):
        let by_stranger = registry.evict(RoomId::new(5), RelayId::next()).await;
        let by_owner = registry.evict(RoomId::new(5), owner).await;

        // then (期待する結果):
        assert!(by_stranger.is_empty());
        assert_eq!(by_owner.len(), 2);
        assert_eq!(registry.room_count().await, 0);
        assert_eq!(
            registry.leave(RoomId::new(5), alice.id()).await,
            LeaveOutcome::NotMember
        );
    }

    #[tokio::test]
    async fn test_close_all_signals_every_connection() {
        // テスト項目: close_all で全ルームの全接続に終了が通知される
        // given (前提条件):
        let registry = RoomRegistry::new();
        let starts = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let principal = Principal::new(UserId::new("u1".to_string()).unwrap(), "alice".into());
        let alice = ConnectionHandle::new(RoomId::new(1), principal, tx);
        let bob = handle(2, "bob");
        registry
            .join(alice.clone(), || idle_relay(starts.clone()))
            .await
            .unwrap();
        registry
            .join(bob.clone(), || idle_relay(starts.clone()))
            .await
            .unwrap();

        // when (操作):
        let closed = registry.close_all(1001, "server shutting down").await;

        // then (期待する結果):
        assert_eq!(closed, 2);
        assert!(alice.shutdown_token().is_cancelled());
        assert!(bob.shutdown_token().is_cancelled());
        assert!(matches!(
            rx.try_recv(),
            Ok(crate::fanout::Outbound::Close { code: 1001, .. })
        ));
    }

    #[tokio::test]
    async fn test_overview_lists_rooms_in_order() {
        // テスト項目: overview がルーム ID 順に接続数と relay の状態を返す
        // given (前提条件):
        let registry = RoomRegistry::new();
        let starts = Arc::new(AtomicUsize::new(0));
        for (room, user) in [(9, "a"), (2, "b"), (9, "c")] {
            registry
                .join(handle(room, user), || idle_relay(starts.clone()))
                .await
                .unwrap();
        }

        // when (操作):
        let overview = registry.overview().await;

        // then (期待する結果):
        assert_eq!(
            overview,
            vec![
                RoomActivity {
                    room_id: RoomId::new(2),
                    connections: 1,
                    relay_active: true,
                },
                RoomActivity {
                    room_id: RoomId::new(9),
                    connections: 2,
                    relay_active: true,
                },
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_join_and_leave_keep_single_relay() {
        // テスト項目: 並行した join/leave の後も relay は高々 1 つで、接続の有無と一致する
        // given (前提条件):
        let registry = Arc::new(RoomRegistry::new());
        let starts = Arc::new(AtomicUsize::new(0));
        let running = Arc::new(AtomicUsize::new(0));
        let max_running = Arc::new(AtomicUsize::new(0));

        // when (操作):
        let mut tasks = Vec::new();
        for n in 0..32 {
            let registry = registry.clone();
            let starts = starts.clone();
            let running = running.clone();
            let max_running = max_running.clone();
            tasks.push(tokio::spawn(async move {
                for round in 0..20 {
                    let connection = handle(1, &format!("user-{}-{}", n, round));
                    let running_for_relay = running.clone();
                    let max_for_relay = max_running.clone();
                    let starts_for_relay = starts.clone();
                    registry
                        .join(connection.clone(), move || async move {
                            starts_for_relay.fetch_add(1, Ordering::SeqCst);
                            let now = running_for_relay.fetch_add(1, Ordering::SeqCst) + 1;
                            max_for_relay.fetch_max(now, Ordering::SeqCst);
                            let token = CancellationToken::new();
                            let cancelled = token.clone();
                            let task = tokio::spawn(async move {
                                cancelled.cancelled().await;
                                running_for_relay.fetch_sub(1, Ordering::SeqCst);
                            });
                            Ok(RelayHandle::new(RelayId::next(), token, task))
                        })
                        .await
                        .unwrap();
                    tokio::task::yield_now().await;
                    registry.leave(RoomId::new(1), connection.id()).await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        // then (期待する結果):
        assert_eq!(max_running.load(Ordering::SeqCst), 1);
        assert_eq!(running.load(Ordering::SeqCst), 0);
        assert!(starts.load(Ordering::SeqCst) >= 1);
        assert_eq!(registry.room_count().await, 0);
        assert!(!registry.has_relay(RoomId::new(1)).await);
    }
}
