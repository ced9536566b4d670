//! InMemory Chat Repository 実装
//!
//! ドメイン層が定義する ChatRepository trait の具体的な実装。
//! BTreeMap をインメモリ DB として使用します。
//!
//! 複数のサーバーインスタンスから共有する場合は同じ `Arc` を渡してください
//! （外部 DB を共有している構成を再現できます）。

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use hiroba_shared::time::{Clock, SystemClock};
use tokio::sync::Mutex;

use crate::domain::{
    ChatMessage, ChatRepository, ChatRoom, MessageContent, MessageId, Principal, RepositoryError,
    RoomId, Timestamp, UserId, UserProfile,
};

#[derive(Debug)]
struct ChatRecord {
    name: String,
    participants: Vec<UserId>,
    created_at: Timestamp,
}

#[derive(Debug, Default)]
struct Store {
    users: BTreeMap<UserId, String>,
    chats: BTreeMap<RoomId, ChatRecord>,
    /// Messages per chat in insertion (= timestamp) order.
    messages: HashMap<RoomId, Vec<ChatMessage>>,
    /// Normalized (smaller, larger) user pair → direct chat.
    direct_chats: HashMap<(UserId, UserId), RoomId>,
    last_chat_id: i64,
    last_message_id: i64,
}

impl Store {
    fn to_chat_room(&self, id: RoomId, record: &ChatRecord) -> ChatRoom {
        ChatRoom {
            id,
            name: record.name.clone(),
            participants: record
                .participants
                .iter()
                .map(|user_id| UserProfile {
                    id: user_id.clone(),
                    username: self.users.get(user_id).cloned().unwrap_or_default(),
                })
                .collect(),
            created_at: record.created_at,
        }
    }

    fn insert_chat(&mut self, name: String, participants: Vec<UserId>, now: Timestamp) -> RoomId {
        self.last_chat_id += 1;
        let id = RoomId::new(self.last_chat_id);
        self.chats.insert(
            id,
            ChatRecord {
                name,
                participants,
                created_at: now,
            },
        );
        id
    }
}

/// インメモリ Chat Repository 実装
pub struct InMemoryChatRepository {
    store: Mutex<Store>,
    clock: Arc<dyn Clock>,
}

impl InMemoryChatRepository {
    /// システム時計を使う InMemoryChatRepository を作成
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// 任意の時計を使う InMemoryChatRepository を作成（テスト用）
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Mutex::new(Store::default()),
            clock,
        }
    }
}

impl Default for InMemoryChatRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatRepository for InMemoryChatRepository {
    async fn upsert_user(&self, principal: &Principal) -> Result<bool, RepositoryError> {
        let mut store = self.store.lock().await;
        let created = store
            .users
            .insert(principal.user_id.clone(), principal.username.clone())
            .is_none();
        Ok(created)
    }

    async fn append_message(
        &self,
        room_id: RoomId,
        sender: &Principal,
        content: &MessageContent,
    ) -> Result<ChatMessage, RepositoryError> {
        let mut store = self.store.lock().await;
        if !store.chats.contains_key(&room_id) {
            return Err(RepositoryError::RoomNotFound(room_id));
        }

        store.last_message_id += 1;
        let message = ChatMessage {
            id: MessageId::new(store.last_message_id),
            room_id,
            sender: sender.username.clone(),
            content: content.clone(),
            timestamp: Timestamp::new(self.clock.now_millis()),
        };
        store
            .messages
            .entry(room_id)
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn history(
        &self,
        room_id: RoomId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let store = self.store.lock().await;
        let messages = store
            .messages
            .get(&room_id)
            .map(|messages| messages.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default();
        Ok(messages)
    }

    async fn list_rooms_for(&self, user_id: &UserId) -> Result<Vec<ChatRoom>, RepositoryError> {
        let store = self.store.lock().await;
        let rooms = store
            .chats
            .iter()
            .filter(|(_, record)| record.participants.contains(user_id))
            .map(|(id, record)| store.to_chat_room(*id, record))
            .collect();
        Ok(rooms)
    }

    async fn is_participant(
        &self,
        user_id: &UserId,
        room_id: RoomId,
    ) -> Result<bool, RepositoryError> {
        let store = self.store.lock().await;
        Ok(store
            .chats
            .get(&room_id)
            .is_some_and(|record| record.participants.contains(user_id)))
    }

    async fn create_or_get_direct_room(
        &self,
        user_a: &UserId,
        user_b: &UserId,
    ) -> Result<ChatRoom, RepositoryError> {
        if user_a == user_b {
            return Err(RepositoryError::InvalidParticipants(
                "a direct chat needs two different users".to_string(),
            ));
        }

        let mut store = self.store.lock().await;
        for user_id in [user_a, user_b] {
            if !store.users.contains_key(user_id) {
                return Err(RepositoryError::UserNotFound(user_id.to_string()));
            }
        }

        let key = if user_a < user_b {
            (user_a.clone(), user_b.clone())
        } else {
            (user_b.clone(), user_a.clone())
        };

        let id = match store.direct_chats.get(&key) {
            Some(id) => *id,
            None => {
                let now = Timestamp::new(self.clock.now_millis());
                let id = store.insert_chat(String::new(), vec![user_a.clone(), user_b.clone()], now);
                store.direct_chats.insert(key, id);
                tracing::debug!("Created direct chat {} for '{}' and '{}'", id, user_a, user_b);
                id
            }
        };

        let record = store
            .chats
            .get(&id)
            .ok_or(RepositoryError::RoomNotFound(id))?;
        Ok(store.to_chat_room(id, record))
    }
}
