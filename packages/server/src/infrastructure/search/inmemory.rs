//! In-memory search index.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{MessageHit, RoomId, SearchError, SearchIndex, UserId, UserProfile};

#[derive(Debug, Default)]
struct Documents {
    messages: Vec<MessageHit>,
    users: BTreeMap<UserId, UserProfile>,
}

/// Keeps every indexed document in memory and scans it on query.
#[derive(Debug, Default)]
pub struct InMemorySearchIndex {
    documents: Mutex<Documents>,
}

impl InMemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn terms(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|term| term.to_lowercase())
        .collect()
}

#[async_trait]
impl SearchIndex for InMemorySearchIndex {
    async fn index_message(
        &self,
        room_id: RoomId,
        sender: &str,
        content: &str,
    ) -> Result<(), SearchError> {
        let mut documents = self.documents.lock().await;
        documents.messages.push(MessageHit {
            room_id,
            sender: sender.to_string(),
            content: content.to_string(),
        });
        Ok(())
    }

    async fn search_messages(
        &self,
        query: &str,
        room_id: RoomId,
    ) -> Result<Vec<MessageHit>, SearchError> {
        let query_terms = terms(query);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let documents = self.documents.lock().await;
        let hits = documents
            .messages
            .iter()
            .filter(|hit| hit.room_id == room_id)
            .filter(|hit| {
                let words = terms(&hit.content);
                query_terms.iter().any(|term| words.contains(term))
            })
            .cloned()
            .collect();
        Ok(hits)
    }

    async fn index_user(&self, user: &UserProfile) -> Result<(), SearchError> {
        let mut documents = self.documents.lock().await;
        documents.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn search_users(&self, prefix: &str) -> Result<Vec<UserProfile>, SearchError> {
        let prefix = prefix.trim().to_lowercase();
        let documents = self.documents.lock().await;
        let mut users: Vec<UserProfile> = documents
            .users
            .values()
            .filter(|user| user.username.to_lowercase().starts_with(&prefix))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }
}
