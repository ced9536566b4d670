//! In-process pub/sub broker.
//!
//! One `tokio::sync::broadcast` channel per topic. Several server instances
//! living in the same process can share one `InMemoryBroker` to behave like
//! independent servers behind a common broker.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::{Mutex, broadcast};

use crate::domain::{BrokerError, BrokerSubscription, MessageBroker};

/// Default buffer size of each topic channel.
pub const DEFAULT_TOPIC_CAPACITY: usize = 1024;

type Topics = Arc<Mutex<HashMap<String, broadcast::Sender<String>>>>;

/// In-memory pub/sub broker.
#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    /// Topic → broadcast sender.
    topics: Topics,
    /// Buffer size for broadcast channels.
    capacity: usize,
}

impl InMemoryBroker {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Number of live subscriptions on `topic`.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        let topics = self.topics.lock().await;
        topics.get(topic).map_or(0, |tx| tx.receiver_count())
    }

    /// Number of topics with at least one subscription.
    pub async fn topic_count(&self) -> usize {
        self.topics.lock().await.len()
    }

    /// Drop a topic, closing every subscription on it.
    ///
    /// Simulates the broker losing a channel; returns whether the topic
    /// existed.
    pub async fn close_topic(&self, topic: &str) -> bool {
        let removed = self.topics.lock().await.remove(topic);
        if removed.is_some() {
            tracing::warn!("Broker topic '{}' closed", topic);
        }
        removed.is_some()
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC_CAPACITY)
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish(&self, topic: &str, payload: String) -> Result<usize, BrokerError> {
        let topics = self.topics.lock().await;
        let receivers = match topics.get(topic) {
            // send() fails only when there is no receiver; nothing is retained then.
            Some(tx) => tx.send(payload).unwrap_or(0),
            None => 0,
        };
        tracing::debug!("Published to '{}' ({} subscribers)", topic, receivers);
        Ok(receivers)
    }

    async fn subscribe(&self, topic: &str) -> Result<Box<dyn BrokerSubscription>, BrokerError> {
        let mut topics = self.topics.lock().await;
        let rx = topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        tracing::debug!("Subscribed to '{}'", topic);

        Ok(Box::new(InMemorySubscription {
            topic: topic.to_string(),
            rx: Some(rx),
            topics: self.topics.clone(),
        }))
    }
}

struct InMemorySubscription {
    topic: String,
    rx: Option<broadcast::Receiver<String>>,
    topics: Topics,
}

#[async_trait]
impl BrokerSubscription for InMemorySubscription {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn recv(&mut self) -> Result<String, BrokerError> {
        let Some(rx) = self.rx.as_mut() else {
            return Err(BrokerError::SubscriptionClosed(self.topic.clone()));
        };

        loop {
            match rx.recv().await {
                Ok(payload) => return Ok(payload),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "Subscriber on '{}' lagged behind, {} payloads skipped",
                        self.topic,
                        skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(BrokerError::SubscriptionClosed(self.topic.clone()));
                }
            }
        }
    }

    async fn unsubscribe(&mut self) {
        let Some(rx) = self.rx.take() else {
            return;
        };
        drop(rx);

        let mut topics = self.topics.lock().await;
        if topics
            .get(&self.topic)
            .is_some_and(|tx| tx.receiver_count() == 0)
        {
            topics.remove(&self.topic);
        }
        tracing::debug!("Unsubscribed from '{}'", self.topic);
    }
}
