//! Redis pub/sub broker.
//!
//! Every server process connected to the same Redis server shares room
//! traffic. Publishing goes through one multiplexed connection; each
//! subscription owns a dedicated pub/sub connection.

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection, aio::PubSub};

use crate::domain::{BrokerError, BrokerSubscription, MessageBroker};

pub struct RedisBroker {
    client: Client,
    publisher: MultiplexedConnection,
}

impl RedisBroker {
    /// Connect to the Redis server at `url` (`redis://host:port/db`).
    ///
    /// # Errors
    ///
    /// `BrokerError::Unavailable` if the URL is malformed or the server cannot
    /// be reached.
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        let client = Client::open(url).map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        let publisher = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;
        tracing::info!("Connected to Redis broker");

        Ok(Self { client, publisher })
    }
}

#[async_trait]
impl MessageBroker for RedisBroker {
    async fn publish(&self, topic: &str, payload: String) -> Result<usize, BrokerError> {
        let mut conn = self.publisher.clone();
        let receivers: usize =
            conn.publish(topic, payload)
                .await
                .map_err(|e| BrokerError::PublishFailed {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                })?;
        tracing::debug!("Published to '{}' ({} subscribers)", topic, receivers);
        Ok(receivers)
    }

    async fn subscribe(&self, topic: &str) -> Result<Box<dyn BrokerSubscription>, BrokerError> {
        let subscribe_failed = |e: redis::RedisError| BrokerError::SubscribeFailed {
            topic: topic.to_string(),
            reason: e.to_string(),
        };

        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(subscribe_failed)?;
        // 応答を待つので、戻った時点で購読は有効
        pubsub.subscribe(topic).await.map_err(subscribe_failed)?;
        tracing::debug!("Subscribed to '{}'", topic);

        Ok(Box::new(RedisSubscription {
            topic: topic.to_string(),
            pubsub: Some(pubsub),
        }))
    }
}

struct RedisSubscription {
    topic: String,
    pubsub: Option<PubSub>,
}

#[async_trait]
impl BrokerSubscription for RedisSubscription {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn recv(&mut self) -> Result<String, BrokerError> {
        let Some(pubsub) = self.pubsub.as_mut() else {
            return Err(BrokerError::SubscriptionClosed(self.topic.clone()));
        };

        loop {
            let Some(msg) = pubsub.on_message().next().await else {
                return Err(BrokerError::SubscriptionClosed(self.topic.clone()));
            };
            match msg.get_payload::<String>() {
                Ok(payload) => return Ok(payload),
                Err(e) => {
                    tracing::warn!("Skipping undecodable payload on '{}': {}", self.topic, e);
                }
            }
        }
    }

    async fn unsubscribe(&mut self) {
        let Some(mut pubsub) = self.pubsub.take() else {
            return;
        };
        if let Err(e) = pubsub.unsubscribe(&self.topic).await {
            tracing::warn!("Failed to unsubscribe from '{}': {}", self.topic, e);
        }
        tracing::debug!("Unsubscribed from '{}'", self.topic);
    }
}
