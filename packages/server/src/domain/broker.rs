//! Publish/subscribe broker boundary.
//!
//! Rooms are propagated between server instances through one broker topic per
//! room. Delivery is in order per topic; nothing is retained for topics
//! without subscribers.

use async_trait::async_trait;

use super::{BrokerError, RoomId};

/// Prefix of every room topic.
pub const TOPIC_PREFIX: &str = "chat_channel";

/// Broker topic carrying the messages of `room_id`.
pub fn room_topic(room_id: RoomId) -> String {
    format!("{}:{}", TOPIC_PREFIX, room_id)
}

#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Publish `payload` on `topic`, returning how many subscribers received it.
    async fn publish(&self, topic: &str, payload: String) -> Result<usize, BrokerError>;

    /// Open a subscription on `topic`.
    ///
    /// Only payloads published after this call returns are delivered.
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn BrokerSubscription>, BrokerError>;
}

/// A live subscription to one topic.
#[async_trait]
pub trait BrokerSubscription: Send {
    fn topic(&self) -> &str;

    /// Wait for the next payload.
    ///
    /// Cancel safe: dropping the future loses no payload. Returns
    /// `BrokerError::SubscriptionClosed` once the broker side is gone or after
    /// `unsubscribe`.
    async fn recv(&mut self) -> Result<String, BrokerError>;

    /// Release the subscription. Calling it again is a no-op.
    async fn unsubscribe(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_topic_format() {
        // テスト項目: ルームのトピック名が chat_channel:{id} になる
        // given (前提条件):
        let room_id = RoomId::new(42);

        // when (操作):
        let topic = room_topic(room_id);

        // then (期待する結果):
        assert_eq!(topic, "chat_channel:42");
    }
}
