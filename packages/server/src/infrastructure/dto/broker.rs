//! Broker payload DTOs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Publishing side of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    /// Process that published the envelope.
    pub instance_id: Uuid,
    /// Connection the message was received on.
    pub connection_id: u64,
}

/// Canonical message carried on a room topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastEnvelope {
    pub id: i64,
    pub chat_id: i64,
    pub sender: String,
    pub content: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
}

impl BroadcastEnvelope {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}
