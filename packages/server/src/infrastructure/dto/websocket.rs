//! WebSocket frame DTOs.

use serde::{Deserialize, Serialize};

/// Frame type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageType {
    Chat,
    Error,
}

/// Chat message pushed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingChatMessage {
    pub r#type: MessageType,
    pub id: i64,
    pub chat_id: i64,
    pub sender: String,
    pub content: String,
    /// Unix time in milliseconds.
    pub timestamp: i64,
}

/// Error notice sent to the originating connection only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNotice {
    pub r#type: MessageType,
    pub code: String,
    pub message: String,
}

impl ErrorNotice {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            r#type: MessageType::Error,
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Frame received from a client.
///
/// Clients send `{"content": "..."}`; any other field (a claimed sender,
/// for instance) is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InboundMessage {
    pub content: String,
}

impl InboundMessage {
    /// Parse a text frame. Anything that is not a JSON object with `content`
    /// is taken as the message body itself.
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str::<InboundMessage>(text) {
            Ok(message) => message,
            Err(_) => Self {
                content: text.to_string(),
            },
        }
    }
}
