//! Domain logic for client-side operations.
//!
//! This module contains pure functions that implement business logic
//! without side effects, making them easy to test.

use hiroba_server::{
    fanout::close_code,
    infrastructure::dto::websocket::{ErrorNotice, MessageType, OutgoingChatMessage},
};

use crate::error::ClientError;

/// Frame pushed by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    Chat(OutgoingChatMessage),
    Error(ErrorNotice),
    /// Anything the client does not understand
    Raw(String),
}

/// Classify a text frame received from the server.
pub fn parse_frame(text: &str) -> ServerFrame {
    if let Ok(chat) = serde_json::from_str::<OutgoingChatMessage>(text)
        && chat.r#type == MessageType::Chat
    {
        return ServerFrame::Chat(chat);
    }
    if let Ok(notice) = serde_json::from_str::<ErrorNotice>(text)
        && notice.r#type == MessageType::Error
    {
        return ServerFrame::Error(notice);
    }
    ServerFrame::Raw(text.to_string())
}

/// Map a close frame to the error that ends the session.
///
/// A policy violation means the credential or the membership was refused;
/// every other code is treated as a disconnect.
pub fn classify_close(code: Option<u16>, reason: &str) -> ClientError {
    match code {
        Some(close_code::POLICY_VIOLATION) => ClientError::Rejected {
            code: close_code::POLICY_VIOLATION,
            reason: reason.to_string(),
        },
        code => ClientError::Disconnected {
            code,
            reason: reason.to_string(),
        },
    }
}

/// Build the websocket URL of a chat.
///
/// # Arguments
///
/// * `base` - Server URL such as `ws://127.0.0.1:8080`
/// * `chat_id` - Chat to join
/// * `token` - Identity token sent as the `token` query parameter
pub fn chat_url(base: &str, chat_id: i64, token: &str) -> String {
    format!(
        "{}/ws/chat/{}?token={}",
        base.trim_end_matches('/'),
        chat_id,
        token
    )
}

/// Check if the client should exit immediately based on the error type.
///
/// # Returns
///
/// `true` if the error requires immediate exit (e.g., Rejected),
/// `false` otherwise
pub fn should_exit_immediately(error: &ClientError) -> bool {
    matches!(error, ClientError::Rejected { .. })
}

/// Check if the client should attempt to reconnect.
///
/// # Arguments
///
/// * `error` - The client error that occurred
/// * `current_attempt` - The current reconnection attempt count (0-indexed)
/// * `max_attempts` - The maximum number of reconnection attempts allowed
pub fn should_attempt_reconnect(
    error: &ClientError,
    current_attempt: u32,
    max_attempts: u32,
) -> bool {
    // Don't reconnect if the error requires immediate exit
    if should_exit_immediately(error) {
        return false;
    }

    // Don't reconnect if we've exhausted all attempts
    current_attempt < max_attempts
}
