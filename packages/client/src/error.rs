//! Error types for the chat client.

use thiserror::Error;

/// Client-specific errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClientError {
    /// The server refused the connection (bad credential or not a member of the chat)
    #[error("Rejected by server ({code}): {reason}")]
    Rejected { code: u16, reason: String },

    /// The server closed an established connection
    #[error("Disconnected by server (code {code:?}): {reason}")]
    Disconnected { code: Option<u16>, reason: String },

    /// Connection error
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Gave up after the configured number of reconnection attempts
    #[error("Failed to reconnect after {0} attempts")]
    ReconnectExhausted(u32),
}
