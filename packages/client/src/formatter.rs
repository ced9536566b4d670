//! Message formatting utilities for client display.

use hiroba_shared::time::timestamp_to_rfc3339;

const RULE: &str = "------------------------------------------------------------";

/// Message formatter for client display
pub struct MessageFormatter;

impl MessageFormatter {
    /// Banner shown once a chat connection is established
    pub fn format_connected(chat_id: i64) -> String {
        format!(
            "\n============================================================\n\
             Joined chat {}. Type messages and press Enter to send. Press Ctrl+C to exit.\n\
             ============================================================\n",
            chat_id
        )
    }

    /// Format a chat message
    ///
    /// # Arguments
    ///
    /// * `from` - Username of the sender
    /// * `content` - The message content
    /// * `sent_at` - Unix timestamp when the message was persisted (milliseconds)
    pub fn format_chat_message(from: &str, content: &str, sent_at: i64) -> String {
        let timestamp_str = timestamp_to_rfc3339(sent_at);
        format!(
            "\n\n{rule}\n@{}: {}\nsent at {}\n{rule}\n",
            from,
            content,
            timestamp_str,
            rule = RULE
        )
    }

    /// Format an error notice about one of our own messages
    pub fn format_error_notice(code: &str, message: &str) -> String {
        format!("\n! message not sent [{}]: {}\n", code, message)
    }

    /// Format a binary message notification
    pub fn format_binary_message(byte_count: usize) -> String {
        format!("\n← Received {} bytes of binary data\n", byte_count)
    }

    /// Format a raw text message (when parsing fails)
    pub fn format_raw_message(text: &str) -> String {
        format!("\n← Received: {}\n", text)
    }
}
