//! Client execution logic with reconnection support.

use std::time::Duration;

use super::{
    domain::{chat_url, should_attempt_reconnect, should_exit_immediately},
    error::ClientError,
    session::run_client_session,
    ui::spawn_line_reader,
};

const MAX_RECONNECT_ATTEMPTS: u32 = 5;
const RECONNECT_INTERVAL_SECS: u64 = 5;

/// Run the WebSocket client with reconnection logic
///
/// Returns once the user ends the input, or with an error when the server
/// rejects the connection or reconnecting keeps failing.
pub async fn run_client(base_url: String, chat_id: i64, token: String) -> Result<(), ClientError> {
    let url = chat_url(&base_url, chat_id, &token);
    let prompt = format!("chat {}> ", chat_id);
    let mut input = spawn_line_reader(prompt.clone());
    let mut reconnect_count = 0;

    loop {
        tracing::info!(
            "Attempting to connect to chat {} on {} (attempt {}/{})",
            chat_id,
            base_url,
            reconnect_count + 1,
            MAX_RECONNECT_ATTEMPTS + 1
        );

        let error = match run_client_session(&url, chat_id, &prompt, &mut input).await {
            Ok(()) => {
                tracing::info!("Client session ended normally");
                return Ok(());
            }
            Err(e) => e,
        };

        if should_exit_immediately(&error) {
            tracing::error!("{}", error);
            return Err(error);
        }

        tracing::warn!("Connection lost: {}", error);
        if !should_attempt_reconnect(&error, reconnect_count, MAX_RECONNECT_ATTEMPTS) {
            return Err(ClientError::ReconnectExhausted(MAX_RECONNECT_ATTEMPTS));
        }
        reconnect_count += 1;

        tracing::info!(
            "Reconnecting in {} seconds... (retry {}/{})",
            RECONNECT_INTERVAL_SECS,
            reconnect_count,
            MAX_RECONNECT_ATTEMPTS
        );
        tokio::time::sleep(Duration::from_secs(RECONNECT_INTERVAL_SECS)).await;
    }
}
