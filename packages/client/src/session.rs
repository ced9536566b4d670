//! WebSocket client session management.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

use crate::{
    domain::{ServerFrame, classify_close, parse_frame},
    error::ClientError,
};

use super::{formatter::MessageFormatter, ui::redisplay_prompt};

fn render(text: &str) -> String {
    match parse_frame(text) {
        ServerFrame::Chat(chat) => {
            MessageFormatter::format_chat_message(&chat.sender, &chat.content, chat.timestamp)
        }
        ServerFrame::Error(notice) => {
            MessageFormatter::format_error_notice(&notice.code, &notice.message)
        }
        ServerFrame::Raw(raw) => MessageFormatter::format_raw_message(&raw),
    }
}

/// Run one WebSocket client session
///
/// # Returns
///
/// * `Ok(())` - The user ended the input (Ctrl+C / Ctrl+D)
/// * `Err(ClientError)` - The connection failed or was closed by the server
pub async fn run_client_session(
    url: &str,
    chat_id: i64,
    prompt: &str,
    input: &mut mpsc::UnboundedReceiver<String>,
) -> Result<(), ClientError> {
    let (ws_stream, _response) = connect_async(url)
        .await
        .map_err(|e| ClientError::ConnectionError(e.to_string()))?;

    tracing::info!("Connected to chat server!");
    print!("{}", MessageFormatter::format_connected(chat_id));
    redisplay_prompt(prompt);

    let (mut write, mut read) = ws_stream.split();

    // Spawn a task to handle incoming messages
    let prompt_for_read = prompt.to_string();
    let mut read_task = tokio::spawn(async move {
        while let Some(message) = read.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    print!("{}", render(text.as_str()));
                    redisplay_prompt(&prompt_for_read);
                }
                Ok(Message::Binary(data)) => {
                    print!("{}", MessageFormatter::format_binary_message(data.len()));
                    redisplay_prompt(&prompt_for_read);
                }
                Ok(Message::Close(frame)) => {
                    let (code, reason) = frame
                        .map(|f| (Some(u16::from(f.code)), f.reason.as_str().to_string()))
                        .unwrap_or((None, String::new()));
                    tracing::info!("Server closed the connection ({:?}): {}", code, reason);
                    return classify_close(code, &reason);
                }
                Err(e) => {
                    tracing::warn!("WebSocket read error: {}", e);
                    return ClientError::ConnectionError(e.to_string());
                }
                _ => {}
            }
        }
        ClientError::Disconnected {
            code: None,
            reason: "connection closed".to_string(),
        }
    });

    loop {
        tokio::select! {
            result = &mut read_task => {
                return Err(result.unwrap_or_else(|e| ClientError::ConnectionError(e.to_string())));
            }
            line = input.recv() => {
                let Some(line) = line else {
                    // Ctrl+C / Ctrl+D
                    read_task.abort();
                    let _ = write.close().await;
                    return Ok(());
                };

                let json = serde_json::json!({ "content": line }).to_string();
                if let Err(e) = write.send(Message::Text(json.into())).await {
                    tracing::warn!("Failed to send message: {}", e);
                    read_task.abort();
                    return Err(ClientError::ConnectionError(e.to_string()));
                }
                redisplay_prompt(prompt);
            }
        }
    }
}
