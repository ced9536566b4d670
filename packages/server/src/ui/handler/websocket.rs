//! WebSocket connection handlers.

use std::{sync::Arc, time::Duration};

use axum::{
    extract::{
        Path, Query, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    domain::RoomId,
    fanout::{ConnectionHandle, Outbound},
    infrastructure::dto::websocket::{ErrorNotice, InboundMessage},
    ui::state::AppState,
};

/// How long the writer may take to flush pending frames after the connection closed.
const WRITER_GRACE: Duration = Duration::from_secs(5);

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub token: Option<String>,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<i64>,
    Query(query): Query<ConnectQuery>,
) -> impl IntoResponse {
    let room_id = RoomId::new(chat_id);
    ws.on_upgrade(move |socket| handle_socket(socket, state, room_id, query.token))
}

fn close_message(code: u16, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }))
}

/// Spawns a task that drains the connection's outbound channel into the socket.
///
/// Frames queued before the shutdown token is cancelled are still written.
/// The task cancels the token itself when the socket can no longer be written,
/// which stops the ingress loop.
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    mut sender: SplitSink<WebSocket, Message>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let outbound = tokio::select! {
                biased;
                outbound = rx.recv() => outbound,
                _ = shutdown.cancelled() => None,
            };

            match outbound {
                Some(Outbound::Text(text)) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    let _ = sender.send(close_message(code, &reason)).await;
                    break;
                }
                None => break,
            }
        }
        shutdown.cancel();
        let _ = sender.close().await;
    })
}

/// Reads client frames until the socket closes or the connection is told to stop.
///
/// Frames are handled one at a time, which keeps a publisher's messages in order.
async fn ingress_loop(
    mut receiver: SplitStream<WebSocket>,
    state: &AppState,
    handle: &ConnectionHandle,
    shutdown: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = receiver.next() => frame,
        };
        let msg = match frame {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                tracing::warn!("WebSocket error on connection {}: {}", handle.id(), e);
                break;
            }
            None => break,
        };

        match msg {
            Message::Text(text) => {
                let inbound = InboundMessage::parse(text.as_str());
                tracing::debug!(
                    "Received {} chars from connection {}",
                    inbound.content.chars().count(),
                    handle.id()
                );

                if let Err(e) = state
                    .send_message_usecase
                    .execute(handle, inbound.content)
                    .await
                {
                    tracing::warn!("Failed to send message from {}: {}", handle.id(), e);
                    let notice = ErrorNotice::new(e.code(), e.to_string());
                    match serde_json::to_string(&notice) {
                        Ok(json) => {
                            let _ = handle.push(&json);
                        }
                        Err(e) => tracing::warn!("Failed to encode error notice: {}", e),
                    }
                }
            }
            Message::Binary(_) => {
                tracing::debug!("Ignoring binary frame from {}", handle.id());
            }
            Message::Close(_) => {
                tracing::info!("Connection {} requested close", handle.id());
                break;
            }
            // Ping/pong is handled automatically by the WebSocket protocol
            _ => {}
        }
    }
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    room_id: RoomId,
    token: Option<String>,
) {
    let (mut sender, receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel();

    // Connecting → Authenticated → Authorized → Active
    let (mut lifecycle, handle) = match state
        .connect_participant_usecase
        .execute(room_id, token.as_deref(), tx)
        .await
    {
        Ok(active) => active,
        Err(e) => {
            tracing::warn!("Rejected connection to chat {}: {}", room_id, e);
            let _ = sender
                .send(close_message(e.close_code(), e.close_reason()))
                .await;
            let _ = sender.close().await;
            return;
        }
    };

    let shutdown = handle.shutdown_token();
    let mut send_task = pusher_loop(rx, sender, shutdown.clone());

    ingress_loop(receiver, &state, &handle, shutdown).await;

    // Active → Closed（leave はここで 1 回だけ実行される）
    lifecycle.close().await;

    if tokio::time::timeout(WRITER_GRACE, &mut send_task)
        .await
        .is_err()
    {
        tracing::warn!("Writer of connection {} did not finish, aborting", handle.id());
        send_task.abort();
    }
}
