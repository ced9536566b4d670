//! HTTP and WebSocket handlers.

mod http;
mod websocket;

pub use http::{
    create_chat, debug_rooms, get_chat_history, health_check, list_chats, search_messages,
    search_users,
};
pub use websocket::websocket_handler;
