//! Multi-instance WebSocket chat relay.
//!
//! Clients join chat rooms over WebSocket. Each server instance keeps the
//! sockets connected to it and relays room messages through a shared
//! publish/subscribe broker, so members connected to different instances see
//! the same conversation.

// layers
pub mod config;
pub mod domain;
pub mod fanout;
pub mod infrastructure;
pub mod ui;
pub mod usecase;
