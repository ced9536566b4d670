//! Data Transfer Objects (DTOs) for the chat relay.
//!
//! DTOs are organized by protocol:
//! - `websocket`: WebSocket frame DTOs
//! - `broker`: payloads carried on broker topics
//! - `http`: HTTP API request/response DTOs

pub mod broker;
pub mod conversion;
pub mod http;
pub mod websocket;
