//! UseCase 層
//!
//! ドメインの trait（Repository, Broker, IdentityVerifier, SearchIndex）と
//! fan-out コアを組み合わせてアプリケーションの操作を実装する。

pub mod chat_directory;
pub mod chat_history;
pub mod connect_participant;
pub mod error;
pub mod lifecycle;
pub mod send_message;

pub use chat_directory::{CreateDirectChatUseCase, ListChatsUseCase, RegisterUserUseCase};
pub use chat_history::{GetChatHistoryUseCase, SearchMessagesUseCase, SearchUsersUseCase};
pub use connect_participant::ConnectParticipantUseCase;
pub use error::{ChatQueryError, ConnectError, SendMessageError};
pub use lifecycle::{ConnectionLifecycle, ConnectionState};
pub use send_message::SendMessageUseCase;
