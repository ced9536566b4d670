//! Domain layer for the chat relay.
//!
//! This module contains entities, value objects and the collaborator traits
//! (persistence, broker, identity, search) the rest of the server depends on.
//! It is independent of DTOs and infrastructure concerns.

pub mod broker;
pub mod entity;
pub mod error;
pub mod identity;
pub mod repository;
pub mod search;
pub mod value_object;

pub use broker::{BrokerSubscription, MessageBroker, room_topic};
pub use entity::{ChatMessage, ChatRoom, MessageHit, Principal, UserProfile};
pub use error::{AuthError, BrokerError, RepositoryError, SearchError, ValueObjectError};
pub use identity::IdentityVerifier;
pub use repository::ChatRepository;
pub use search::SearchIndex;
pub use value_object::{MessageContent, MessageId, RoomId, Timestamp, UserId};

#[cfg(test)]
pub use identity::MockIdentityVerifier;
#[cfg(test)]
pub use repository::MockChatRepository;
#[cfg(test)]
pub use search::MockSearchIndex;
