//! Domain error types.
//!
//! One enum per collaborator boundary. Use cases translate these into their
//! own error types.

use thiserror::Error;

use super::value_object::RoomId;

/// Validation errors raised by value objects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueObjectError {
    #[error("user id must not be empty")]
    EmptyUserId,

    #[error("user id is too long ({actual} > {max} characters)")]
    UserIdTooLong { max: usize, actual: usize },

    #[error("message content must not be empty")]
    EmptyContent,

    #[error("message content is too long ({actual} > {max} characters)")]
    ContentTooLong { max: usize, actual: usize },
}

/// Errors returned by the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("user '{0}' is not registered")]
    UserNotFound(String),

    #[error("chat {0} does not exist")]
    RoomNotFound(RoomId),

    #[error("invalid participants: {0}")]
    InvalidParticipants(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Errors returned by the publish/subscribe broker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("failed to publish to '{topic}': {reason}")]
    PublishFailed { topic: String, reason: String },

    #[error("failed to subscribe to '{topic}': {reason}")]
    SubscribeFailed { topic: String, reason: String },

    #[error("subscription to '{0}' was closed")]
    SubscriptionClosed(String),

    #[error("broker unavailable: {0}")]
    Unavailable(String),
}

/// Errors returned by the search collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error("search index unavailable: {0}")]
    Unavailable(String),
}

/// Errors returned by the identity verification collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("credential is missing")]
    MissingCredential,

    #[error("credential is invalid: {0}")]
    InvalidToken(String),

    #[error("credential carries an invalid identity: {0}")]
    InvalidIdentity(String),
}
