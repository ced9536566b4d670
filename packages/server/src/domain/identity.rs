//! Identity verification boundary.

use async_trait::async_trait;

use super::{AuthError, Principal};

/// Turns a credential presented at handshake time into a [`Principal`].
///
/// Any error means "unauthorized"; callers never retry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<Principal, AuthError>;
}
