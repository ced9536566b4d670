//! JWT based identity verification.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;

use crate::domain::{AuthError, IdentityVerifier, Principal, UserId};

/// Claims read from an identity token.
#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    preferred_username: Option<String>,
}

/// Verifies signed JWTs and maps their claims to a [`Principal`].
///
/// `exp` is mandatory, the audience is not checked.
pub struct JwtIdentityVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityVerifier {
    fn new(key: DecodingKey, algorithm: Algorithm) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);
        Self { key, validation }
    }

    /// HS256 with a shared secret.
    pub fn hs256(secret: &[u8]) -> Self {
        Self::new(DecodingKey::from_secret(secret), Algorithm::HS256)
    }

    /// RS256 with a PEM encoded public key.
    pub fn rs256_pem(pem: &[u8]) -> Result<Self, AuthError> {
        let key = DecodingKey::from_rsa_pem(pem)
            .map_err(|e| AuthError::InvalidToken(format!("invalid RSA public key: {}", e)))?;
        Ok(Self::new(key, Algorithm::RS256))
    }
}

#[async_trait]
impl IdentityVerifier for JwtIdentityVerifier {
    async fn verify(&self, credential: &str) -> Result<Principal, AuthError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(AuthError::MissingCredential);
        }

        let data = decode::<Claims>(credential, &self.key, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        let Claims {
            sub,
            preferred_username,
        } = data.claims;
        let username = preferred_username
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| sub.clone());
        let user_id = UserId::new(sub).map_err(|e| AuthError::InvalidIdentity(e.to_string()))?;

        Ok(Principal::new(user_id, username))
    }
}
