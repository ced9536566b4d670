//! Request extractors.

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
};

use crate::{domain::Principal, ui::state::AppState, usecase::ChatQueryError};

/// Caller authenticated with `Authorization: Bearer <token>`.
///
/// Extraction registers the user on first sight.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Principal);

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

impl FromRequestParts<Arc<AppState>> for AuthenticatedUser {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Err((
                StatusCode::UNAUTHORIZED,
                "missing bearer token".to_string(),
            ));
        };

        match state.register_user_usecase.execute(token).await {
            Ok(principal) => Ok(Self(principal)),
            Err(ChatQueryError::Unauthorized(e)) => {
                tracing::warn!("Rejected HTTP credential: {}", e);
                Err((StatusCode::UNAUTHORIZED, "invalid token".to_string()))
            }
            Err(e) => {
                tracing::error!("Failed to register user: {}", e);
                Err((
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/chat/chats/");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token_parsing() {
        // テスト項目: Bearer スキームのトークンだけが取り出される
        // given (前提条件):
        let valid = parts_with(Some("Bearer abc.def"));
        let lowercase = parts_with(Some("bearer xyz"));
        let basic = parts_with(Some("Basic dXNlcjpwYXNz"));
        let empty = parts_with(Some("Bearer   "));
        let missing = parts_with(None);

        // when (操作):
        let tokens = [
            bearer_token(&valid),
            bearer_token(&lowercase),
            bearer_token(&basic),
            bearer_token(&empty),
            bearer_token(&missing),
        ];

        // then (期待する結果):
        assert_eq!(tokens, [Some("abc.def"), Some("xyz"), None, None, None]);
    }
}
