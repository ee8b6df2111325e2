//! Bearer token extractor.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use teleserve_core::{Claims, TokenType};

use crate::error::HttpError;
use crate::state::SharedState;

/// The caller identified by a valid access token.
///
/// Rejects with 401 when the `Authorization: Bearer` header is missing, the
/// token does not verify, or it is a refresh token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub claims: Claims,
}

impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = HttpError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| HttpError::unauthorized("Not authenticated"))?;
        let claims = state.tokens.decode_typed(token, TokenType::Access)?;
        Ok(Self {
            user_id: claims.user_id.clone(),
            claims,
        })
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
