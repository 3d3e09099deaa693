//! Bearer authentication for the admin and dev surfaces.

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{HeaderValue, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};

use super::{TokenHasher, parse_token};
use crate::clock::Clock;
use crate::server::AppState;
use crate::server::response::ApiError;
use crate::store::Store;
use crate::types::Token;

/// Extractor that rejects the request unless it carries a valid admin token.
pub struct RequireAdmin(pub Token);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    Missing,
    WrongScheme,
    Invalid,
    Expired,
    Unavailable,
}

impl AuthError {
    fn message(self) -> &'static str {
        match self {
            AuthError::Missing => "Authentication required",
            AuthError::WrongScheme => "Invalid authorization scheme",
            AuthError::Invalid => "Invalid token",
            AuthError::Expired => "Token expired",
            AuthError::Unavailable => "Internal server error",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if self == AuthError::Unavailable {
            return ApiError::internal(self.message()).into_response();
        }
        let mut response = ApiError::new(StatusCode::UNAUTHORIZED, self.message()).into_response();
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Bearer realm=\"rafflebox\""),
        );
        response
    }
}

/// Pulls the token out of an `Authorization: Bearer ...` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let token = header
        .ok_or(AuthError::Missing)?
        .strip_prefix("Bearer ")
        .ok_or(AuthError::WrongScheme)?
        .trim();
    if token.is_empty() {
        return Err(AuthError::Missing);
    }
    Ok(token)
}

/// Resolves a raw token to its stored row and records the use.
pub fn authenticate(store: &dyn Store, raw: &str, now: DateTime<Utc>) -> Result<Token, AuthError> {
    let parts = parse_token(raw).map_err(|_| AuthError::Invalid)?;

    let token = store
        .get_token_by_lookup(parts.lookup)
        .map_err(|e| {
            tracing::error!("Token lookup failed: {e}");
            AuthError::Unavailable
        })?
        .ok_or(AuthError::Invalid)?;

    let matches = TokenHasher::new()
        .verify(raw, &token.token_hash)
        .map_err(|e| {
            tracing::error!(token_id = %token.id, "Token verification failed: {e}");
            AuthError::Unavailable
        })?;
    if !matches {
        return Err(AuthError::Invalid);
    }

    if token.expires_at.is_some_and(|expires_at| expires_at <= now) {
        return Err(AuthError::Expired);
    }

    if let Err(e) = store.update_token_last_used(&token.id, now) {
        tracing::warn!("Failed to update token last_used_at: {e}");
    }

    Ok(token)
}

impl FromRequestParts<Arc<AppState>> for RequireAdmin {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        let raw = bearer_token(header)?;
        authenticate(state.store.as_ref(), raw, state.clock.now()).map(RequireAdmin)
    }
}
