//! Request-boundary gate for protected routes.
//!
//! The middleware only allows or denies: it verifies the bearer token and
//! attaches the resulting [`Identity`] to the request extensions, where
//! handlers pick it up through the `Identity` extractor.

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::error::GuardError;
use super::token::{Identity, TokenService};
use crate::api::error::ApiError;
use crate::AppState;

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, GuardError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(GuardError::MissingCredential)?;

    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or(GuardError::MissingCredential)?;

    if token.is_empty() {
        return Err(GuardError::MissingCredential);
    }
    Ok(token)
}

pub fn authenticate(tokens: &TokenService, headers: &HeaderMap) -> Result<Identity, GuardError> {
    let token = bearer_token(headers)?;
    Ok(tokens.verify(token)?)
}

/// Auth middleware that validates bearer tokens
pub async fn require_identity(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    match authenticate(&state.tokens, request.headers()) {
        Ok(identity) => {
            tracing::debug!(user_id = identity.id, username = %identity.username, "Request authenticated");
            request.extensions_mut().insert(identity);
            Ok(next.run(request).await)
        }
        Err(e) => {
            tracing::warn!(
                reason = e.kind(),
                path = %request.uri().path(),
                "Rejected unauthenticated request"
            );
            Err(e.into())
        }
    }
}

/// Extractor for the identity attached by [`require_identity`]
#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Not authenticated"))
    }
}
