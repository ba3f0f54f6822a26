//! Authentication Middleware
//! Protects routes by requiring a valid access token

use crate::api::ApiError;
use crate::auth::{authority::TokenAuthority, errors::AuthError, models::TokenType};
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

/// Validates the bearer access token, loads the live account behind it, and stores both
/// the `Claims` and the `User` in request extensions.
pub async fn auth_middleware(
    State(authority): State<Arc<TokenAuthority>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers());

    let claims = authority
        .verify(token, TokenType::Access)
        .map_err(|e| {
            if !matches!(e, AuthError::TokenMissing) {
                warn!(path = %req.uri().path(), "Rejected access token: {}", e);
            }
            e
        })?;

    // Deleted or deactivated accounts lose access before their tokens expire.
    let user = authority.current_user(&claims)?;

    req.extensions_mut().insert(claims);
    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}

/// Token from an `Authorization: Bearer <token>` header. The scheme is case-insensitive.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;

    if scheme.eq_ignore_ascii_case("bearer") {
        Some(token.trim())
    } else {
        None
    }
}
