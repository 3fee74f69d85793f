//! Axum extractors for authentication.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};

use super::errors::{ApiAuthError, AuthErrorKind};
use super::state::HasAuthBackend;
use super::types::AuthenticatedUser;

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Extractor for API endpoints that require a valid access token.
/// Checks signature, expiry and token type only; it never consults the
/// session store and never refreshes. Clients refresh on 401 themselves.
pub struct BearerAuth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for BearerAuth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ApiAuthError::new(AuthErrorKind::NotAuthenticated))?;

        let claims = state.jwt().validate_access_token(token).map_err(|e| {
            tracing::debug!(error = %e, "Rejected access token");
            ApiAuthError::new(AuthErrorKind::InvalidToken)
        })?;

        Ok(BearerAuth(AuthenticatedUser { claims }))
    }
}
