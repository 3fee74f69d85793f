//! Authentication user types.

use crate::jwt::Claims;

/// Authenticated user information extracted from the access token.
/// Only the signature and expiry were checked; the user record was not loaded.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// JWT claims from the access token
    pub claims: Claims,
}

impl AuthenticatedUser {
    /// The user's UUID (token subject).
    pub fn user_uuid(&self) -> &str {
        &self.claims.sub
    }
}
