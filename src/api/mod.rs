mod auth;
mod error;
mod validation;

use axum::Router;
use std::sync::Arc;

use crate::db::Database;
use crate::jwt::TokenIssuer;
use crate::rate_limit::RateLimitConfig;
use crate::session::SessionService;

pub use auth::AuthState;
pub use error::{ApiError, ResultExt};
pub use validation::{FieldError, Validator};

/// Create the API router.
pub fn create_api_router(
    db: Database,
    jwt: Arc<TokenIssuer>,
    sessions: SessionService,
    verbose_auth_errors: bool,
    rate_limit: Option<Arc<RateLimitConfig>>,
) -> Router {
    let auth_state = auth::AuthState {
        db,
        jwt,
        sessions,
        verbose_auth_errors,
    };

    Router::new().nest("/auth", auth::router(auth_state, rate_limit))
}
