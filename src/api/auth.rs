//! Account and session endpoints.
//!
//! - POST `/register` - Create an account
//! - POST `/login` - Verify credentials, return an access token and set the refresh cookie
//! - POST `/refresh-token` - Exchange the refresh cookie for a new token pair
//! - POST `/logout` - Clear the stored refresh token and the cookie (Bearer required)
//! - GET `/me` - Current user (Bearer required)

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::error::{ApiError, ResultExt};
use super::validation::Validator;
use crate::auth::BearerAuth;
use crate::db::{Database, NewUser, PublicUser};
use crate::impl_has_auth_backend;
use crate::jwt::TokenIssuer;
use crate::password;
use crate::rate_limit::{RateLimitConfig, rate_limit_login, rate_limit_register};
use crate::session::{SessionError, SessionService};

#[derive(Clone)]
pub struct AuthState {
    pub db: Database,
    pub jwt: Arc<TokenIssuer>,
    pub sessions: SessionService,
    /// Answer unknown emails with 404 instead of the generic 401
    pub verbose_auth_errors: bool,
}

impl_has_auth_backend!(AuthState);

pub fn router(state: AuthState, rate_limit: Option<Arc<RateLimitConfig>>) -> Router {
    let mut register_routes = Router::new()
        .route("/register", post(register))
        .with_state(state.clone());
    let mut login_routes = Router::new()
        .route("/login", post(login))
        .with_state(state.clone());

    if let Some(config) = rate_limit {
        register_routes = register_routes.layer(middleware::from_fn_with_state(
            config.clone(),
            rate_limit_register,
        ));
        login_routes = login_routes.layer(middleware::from_fn_with_state(config, rate_limit_login));
    }

    Router::new()
        .route("/refresh-token", post(refresh_token))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .with_state(state)
        .merge(register_routes)
        .merge(login_routes)
}

impl AuthState {
    fn session_error(&self, e: SessionError) -> ApiError {
        match e {
            SessionError::NotFound if self.verbose_auth_errors => {
                ApiError::not_found("User is not exist")
            }
            SessionError::NotFound | SessionError::InvalidCredentials => {
                ApiError::unauthorized("Invalid user credentials")
            }
            SessionError::Unauthorized(reason) => ApiError::unauthorized(reason.message()),
            SessionError::Signing(e) => ApiError::internal_error("Failed to generate token", e),
            SessionError::Password(e) => ApiError::internal_error("Failed to verify password", e),
            SessionError::Database(e) => ApiError::db_error("Session storage failed", e),
        }
    }
}

#[derive(Deserialize)]
struct RegisterRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterResponse {
    created_user: PublicUser,
    message: &'static str,
}

async fn register(
    State(state): State<AuthState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = payload.name.trim();
    let email = payload.email.trim();

    Validator::new()
        .name(name)
        .email(email)
        .password(&payload.password)
        .finish()?;

    let available = state
        .db
        .users()
        .is_email_available(email)
        .await
        .db_err("Failed to check email availability")?;

    if !available {
        return Err(ApiError::bad_request("User already exists"));
    }

    let password_hash = password::hash_password(&payload.password)
        .await
        .internal_err("Failed to hash password")?;

    let uuid = uuid::Uuid::new_v4().to_string();
    let created = state
        .db
        .users()
        .create(&NewUser {
            uuid: &uuid,
            name,
            email,
            password_hash: &password_hash,
        })
        .await;

    match created {
        Ok(_) => {}
        // Lost a race with a concurrent registration of the same email
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(ApiError::bad_request("User already exists"));
        }
        Err(e) => return Err(ApiError::db_error("Failed to create user", e)),
    }

    let user = state
        .db
        .users()
        .get_by_uuid(&uuid)
        .await
        .db_err("Failed to load created user")?
        .ok_or_else(|| ApiError::internal("Something went wrong while registering the user"))?;

    info!(user = %user.uuid, "Registered user");

    Ok((
        StatusCode::OK,
        Json(RegisterResponse {
            created_user: user.into(),
            message: "User registration successful.",
        }),
    ))
}

#[derive(Deserialize)]
struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    user: PublicUser,
    access_token: String,
    message: &'static str,
}

async fn login(
    State(state): State<AuthState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = payload.email.trim();

    Validator::new().email(email).finish()?;

    let outcome = state
        .sessions
        .login(email, &payload.password)
        .await
        .map_err(|e| state.session_error(e))?;

    Ok((
        StatusCode::OK,
        outcome.cookies,
        Json(LoginResponse {
            user: outcome.user.into(),
            access_token: outcome.access_token.token,
            message: "Login successful.",
        }),
    ))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
    message: &'static str,
}

async fn refresh_token(
    State(state): State<AuthState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .sessions
        .refresh(&headers)
        .await
        .map_err(|e| state.session_error(e))?;

    Ok((
        StatusCode::OK,
        outcome.cookies,
        Json(RefreshResponse {
            access_token: outcome.access_token.token,
            message: "Access token refreshed",
        }),
    ))
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

async fn logout(
    State(state): State<AuthState>,
    BearerAuth(auth): BearerAuth,
) -> Result<impl IntoResponse, ApiError> {
    let cookies = state
        .sessions
        .logout(auth.user_uuid())
        .await
        .map_err(|e| state.session_error(e))?;

    Ok((
        StatusCode::OK,
        cookies,
        Json(MessageResponse {
            message: "User Logged Out.",
        }),
    ))
}

#[derive(Serialize)]
struct MeResponse {
    user: PublicUser,
}

async fn me(
    State(state): State<AuthState>,
    BearerAuth(auth): BearerAuth,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .users()
        .get_by_uuid(auth.user_uuid())
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(MeResponse { user: user.into() }))
}
