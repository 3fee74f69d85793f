//! Login, refresh and logout.
//!
//! Refresh runs through these checks in order, and any failure ends the
//! request with no write to the session store:
//!
//! 1. a `refreshToken` cookie is present
//! 2. its signature, type and expiry are valid
//! 3. its subject is an existing user
//! 4. it is byte-identical to the token stored in that user's slot
//! 5. a new pair is issued and the slot is swapped with compare-and-set
//!
//! Step 4 is what makes refresh tokens single-use: once exchanged, the old
//! token no longer matches the slot. Step 5 repeats the comparison atomically
//! so two concurrent refreshes of the same token cannot both win.

use std::sync::Arc;

use axum::http::HeaderMap;
use tracing::{debug, info, warn};

use crate::auth::{CookieTransport, REFRESH_COOKIE_NAME, get_cookie};
use crate::db::{Database, User};
use crate::jwt::{IssuedToken, JwtError, TokenIssuer};
use crate::password::{self, PasswordError};

/// Successful login: the access token goes in the body, the cookies in the headers.
pub struct LoginOutcome {
    pub user: User,
    pub access_token: IssuedToken,
    pub cookies: HeaderMap,
}

/// Successful refresh.
pub struct RefreshOutcome {
    pub access_token: IssuedToken,
    pub cookies: HeaderMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshRejection {
    /// No refresh cookie on the request
    MissingCookie,
    /// Bad signature, wrong type, or expired
    InvalidToken,
    /// The subject no longer exists
    UnknownUser,
    /// Well-formed but not the token currently stored for the user
    TokenReused,
}

impl RefreshRejection {
    pub fn message(&self) -> &'static str {
        match self {
            RefreshRejection::MissingCookie => "Unauthorized request",
            RefreshRejection::InvalidToken | RefreshRejection::UnknownUser => {
                "Invalid Refresh Token"
            }
            RefreshRejection::TokenReused => "Refreshed token is expired or used",
        }
    }
}

#[derive(Debug)]
pub enum SessionError {
    /// No user with this email
    NotFound,
    /// Wrong password
    InvalidCredentials,
    /// Refresh token rejected
    Unauthorized(RefreshRejection),
    Signing(JwtError),
    Password(PasswordError),
    Database(sqlx::Error),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::NotFound => write!(f, "User not found"),
            SessionError::InvalidCredentials => write!(f, "Invalid user credentials"),
            SessionError::Unauthorized(reason) => write!(f, "{}", reason.message()),
            SessionError::Signing(e) => write!(f, "Token signing failed: {}", e),
            SessionError::Password(e) => write!(f, "{}", e),
            SessionError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<JwtError> for SessionError {
    fn from(e: JwtError) -> Self {
        SessionError::Signing(e)
    }
}

impl From<PasswordError> for SessionError {
    fn from(e: PasswordError) -> Self {
        SessionError::Password(e)
    }
}

impl From<sqlx::Error> for SessionError {
    fn from(e: sqlx::Error) -> Self {
        SessionError::Database(e)
    }
}

/// Composes the token issuer, the session store and the cookie transport.
#[derive(Clone)]
pub struct SessionService {
    db: Database,
    jwt: Arc<TokenIssuer>,
    cookies: CookieTransport,
}

impl SessionService {
    pub fn new(db: Database, jwt: Arc<TokenIssuer>, cookies: CookieTransport) -> Self {
        Self { db, jwt, cookies }
    }

    pub fn cookies(&self) -> &CookieTransport {
        &self.cookies
    }

    /// Verify email and password, then start a session.
    /// Any previously stored refresh token is replaced.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, SessionError> {
        let user = self
            .db
            .users()
            .get_by_email(email)
            .await?
            .ok_or(SessionError::NotFound)?;

        if !password::verify_password(&user.password_hash, password).await? {
            debug!(user = %user.uuid, "Wrong password");
            return Err(SessionError::InvalidCredentials);
        }

        let access_token = self.jwt.issue_access_token(&user.uuid)?;
        let refresh_token = self.jwt.issue_refresh_token(&user.uuid)?;

        let stored = self
            .db
            .sessions()
            .set(&user.uuid, &refresh_token.token, refresh_token.expires_at)
            .await?;
        if !stored {
            // Deleted between lookup and write
            return Err(SessionError::NotFound);
        }

        let mut cookies = HeaderMap::new();
        self.cookies
            .set_refresh_cookie(&mut cookies, &refresh_token.token);

        info!(user = %user.uuid, "Logged in");

        Ok(LoginOutcome {
            user,
            access_token,
            cookies,
        })
    }

    /// Exchange the refresh cookie on `headers` for a new token pair.
    pub async fn refresh(&self, headers: &HeaderMap) -> Result<RefreshOutcome, SessionError> {
        let presented = get_cookie(headers, REFRESH_COOKIE_NAME)
            .filter(|token| !token.is_empty())
            .ok_or(SessionError::Unauthorized(RefreshRejection::MissingCookie))?;

        let claims = self.jwt.validate_refresh_token(presented).map_err(|e| {
            debug!(error = %e, "Rejected refresh token");
            SessionError::Unauthorized(RefreshRejection::InvalidToken)
        })?;

        let user = self
            .db
            .users()
            .get_by_uuid(&claims.sub)
            .await?
            .ok_or(SessionError::Unauthorized(RefreshRejection::UnknownUser))?;

        let stored = self.db.sessions().get(&user.uuid).await?;
        if stored.as_deref() != Some(presented) {
            warn!(user = %user.uuid, "Refresh token is not the current one (reused or logged out)");
            return Err(SessionError::Unauthorized(RefreshRejection::TokenReused));
        }

        let access_token = self.jwt.issue_access_token(&user.uuid)?;
        let refresh_token = self.jwt.issue_refresh_token(&user.uuid)?;

        let rotated = self
            .db
            .sessions()
            .rotate(
                &user.uuid,
                presented,
                &refresh_token.token,
                refresh_token.expires_at,
            )
            .await?;
        if !rotated {
            warn!(user = %user.uuid, "Lost concurrent refresh race");
            return Err(SessionError::Unauthorized(RefreshRejection::TokenReused));
        }

        let mut cookies = HeaderMap::new();
        self.cookies
            .set_refresh_cookie(&mut cookies, &refresh_token.token);

        debug!(user = %user.uuid, "Rotated refresh token");

        Ok(RefreshOutcome {
            access_token,
            cookies,
        })
    }

    /// End the user's session. Safe to call when already logged out.
    pub async fn logout(&self, user_uuid: &str) -> Result<HeaderMap, SessionError> {
        self.db.sessions().clear(user_uuid).await?;

        let mut cookies = HeaderMap::new();
        self.cookies.clear_refresh_cookie(&mut cookies);

        info!(user = %user_uuid, "Logged out");

        Ok(cookies)
    }
}
