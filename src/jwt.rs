//! JWT token generation and validation.
//!
//! Access and refresh tokens are signed with separate secrets so that a leaked
//! access secret cannot be used to mint refresh tokens (and vice versa).

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived access token, stateless
    Access,
    /// Long-lived refresh token, stored in the user's session slot
    Refresh,
}

/// JWT claims shared by both token kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// JWT ID, random per token so two tokens issued in the same second differ
    pub jti: String,
    /// Subject (user UUID)
    pub sub: String,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Default access token duration: 15 minutes
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 15 * 60;

/// Default refresh token duration: 10 days
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 10 * 24 * 60 * 60;

/// Upper bound for either token lifetime: 10 years
pub const MAX_TOKEN_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Token lifetimes in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenDurations {
    pub access: u64,
    pub refresh: u64,
}

impl Default for TokenDurations {
    fn default() -> Self {
        Self {
            access: ACCESS_TOKEN_DURATION_SECS,
            refresh: REFRESH_TOKEN_DURATION_SECS,
        }
    }
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// Signs and validates access and refresh tokens.
pub struct TokenIssuer {
    access: SigningKeys,
    refresh: SigningKeys,
    durations: TokenDurations,
}

/// A freshly signed token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The JWT token string
    pub token: String,
    /// JWT ID
    pub jti: String,
    /// Issued at timestamp (Unix seconds)
    pub issued_at: u64,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

impl TokenIssuer {
    /// Create an issuer with the default token durations.
    pub fn new(access_secret: &[u8], refresh_secret: &[u8]) -> Result<Self, JwtError> {
        Self::with_durations(access_secret, refresh_secret, TokenDurations::default())
    }

    pub fn with_durations(
        access_secret: &[u8],
        refresh_secret: &[u8],
        durations: TokenDurations,
    ) -> Result<Self, JwtError> {
        if access_secret.is_empty() || refresh_secret.is_empty() {
            return Err(JwtError::MissingSecret);
        }
        if access_secret == refresh_secret {
            return Err(JwtError::SharedSecret);
        }
        let in_range = |secs: u64| (1..=MAX_TOKEN_DURATION_SECS).contains(&secs);
        if !in_range(durations.access) || !in_range(durations.refresh) {
            return Err(JwtError::InvalidDuration);
        }

        Ok(Self {
            access: SigningKeys::from_secret(access_secret),
            refresh: SigningKeys::from_secret(refresh_secret),
            durations,
        })
    }

    pub fn durations(&self) -> TokenDurations {
        self.durations
    }

    /// Generate an access token for a user.
    pub fn issue_access_token(&self, user_uuid: &str) -> Result<IssuedToken, JwtError> {
        issue(
            &self.access,
            user_uuid,
            TokenType::Access,
            self.durations.access,
        )
    }

    /// Generate a refresh token for a user.
    /// The caller is responsible for storing it in the user's session slot.
    pub fn issue_refresh_token(&self, user_uuid: &str) -> Result<IssuedToken, JwtError> {
        issue(
            &self.refresh,
            user_uuid,
            TokenType::Refresh,
            self.durations.refresh,
        )
    }

    /// Validate and decode an access token.
    pub fn validate_access_token(&self, token: &str) -> Result<Claims, JwtError> {
        validate(&self.access, token, TokenType::Access)
    }

    /// Validate and decode a refresh token.
    pub fn validate_refresh_token(&self, token: &str) -> Result<Claims, JwtError> {
        validate(&self.refresh, token, TokenType::Refresh)
    }

    /// Sign and validate one token of each kind.
    /// Run at startup so misconfigured signing material fails before serving.
    pub fn self_check(&self) -> Result<(), JwtError> {
        let probe = uuid::Uuid::nil().to_string();

        let access = self.issue_access_token(&probe)?;
        self.validate_access_token(&access.token)?;

        let refresh = self.issue_refresh_token(&probe)?;
        self.validate_refresh_token(&refresh.token)?;

        Ok(())
    }
}

fn now_secs() -> Result<u64, JwtError> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| JwtError::TimeError)?
        .as_secs())
}

fn issue(
    keys: &SigningKeys,
    user_uuid: &str,
    token_type: TokenType,
    duration: u64,
) -> Result<IssuedToken, JwtError> {
    let now = now_secs()?;
    let jti = uuid::Uuid::new_v4().to_string();
    // Expiry must also fit the signed 64-bit column it is stored in
    let exp = now
        .checked_add(duration)
        .filter(|exp| i64::try_from(*exp).is_ok())
        .ok_or(JwtError::InvalidDuration)?;

    let claims = Claims {
        jti: jti.clone(),
        sub: user_uuid.to_string(),
        token_type,
        iat: now,
        exp,
    };

    let token = jsonwebtoken::encode(&Header::default(), &claims, &keys.encoding)
        .map_err(JwtError::Encoding)?;

    Ok(IssuedToken {
        token,
        jti,
        issued_at: now,
        expires_at: exp,
        duration,
    })
}

fn validate(keys: &SigningKeys, token: &str, expected: TokenType) -> Result<Claims, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    let token_data = jsonwebtoken::decode::<Claims>(token, &keys.decoding, &validation)
        .map_err(JwtError::Decoding)?;

    if token_data.claims.token_type != expected {
        return Err(JwtError::WrongTokenType);
    }

    Ok(token_data.claims)
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Error decoding the token
    Decoding(jsonwebtoken::errors::Error),
    /// System time error
    TimeError,
    /// Wrong token type (e.g., using refresh token as access token)
    WrongTokenType,
    /// A signing secret is empty
    MissingSecret,
    /// Access and refresh tokens were configured with the same secret
    SharedSecret,
    /// A token lifetime is zero or too large to compute an expiry from
    InvalidDuration,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Decoding(e) => write!(f, "Failed to decode token: {}", e),
            JwtError::TimeError => write!(f, "System time error"),
            JwtError::WrongTokenType => write!(f, "Wrong token type"),
            JwtError::MissingSecret => write!(f, "Signing secret is empty"),
            JwtError::SharedSecret => {
                write!(f, "Access and refresh tokens must use different secrets")
            }
            JwtError::InvalidDuration => write!(
                f,
                "Token lifetime must be between 1 and {} seconds",
                MAX_TOKEN_DURATION_SECS
            ),
        }
    }
}

impl std::error::Error for JwtError {}
