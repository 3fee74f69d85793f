pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod client;
pub mod db;
pub mod jwt;
pub mod password;
pub mod rate_limit;
pub mod session;

use api::create_api_router;
use auth::CookieTransport;
use axum::Router;
use cli::Environment;
use db::Database;
use jwt::{JwtError, TokenDurations, TokenIssuer};
use rate_limit::RateLimitConfig;
use session::SessionService;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secret for signing access tokens
    pub access_secret: Vec<u8>,
    /// Secret for signing refresh tokens, distinct from the access secret
    pub refresh_secret: Vec<u8>,
    pub token_durations: TokenDurations,
    /// Decides the refresh cookie's Secure and SameSite attributes
    pub environment: Environment,
    /// Refresh cookie Max-Age in seconds
    pub cookie_max_age: u64,
    /// Take the client IP from X-Forwarded-For
    pub trust_proxy: bool,
    /// Answer logins for unknown emails with 404 instead of the generic 401
    pub verbose_auth_errors: bool,
    /// Whether to rate limit login and registration
    pub rate_limit: bool,
}

impl ServerConfig {
    /// Build the token issuer described by this configuration.
    pub fn token_issuer(&self) -> Result<TokenIssuer, JwtError> {
        TokenIssuer::with_durations(
            &self.access_secret,
            &self.refresh_secret,
            self.token_durations,
        )
    }
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Result<Router, JwtError> {
    let jwt = Arc::new(config.token_issuer()?);
    let cookies = CookieTransport::new(config.environment, config.cookie_max_age);
    let sessions = SessionService::new(config.db.clone(), jwt.clone(), cookies);

    let rate_limit = config
        .rate_limit
        .then(|| Arc::new(RateLimitConfig::new(config.trust_proxy)));

    Ok(create_api_router(
        config.db.clone(),
        jwt,
        sessions,
        config.verbose_auth_errors,
        rate_limit,
    ))
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(db: &Database) {
    cleanup::run_cleanup(db).await;
    cleanup::spawn_cleanup_scheduler(db.clone());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config).map_err(std::io::Error::other)?;
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    init_cleanup(&config.db).await;

    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
