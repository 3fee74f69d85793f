//! Rate limiting for authentication endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to prevent brute force attacks.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};

use crate::auth::extract_client_ip;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

const LOGIN_PER_SEC: NonZeroU32 = NonZeroU32::new(1).unwrap();
const LOGIN_BURST: NonZeroU32 = NonZeroU32::new(5).unwrap();
const REGISTER_PER_MIN: NonZeroU32 = NonZeroU32::new(3).unwrap();

/// Rate limiting configuration for authentication endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Per-IP limiter for login (strict: 5 requests per 5 seconds)
    pub login: Arc<IpLimiter>,
    /// Per-IP limiter for registration (strict: 3 requests per minute)
    pub register: Arc<IpLimiter>,
    /// Whether the client IP comes from X-Forwarded-For
    pub trust_proxy: bool,
}

impl RateLimitConfig {
    pub fn new(trust_proxy: bool) -> Self {
        Self {
            // Login: 1 request per second per IP, bursts of 5 (prevents password guessing)
            login: Arc::new(RateLimiter::keyed(
                Quota::per_second(LOGIN_PER_SEC).allow_burst(LOGIN_BURST),
            )),
            // Registration: 3 requests per minute per IP (prevents spam)
            register: Arc::new(RateLimiter::keyed(Quota::per_minute(REGISTER_PER_MIN))),
            trust_proxy,
        }
    }
}

fn check(limiter: &IpLimiter, trust_proxy: bool, request: &Request) -> Result<(), Response> {
    let Some(ip) = extract_client_ip(request, trust_proxy) else {
        return Err((StatusCode::FORBIDDEN, "Unable to determine client IP.").into_response());
    };

    limiter.check_key(&ip).map_err(|_| {
        tracing::warn!(ip = %ip, "Rate limit exceeded");
        (
            StatusCode::TOO_MANY_REQUESTS,
            "Too many requests. Please try again later.",
        )
            .into_response()
    })
}

/// Middleware for rate limiting login.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    match check(&config.login, config.trust_proxy, &request) {
        Ok(()) => next.run(request).await,
        Err(response) => response,
    }
}

/// Middleware for rate limiting registration.
pub async fn rate_limit_register(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    match check(&config.register, config.trust_proxy, &request) {
        Ok(()) => next.run(request).await,
        Err(response) => response,
    }
}
