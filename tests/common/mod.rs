#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, Response, header},
};
use serde_json::Value;
use tower::ServiceExt;
use visage::{ServerConfig, cli::Environment, create_app, db::Database, jwt::TokenDurations};

pub const ACCESS_SECRET: &[u8] = b"test-access-secret-at-least-32-characters";
pub const REFRESH_SECRET: &[u8] = b"test-refresh-secret-at-least-32-characters";

pub const NAME: &str = "Ana";
pub const EMAIL: &str = "ana@x.com";
pub const PASSWORD: &str = "Aa1!aaaa";

pub async fn test_config() -> ServerConfig {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");

    ServerConfig {
        db,
        access_secret: ACCESS_SECRET.to_vec(),
        refresh_secret: REFRESH_SECRET.to_vec(),
        token_durations: TokenDurations::default(),
        environment: Environment::Development,
        cookie_max_age: 600,
        trust_proxy: false,
        verbose_auth_errors: false,
        rate_limit: false,
    }
}

pub async fn create_test_app() -> (Router, Database) {
    create_test_app_with(|_| {}).await
}

pub async fn create_test_app_with(configure: impl FnOnce(&mut ServerConfig)) -> (Router, Database) {
    let mut config = test_config().await;
    configure(&mut config);
    let app = create_app(&config).expect("Failed to create app");
    (app, config.db)
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// POST with only a `Cookie` header, as a browser would call refresh.
pub fn post_with_cookie(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn with_bearer(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// The raw `Set-Cookie` value for the refresh cookie, if any.
pub fn set_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("refreshToken="))
        .map(str::to_string)
}

/// The `name=value` pair a client would send back in `Cookie`.
pub fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap().trim().to_string()
}

pub async fn register(app: &Router, name: &str, email: &str, password: &str) -> Response<Body> {
    send(
        app,
        post_json(
            "/auth/register",
            serde_json::json!({ "name": name, "email": email, "password": password }),
        ),
    )
    .await
}

pub struct LoggedIn {
    pub access_token: String,
    /// `refreshToken=<jwt>`
    pub cookie: String,
}

pub async fn register_and_login(app: &Router) -> LoggedIn {
    let response = register(app, NAME, EMAIL, PASSWORD).await;
    assert_eq!(response.status(), 200);

    let response = send(
        app,
        post_json(
            "/auth/login",
            serde_json::json!({ "email": EMAIL, "password": PASSWORD }),
        ),
    )
    .await;
    assert_eq!(response.status(), 200);

    let cookie = cookie_pair(&set_cookie(response.headers()).expect("login sets refresh cookie"));
    let json = body_json(response).await;

    LoggedIn {
        access_token: json["accessToken"].as_str().unwrap().to_string(),
        cookie,
    }
}
