//! Drive a live server with the HTTP client.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use url::Url;
use visage::client::{
    ApiClient, ClientError, CredentialStore, MemoryCredentialStore, SessionStatus, peek_claims,
};
use visage::jwt::TokenDurations;
use visage::start_server;

async fn serve(configure: impl FnOnce(&mut visage::ServerConfig)) -> SocketAddr {
    let mut config = test_config().await;
    configure(&mut config);
    let (_handle, addr) = start_server(config, 0).await.expect("Failed to start server");
    addr
}

fn client(addr: SocketAddr) -> ApiClient {
    let base = Url::parse(&format!("http://{}/", addr)).unwrap();
    ApiClient::new(base, Arc::new(MemoryCredentialStore::new())).unwrap()
}

#[tokio::test]
async fn test_login_me_logout() {
    let addr = serve(|_| {}).await;
    let api = client(addr);
    let mut status = api.session_status();
    assert_eq!(*status.borrow_and_update(), SessionStatus::Ended);

    let created = api.register(NAME, EMAIL, PASSWORD).await.unwrap();
    assert_eq!(created.email, EMAIL);

    let user = api.login(EMAIL, PASSWORD).await.unwrap();
    assert_eq!(user.id, created.id);
    assert_eq!(*status.borrow_and_update(), SessionStatus::Active);

    let token = api.credentials().get().unwrap();
    assert_eq!(peek_claims(&token).unwrap().sub, created.id);

    let me = api.me().await.unwrap();
    assert_eq!(me.name, NAME);

    api.logout().await.unwrap();
    assert_eq!(api.credentials().get(), None);
    assert_eq!(*status.borrow_and_update(), SessionStatus::Ended);
    assert!(matches!(api.me().await, Err(ClientError::SessionEnded)));
}

#[tokio::test]
async fn test_login_failure_does_not_touch_session() {
    let addr = serve(|_| {}).await;
    let api = client(addr);
    api.register(NAME, EMAIL, PASSWORD).await.unwrap();

    let result = api.login(EMAIL, "Wrong1!pass").await;
    assert!(matches!(result, Err(ClientError::Unauthorized(ref m)) if m == "Invalid user credentials"));
    assert_eq!(api.credentials().get(), None);

    let result = api.register(NAME, EMAIL, PASSWORD).await;
    assert!(matches!(result, Err(ClientError::Status(s, ref m)) if s == 400 && m == "User already exists"));
}

#[tokio::test]
async fn test_rejected_access_token_is_renewed() {
    let addr = serve(|_| {}).await;
    let api = client(addr);
    api.register(NAME, EMAIL, PASSWORD).await.unwrap();
    api.login(EMAIL, PASSWORD).await.unwrap();

    api.credentials().set("stale".into());

    let me = api.me().await.unwrap();
    assert_eq!(me.email, EMAIL);
    let renewed = api.credentials().get().unwrap();
    assert_ne!(renewed, "stale");
    assert_eq!(*api.session_status().borrow(), SessionStatus::Active);
}

#[tokio::test]
async fn test_expired_access_token_concurrent_calls() {
    let addr = serve(|c| {
        c.token_durations = TokenDurations {
            access: 1,
            ..TokenDurations::default()
        };
    })
    .await;
    let api = client(addr);
    api.register(NAME, EMAIL, PASSWORD).await.unwrap();
    api.login(EMAIL, PASSWORD).await.unwrap();
    let first = api.credentials().get().unwrap();

    tokio::time::sleep(Duration::from_millis(2100)).await;

    // All of them hold the expired token; the single-use refresh cookie
    // survives only if exactly one of them exchanges it.
    let calls = (0..4).map(|_| api.me());
    for result in futures::future::join_all(calls).await {
        assert_eq!(result.unwrap().email, EMAIL);
    }
    assert_ne!(api.credentials().get().unwrap(), first);
}

#[tokio::test]
async fn test_revoked_refresh_ends_session() {
    let addr = serve(|_| {}).await;
    let api = client(addr);
    api.register(NAME, EMAIL, PASSWORD).await.unwrap();
    api.login(EMAIL, PASSWORD).await.unwrap();

    // A second device logs in and takes over the refresh slot
    let other = client(addr);
    other.login(EMAIL, PASSWORD).await.unwrap();

    let mut status = api.session_status();
    let _ = status.borrow_and_update();
    api.credentials().set("stale".into());

    assert!(matches!(api.me().await, Err(ClientError::SessionEnded)));
    assert_eq!(api.credentials().get(), None);
    assert!(status.has_changed().unwrap());
    assert_eq!(*status.borrow_and_update(), SessionStatus::Ended);

    other.me().await.unwrap();
}
