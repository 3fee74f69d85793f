//! Single-flight access token renewal.
//!
//! Every authenticated call runs through [`RefreshCoordinator::execute`]. When
//! a call is rejected with 401 the coordinator renews the access token through
//! the refresh endpoint and retries the call once. Renewal is serialized by an
//! async mutex and stamped with a generation counter: a caller that waited on
//! the mutex while someone else renewed sees the generation moved and reuses
//! that outcome instead of exchanging again. K concurrent callers holding the
//! same expired token therefore cause exactly one exchange, and all K are
//! replayed.
//!
//! The refresh cookie is single-use on the server: a second exchange with the
//! same cookie fails and ends the session.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::StatusCode;
use tokio::sync::{Mutex, watch};
use tracing::{debug, warn};

use super::credentials::CredentialStore;

/// Whether the client still holds a usable session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    /// Renewal failed or the user logged out. Log in again.
    Ended,
}

#[derive(Debug)]
pub enum ClientError {
    /// The server answered 401
    Unauthorized(String),
    /// Any other non-success status
    Status(StatusCode, String),
    /// Connection failure or timeout
    Transport(reqwest::Error),
    /// The response body was not what was expected
    Decode(String),
    /// Renewal failed; the held credential was cleared
    SessionEnded,
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ClientError::Status(status, msg) => write!(f, "Request failed ({}): {}", status, msg),
            ClientError::Transport(e) => write!(f, "Transport error: {}", e),
            ClientError::Decode(msg) => write!(f, "Invalid response: {}", msg),
            ClientError::SessionEnded => write!(f, "Session ended, log in again"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Transport(e)
    }
}

/// The call that trades the refresh cookie for a new access token.
pub trait RefreshExchange: Send + Sync {
    fn exchange(&self) -> impl Future<Output = Result<String, ClientError>> + Send;
}

pub struct RefreshCoordinator<E> {
    credentials: Arc<dyn CredentialStore>,
    exchange: E,
    gate: Mutex<()>,
    generation: AtomicU64,
    status: watch::Sender<SessionStatus>,
}

impl<E: RefreshExchange> RefreshCoordinator<E> {
    pub fn new(credentials: Arc<dyn CredentialStore>, exchange: E) -> Self {
        let initial = if credentials.get().is_some() {
            SessionStatus::Active
        } else {
            SessionStatus::Ended
        };

        Self {
            credentials,
            exchange,
            gate: Mutex::new(()),
            generation: AtomicU64::new(0),
            status: watch::Sender::new(initial),
        }
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    /// Observe session state, e.g. to send the user back to the login screen.
    pub fn session_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Run `call` with the held access token, renewing and retrying once on 401.
    pub async fn execute<T, F, Fut>(&self, call: F) -> Result<T, ClientError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let observed = self.generation.load(Ordering::Acquire);
        let token = self.credentials.get().ok_or(ClientError::SessionEnded)?;

        match call(token).await {
            Err(ClientError::Unauthorized(msg)) => {
                debug!(reason = %msg, "Access token rejected, renewing");
                let token = self.renew(observed).await?;
                call(token).await
            }
            other => other,
        }
    }

    /// Install the token from a fresh login.
    pub async fn begin_session(&self, token: String) {
        let _gate = self.gate.lock().await;
        self.credentials.set(token);
        self.generation.fetch_add(1, Ordering::Release);
        self.publish(SessionStatus::Active);
    }

    /// Drop the held token after logout.
    pub async fn end_session(&self) {
        let _gate = self.gate.lock().await;
        self.credentials.clear();
        self.generation.fetch_add(1, Ordering::Release);
        self.publish(SessionStatus::Ended);
    }

    async fn renew(&self, observed: u64) -> Result<String, ClientError> {
        let _gate = self.gate.lock().await;

        if self.generation.load(Ordering::Acquire) != observed {
            // Someone renewed (or ended the session) while we waited
            return self.credentials.get().ok_or(ClientError::SessionEnded);
        }

        // The credential is written before the generation moves: a caller that
        // sees the new generation must also see the new credential.
        match self.exchange.exchange().await {
            Ok(token) => {
                self.credentials.set(token.clone());
                self.generation.fetch_add(1, Ordering::Release);
                self.publish(SessionStatus::Active);
                Ok(token)
            }
            Err(e) => {
                warn!(error = %e, "Token renewal failed, ending session");
                self.credentials.clear();
                self.generation.fetch_add(1, Ordering::Release);
                self.publish(SessionStatus::Ended);
                Err(ClientError::SessionEnded)
            }
        }
    }

    fn publish(&self, next: SessionStatus) {
        self.status.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryCredentialStore;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct FakeExchange {
        calls: AtomicUsize,
        issues: Option<&'static str>,
    }

    impl FakeExchange {
        fn issuing(token: &'static str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                issues: Some(token),
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                issues: None,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl RefreshExchange for FakeExchange {
        async fn exchange(&self) -> Result<String, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            // Hold the gate long enough for every other caller to queue up
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.issues
                .map(str::to_string)
                .ok_or_else(|| ClientError::Unauthorized("Invalid Refresh Token".into()))
        }
    }

    /// Accepts only `valid`.
    async fn protected_call(token: String, valid: &str) -> Result<String, ClientError> {
        if token == valid {
            Ok(format!("ok:{}", token))
        } else {
            Err(ClientError::Unauthorized("Invalid access token".into()))
        }
    }

    fn coordinator(exchange: FakeExchange, held: &str) -> RefreshCoordinator<FakeExchange> {
        RefreshCoordinator::new(Arc::new(MemoryCredentialStore::with_token(held)), exchange)
    }

    #[tokio::test]
    async fn test_valid_token_needs_no_exchange() {
        let c = coordinator(FakeExchange::issuing("fresh"), "fresh");

        let result = c.execute(|t| protected_call(t, "fresh")).await.unwrap();
        assert_eq!(result, "ok:fresh");
        assert_eq!(c.exchange.calls(), 0);
    }

    #[tokio::test]
    async fn test_expired_token_renews_and_retries() {
        let c = coordinator(FakeExchange::issuing("fresh"), "stale");

        let result = c.execute(|t| protected_call(t, "fresh")).await.unwrap();
        assert_eq!(result, "ok:fresh");
        assert_eq!(c.exchange.calls(), 1);
        assert_eq!(c.credentials().get().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_concurrent_expiry_single_exchange() {
        let c = coordinator(FakeExchange::issuing("fresh"), "stale");

        let calls = (0..8).map(|_| c.execute(|t| protected_call(t, "fresh")));
        let results = futures::future::join_all(calls).await;

        assert_eq!(c.exchange.calls(), 1);
        for result in results {
            assert_eq!(result.unwrap(), "ok:fresh");
        }
    }

    #[tokio::test]
    async fn test_failed_renewal_ends_session_once() {
        let c = coordinator(FakeExchange::failing(), "stale");
        let mut status = c.session_status();
        assert_eq!(*status.borrow_and_update(), SessionStatus::Active);

        let calls = (0..5).map(|_| c.execute(|t| protected_call(t, "fresh")));
        let results = futures::future::join_all(calls).await;

        assert_eq!(c.exchange.calls(), 1);
        for result in results {
            assert!(matches!(result, Err(ClientError::SessionEnded)));
        }
        assert_eq!(c.credentials().get(), None);
        assert!(status.has_changed().unwrap());
        assert_eq!(*status.borrow_and_update(), SessionStatus::Ended);

        // With no credential, calls end immediately and nothing is republished
        let result = c.execute(|t| protected_call(t, "fresh")).await;
        assert!(matches!(result, Err(ClientError::SessionEnded)));
        assert_eq!(c.exchange.calls(), 1);
        assert!(!status.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_other_errors_pass_through() {
        let c = coordinator(FakeExchange::issuing("fresh"), "stale");

        let result: Result<(), _> = c
            .execute(|_| async {
                Err(ClientError::Status(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "boom".into(),
                ))
            })
            .await;

        assert!(matches!(
            result,
            Err(ClientError::Status(s, _)) if s == StatusCode::INTERNAL_SERVER_ERROR
        ));
        assert_eq!(c.exchange.calls(), 0);
    }

    #[tokio::test]
    async fn test_begin_and_end_session() {
        let c = RefreshCoordinator::new(
            Arc::new(MemoryCredentialStore::new()),
            FakeExchange::issuing("fresh"),
        );
        let mut status = c.session_status();
        assert_eq!(*status.borrow_and_update(), SessionStatus::Ended);

        c.begin_session("from-login".into()).await;
        assert_eq!(*status.borrow_and_update(), SessionStatus::Active);
        let result = c
            .execute(|t| protected_call(t, "from-login"))
            .await
            .unwrap();
        assert_eq!(result, "ok:from-login");

        c.end_session().await;
        assert_eq!(*status.borrow_and_update(), SessionStatus::Ended);
        assert_eq!(c.credentials().get(), None);
        assert_eq!(c.exchange.calls(), 0);
    }

    /// Credential store whose writes take a while, so another worker can run
    /// in the gap between the exchange finishing and the credential landing.
    struct SlowStore {
        inner: MemoryCredentialStore,
    }

    impl CredentialStore for SlowStore {
        fn get(&self) -> Option<String> {
            self.inner.get()
        }

        fn set(&self, token: String) {
            std::thread::sleep(Duration::from_millis(100));
            self.inner.set(token);
        }

        fn clear(&self) {
            self.inner.clear();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_caller_during_slow_credential_write_reuses_renewal() {
        let store = SlowStore {
            inner: MemoryCredentialStore::with_token("stale"),
        };
        let c = Arc::new(RefreshCoordinator::new(
            Arc::new(store),
            FakeExchange::issuing("fresh"),
        ));

        let first = tokio::spawn({
            let c = c.clone();
            async move { c.execute(|t| protected_call(t, "fresh")).await }
        });

        // Lands after the exchange and while the new credential is being written
        tokio::time::sleep(Duration::from_millis(40)).await;
        let second = tokio::spawn({
            let c = c.clone();
            async move { c.execute(|t| protected_call(t, "fresh")).await }
        });

        assert_eq!(first.await.unwrap().unwrap(), "ok:fresh");
        assert_eq!(second.await.unwrap().unwrap(), "ok:fresh");
        assert_eq!(c.exchange.calls(), 1);
    }
}
