//! HTTP client for the `/auth` endpoints.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use url::Url;

use super::coordinator::{ClientError, RefreshCoordinator, RefreshExchange, SessionStatus};
use super::credentials::CredentialStore;
use crate::db::PublicUser;

/// Request timeout. A refresh that times out ends the session like any other failure.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterBody {
    created_user: PublicUser,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginBody {
    user: PublicUser,
    access_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody {
    access_token: String,
}

#[derive(Deserialize)]
struct MeBody {
    user: PublicUser,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

fn endpoint(base: &Url, path: &str) -> Result<Url, ClientError> {
    base.join(path)
        .map_err(|e| ClientError::Decode(format!("invalid endpoint {}: {}", path, e)))
}

/// Turn a response into `T`, mapping 401 to [`ClientError::Unauthorized`].
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if !status.is_success() {
        let message = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.error)
            .unwrap_or_default();
        return Err(if status == StatusCode::UNAUTHORIZED {
            ClientError::Unauthorized(message)
        } else {
            ClientError::Status(status, message)
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| ClientError::Decode(e.to_string()))
}

/// Calls `POST /auth/refresh-token`. The refresh cookie travels in the shared
/// cookie jar of the underlying `reqwest::Client`.
pub struct HttpRefreshExchange {
    http: reqwest::Client,
    url: Url,
}

impl RefreshExchange for HttpRefreshExchange {
    async fn exchange(&self) -> Result<String, ClientError> {
        let response = self.http.post(self.url.clone()).send().await?;
        let body: RefreshBody = decode(response).await?;
        Ok(body.access_token)
    }
}

/// Session-aware API client.
///
/// Register, login and the refresh exchange go straight to the server.
/// Everything that needs a Bearer token goes through the coordinator.
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    coordinator: RefreshCoordinator<HttpRefreshExchange>,
}

impl ApiClient {
    pub fn new(base: Url, credentials: Arc<dyn CredentialStore>) -> Result<Self, ClientError> {
        Self::with_timeout(base, credentials, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        base: Url,
        credentials: Arc<dyn CredentialStore>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()?;

        let exchange = HttpRefreshExchange {
            http: http.clone(),
            url: endpoint(&base, "auth/refresh-token")?,
        };

        Ok(Self {
            http,
            base,
            coordinator: RefreshCoordinator::new(credentials, exchange),
        })
    }

    pub fn session_status(&self) -> watch::Receiver<SessionStatus> {
        self.coordinator.session_status()
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        self.coordinator.credentials()
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<PublicUser, ClientError> {
        let response = self
            .http
            .post(endpoint(&self.base, "auth/register")?)
            .json(&RegisterRequest {
                name,
                email,
                password,
            })
            .send()
            .await?;

        let body: RegisterBody = decode(response).await?;
        Ok(body.created_user)
    }

    /// Log in and hold the returned access token. The refresh cookie lands in
    /// the cookie jar.
    pub async fn login(&self, email: &str, password: &str) -> Result<PublicUser, ClientError> {
        let response = self
            .http
            .post(endpoint(&self.base, "auth/login")?)
            .json(&LoginRequest { email, password })
            .send()
            .await?;

        let body: LoginBody = decode(response).await?;
        self.coordinator.begin_session(body.access_token).await;
        Ok(body.user)
    }

    pub async fn me(&self) -> Result<PublicUser, ClientError> {
        let url = endpoint(&self.base, "auth/me")?;
        let body: MeBody = self
            .coordinator
            .execute(|token| {
                let request = self.http.get(url.clone()).bearer_auth(token);
                async move { decode(request.send().await?).await }
            })
            .await?;
        Ok(body.user)
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        let url = endpoint(&self.base, "auth/logout")?;
        let result = self
            .coordinator
            .execute(|token| {
                let request = self.http.post(url.clone()).bearer_auth(token);
                async move { decode::<serde_json::Value>(request.send().await?).await }
            })
            .await;

        self.coordinator.end_session().await;
        result.map(|_| ())
    }
}
