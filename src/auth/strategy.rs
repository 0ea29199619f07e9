use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use tokio::sync::Mutex;

use super::credentials::{detect_login_grant, GrantCredentials};
use super::expiry::{classify, ResponseClass};
use super::grant::TokenGrantClient;
use super::types::{token_prefix, Credentials, GrantType};
use crate::error::{ClientError, Result};
use crate::replay::ReplayableBody;

/// Method, URL and extra headers of a resource request. Rebuilt into a
/// fresh `reqwest::Request` on every send.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
}

impl RequestTemplate {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
        }
    }
}

/// Fully read response from the resource API
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    async fn read(response: reqwest::Response) -> Result<Self> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(ClientError::from_transport)?;
        Ok(Self {
            status,
            headers,
            body,
        })
    }

    pub fn class(&self) -> ResponseClass {
        classify(self.status, &self.body)
    }
}

/// Per-call progress through login, send and the single refresh-and-replay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Unauthenticated,
    Authenticated { replayed: bool },
    Refreshing,
}

/// Owns the session's tokens and sends authenticated requests.
///
/// All token reads and writes happen under one mutex held for the whole of
/// `login`, `refresh`, `logout` and `do_request`, so concurrent callers never
/// issue duplicate grants or replay against a half-finished refresh.
pub struct AuthStrategy {
    /// HTTP client for resource requests
    client: Client,

    /// Grant flows against the auth server
    grants: TokenGrantClient,

    /// Client and user secrets (memory only)
    grant_credentials: GrantCredentials,

    /// Current tokens
    state: Mutex<Credentials>,
}

impl AuthStrategy {
    pub fn new(
        client: Client,
        grants: TokenGrantClient,
        grant_credentials: GrantCredentials,
        credentials: Credentials,
    ) -> Self {
        Self {
            client,
            grants,
            grant_credentials,
            state: Mutex::new(credentials),
        }
    }

    /// Snapshot of the current tokens, for write-back to the config store
    pub async fn credentials(&self) -> Credentials {
        self.state.lock().await.clone()
    }

    pub fn grant_credentials(&self) -> &GrantCredentials {
        &self.grant_credentials
    }

    /// Obtain tokens unless an access token is already cached
    pub async fn login(&self) -> Result<()> {
        let mut creds = self.state.lock().await;
        self.login_locked(&mut creds).await
    }

    /// Replace the tokens, preferring the refresh grant over a full login
    pub async fn refresh(&self) -> Result<()> {
        let mut creds = self.state.lock().await;
        self.refresh_locked(&mut creds).await
    }

    /// Revoke the refresh token on the server (best effort) and mark the session revoked
    pub async fn logout(&self) {
        let mut creds = self.state.lock().await;

        match (creds.bearer(), creds.usable_refresh_token()) {
            (Some(access_token), Some(refresh_token)) => {
                if let Err(e) = self.grants.revoke_token(access_token, refresh_token).await {
                    tracing::warn!(
                        error = %e,
                        "Token revocation failed, clearing local tokens anyway"
                    );
                }
            }
            _ => tracing::debug!("No token pair to revoke"),
        }

        creds.revoke();
        tracing::info!("Logged out");
    }

    /// Send `request` with a bearer token, replaying it once after a refresh
    /// if the first response says the token expired. The replayed response is
    /// returned as-is, even if it reports expiry again.
    pub async fn do_request(
        &self,
        request: &RequestTemplate,
        body: &ReplayableBody,
    ) -> Result<ApiResponse> {
        let mut creds = self.state.lock().await;
        let mut phase = Phase::Unauthenticated;

        loop {
            phase = match phase {
                Phase::Unauthenticated => {
                    self.login_locked(&mut creds).await?;
                    Phase::Authenticated { replayed: false }
                }
                Phase::Authenticated { replayed } => {
                    let bearer = creds.bearer().ok_or(ClientError::NotLoggedIn)?;
                    let response = self.send(request, body, bearer).await?;

                    if replayed || !response.class().is_expired() {
                        return Ok(response);
                    }

                    tracing::warn!(
                        status = response.status.as_u16(),
                        url = %request.url,
                        "Access token expired, refreshing and replaying request"
                    );
                    Phase::Refreshing
                }
                Phase::Refreshing => {
                    self.refresh_locked(&mut creds).await?;
                    Phase::Authenticated { replayed: true }
                }
            };
        }
    }

    async fn login_locked(&self, creds: &mut Credentials) -> Result<()> {
        if let Some(token) = creds.bearer() {
            tracing::debug!(token = token_prefix(token), "Using cached access token");
            return Ok(());
        }

        let gc = &self.grant_credentials;
        let result = match detect_login_grant(gc) {
            GrantType::Password => {
                self.grants
                    .password_grant(
                        &gc.client_id,
                        &gc.client_secret,
                        gc.username.as_deref().unwrap_or_default(),
                        gc.password.as_deref().unwrap_or_default(),
                    )
                    .await
            }
            _ => {
                self.grants
                    .client_credentials_grant(&gc.client_id, &gc.client_secret)
                    .await
            }
        };

        // Rejected credentials at login time are fatal and never retried
        let response = result.map_err(ClientError::into_login_error)?;

        creds.apply(response);
        tracing::info!(
            token = creds.bearer().map(token_prefix).unwrap_or_default(),
            "Login successful"
        );
        Ok(())
    }

    async fn refresh_locked(&self, creds: &mut Credentials) -> Result<()> {
        match creds.usable_refresh_token().map(str::to_string) {
            Some(refresh_token) => {
                let gc = &self.grant_credentials;
                let response = self
                    .grants
                    .refresh_token_grant(&gc.client_id, &gc.client_secret, &refresh_token)
                    .await?;
                creds.apply(response);
                tracing::info!("Access token refreshed");
                Ok(())
            }
            None => {
                tracing::debug!("No refresh token, logging in again");
                creds.access_token = None;
                self.login_locked(creds).await
            }
        }
    }

    async fn send(
        &self,
        request: &RequestTemplate,
        body: &ReplayableBody,
        bearer: &str,
    ) -> Result<ApiResponse> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone());

        let value = HeaderValue::from_str(&format!("Bearer {}", bearer))
            .map_err(|e| ClientError::Internal(anyhow::anyhow!("invalid bearer token: {}", e)))?;
        builder = builder.header(AUTHORIZATION, value);

        if !body.is_empty() {
            if let Some(content_type) = body.content_type() {
                if !request.headers.contains_key(CONTENT_TYPE) {
                    builder = builder.header(CONTENT_TYPE, content_type);
                }
            }
            builder = builder.body(body.to_body());
        }

        tracing::debug!(method = %request.method, url = %request.url, "Sending API request");

        let response = builder.send().await.map_err(ClientError::from_transport)?;
        let response = ApiResponse::read(response).await?;

        tracing::debug!(status = %response.status, "Received API response");
        Ok(response)
    }
}
