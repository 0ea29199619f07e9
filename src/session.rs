// Per-invocation session: config store, auth strategy and dispatcher wired together

use reqwest::header::ACCEPT;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{AuthStrategy, ErrorBody, GrantCredentials, TokenGrantClient};
use crate::config::{ConfigStore, HttpSettings, ServerTarget};
use crate::dispatcher::RequestDispatcher;
use crate::error::{ClientError, Result};

pub struct Session {
    store: ConfigStore,
    target: ServerTarget,
    dispatcher: RequestDispatcher,
}

impl Session {
    /// Open a session with the persisted target and tokens
    pub fn open(
        store: ConfigStore,
        http: &HttpSettings,
        grant_credentials: GrantCredentials,
    ) -> Result<Self> {
        let target = store.load().map_err(config_error)?;
        Self::with_target(store, target, http, grant_credentials)
    }

    /// Open a session that ignores cached tokens, so `login` always runs a grant
    pub fn open_for_login(
        store: ConfigStore,
        http: &HttpSettings,
        grant_credentials: GrantCredentials,
    ) -> Result<Self> {
        let mut target = store.load().map_err(config_error)?;
        if target.target_url().is_none() {
            return Err(ClientError::NoTargetConfigured);
        }
        target.clear_tokens();
        Self::with_target(store, target, http, grant_credentials)
    }

    fn with_target(
        store: ConfigStore,
        target: ServerTarget,
        http: &HttpSettings,
        grant_credentials: GrantCredentials,
    ) -> Result<Self> {
        let client = build_http_client(http, &target)?;
        let grants = TokenGrantClient::new(client.clone(), target.auth_url.clone());
        let auth = Arc::new(AuthStrategy::new(
            client,
            grants,
            grant_credentials,
            target.credentials(),
        ));
        let dispatcher = RequestDispatcher::new(target.target_url(), auth);

        Ok(Self {
            store,
            target,
            dispatcher,
        })
    }

    pub fn target(&self) -> &ServerTarget {
        &self.target
    }

    pub fn dispatcher(&self) -> &RequestDispatcher {
        &self.dispatcher
    }

    pub fn auth(&self) -> &Arc<AuthStrategy> {
        self.dispatcher.auth()
    }

    /// Pre-flight for resource commands: a target is set and a token is
    /// cached or obtainable without user interaction
    pub async fn require_login(&self) -> Result<()> {
        if self.target.target_url().is_none() {
            return Err(ClientError::NoTargetConfigured);
        }

        let creds = self.auth().credentials().await;
        if creds.bearer().is_none() && !self.auth().grant_credentials().has_client_credentials() {
            return Err(ClientError::NotLoggedIn);
        }
        Ok(())
    }

    /// Write changed tokens back to the config store
    pub async fn persist(&mut self) -> Result<()> {
        let creds = self.auth().credentials().await;
        let current = self.target.credentials();

        if creds.access_token == current.access_token && creds.refresh_token == current.refresh_token
        {
            tracing::debug!("Tokens unchanged, nothing to persist");
            return Ok(());
        }

        self.store.save_tokens(&creds).map_err(config_error)?;
        self.target.set_tokens(&creds);
        tracing::debug!(path = %self.store.path().display(), "Tokens persisted");
        Ok(())
    }
}

/// Point the config at a new API, discovering its auth server from `/info`.
/// Tokens are dropped when the API URL changes.
pub async fn set_target(
    store: &ConfigStore,
    http: &HttpSettings,
    server: &str,
    ca_certs: Vec<String>,
    insecure_skip_verify: bool,
) -> Result<ServerTarget> {
    let previous = store.load().map_err(config_error)?;

    let mut target = ServerTarget {
        api_url: normalize_api_url(server),
        ca_certs,
        insecure_skip_verify,
        ..previous.clone()
    };

    let client = build_http_client(http, &target)?;
    target.auth_url = fetch_auth_url(&client, &target.api_url).await?;

    if target.api_url != previous.api_url {
        tracing::info!(api_url = %target.api_url, "Target changed, clearing tokens");
        target.clear_tokens();
    }

    store.save(&target).map_err(config_error)?;
    Ok(target)
}

/// Default to https and drop trailing slashes
pub fn normalize_api_url(server: &str) -> String {
    let server = server.trim();
    let url = if server.contains("://") {
        server.to_string()
    } else {
        format!("https://{}", server)
    };
    url.trim_end_matches('/').to_string()
}

async fn fetch_auth_url(client: &Client, api_url: &str) -> Result<String> {
    let url = format!("{}/info", api_url);
    tracing::debug!(url = %url, "Fetching server info");

    let response = client
        .get(&url)
        .header(ACCEPT, "application/json")
        .send()
        .await
        .map_err(ClientError::from_transport)?;

    let status = response.status();
    let body = response.bytes().await.map_err(ClientError::from_transport)?;

    if !status.is_success() {
        return Err(ClientError::Server {
            status: status.as_u16(),
            message: ErrorBody::message_from(&body),
        });
    }

    let info: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ClientError::ResponseDecode(format!("server info: {}", e)))?;

    info["auth-server"]["url"]
        .as_str()
        .filter(|u| !u.is_empty())
        .map(|u| u.trim_end_matches('/').to_string())
        .ok_or_else(|| ClientError::ResponseDecode("server info has no auth-server.url".to_string()))
}

/// Shared HTTP client honouring the target's TLS settings
pub fn build_http_client(http: &HttpSettings, target: &ServerTarget) -> Result<Client> {
    let mut builder = Client::builder()
        .connect_timeout(Duration::from_secs(http.connect_timeout))
        .timeout(Duration::from_secs(http.request_timeout));

    for pem in &target.ca_certs {
        if !pem.contains("-----BEGIN CERTIFICATE-----") {
            return Err(ClientError::Config(
                "invalid CA certificate: expected PEM-encoded certificate".to_string(),
            ));
        }
        let cert = reqwest::Certificate::from_pem(pem.as_bytes())
            .map_err(|e| ClientError::Config(format!("invalid CA certificate: {}", e)))?;
        builder = builder.add_root_certificate(cert);
    }

    if target.insecure_skip_verify {
        tracing::warn!("TLS certificate validation is disabled for this target");
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder
        .build()
        .map_err(|e| ClientError::Internal(anyhow::Error::new(e).context("Failed to create HTTP client")))
}

fn config_error(err: anyhow::Error) -> ClientError {
    ClientError::Config(format!("{:#}", err))
}
