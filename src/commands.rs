// Command handlers: one session per invocation, tokens written back afterwards

use anyhow::{Context, Result};
use dialoguer::{Input, Password};
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::Method;

use crate::auth::GrantCredentials;
use crate::config::{read_ca_cert, Command, Config, ConfigStore};
use crate::dispatcher::ApiRequest;
use crate::error::ClientError;
use crate::replay::Payload;
use crate::repository::{CredentialRepository, JsonRepository, Repository};
use crate::session::{self, Session};

const DATA_PATH: &str = "/api/v1/data";

/// What a command prints on success
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Message(String),
    Json(serde_json::Value),
}

impl std::fmt::Display for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Output::Message(msg) => f.write_str(msg),
            Output::Json(value) => {
                let text = serde_json::to_string_pretty(value).map_err(|_| std::fmt::Error)?;
                f.write_str(&text)
            }
        }
    }
}

pub async fn run(config: &Config, command: Command) -> Result<Output> {
    let store = ConfigStore::new(&config.config_dir);

    match command {
        Command::Api {
            server,
            ca_certs,
            skip_tls_validation,
        } => {
            let certs = ca_certs
                .iter()
                .map(|c| read_ca_cert(c))
                .collect::<Result<Vec<_>>>()?;
            let target =
                session::set_target(&store, &config.http, &server, certs, skip_tls_validation)
                    .await?;
            Ok(Output::Message(format!(
                "Setting the target url: {}",
                target.api_url
            )))
        }
        Command::Login { username, password } => login(config, store, username, password).await,
        Command::Logout => {
            let mut session =
                Session::open(store, &config.http, GrantCredentials::default_client())?;
            session.auth().logout().await;
            session.persist().await?;
            Ok(Output::Message("Logout Successful".to_string()))
        }
        Command::Get { name, id } => {
            let (request, identifier) = match (name, id) {
                (Some(name), _) => (
                    ApiRequest::get(DATA_PATH)
                        .query("name", name.as_str())
                        .query("current", "true"),
                    name,
                ),
                (None, Some(id)) => (ApiRequest::get(format!("{}/{}", DATA_PATH, id)), id),
                (None, None) => anyhow::bail!("either --name or --id is required"),
            };
            let credential =
                execute(config, store, request, &identifier, &CredentialRepository).await?;
            Ok(Output::Json(serde_json::to_value(credential)?))
        }
        Command::Delete { name } => {
            let request = ApiRequest::delete(DATA_PATH).query("name", name.as_str());
            execute(config, store, request, &name, &JsonRepository).await?;
            Ok(Output::Message("Credential successfully deleted".to_string()))
        }
        Command::Find { name_like, path } => {
            let request = match (name_like, path) {
                (Some(name_like), _) => ApiRequest::get(DATA_PATH).query("name-like", name_like),
                (None, Some(path)) => ApiRequest::get(DATA_PATH).query("path", path),
                (None, None) => anyhow::bail!("either --name-like or --path is required"),
            };
            let found = execute(config, store, request, "find", &JsonRepository).await?;
            Ok(Output::Json(found))
        }
        Command::Curl { path, method, data } => {
            let method = Method::from_bytes(method.to_uppercase().as_bytes())
                .with_context(|| format!("invalid HTTP method: {}", method))?;
            let mut request = ApiRequest::new(method, path.clone());
            if let Some(data) = data {
                // Sent exactly as typed; JSON is only validated to pick the content type
                if serde_json::from_str::<serde::de::IgnoredAny>(&data).is_ok() {
                    request = request
                        .header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                }
                request = request.payload(Payload::Bytes(data.into()));
            }
            let body = execute(config, store, request, &path, &JsonRepository).await?;
            Ok(Output::Json(body))
        }
    }
}

async fn login(
    config: &Config,
    store: ConfigStore,
    username: Option<String>,
    password: Option<String>,
) -> Result<Output> {
    if store.load()?.target_url().is_none() {
        return Err(ClientError::NoTargetConfigured.into());
    }

    let grant_credentials = match config.client_credentials() {
        Some(client) if username.is_none() && password.is_none() => client,
        _ => {
            let username = match username {
                Some(u) => u,
                None => Input::new()
                    .with_prompt("username")
                    .interact_text()
                    .context("Failed to read username")?,
            };
            let password = match password {
                Some(p) => p,
                None => Password::new()
                    .with_prompt("password")
                    .interact()
                    .context("Failed to read password")?,
            };
            GrantCredentials::user(username, password)
        }
    };

    let mut session = Session::open_for_login(store, &config.http, grant_credentials)?;
    session.auth().login().await?;
    session.persist().await?;

    Ok(Output::Message("Login Successful".to_string()))
}

/// Run one resource operation, persisting refreshed tokens whether or not it succeeded
async fn execute<R: Repository>(
    config: &Config,
    store: ConfigStore,
    request: ApiRequest,
    identifier: &str,
    repository: &R,
) -> Result<R::Item> {
    let grant_credentials = config
        .client_credentials()
        .unwrap_or_else(GrantCredentials::default_client);
    let mut session = Session::open(store, &config.http, grant_credentials)?;
    session.require_login().await?;

    let result = session
        .dispatcher()
        .execute(request, identifier, repository)
        .await;
    let persisted = session.persist().await;

    match result {
        Ok(item) => {
            persisted?;
            Ok(item)
        }
        Err(e) => {
            if let Err(persist_err) = persisted {
                tracing::warn!(error = %persist_err, "Failed to save tokens after failed request");
            }
            Err(e.into())
        }
    }
}
