// OAuth2 grant flows and token revocation against the auth server

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;

use super::credentials::token_jti;
use super::types::{ErrorBody, GrantRequest, GrantType, TokenResponse};
use crate::error::{ClientError, Result};

/// Executes grant requests against `{auth_url}/oauth/token`. Performs no retries.
#[derive(Debug, Clone)]
pub struct TokenGrantClient {
    client: Client,
    auth_url: String,
}

impl TokenGrantClient {
    pub fn new(client: Client, auth_url: impl Into<String>) -> Self {
        Self {
            client,
            auth_url: auth_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn token_url(&self) -> Result<String> {
        if self.auth_url.is_empty() {
            return Err(ClientError::Config(
                "auth server URL is not set; re-run `api` to discover it".to_string(),
            ));
        }
        Ok(format!("{}/oauth/token", self.auth_url))
    }

    /// Machine login; the auth server does not issue a refresh token for this grant
    pub async fn client_credentials_grant(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<TokenResponse> {
        let request = GrantRequest::new(GrantType::ClientCredentials)
            .param("client_id", client_id)
            .param("client_secret", client_secret);
        self.grant(request).await
    }

    pub async fn password_grant(
        &self,
        client_id: &str,
        client_secret: &str,
        username: &str,
        password: &str,
    ) -> Result<TokenResponse> {
        let request = GrantRequest::new(GrantType::Password)
            .param("client_id", client_id)
            .param("client_secret", client_secret)
            .param("username", username)
            .param("password", password);
        self.grant(request).await
    }

    pub async fn refresh_token_grant(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<TokenResponse> {
        let request = GrantRequest::new(GrantType::RefreshToken)
            .param("client_id", client_id)
            .param("client_secret", client_secret)
            .param("refresh_token", refresh_token);
        self.grant(request).await
    }

    /// Revoke the session behind `refresh_token`, authenticated with `access_token`
    pub async fn revoke_token(&self, access_token: &str, refresh_token: &str) -> Result<()> {
        let jti = token_jti(refresh_token)?;
        let url = format!("{}/revoke/{}", self.token_url()?, jti);

        tracing::debug!(url = %url, "Revoking refresh token");

        let response = self
            .client
            .delete(&url)
            .header(AUTHORIZATION, format!("Bearer {}", access_token))
            .send()
            .await
            .map_err(ClientError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(ClientError::Server {
                status: status.as_u16(),
                message: ErrorBody::message_from(&body),
            });
        }

        tracing::info!("Refresh token revoked");
        Ok(())
    }

    async fn grant(&self, request: GrantRequest) -> Result<TokenResponse> {
        let url = self.token_url()?;
        let grant_type = request.grant_type.as_str();

        tracing::debug!(url = %url, grant_type, "Requesting token");

        let response = self
            .client
            .post(&url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(&request.form())
            .send()
            .await
            .map_err(ClientError::from_transport)?;

        let status = response.status();
        let body = response.bytes().await.map_err(ClientError::from_transport)?;

        if !status.is_success() {
            let message = ErrorBody::message_from(&body);
            tracing::error!(
                status = status.as_u16(),
                grant_type,
                message = %message,
                "Token request failed"
            );
            return Err(ClientError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let data: TokenResponse = serde_json::from_slice(&body)
            .map_err(|e| ClientError::ResponseDecode(format!("token response: {}", e)))?;

        if data.access_token.is_empty() {
            return Err(ClientError::ResponseDecode(
                "token response does not contain access_token".to_string(),
            ));
        }

        tracing::info!(grant_type, expires_in = ?data.expires_in, "Token granted");
        Ok(data)
    }
}
