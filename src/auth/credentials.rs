// Client/user credentials used to obtain tokens

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;

use super::types::GrantType;
use crate::error::{ClientError, Result};

/// Client id used for password grants when none is configured
pub const DEFAULT_CLIENT_ID: &str = "credhub_cli";

/// Secrets needed to run a grant. Held in memory only.
#[derive(Clone, Default)]
pub struct GrantCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl GrantCredentials {
    /// User login with the default CLI client
    pub fn user(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            client_secret: String::new(),
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// The CLI client with no user attached. Refresh grants for tokens issued
    /// to the default client must present this id.
    pub fn default_client() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            ..Default::default()
        }
    }

    /// Machine login with a client id and secret
    pub fn client(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            username: None,
            password: None,
        }
    }

    /// True when a non-default client was configured explicitly
    pub fn has_client_credentials(&self) -> bool {
        !self.client_id.is_empty() && self.client_id != DEFAULT_CLIENT_ID
    }

    pub fn has_username(&self) -> bool {
        self.username.as_deref().is_some_and(|u| !u.is_empty())
    }
}

impl std::fmt::Debug for GrantCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrantCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Pick the login grant: password when a username is configured, else client credentials
pub fn detect_login_grant(creds: &GrantCredentials) -> GrantType {
    if creds.has_username() {
        tracing::debug!("Login via password grant");
        GrantType::Password
    } else {
        tracing::debug!("Login via client_credentials grant");
        GrantType::ClientCredentials
    }
}

/// Read the `jti` claim out of a token without verifying its signature.
/// Refresh tokens carry a `jti` ending in `-r`, which is what the revoke endpoint expects.
pub fn token_jti(token: &str) -> Result<String> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() < 2 {
        return Err(ClientError::ResponseDecode(
            "refresh token is not a JWT".to_string(),
        ));
    }

    let payload = URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .or_else(|_| {
            let padded = match parts[1].len() % 4 {
                2 => format!("{}==", parts[1]),
                3 => format!("{}=", parts[1]),
                _ => parts[1].to_string(),
            };
            STANDARD.decode(&padded)
        })
        .map_err(|e| ClientError::ResponseDecode(format!("invalid token payload: {}", e)))?;

    let claims: serde_json::Value = serde_json::from_slice(&payload)
        .map_err(|e| ClientError::ResponseDecode(format!("invalid token claims: {}", e)))?;

    claims["jti"]
        .as_str()
        .filter(|jti| !jti.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ClientError::ResponseDecode("token has no jti claim".to_string()))
}

#[cfg(test)]
pub(crate) fn fake_jwt(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.signature", header, payload)
}
