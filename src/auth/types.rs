// Authentication types

use serde::Deserialize;

/// Sentinel stored in place of both tokens after an explicit logout
pub const REVOKED: &str = "revoked";

/// Error code the credential API returns for an expired bearer token
pub const ACCESS_TOKEN_EXPIRED: &str = "access_token_expired";

/// OAuth2 grant mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    Password,
    ClientCredentials,
    RefreshToken,
}

impl GrantType {
    pub fn as_str(self) -> &'static str {
        match self {
            GrantType::Password => "password",
            GrantType::ClientCredentials => "client_credentials",
            GrantType::RefreshToken => "refresh_token",
        }
    }
}

/// One grant attempt against the token endpoint. Never persisted.
#[derive(Debug, Clone)]
pub struct GrantRequest {
    pub grant_type: GrantType,
    pub params: Vec<(&'static str, String)>,
}

impl GrantRequest {
    pub fn new(grant_type: GrantType) -> Self {
        Self {
            grant_type,
            params: Vec::new(),
        }
    }

    pub fn param(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.params.push((key, value.into()));
        self
    }

    /// Form fields in wire order
    pub fn form(&self) -> Vec<(&'static str, &str)> {
        let mut form = vec![
            ("grant_type", self.grant_type.as_str()),
            ("response_type", "token"),
        ];
        form.extend(self.params.iter().map(|(k, v)| (*k, v.as_str())));
        form
    }
}

/// Token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Error body returned by the auth server and the credential API
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl ErrorBody {
    /// Best human-readable message; falls back to the raw text
    pub fn message_from(raw: &[u8]) -> String {
        match serde_json::from_slice::<ErrorBody>(raw) {
            Ok(ErrorBody {
                error_description: Some(desc),
                ..
            }) if !desc.is_empty() => desc,
            Ok(ErrorBody {
                error: Some(err), ..
            }) if !err.is_empty() => err,
            _ => String::from_utf8_lossy(raw).trim().to_string(),
        }
    }
}

/// In-memory token state for one session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub expires_in: Option<u64>,
}

impl Credentials {
    pub fn new(access_token: Option<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: non_empty(access_token),
            refresh_token: non_empty(refresh_token),
            token_type: None,
            expires_in: None,
        }
    }

    /// Access token usable as a bearer credential (present and not revoked)
    pub fn bearer(&self) -> Option<&str> {
        self.access_token
            .as_deref()
            .filter(|t| !t.is_empty() && *t != REVOKED)
    }

    /// Refresh token usable for a refresh grant or revocation
    pub fn usable_refresh_token(&self) -> Option<&str> {
        self.refresh_token
            .as_deref()
            .filter(|t| !t.is_empty() && *t != REVOKED)
    }

    /// Apply a grant response, keeping the old refresh token when none is returned
    pub fn apply(&mut self, response: TokenResponse) {
        self.access_token = Some(response.access_token);
        if let Some(refresh_token) = non_empty(response.refresh_token) {
            self.refresh_token = Some(refresh_token);
        }
        self.token_type = response.token_type;
        self.expires_in = response.expires_in;
    }

    pub fn revoke(&mut self) {
        self.access_token = Some(REVOKED.to_string());
        self.refresh_token = Some(REVOKED.to_string());
        self.token_type = None;
        self.expires_in = None;
    }

    pub fn is_revoked(&self) -> bool {
        self.refresh_token.as_deref() == Some(REVOKED)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Short prefix of a token for log lines
pub fn token_prefix(token: &str) -> &str {
    let end = token
        .char_indices()
        .nth(8)
        .map(|(i, _)| i)
        .unwrap_or(token.len());
    &token[..end]
}
