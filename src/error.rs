// Error handling module
// Defines the client error taxonomy shared by grant, auth and dispatch layers

use thiserror::Error;

/// Errors that can occur while talking to the auth server or the credential API
#[derive(Error, Debug)]
pub enum ClientError {
    /// No response was received (connect failure, timeout, TLS, ...)
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response with the server's decoded message
    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },

    /// Access token still reported as expired after the single refresh-and-replay
    #[error("Access token expired: {0}")]
    AuthExpired(String),

    /// Bad credentials at login time
    #[error("Authorization failed: {0}")]
    Authorization(String),

    /// No target API URL configured
    #[error("An API target is not set. Please target the location of your server with `credhub-auth api --server <url>` to continue.")]
    NoTargetConfigured,

    /// No usable token and no client credentials to obtain one
    #[error("You are not currently authenticated. Please log in to continue.")]
    NotLoggedIn,

    /// Malformed server JSON
    #[error("Failed to decode response: {0}")]
    ResponseDecode(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ClientError {
    /// Map a transport failure from reqwest into the taxonomy
    pub fn from_transport(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            "timeout"
        } else if err.is_connect() {
            "connection_failed"
        } else if err.is_request() {
            "request_error"
        } else if err.is_body() {
            "body_error"
        } else if err.is_decode() {
            "decode_error"
        } else {
            "unknown"
        };

        tracing::warn!(error_kind = kind, error = %err, "HTTP request error");

        if err.is_decode() {
            ClientError::ResponseDecode(err.to_string())
        } else {
            ClientError::Network(format!("{} (kind: {})", err, kind))
        }
    }

    /// A 400/401 from the token endpoint during login means bad credentials
    pub fn into_login_error(self) -> Self {
        match self {
            ClientError::Server {
                status: 400 | 401,
                message,
            } => ClientError::Authorization(message),
            other => other,
        }
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
