use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::auth::{Credentials, GrantCredentials};

/// Authenticating client for a credential-management API
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding config.json
    #[arg(long, env = "CREDHUB_CONFIG_DIR", global = true)]
    pub config_dir: Option<String>,

    /// Client id for client_credentials login (never persisted)
    #[arg(long, env = "CREDHUB_CLIENT", global = true, hide_env_values = true)]
    pub client_name: Option<String>,

    /// Client secret for client_credentials login (never persisted)
    #[arg(long, env = "CREDHUB_SECRET", global = true, hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn", global = true)]
    pub log_level: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "CREDHUB_HTTP_TIMEOUT", default_value = "45", global = true)]
    pub http_timeout: u64,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Set the target API and discover its auth server
    Api {
        /// API URL, e.g. https://credhub.example.com:8844
        #[arg(short, long, env = "CREDHUB_SERVER")]
        server: String,

        /// CA certificate (PEM file path or PEM text); repeatable
        #[arg(long = "ca-cert")]
        ca_certs: Vec<String>,

        /// Disable TLS certificate validation
        #[arg(long)]
        skip_tls_validation: bool,
    },

    /// Authenticate with the auth server
    Login {
        #[arg(short, long)]
        username: Option<String>,

        #[arg(short, long)]
        password: Option<String>,
    },

    /// Revoke the session and discard tokens
    Logout,

    /// Fetch a credential by name or id
    Get {
        #[arg(short, long, conflicts_with = "id", required_unless_present = "id")]
        name: Option<String>,

        #[arg(long)]
        id: Option<String>,
    },

    /// Delete a credential by name
    Delete {
        #[arg(short, long)]
        name: String,
    },

    /// Find credentials by partial name or path
    Find {
        #[arg(short = 'n', long, conflicts_with = "path", required_unless_present = "path")]
        name_like: Option<String>,

        #[arg(short, long)]
        path: Option<String>,
    },

    /// Make an authenticated request to an arbitrary API path
    Curl {
        #[arg(short, long)]
        path: String,

        #[arg(short = 'X', long, default_value = "GET")]
        method: String,

        #[arg(short, long)]
        data: Option<String>,
    },
}

/// Process-level settings resolved from CLI and environment
#[derive(Clone, Debug)]
pub struct Config {
    pub config_dir: PathBuf,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub log_level: String,
    pub http: HttpSettings,
}

/// Timeouts for the shared HTTP client
#[derive(Clone, Debug, PartialEq)]
pub struct HttpSettings {
    pub connect_timeout: u64,
    pub request_timeout: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: 30,
            request_timeout: 45,
        }
    }
}

impl Config {
    /// Load configuration with priority: CLI > ENV (.env included) > defaults
    pub fn load() -> Result<(Self, Command)> {
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        let config = Self::from_args(&args)?;
        Ok((config, args.command))
    }

    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let config_dir = match args.config_dir.as_deref() {
            Some(dir) if !dir.is_empty() => expand_tilde(dir),
            _ => default_config_dir()?,
        };

        Ok(Config {
            config_dir,
            client_id: args.client_name.clone().filter(|s| !s.is_empty()),
            client_secret: args.client_secret.clone(),
            log_level: args.log_level.clone(),
            http: HttpSettings {
                connect_timeout: std::env::var("CREDHUB_HTTP_CONNECT_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
                request_timeout: args.http_timeout,
            },
        })
    }

    /// Client credentials from the environment, if any
    pub fn client_credentials(&self) -> Option<GrantCredentials> {
        self.client_id.as_ref().map(|id| {
            GrantCredentials::client(id.clone(), self.client_secret.clone().unwrap_or_default())
        })
    }
}

fn default_config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Cannot determine home directory")?;
    Ok(home.join(".credhub"))
}

/// Expand tilde (~) in file paths to user's home directory
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Read a CA certificate argument: a PEM file path or inline PEM text
pub fn read_ca_cert(arg: &str) -> Result<String> {
    if arg.trim_start().starts_with("-----BEGIN") {
        return Ok(arg.to_string());
    }
    let path = expand_tilde(arg);
    fs::read_to_string(&path)
        .with_context(|| format!("Failed to read CA certificate: {}", path.display()))
}

/// The persisted server target. Holds tokens but no client secrets.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerTarget {
    #[serde(rename = "ApiURL", default)]
    pub api_url: String,

    #[serde(rename = "AuthURL", default)]
    pub auth_url: String,

    #[serde(rename = "AccessToken", default)]
    pub access_token: String,

    #[serde(rename = "RefreshToken", default)]
    pub refresh_token: String,

    #[serde(rename = "CaCerts", default)]
    pub ca_certs: Vec<String>,

    #[serde(rename = "InsecureSkipVerify", default)]
    pub insecure_skip_verify: bool,
}

impl ServerTarget {
    pub fn target_url(&self) -> Option<String> {
        Some(self.api_url.clone()).filter(|u| !u.is_empty())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(
            Some(self.access_token.clone()),
            Some(self.refresh_token.clone()),
        )
    }

    pub fn set_tokens(&mut self, creds: &Credentials) {
        self.access_token = creds.access_token.clone().unwrap_or_default();
        self.refresh_token = creds.refresh_token.clone().unwrap_or_default();
    }

    pub fn clear_tokens(&mut self) {
        self.access_token.clear();
        self.refresh_token.clear();
    }
}

/// Reads and writes `config.json` with owner-only permissions
#[derive(Clone, Debug)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        Self {
            path: config_dir.as_ref().join("config.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the target; a missing file is an empty target
    pub fn load(&self) -> Result<ServerTarget> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "No config file, starting empty");
            return Ok(ServerTarget::default());
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read config: {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", self.path.display()))
    }

    pub fn save(&self, target: &ServerTarget) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config dir: {}", dir.display()))?;
        }

        let content =
            serde_json::to_string_pretty(target).context("Failed to serialize config")?;

        write_private(&self.path, content.as_bytes())
            .with_context(|| format!("Failed to write config: {}", self.path.display()))?;

        tracing::debug!(path = %self.path.display(), "Config saved");
        Ok(())
    }

    /// Write back only the token fields, leaving the rest of the file as found
    pub fn save_tokens(&self, creds: &Credentials) -> Result<()> {
        let mut target = self.load()?;
        target.set_tokens(creds);
        self.save(&target)
    }
}

#[cfg(unix)]
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(content)?;
    // mode() only applies on creation
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    fs::write(path, content)
}
