// Repositories decode successful API responses into domain objects

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::ApiResponse;
use crate::error::{ClientError, Result};

/// Maps a successful response to a domain object
pub trait Repository {
    type Item;

    fn decode(&self, response: ApiResponse, identifier: &str) -> Result<Self::Item>;
}

/// A stored credential version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_created_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CredentialEnvelope {
    Versions { data: Vec<Credential> },
    Single(Credential),
}

/// Decodes a credential, either bare or from a `{"data":[...]}` envelope
/// whose first entry is the current version
#[derive(Debug, Clone, Copy, Default)]
pub struct CredentialRepository;

impl Repository for CredentialRepository {
    type Item = Credential;

    fn decode(&self, response: ApiResponse, identifier: &str) -> Result<Credential> {
        let envelope: CredentialEnvelope = serde_json::from_slice(&response.body)
            .map_err(|e| ClientError::ResponseDecode(format!("credential {}: {}", identifier, e)))?;

        match envelope {
            CredentialEnvelope::Single(credential) => Ok(credential),
            CredentialEnvelope::Versions { data } => data.into_iter().next().ok_or_else(|| {
                ClientError::ResponseDecode(format!("no versions returned for {}", identifier))
            }),
        }
    }
}

/// Passes the JSON body through; an empty body decodes to `null`
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRepository;

impl Repository for JsonRepository {
    type Item = serde_json::Value;

    fn decode(&self, response: ApiResponse, identifier: &str) -> Result<serde_json::Value> {
        if response.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_slice(&response.body)
            .map_err(|e| ClientError::ResponseDecode(format!("{}: {}", identifier, e)))
    }
}
