// Response classification
//
// The one rule deciding whether a response means "token expired". Only
// `Expired` triggers the refresh-and-replay; everything else passes through.

use reqwest::StatusCode;

use super::types::ACCESS_TOKEN_EXPIRED;

/// Outcome of a resource API response as seen by the auth layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// Status below 400
    Success,
    /// Status >= 400 with `{"error":"access_token_expired"}`
    Expired,
    /// Other 4xx with a JSON object body
    OtherClientError,
    /// 5xx (or other >= 400) with a JSON object body
    ServerError,
    /// Status >= 400 and the body is not a JSON object
    Malformed,
}

impl ResponseClass {
    pub fn is_expired(self) -> bool {
        self == ResponseClass::Expired
    }
}

/// Classify a response by status and raw body bytes
pub fn classify(status: StatusCode, body: &[u8]) -> ResponseClass {
    if status.as_u16() < 400 {
        return ResponseClass::Success;
    }

    let object = match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => return ResponseClass::Malformed,
    };

    match object.get("error").and_then(|v| v.as_str()) {
        Some(ACCESS_TOKEN_EXPIRED) => ResponseClass::Expired,
        _ if status.is_client_error() => ResponseClass::OtherClientError,
        _ => ResponseClass::ServerError,
    }
}
