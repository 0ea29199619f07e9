use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};
use std::sync::Arc;

use crate::auth::{ApiResponse, AuthStrategy, ErrorBody, RequestTemplate, ResponseClass};
use crate::error::{ClientError, Result};
use crate::replay::Payload;
use crate::repository::Repository;

/// One credential API operation, relative to the configured target
#[derive(Debug)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub payload: Payload,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            payload: Payload::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    fn template(&self, api_url: &str) -> Result<RequestTemplate> {
        let raw = format!(
            "{}/{}",
            api_url.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        );
        let mut url = Url::parse(&raw)
            .map_err(|e| ClientError::Config(format!("invalid API URL {}: {}", raw, e)))?;

        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }

        let mut template = RequestTemplate::new(self.method.clone(), url.to_string());
        template.headers = self.headers.clone();
        Ok(template)
    }
}

/// Entry point for every credential operation
pub struct RequestDispatcher {
    /// Target API URL, if one is configured
    api_url: Option<String>,

    /// Authenticated sender
    auth: Arc<AuthStrategy>,
}

impl RequestDispatcher {
    pub fn new(api_url: Option<String>, auth: Arc<AuthStrategy>) -> Self {
        Self {
            api_url: api_url.filter(|u| !u.is_empty()),
            auth,
        }
    }

    pub fn auth(&self) -> &Arc<AuthStrategy> {
        &self.auth
    }

    /// Send `request` and decode the result with `repository`.
    ///
    /// The payload is snapshotted before the first send so a refresh-and-replay
    /// resends identical bytes. Errors propagate unchanged.
    pub async fn execute<R: Repository>(
        &self,
        request: ApiRequest,
        identifier: &str,
        repository: &R,
    ) -> Result<R::Item> {
        let api_url = self
            .api_url
            .as_deref()
            .ok_or(ClientError::NoTargetConfigured)?;

        let template = request.template(api_url)?;
        let body = request.payload.snapshot().await?;

        tracing::debug!(
            method = %template.method,
            url = %template.url,
            body_len = body.as_bytes().len(),
            "Dispatching request"
        );

        let response = self.auth.do_request(&template, &body).await?;
        let response = check_response(response)?;

        repository.decode(response, identifier)
    }
}

/// Turn a non-success response into the matching error
pub fn check_response(response: ApiResponse) -> Result<ApiResponse> {
    let class = response.class();
    if class == ResponseClass::Success {
        return Ok(response);
    }

    let status = response.status.as_u16();
    let message = ErrorBody::message_from(&response.body);

    tracing::error!(
        status,
        class = ?class,
        message = %message,
        "API request failed"
    );

    match class {
        ResponseClass::Expired => Err(ClientError::AuthExpired(message)),
        _ => Err(ClientError::Server { status, message }),
    }
}
