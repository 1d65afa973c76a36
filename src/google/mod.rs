//! HTTP plumbing shared by the YouTube and Sheets clients.
//!
//! Every request goes through [`ApiClient`], which owns the retry policy and
//! turns Google's JSON error bodies into [`ApiError`] variants. The actual
//! network call sits behind [`HttpTransport`] so tests can script responses.

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

pub mod oauth;
pub mod service_account;
pub mod session;

#[cfg(test)]
pub mod testing;

pub use session::{AccessToken, GoogleSessions, SessionProvider};

/// Request body variants used by the Google APIs we call
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
}

/// A single upstream request, independent of the HTTP library
#[derive(Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub bearer: Option<String>,
    pub body: Option<RequestBody>,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            bearer: None,
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn bearer(mut self, token: &str) -> Self {
        self.bearer = Some(token.to_string());
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    /// Look up a query parameter by name
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

// Query strings carry the API key and bodies carry secrets, so only the
// method and URL are printed.
impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into() }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network-level failure: the request never produced an HTTP status
#[derive(thiserror::Error, Debug, Clone)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Sends requests over the wire
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// Production transport backed by reqwest
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("channel-exporter/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| TransportError(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .query(&request.query);

        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }

        builder = match &request.body {
            Some(RequestBody::Json(value)) => builder.json(value),
            None => builder,
        };

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError(e.without_url().to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError(e.without_url().to_string()))?;

        Ok(ApiResponse { status, body })
    }
}

/// Classified upstream failure
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("quota exceeded ({reason})")]
    Quota { reason: String },

    #[error("unauthorized ({reason})")]
    Unauthorized { reason: String },

    #[error("forbidden ({reason})")]
    Forbidden { reason: String },

    #[error("not found ({reason})")]
    NotFound { reason: String },

    #[error("HTTP {status} ({reason})")]
    Status { status: u16, reason: String },

    #[error("{message} after {attempts} attempt(s)")]
    Transient { attempts: u32, message: String },

    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn reason(&self) -> &str {
        match self {
            ApiError::Quota { reason }
            | ApiError::Unauthorized { reason }
            | ApiError::Forbidden { reason }
            | ApiError::NotFound { reason }
            | ApiError::Status { reason, .. } => reason,
            ApiError::Transient { message, .. } => message,
            ApiError::Decode(message) => message,
        }
    }
}

const QUOTA_REASONS: &[&str] = &["quotaExceeded", "dailyLimitExceeded"];
const RATE_LIMIT_REASONS: &[&str] = &["rateLimitExceeded", "userRateLimitExceeded"];
const INVALID_KEY_REASONS: &[&str] = &["keyInvalid", "API_KEY_INVALID"];

/// Pull the most specific reason out of a Google error body.
///
/// Handles both the API shape (`{"error": {"errors": [{"reason": ..}], "status": ..}}`)
/// and the OAuth token endpoint shape (`{"error": "invalid_grant"}`).
pub fn error_reason(body: &str) -> String {
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => return String::new(),
    };

    let error = &value["error"];
    if let Some(code) = error.as_str() {
        return code.to_string();
    }

    if let Some(reason) = error["errors"][0]["reason"].as_str() {
        return reason.to_string();
    }

    if let Some(reason) = error["details"][0]["reason"].as_str() {
        return reason.to_string();
    }

    error["status"].as_str().unwrap_or_default().to_string()
}

enum Outcome {
    Done(Result<ApiResponse, ApiError>),
    Retry(String),
}

fn classify(response: ApiResponse) -> Outcome {
    if response.is_success() {
        return Outcome::Done(Ok(response));
    }

    let reason = error_reason(&response.body);
    let status = response.status;

    if QUOTA_REASONS.contains(&reason.as_str()) {
        return Outcome::Done(Err(ApiError::Quota { reason }));
    }
    if status == 429 || status >= 500 || RATE_LIMIT_REASONS.contains(&reason.as_str()) {
        return Outcome::Retry(format!("HTTP {status} {reason}").trim_end().to_string());
    }
    if INVALID_KEY_REASONS.contains(&reason.as_str()) {
        return Outcome::Done(Err(ApiError::Unauthorized { reason }));
    }

    let err = match status {
        401 => ApiError::Unauthorized { reason },
        403 => ApiError::Forbidden { reason },
        404 => ApiError::NotFound { reason },
        _ => ApiError::Status { status, reason },
    };
    Outcome::Done(Err(err))
}

/// Exponential backoff for transient failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self { max_retries, base_delay }
    }

    /// Delay before retry number `retry` (0-based)
    pub fn delay(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

/// Retrying, classifying client shared by every upstream component
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    retry: RetryPolicy,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn HttpTransport>, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    /// Send a request, retrying transient failures with exponential backoff
    pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let message = match self.transport.send(request).await {
                Ok(response) => match classify(response) {
                    Outcome::Done(result) => return result,
                    Outcome::Retry(message) => message,
                },
                Err(err) => err.0,
            };

            if attempt > self.retry.max_retries {
                tracing::warn!("Giving up on {} after {} attempts: {}", request.url, attempt, message);
                return Err(ApiError::Transient { attempts: attempt, message });
            }

            let delay = self.retry.delay(attempt - 1);
            tracing::debug!(
                "Transient failure on {} ({}), retrying in {:?}",
                request.url,
                message,
                delay
            );
            sleep(delay).await;
        }
    }

    /// Send a request and decode the JSON body
    pub async fn json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ApiError> {
        let response = self.execute(request).await?;
        serde_json::from_str(&response.body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Send a request and return the raw body text
    pub async fn text(&self, request: &ApiRequest) -> Result<String, ApiError> {
        Ok(self.execute(request).await?.body)
    }
}
