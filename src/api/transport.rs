//! HTTP transport for the Dataproc REST API.
//!
//! The [`Transport`] trait is the seam between the client and the network.
//! [`HttpTransport`] implements it over `reqwest`, adding authentication, a
//! fresh request id per attempt, and retries for rate limiting, server errors
//! and network failures.

use async_trait::async_trait;
use reqwest::{Client, Method, header};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{Instrument, debug, debug_span, trace, warn};
use uuid::Uuid;

use crate::error::{ApiError, Result};
use crate::model::HttpMethod;

use super::auth::TokenSource;
use super::retry::RetryPolicy;

/// Header carrying the per-request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Default user agent.
pub const DEFAULT_USER_AGENT: &str = concat!("dataproc-reconciler/", env!("CARGO_PKG_VERSION"));

/// A request to the API.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Absolute URL.
    pub url: String,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// JSON body.
    pub body: Option<Value>,
}

impl ApiRequest {
    /// Creates a request without query or body.
    #[must_use]
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Sets the JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A raw API response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: String,
}

impl ApiResponse {
    /// Creates a response.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Returns true for statuses worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.status == 429 || self.status >= 500
    }

    /// Parses the body as JSON; an empty body is `null`.
    ///
    /// # Errors
    ///
    /// Returns an invalid-response error if the body is not JSON.
    pub fn json(&self) -> Result<Value> {
        if self.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&self.body)
            .map_err(|e| ApiError::invalid_response(format!("Failed to parse response: {e}")).into())
    }
}

/// Sends API requests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a request and returns the raw response, whatever its status.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;
}

/// `reqwest`-backed transport.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    tokens: Arc<dyn TokenSource>,
    retry: RetryPolicy,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("tokens", &self.tokens)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Creates a transport.
    ///
    /// # Errors
    ///
    /// Returns a network error if the HTTP client cannot be built.
    pub fn new(tokens: Arc<dyn TokenSource>, user_agent: &str, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| ApiError::network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, tokens, retry })
    }

    async fn send_once(&self, request: &ApiRequest, request_id: &str) -> Result<ApiResponse> {
        let token = self.tokens.token().await?;
        let mut builder = self
            .client
            .request(to_method(request.method), &request.url)
            .bearer_auth(token)
            .header(REQUEST_ID_HEADER, request_id)
            .header(header::ACCEPT, "application/json");
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            trace!("Request body: {body}");
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::network(format!("Request failed: {e}")))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::network(format!("Failed to read response body: {e}")))?;
        debug!("{} {} -> {status}", request.method, request.url);
        Ok(ApiResponse::new(status, body))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let request_id = Uuid::new_v4().to_string();
            let span = debug_span!(
                "dataproc_request",
                request_id = %request_id,
                method = %request.method,
                url = %request.url,
                attempt
            );
            let outcome = self.send_once(&request, &request_id).instrument(span).await;

            let retryable = match &outcome {
                Ok(response) => response.is_retryable(),
                Err(e) => e.is_retryable(),
            };
            if !retryable || !self.retry.allows(attempt) {
                return outcome;
            }

            let delay = self.retry.backoff(attempt);
            match &outcome {
                Ok(response) => warn!(
                    "{} {} returned {}, retrying in {delay:?} (attempt {attempt}/{})",
                    request.method, request.url, response.status, self.retry.max_attempts
                ),
                Err(e) => warn!(
                    "{} {} failed: {e}, retrying in {delay:?} (attempt {attempt}/{})",
                    request.method, request.url, self.retry.max_attempts
                ),
            }
            tokio::time::sleep(delay).await;
        }
    }
}

const fn to_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_json() {
        assert_eq!(ApiResponse::new(200, "").json().unwrap(), Value::Null);
        assert_eq!(
            ApiResponse::new(200, r#"{"a":1}"#).json().unwrap(),
            serde_json::json!({"a": 1})
        );
        assert!(ApiResponse::new(200, "not json").json().is_err());
    }

    #[test]
    fn test_response_classification() {
        assert!(ApiResponse::new(204, "").is_success());
        assert!(!ApiResponse::new(404, "").is_success());
        assert!(ApiResponse::new(429, "").is_retryable());
        assert!(ApiResponse::new(503, "").is_retryable());
        assert!(!ApiResponse::new(409, "").is_retryable());
    }

    #[test]
    fn test_request_builder() {
        let request = ApiRequest::new(HttpMethod::Get, "https://example.test/v1/x")
            .with_query("pageSize", "10")
            .with_body(serde_json::json!({}));
        assert_eq!(request.query, vec![(String::from("pageSize"), String::from("10"))]);
        assert!(request.body.is_some());
    }
}
