//! Dataproc REST client.
//!
//! Wraps a [`Transport`] with the base URL, the per-call deadline and the
//! mapping of HTTP statuses onto typed errors.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::{ClientConfig, CredentialsMode};
use crate::error::{ApiError, Result};

use super::auth::{AdcTokenSource, StaticToken, TokenSource};
use super::retry::RetryPolicy;
use super::transport::{ApiRequest, ApiResponse, HttpTransport, Transport};

/// Default Dataproc API base URL.
pub const DEFAULT_BASE_PATH: &str = "https://dataproc.googleapis.com/v1/";

/// Longest error body kept in error messages.
const MAX_ERROR_BODY_LENGTH: usize = 2_000;

/// Client for the Dataproc REST API.
#[derive(Clone)]
pub struct DataprocClient {
    transport: Arc<dyn Transport>,
    base_path: String,
    timeout: Option<Duration>,
    retry: RetryPolicy,
}

impl fmt::Debug for DataprocClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataprocClient")
            .field("base_path", &self.base_path)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl DataprocClient {
    /// Creates a client over the given transport with default settings.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            base_path: DEFAULT_BASE_PATH.to_string(),
            timeout: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Builds a client from configuration, resolving credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if no credentials can be resolved or the HTTP client
    /// cannot be built.
    pub async fn from_config(config: &ClientConfig) -> Result<Self> {
        let tokens = token_source(config).await?;
        let transport = HttpTransport::new(tokens, &config.user_agent, config.retry)?;
        info!("Using Dataproc endpoint {}", config.base_path);
        Ok(Self::new(Arc::new(transport))
            .with_base_path(&config.base_path)
            .with_timeout(config.timeout())
            .with_retry(config.retry))
    }

    /// Overrides the base URL; a trailing slash is added if missing.
    #[must_use]
    pub fn with_base_path(mut self, base_path: &str) -> Self {
        let mut base = base_path.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        self.base_path = base;
        self
    }

    /// Sets the per-call deadline; `None` or zero means no deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    /// Sets the retry policy used for polling and the apply loop.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Base URL, always ending with `/`.
    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Retry policy.
    #[must_use]
    pub const fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// Absolute URL of a path relative to the base.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_path, path.trim_start_matches('/'))
    }

    /// Sends a request and returns the parsed JSON body of a 2xx response.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`], [`ApiError::Conflict`],
    /// [`ApiError::RateLimited`] or [`ApiError::ApiRequestFailed`] for non-2xx
    /// statuses, and [`ApiError::DeadlineExceeded`] if the call outlives the
    /// configured timeout.
    pub async fn call(&self, request: ApiRequest) -> Result<Value> {
        let url = request.url.clone();
        debug!("{} {url}", request.method);

        let response = match self.timeout {
            None => self.transport.send(request).await?,
            Some(timeout) => {
                let started = Instant::now();
                tokio::time::timeout(timeout, self.transport.send(request))
                    .await
                    .map_err(|_| ApiError::DeadlineExceeded {
                        url: url.clone(),
                        elapsed_ms: started.elapsed().as_millis(),
                    })??
            }
        };

        check_status(&url, &response)?;
        response.json()
    }
}

/// Maps a non-2xx response onto a typed error.
fn check_status(url: &str, response: &ApiResponse) -> std::result::Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    let body = truncate(&response.body);
    Err(match response.status {
        404 => ApiError::NotFound { url: url.to_string() },
        409 => ApiError::Conflict {
            url: url.to_string(),
            body,
        },
        429 => ApiError::RateLimited { url: url.to_string() },
        status => ApiError::api_error(status, body),
    })
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let cut = (0..=MAX_ERROR_BODY_LENGTH)
        .rev()
        .find(|i| body.is_char_boundary(*i))
        .unwrap_or(0);
    format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
}

async fn token_source(config: &ClientConfig) -> Result<Arc<dyn TokenSource>> {
    let configured = config
        .token
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .map(StaticToken::new)
        .or_else(StaticToken::from_env);

    match (config.credentials, configured) {
        (CredentialsMode::Token | CredentialsMode::Auto, Some(token)) => {
            debug!("Using static access token");
            Ok(Arc::new(token))
        }
        (CredentialsMode::Token, None) => Err(ApiError::AuthenticationFailed {
            message: String::from(
                "credentials mode is 'token' but no token is configured and GOOGLE_OAUTH_ACCESS_TOKEN is unset",
            ),
        }
        .into()),
        (CredentialsMode::Adc | CredentialsMode::Auto, _) => {
            debug!("Using Application Default Credentials");
            Ok(Arc::new(AdcTokenSource::new().await?))
        }
    }
}
