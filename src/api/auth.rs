//! Access tokens for the Dataproc API.
//!
//! Either a static bearer token (from configuration or
//! `GOOGLE_OAUTH_ACCESS_TOKEN`) or Application Default Credentials resolved by
//! `gcp_auth` and cached in memory.

use async_trait::async_trait;
use gcp_auth::TokenProvider;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{ApiError, Result};

/// OAuth scope requested for ADC tokens.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Environment variable holding a static access token.
pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Refresh this long before the assumed expiry.
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Assumed lifetime of an ADC token.
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Supplies bearer tokens for API requests.
#[async_trait]
pub trait TokenSource: Send + Sync + fmt::Debug {
    /// Returns a currently valid access token.
    async fn token(&self) -> Result<String>;
}

/// A fixed token.
#[derive(Clone)]
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    /// Wraps a token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }

    /// Reads the token from `GOOGLE_OAUTH_ACCESS_TOKEN`, if set and non-empty.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        std::env::var(ACCESS_TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .map(Self::new)
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticToken").field("token", &"<redacted>").finish()
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Application Default Credentials.
#[derive(Clone)]
pub struct AdcTokenSource {
    provider: Arc<dyn TokenProvider>,
    cache: Arc<RwLock<Option<CachedToken>>>,
}

impl fmt::Debug for AdcTokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdcTokenSource").finish_non_exhaustive()
    }
}

impl AdcTokenSource {
    /// Resolves Application Default Credentials.
    ///
    /// # Errors
    ///
    /// Returns an authentication error if no credentials are available.
    pub async fn new() -> Result<Self> {
        let provider = gcp_auth::provider().await.map_err(|e| ApiError::AuthenticationFailed {
            message: format!(
                "Failed to initialize Application Default Credentials ({e}). Run 'gcloud auth application-default login'"
            ),
        })?;
        Ok(Self {
            provider,
            cache: Arc::new(RwLock::new(None)),
        })
    }
}

#[async_trait]
impl TokenSource for AdcTokenSource {
    async fn token(&self) -> Result<String> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref().filter(|c| Instant::now() < c.expires_at) {
                return Ok(cached.token.clone());
            }
        }

        let token = self
            .provider
            .token(&[CLOUD_PLATFORM_SCOPE])
            .await
            .map_err(|e| ApiError::AuthenticationFailed {
                message: format!("Failed to get access token: {e}"),
            })?;
        let token = token.as_str().to_string();

        *self.cache.write().await = Some(CachedToken {
            token: token.clone(),
            expires_at: Instant::now() + DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER,
        });
        debug!("Cached new access token");
        Ok(token)
    }
}
