//! Client configuration.
//!
//! Settings for talking to the Dataproc API: endpoint, deadline, retry
//! policy, user agent and credentials. Loaded from YAML, then overridden by
//! `DATAPROC_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use crate::api::{DEFAULT_BASE_PATH, DEFAULT_USER_AGENT, RetryPolicy};
use crate::error::{ConfigError, Result};

/// Directory name under the user config directory.
pub const CONFIG_DIR_NAME: &str = "dataproc-reconciler";

/// How API credentials are resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialsMode {
    /// A static token if one is configured, otherwise ADC.
    #[default]
    Auto,
    /// Application Default Credentials only.
    Adc,
    /// A static token only.
    Token,
}

impl std::str::FromStr for CredentialsMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "adc" => Ok(Self::Adc),
            "token" => Ok(Self::Token),
            other => Err(ConfigError::validation(
                "ClientConfig",
                "credentials",
                format!("unknown credentials mode '{other}' (expected auto, adc or token)"),
            )),
        }
    }
}

/// Dataproc client settings.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API base URL.
    pub base_path: String,
    /// Per-call deadline in seconds; 0 disables it.
    pub timeout_secs: u64,
    /// Retry policy for transient failures, polling and conflicts.
    pub retry: RetryPolicy,
    /// User agent sent with every request.
    pub user_agent: String,
    /// Static access token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Credentials mode.
    pub credentials: CredentialsMode,
    /// Local state file; defaults to the user config directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_BASE_PATH.to_string(),
            timeout_secs: 0,
            retry: RetryPolicy::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            token: None,
            credentials: CredentialsMode::Auto,
            state_file: None,
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_path", &self.base_path)
            .field("timeout_secs", &self.timeout_secs)
            .field("retry", &self.retry)
            .field("user_agent", &self.user_agent)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("credentials", &self.credentials)
            .field("state_file", &self.state_file)
            .finish()
    }
}

impl ClientConfig {
    /// Per-call deadline, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        if self.timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout_secs))
        }
    }

    /// Default location of the client config file.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join("config.yaml"))
    }

    /// State file path: the configured one, else under the user config directory.
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.state_file.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(CONFIG_DIR_NAME)
                .join("state.json")
        })
    }

    /// Applies `DATAPROC_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns a validation error if a numeric or enum override is malformed.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from any variable lookup.
    pub(crate) fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(base) = lookup("DATAPROC_BASE_PATH") {
            debug!("Overriding base_path from environment");
            self.base_path = base;
        }
        if let Some(timeout) = lookup("DATAPROC_TIMEOUT_SECS") {
            debug!("Overriding timeout_secs from environment");
            self.timeout_secs = parse_number("DATAPROC_TIMEOUT_SECS", &timeout)?;
        }
        if let Some(attempts) = lookup("DATAPROC_MAX_ATTEMPTS") {
            debug!("Overriding retry.max_attempts from environment");
            self.retry.max_attempts = parse_number("DATAPROC_MAX_ATTEMPTS", &attempts)?;
        }
        if let Some(user_agent) = lookup("DATAPROC_USER_AGENT") {
            self.user_agent = user_agent;
        }
        if let Some(token) = lookup("DATAPROC_ACCESS_TOKEN").filter(|t| !t.trim().is_empty()) {
            debug!("Using access token from environment");
            self.token = Some(token);
        }
        if let Some(mode) = lookup("DATAPROC_CREDENTIALS") {
            self.credentials = mode.parse()?;
        }
        if let Some(path) = lookup("DATAPROC_STATE_FILE") {
            self.state_file = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Checks the settings are usable.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the first bad setting.
    pub fn validate(&self) -> Result<()> {
        let url = self.base_path.trim();
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ConfigError::validation(
                "ClientConfig",
                "base_path",
                format!("'{url}' is not an http(s) URL"),
            )
            .into());
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::validation("ClientConfig", "retry.max_attempts", "must be at least 1").into());
        }
        if self.retry.multiplier < 1.0 {
            return Err(ConfigError::validation("ClientConfig", "retry.multiplier", "must be at least 1.0").into());
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        ConfigError::ParseError {
            message: format!("{name} must be a non-negative integer, got '{value}'"),
            location: None,
        }
        .into()
    })
}
