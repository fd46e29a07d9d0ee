//! Configuration parser for client settings and resource manifests.
//!
//! This module loads YAML files and the `.env` file, with environment
//! variables taking precedence over file values.

use crate::error::{ConfigError, DataprocError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::client::ClientConfig;
use super::manifest::Manifest;

/// Parser for configuration and manifest files.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving `.env`.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads a manifest from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_manifest(&self, path: impl AsRef<Path>) -> Result<Manifest> {
        let path = path.as_ref();
        info!("Loading manifest from: {}", path.display());
        let content = read_file(path)?;
        self.parse_manifest(&content, Some(path))
    }

    /// Parses a manifest from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_manifest(&self, content: &str, source: Option<&Path>) -> Result<Manifest> {
        let manifest: Manifest = parse_yaml(content, source)?;
        debug!("Parsed manifest with {} resource(s)", manifest.resources.len());
        Ok(manifest)
    }

    /// Loads client settings.
    ///
    /// An explicit `path` must exist. Without one, the default location under
    /// the user config directory is used if present, else built-in defaults.
    /// `DATAPROC_*` environment variables are applied last.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read or parsed, or an override is malformed.
    pub fn load_client_config(&self, path: Option<&Path>) -> Result<ClientConfig> {
        let file = match path {
            Some(path) => Some(path.to_path_buf()),
            None => ClientConfig::default_path().filter(|p| p.exists()),
        };

        let mut config = match file {
            Some(file) => {
                info!("Loading client configuration from: {}", file.display());
                let content = read_file(&file)?;
                if content.trim().is_empty() {
                    ClientConfig::default()
                } else {
                    parse_yaml(&content, Some(&file))?
                }
            }
            None => {
                debug!("No client configuration file, using defaults");
                ClientConfig::default()
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                DataprocError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

fn read_file(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(DataprocError::Config(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        }));
    }
    std::fs::read_to_string(path).map_err(|e| {
        DataprocError::Config(ConfigError::ParseError {
            message: format!("Failed to read file: {e}"),
            location: Some(path.display().to_string()),
        })
    })
}

fn parse_yaml<T: serde::de::DeserializeOwned>(content: &str, source: Option<&Path>) -> Result<T> {
    serde_yaml::from_str(content).map_err(|e| {
        let location = source.map(|p| p.display().to_string());
        DataprocError::Config(ConfigError::ParseError {
            message: format!("YAML parse error: {e}"),
            location,
        })
    })
}

/// Default manifest file names to search for.
pub const DEFAULT_MANIFEST_FILES: &[&str] = &["dataproc.yaml", "dataproc.yml"];

/// Finds the manifest in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no manifest is found.
pub fn find_manifest_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_MANIFEST_FILES {
            let manifest_path = current.join(filename);
            if manifest_path.exists() {
                info!("Found manifest: {}", manifest_path.display());
                return Ok(manifest_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(DataprocError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_MANIFEST_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CredentialsMode;

    #[test]
    fn test_parse_manifest() {
        let yaml = r"
project: my-project
location: us-central1
resources:
  - kind: WorkflowTemplate
    name: nightly
    spec:
      placement:
        clusterSelector:
          clusterLabels:
            env: prod
      jobs:
        - stepId: etl
          sparkJob:
            mainClass: com.example.Etl
";
        let manifest = ConfigParser::new().parse_manifest(yaml, None).unwrap();
        assert_eq!(manifest.project.as_deref(), Some("my-project"));
        assert_eq!(manifest.resources.len(), 1);
        assert_eq!(manifest.resources[0].kind, "WorkflowTemplate");
        assert_eq!(manifest.resources().unwrap().len(), 1);
    }

    #[test]
    fn test_parse_error_has_location() {
        let err = ConfigParser::new()
            .parse_manifest("resources: {", Some(Path::new("dataproc.yaml")))
            .unwrap_err();
        assert!(matches!(
            err,
            DataprocError::Config(ConfigError::ParseError { location: Some(ref l), .. }) if l == "dataproc.yaml"
        ));
    }

    #[test]
    fn test_load_client_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "base_path: http://localhost:8080/v1/\ntimeout_secs: 5\ncredentials: adc\nretry:\n  max_attempts: 2\n",
        )
        .unwrap();

        let config = ConfigParser::new().load_client_config(Some(&path)).unwrap();
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.credentials, CredentialsMode::Adc);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.initial_backoff_ms, 500);
    }

    #[test]
    fn test_missing_explicit_config() {
        let err = ConfigParser::new()
            .load_client_config(Some(Path::new("/nonexistent/config.yaml")))
            .unwrap_err();
        assert!(matches!(err, DataprocError::Config(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_find_manifest_in_parent() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("dataproc.yaml"), "resources: []\n").unwrap();

        let found = find_manifest_file(&nested).unwrap();
        assert_eq!(found, dir.path().join("dataproc.yaml"));
    }
}
