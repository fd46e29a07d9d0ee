//! Resource manifests.
//!
//! A manifest lists the resources to reconcile:
//!
//! ```yaml
//! project: my-project
//! location: us-central1
//! resources:
//!   - kind: AutoscalingPolicy
//!     name: p1
//!     spec:
//!       workerConfig:
//!         maxInstances: 10
//! ```
//!
//! `spec` uses the API's wire field names. `project` and `location` default
//! to the manifest-level values.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::{ConfigError, Result};
use crate::model::{AutoscalingPolicy, Cluster, Identity, Resource, WorkflowTemplate};
use crate::planner::LifecycleParam;

/// A parsed manifest document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Default project.
    #[serde(default)]
    pub project: Option<String>,
    /// Default location.
    #[serde(default)]
    pub location: Option<String>,
    /// Resource entries.
    #[serde(default)]
    pub resources: Vec<ManifestEntry>,
}

/// One resource entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Resource kind.
    pub kind: String,
    /// Resource name.
    pub name: String,
    /// Project override.
    #[serde(default)]
    pub project: Option<String>,
    /// Location override.
    #[serde(default)]
    pub location: Option<String>,
    /// Lifecycle parameters for this resource.
    #[serde(default)]
    pub lifecycle: Vec<LifecycleParam>,
    /// Resource body in wire format.
    #[serde(default)]
    pub spec: serde_yaml::Value,
}

/// A typed resource from a manifest.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagedResource {
    /// Autoscaling policy.
    AutoscalingPolicy(AutoscalingPolicy),
    /// Cluster.
    Cluster(Cluster),
    /// Workflow template.
    WorkflowTemplate(WorkflowTemplate),
}

/// Kinds a manifest may name.
pub const KNOWN_KINDS: &[&str] = &[AutoscalingPolicy::KIND, Cluster::KIND, WorkflowTemplate::KIND];

/// A typed resource with its lifecycle parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredResource {
    /// The resource.
    pub resource: ManagedResource,
    /// Lifecycle parameters.
    pub lifecycle: Vec<LifecycleParam>,
}

impl ManagedResource {
    /// Resource kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AutoscalingPolicy(_) => AutoscalingPolicy::KIND,
            Self::Cluster(_) => Cluster::KIND,
            Self::WorkflowTemplate(_) => WorkflowTemplate::KIND,
        }
    }

    /// Resource identity.
    #[must_use]
    pub fn identity(&self) -> Identity {
        match self {
            Self::AutoscalingPolicy(r) => r.identity(),
            Self::Cluster(r) => r.identity(),
            Self::WorkflowTemplate(r) => r.identity(),
        }
    }

    /// Validates the resource.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::AutoscalingPolicy(r) => r.validate()?,
            Self::Cluster(r) => r.validate()?,
            Self::WorkflowTemplate(r) => r.validate()?,
        }
        Ok(())
    }

    /// Builds an identity-only resource of the given kind, for get and delete.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownKind`] for an unmanaged kind.
    pub fn reference(kind: &str, identity: &Identity) -> Result<Self> {
        Ok(match canonical_kind(kind)? {
            k if k == AutoscalingPolicy::KIND => Self::AutoscalingPolicy(with_identity(identity)),
            k if k == Cluster::KIND => Self::Cluster(with_identity(identity)),
            _ => Self::WorkflowTemplate(with_identity(identity)),
        })
    }
}

impl fmt::Display for ManagedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.identity())
    }
}

/// Resolves a kind name case-insensitively.
///
/// # Errors
///
/// Returns [`ConfigError::UnknownKind`] if no managed kind matches.
pub fn canonical_kind(kind: &str) -> Result<&'static str> {
    KNOWN_KINDS
        .iter()
        .find(|k| k.eq_ignore_ascii_case(kind.trim()))
        .copied()
        .ok_or_else(|| {
            ConfigError::UnknownKind {
                kind: kind.to_string(),
            }
            .into()
        })
}

fn with_identity<R: Resource + Default>(identity: &Identity) -> R {
    let mut resource = R::default();
    resource.set_identity(identity);
    resource
}

impl Manifest {
    /// Converts every entry into a typed resource.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown kinds, duplicate names, missing identity
    /// or a spec that does not match the resource schema.
    pub fn resources(&self) -> Result<Vec<DeclaredResource>> {
        let mut seen = HashSet::new();
        let mut resolved = Vec::with_capacity(self.resources.len());

        for entry in &self.resources {
            let kind = canonical_kind(&entry.kind)?;
            let identity = Identity {
                project: entry.project.clone().or_else(|| self.project.clone()),
                location: entry.location.clone().or_else(|| self.location.clone()),
                name: Some(entry.name.clone()),
            };
            identity.require(kind)?;
            if !seen.insert((kind, identity.clone())) {
                return Err(ConfigError::DuplicateName {
                    kind: kind.to_string(),
                    name: entry.name.clone(),
                }
                .into());
            }

            let resource = match kind {
                k if k == AutoscalingPolicy::KIND => ManagedResource::AutoscalingPolicy(decode(entry, &identity)?),
                k if k == Cluster::KIND => ManagedResource::Cluster(decode(entry, &identity)?),
                _ => ManagedResource::WorkflowTemplate(decode(entry, &identity)?),
            };
            resolved.push(DeclaredResource {
                resource,
                lifecycle: entry.lifecycle.clone(),
            });
        }

        Ok(resolved)
    }
}

fn decode<R: Resource + Default>(entry: &ManifestEntry, identity: &Identity) -> Result<R> {
    let mut resource: R = match &entry.spec {
        serde_yaml::Value::Null => R::default(),
        spec => {
            let json = serde_json::to_value(spec).map_err(|e| parse_error(entry, &e))?;
            serde_json::from_value(json).map_err(|e| parse_error(entry, &e))?
        }
    };
    resource.set_identity(identity);
    Ok(resource)
}

fn parse_error(entry: &ManifestEntry, e: &dyn fmt::Display) -> ConfigError {
    ConfigError::ParseError {
        message: format!("invalid spec: {e}"),
        location: Some(format!("{} '{}'", entry.kind, entry.name)),
    }
}
