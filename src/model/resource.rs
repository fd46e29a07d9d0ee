//! The resource descriptor driving the generic reconciliation engine.
//!
//! Each Dataproc resource type implements [`Resource`] once: its URL
//! templates, named update operations, canonicalization and diff rules. The
//! client, planner and reconciler are written against this trait only.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConfigError;
use crate::planner::FieldDiff;

/// Identity fields of a resource. Immutable once set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Google Cloud project.
    pub project: Option<String>,
    /// Location (region for clusters).
    pub location: Option<String>,
    /// Resource name.
    pub name: Option<String>,
}

impl Identity {
    /// Creates a fully populated identity.
    #[must_use]
    pub fn new(project: impl Into<String>, location: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            project: Some(project.into()),
            location: Some(location.into()),
            name: Some(name.into()),
        }
    }

    /// Returns `(project, location, name)`, failing on the first unset part.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the missing identity field.
    pub fn require(&self, kind: &str) -> Result<(&str, &str, &str), ConfigError> {
        Ok((
            required_part(self.project.as_ref(), kind, "project")?,
            required_part(self.location.as_ref(), kind, "location")?,
            required_part(self.name.as_ref(), kind, "name")?,
        ))
    }

    /// Returns the `(project, location)` parent, failing on the first unset part.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the missing identity field.
    pub fn require_parent(&self, kind: &str) -> Result<(&str, &str), ConfigError> {
        Ok((
            required_part(self.project.as_ref(), kind, "project")?,
            required_part(self.location.as_ref(), kind, "location")?,
        ))
    }
}

fn required_part<'a>(value: Option<&'a String>, kind: &str, field: &str) -> Result<&'a str, ConfigError> {
    value
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::required(kind, field))
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: &Option<String>| v.clone().unwrap_or_else(|| String::from("?"));
        write!(
            f,
            "{}/{}/{}",
            show(&self.project),
            show(&self.location),
            show(&self.name)
        )
    }
}

/// HTTP methods used by the Dataproc API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        };
        write!(f, "{s}")
    }
}

/// How an update operation builds its request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateBody {
    /// Every top-level object touched by a diff is sent whole.
    TopLevel,
    /// Only touched leaf fields are sent, listed in the `updateMask` query parameter.
    Masked,
}

/// A named in-place update operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOperation {
    /// Operation name referenced by field rules.
    pub name: &'static str,
    /// HTTP method.
    pub method: HttpMethod,
    /// Body shape.
    pub body: UpdateBody,
}

/// A Dataproc resource type.
pub trait Resource:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Resource kind, as written in manifests.
    const KIND: &'static str;

    /// Key holding the items array in a list response.
    const LIST_KEY: &'static str;

    /// Whether mutating calls return a long-running operation.
    const LONG_RUNNING: bool = false;

    /// Dotted wire paths the server populates; never sent on create.
    const OUTPUT_ONLY: &'static [&'static str] = &[];

    /// Wire key repeated in update bodies as the resource's derived id.
    const ID_KEY: Option<&'static str> = None;

    /// Named update operations this resource supports.
    const UPDATE_OPERATIONS: &'static [UpdateOperation] = &[];

    /// Returns the identity fields.
    fn identity(&self) -> Identity;

    /// Overwrites the identity fields.
    fn set_identity(&mut self, identity: &Identity);

    /// Checks required-field presence before any network call.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure.
    fn validate(&self) -> Result<(), ConfigError>;

    /// Path of the collection under the base URL.
    fn collection_path(project: &str, location: &str) -> String;

    /// Maps a diff path onto its `updateMask` entry, for masked updates.
    fn update_mask_path(_wire_path: &str) -> Option<&'static str> {
        None
    }

    /// Canonicalizes raw desired state against the initial state, if any.
    fn canonicalize_desired(raw_desired: &Self, initial: Option<&Self>) -> Self;

    /// Canonicalizes the raw initial state against raw desired state.
    fn canonicalize_initial(raw_initial: &Self, _raw_desired: &Self) -> Self {
        raw_initial.clone()
    }

    /// Canonicalizes freshly observed state against raw desired state.
    fn canonicalize_new(raw_new: &Self, raw_desired: &Self) -> Self;

    /// Field-level differences between canonical desired and actual state.
    fn diff(desired: &Self, actual: &Self) -> Vec<FieldDiff>;

    /// Resource name, or an empty string when unset.
    fn name(&self) -> String {
        self.identity().name.unwrap_or_default()
    }

    /// Path of this resource under the base URL.
    ///
    /// # Errors
    ///
    /// Returns a validation error if an identity field is unset.
    fn resource_path(&self) -> Result<String, ConfigError> {
        let identity = self.identity();
        let (project, location, name) = identity.require(Self::KIND)?;
        Ok(format!("{}/{name}", Self::collection_path(project, location)))
    }

    /// Path of the parent collection under the base URL.
    ///
    /// # Errors
    ///
    /// Returns a validation error if project or location is unset.
    fn parent_path(&self) -> Result<String, ConfigError> {
        let identity = self.identity();
        let (project, location) = identity.require_parent(Self::KIND)?;
        Ok(Self::collection_path(project, location))
    }

    /// Looks up a named update operation.
    #[must_use]
    fn update_operation(name: &str) -> Option<&'static UpdateOperation> {
        Self::UPDATE_OPERATIONS.iter().find(|op| op.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_require() {
        let identity = Identity::new("p", "us-central1", "c1");
        assert_eq!(identity.require("Cluster").unwrap(), ("p", "us-central1", "c1"));

        let partial = Identity {
            project: Some(String::from("p")),
            ..Identity::default()
        };
        let err = partial.require("Cluster").unwrap_err();
        assert!(err.to_string().contains("'location'"));
        assert!(partial.require_parent("Cluster").is_err());
    }

    #[test]
    fn test_identity_display() {
        let identity = Identity {
            name: Some(String::from("p1")),
            ..Identity::default()
        };
        assert_eq!(identity.to_string(), "?/?/p1");
    }

    #[test]
    fn test_http_method() {
        assert_eq!(HttpMethod::Put.to_string(), "PUT");
    }
}
