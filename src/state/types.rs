//! State types for recording applied resources.
//!
//! The state file keeps, per resource, the last canonical state observed
//! after a successful apply. It is read back as the state hint for the next
//! apply of the same resource.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{Result, StateError};
use crate::model::{Fingerprinter, Identity, Resource, codec};

/// Current version of the state format.
pub const STATE_VERSION: &str = "1.0";

/// The complete state file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileState {
    /// State format version.
    pub version: String,
    /// Records keyed by `kind/project/location/name`.
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceRecord>,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
}

/// The recorded state of one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Resource kind.
    pub kind: String,
    /// Resource identity.
    pub identity: Identity,
    /// Fingerprint of the recorded state.
    pub fingerprint: String,
    /// Canonical state observed after apply, in wire format.
    pub observed: Value,
    /// When the resource was last applied.
    pub applied_at: DateTime<Utc>,
}

impl Default for ReconcileState {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconcileState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            resources: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }

    /// Key under which a resource is recorded.
    #[must_use]
    pub fn key(kind: &str, identity: &Identity) -> String {
        format!("{kind}/{identity}")
    }

    /// Records the applied state of `resource`.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the resource cannot be encoded.
    pub fn record<R: Resource>(&mut self, resource: &R) -> Result<()> {
        let identity = resource.identity();
        let observed = codec::to_object(resource)
            .map_err(|e| StateError::serialization(format!("Failed to encode {}: {e}", R::KIND)))?;
        let now = Utc::now();
        self.resources.insert(
            Self::key(R::KIND, &identity),
            ResourceRecord {
                kind: R::KIND.to_string(),
                identity,
                fingerprint: Fingerprinter::new().fingerprint(resource),
                observed: Value::Object(observed),
                applied_at: now,
            },
        );
        self.last_updated = now;
        Ok(())
    }

    /// Returns the recorded state of a resource, decoded, if present.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Corrupted`] if the record does not decode.
    pub fn hint<R: Resource>(&self, identity: &Identity) -> Result<Option<R>> {
        let Some(record) = self.resources.get(&Self::key(R::KIND, identity)) else {
            return Ok(None);
        };
        let mut resource: R = serde_json::from_value(record.observed.clone()).map_err(|e| StateError::Corrupted {
            message: format!("Record for {} {identity} does not decode: {e}", R::KIND),
        })?;
        resource.set_identity(&record.identity);
        Ok(Some(resource))
    }

    /// Removes a record; returns true if one existed.
    pub fn remove(&mut self, kind: &str, identity: &Identity) -> bool {
        let removed = self.resources.remove(&Self::key(kind, identity)).is_some();
        if removed {
            self.last_updated = Utc::now();
        }
        removed
    }

    /// Number of recorded resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns true if nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
