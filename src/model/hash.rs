//! Resource fingerprints for change detection.
//!
//! A fingerprint is the SHA-256 of a resource's JSON encoding. Map fields are
//! `BTreeMap`s and struct fields serialize in declaration order, so the
//! encoding and therefore the fingerprint are deterministic.

use sha2::{Digest, Sha256};

use super::resource::Resource;

/// Computes resource fingerprints.
#[derive(Debug, Default)]
pub struct Fingerprinter;

impl Fingerprinter {
    /// Creates a new fingerprinter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Fingerprints a resource, identity included.
    #[must_use]
    pub fn fingerprint<R: Resource>(&self, resource: &R) -> String {
        let mut hasher = Sha256::new();
        hasher.update(R::KIND.as_bytes());
        hasher.update(resource.identity().to_string().as_bytes());
        if let Ok(encoded) = serde_json::to_vec(resource) {
            hasher.update(&encoded);
        }
        hex::encode(hasher.finalize())
    }

    /// Returns the first 12 characters of a fingerprint.
    #[must_use]
    pub fn short(&self, fingerprint: &str) -> String {
        fingerprint.chars().take(12).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AutoscalingPolicy;

    fn policy(name: &str) -> AutoscalingPolicy {
        AutoscalingPolicy {
            name: Some(name.to_string()),
            project: Some(String::from("my-project")),
            location: Some(String::from("us-central1")),
            ..AutoscalingPolicy::default()
        }
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let fp = Fingerprinter::new();
        assert_eq!(fp.fingerprint(&policy("p1")), fp.fingerprint(&policy("p1")));
        assert_eq!(fp.fingerprint(&policy("p1")).len(), 64);
    }

    #[test]
    fn test_fingerprint_covers_identity() {
        let fp = Fingerprinter::new();
        let mut moved = policy("p1");
        moved.location = Some(String::from("europe-west1"));
        assert_ne!(fp.fingerprint(&policy("p1")), fp.fingerprint(&moved));
        assert_eq!(fp.short(&fp.fingerprint(&moved)).len(), 12);
    }
}
