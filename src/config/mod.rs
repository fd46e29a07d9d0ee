//! Configuration for the Dataproc reconciler.
//!
//! This module handles:
//! - Client settings (endpoint, deadline, retries, credentials)
//! - Resource manifests declaring the desired resources
//! - Loading both from YAML, `.env` and `DATAPROC_*` environment variables

mod client;
mod manifest;
mod parser;

pub use client::{CONFIG_DIR_NAME, ClientConfig, CredentialsMode};
pub use manifest::{
    DeclaredResource, KNOWN_KINDS, ManagedResource, Manifest, ManifestEntry, canonical_kind,
};
pub use parser::{ConfigParser, DEFAULT_MANIFEST_FILES, find_manifest_file};
