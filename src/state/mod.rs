//! State management for the Dataproc reconciler.
//!
//! This module records the last applied state of each resource so the next
//! apply can use it as its state hint instead of fetching.

mod local;
mod store;
mod types;

pub use local::LocalStateStore;
pub use store::StateStore;
pub use types::{ReconcileState, ResourceRecord, STATE_VERSION};
