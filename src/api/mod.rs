//! Dataproc REST API integration.
//!
//! [`transport`] moves requests over HTTP, [`client`] maps statuses onto
//! typed errors, and the observer and provisioner implement the generic
//! get, list, create, update and delete calls over any [`Resource`](crate::model::Resource).

pub mod auth;
pub mod client;
mod observer;
mod operation;
mod provisioner;
pub mod retry;
pub mod transport;

pub use auth::{AdcTokenSource, StaticToken, TokenSource};
pub use client::{DEFAULT_BASE_PATH, DataprocClient};
pub use observer::{ResourceList, ResourceObserver, UNLIMITED_PAGE_SIZE};
pub use operation::{Operation, OperationStatus};
pub use provisioner::{DELETE_POLLS, ResourceProvisioner};
pub use retry::RetryPolicy;
pub use transport::{ApiRequest, ApiResponse, DEFAULT_USER_AGENT, HttpTransport, Transport};
