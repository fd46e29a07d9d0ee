// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![forbid(unsafe_code)]               // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Dataproc Reconciler
//!
//! Declarative, idempotent reconciliation of Google Cloud Dataproc resources:
//! autoscaling policies, clusters and workflow templates.
//!
//! ## Overview
//!
//! A caller describes the resource it wants. The reconciler fetches what
//! exists, canonicalizes both sides so that server defaults and equivalent
//! representations do not show up as changes, diffs them field by field, and
//! issues the create or update calls needed to converge. It then re-fetches
//! the resource and fails if anything still differs.
//!
//! One generic engine runs over every resource type. Each type supplies a
//! [`model::Resource`] descriptor: URL templates, update operations, and its
//! canonicalize and diff functions.
//!
//! ## Modules
//!
//! - [`model`]: Typed resources, the three-way [`model::Nested`] value and the wire codec
//! - [`planner`]: Canonicalizer, differ, plan construction and execution
//! - [`api`]: HTTP transport, authentication and resource operations
//! - [`reconciler`]: The apply driver
//! - [`config`]: Client configuration and resource manifests
//! - [`state`]: Recorded state used as the next apply's hint
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! project: my-project
//! location: us-central1
//!
//! resources:
//!   - kind: AutoscalingPolicy
//!     name: batch-policy
//!     spec:
//!       basicAlgorithm:
//!         yarnConfig:
//!           gracefulDecommissionTimeout: 3600s
//!           scaleUpFactor: 0.5
//!           scaleDownFactor: 0.5
//!       workerConfig:
//!         maxInstances: 10
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod planner;
pub mod reconciler;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use api::{DataprocClient, ResourceObserver, ResourceProvisioner, RetryPolicy};
pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ClientConfig, ConfigParser, ManagedResource, Manifest};
pub use error::{DataprocError, Result};
pub use model::{AutoscalingPolicy, Cluster, Identity, Nested, Resource, WorkflowTemplate};
pub use planner::{FieldDiff, LifecycleParam, PlanExecutor, ResourcePlan};
pub use reconciler::{ApplyOptions, ApplyOutcome, ApplySummary, Reconciler};
pub use state::{LocalStateStore, ReconcileState, StateStore};
