//! Planning for reconciliation.
//!
//! This module compares canonical desired and actual state field by field
//! and turns the differences into an ordered plan of API operations.

pub mod canonical;
mod diff;
mod executor;
mod plan;

pub use canonical::Canonicalize;
pub use diff::{Compare, Differ, FieldDiff, FieldRule, Remediation, compare};
pub use executor::{ExecutionReport, OperationResult, PlanExecutor};
pub use plan::{Baseline, LifecycleParam, PlannedOperation, ResourcePlan};
