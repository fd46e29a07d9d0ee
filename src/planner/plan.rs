//! Operation plans and their construction.
//!
//! A plan is built from the diffs between canonical desired and actual state.
//! It either creates the resource, runs one update per named operation, or
//! deletes it. Lifecycle parameters and recreate diffs make a plan
//! infeasible before any mutating call is issued.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PlanError;
use crate::model::{Fingerprinter, Identity, Resource};

use super::diff::{FieldDiff, Remediation};

/// Constraints the caller places on which remediation paths are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleParam {
    /// Creating a missing resource is forbidden.
    BlockCreation,
    /// Taking over an existing, previously unmanaged resource is forbidden.
    BlockAcquire,
    /// Changing an existing resource is forbidden.
    BlockModification,
}

/// Where the initial state came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Baseline {
    /// The resource does not exist.
    Missing,
    /// The resource exists and was fetched from the API.
    Observed,
    /// The resource was supplied by the caller as previously applied state.
    Hinted,
}

impl Baseline {
    /// Returns true if the resource exists.
    #[must_use]
    pub const fn exists(self) -> bool {
        !matches!(self, Self::Missing)
    }
}

/// One HTTP-level action.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlannedOperation {
    /// Create the resource.
    Create,
    /// Run a named update operation for the diffs it remediates.
    Update {
        /// Operation name.
        name: &'static str,
        /// Diffs remediated by this operation.
        diffs: Vec<FieldDiff>,
    },
    /// Delete the resource.
    Delete,
}

impl PlannedOperation {
    /// Short verb for display.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update { .. } => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for PlannedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "Create"),
            Self::Update { name, diffs } => write!(f, "{name} ({} field(s))", diffs.len()),
            Self::Delete => write!(f, "Delete"),
        }
    }
}

/// The plan for a single resource.
#[derive(Debug, Clone, Serialize)]
pub struct ResourcePlan {
    /// Resource kind.
    pub kind: &'static str,
    /// Resource identity.
    pub identity: Identity,
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Fingerprint of the canonical desired resource.
    pub fingerprint: String,
    /// Operations in execution order.
    pub operations: Vec<PlannedOperation>,
    /// Every diff found, in field declaration order.
    pub diffs: Vec<FieldDiff>,
}

impl ResourcePlan {
    /// Builds the plan converging `desired` given the diffs against the baseline.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::InfeasibleUpdate`] if a lifecycle parameter forbids
    /// the required path or a diff requires recreation, and
    /// [`PlanError::UnknownOperation`] if a diff names an undefined operation.
    pub fn build<R: Resource>(
        desired: &R,
        baseline: Baseline,
        diffs: Vec<FieldDiff>,
        lifecycle: &[LifecycleParam],
    ) -> Result<Self, PlanError> {
        let name = desired.name();
        let blocked = |param: LifecycleParam| lifecycle.contains(&param);

        if !baseline.exists() {
            if blocked(LifecycleParam::BlockCreation) {
                return Err(PlanError::infeasible(
                    R::KIND,
                    name,
                    "resource does not exist and creation is blocked",
                ));
            }
            return Ok(Self::new(desired, vec![PlannedOperation::Create], diffs));
        }

        if baseline == Baseline::Observed && blocked(LifecycleParam::BlockAcquire) {
            return Err(PlanError::infeasible(
                R::KIND,
                name,
                "resource already exists and acquisition is blocked",
            ));
        }

        if diffs.is_empty() {
            return Ok(Self::new(desired, Vec::new(), diffs));
        }

        if blocked(LifecycleParam::BlockModification) {
            return Err(PlanError::infeasible(
                R::KIND,
                name,
                format!("{} field(s) differ and modification is blocked", diffs.len()),
            ));
        }

        if let Some(diff) = diffs.iter().find(|d| d.requires_recreate()) {
            return Err(PlanError::infeasible(
                R::KIND,
                name,
                format!("field '{}' cannot be changed in place", diff.path),
            ));
        }

        let mut operations: Vec<PlannedOperation> = Vec::new();
        for diff in &diffs {
            let Remediation::Update(operation) = diff.remediation else {
                continue;
            };
            if R::update_operation(operation).is_none() {
                return Err(PlanError::UnknownOperation {
                    kind: R::KIND.to_string(),
                    operation: operation.to_string(),
                });
            }
            let group = operations.iter_mut().find_map(|op| match op {
                PlannedOperation::Update { name: existing, diffs } if *existing == operation => Some(diffs),
                _ => None,
            });
            match group {
                Some(group) => group.push(diff.clone()),
                None => operations.push(PlannedOperation::Update {
                    name: operation,
                    diffs: vec![diff.clone()],
                }),
            }
        }

        Ok(Self::new(desired, operations, diffs))
    }

    /// A plan that deletes `resource`.
    #[must_use]
    pub fn deletion<R: Resource>(resource: &R) -> Self {
        Self::new(resource, vec![PlannedOperation::Delete], Vec::new())
    }

    fn new<R: Resource>(desired: &R, operations: Vec<PlannedOperation>, diffs: Vec<FieldDiff>) -> Self {
        Self {
            kind: R::KIND,
            identity: desired.identity(),
            created_at: Utc::now(),
            fingerprint: Fingerprinter::new().fingerprint(desired),
            operations,
            diffs,
        }
    }

    /// Returns true if nothing needs to be done.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Returns true if the plan creates the resource.
    #[must_use]
    pub fn creates(&self) -> bool {
        self.operations.contains(&PlannedOperation::Create)
    }

    /// Returns the number of update operations.
    #[must_use]
    pub fn update_count(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op, PlannedOperation::Update { .. }))
            .count()
    }
}

impl fmt::Display for ResourcePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.operations.is_empty() {
            return write!(f, "{} {}: no changes", self.kind, self.identity);
        }
        writeln!(f, "{} {} ({} operation(s)):", self.kind, self.identity, self.operations.len())?;
        for (i, op) in self.operations.iter().enumerate() {
            writeln!(f, "  {i}. {op}")?;
            if let PlannedOperation::Update { diffs, .. } = op {
                for diff in diffs {
                    writeln!(f, "       {diff}")?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AutoscalingPolicy, UPDATE_AUTOSCALING_POLICY};
    use serde_json::json;

    fn policy() -> AutoscalingPolicy {
        AutoscalingPolicy {
            name: Some(String::from("p1")),
            project: Some(String::from("my-project")),
            location: Some(String::from("us-central1")),
            ..AutoscalingPolicy::default()
        }
    }

    fn update(path: &str) -> FieldDiff {
        FieldDiff {
            path: path.to_string(),
            desired: Some(json!(20)),
            actual: Some(json!(10)),
            remediation: Remediation::Update(UPDATE_AUTOSCALING_POLICY),
        }
    }

    fn recreate(path: &str) -> FieldDiff {
        FieldDiff {
            remediation: Remediation::Recreate,
            ..update(path)
        }
    }

    #[test]
    fn test_missing_resource_plans_create() {
        let plan = ResourcePlan::build(&policy(), Baseline::Missing, Vec::new(), &[]).unwrap();
        assert_eq!(plan.operations, vec![PlannedOperation::Create]);
        assert!(plan.creates());
        assert_eq!(plan.fingerprint.len(), 64);
    }

    #[test]
    fn test_block_creation() {
        let err = ResourcePlan::build(&policy(), Baseline::Missing, Vec::new(), &[LifecycleParam::BlockCreation])
            .unwrap_err();
        assert!(matches!(err, PlanError::InfeasibleUpdate { .. }));
    }

    #[test]
    fn test_block_acquire_only_applies_to_unmanaged_resources() {
        let lifecycle = [LifecycleParam::BlockAcquire];
        assert!(ResourcePlan::build(&policy(), Baseline::Observed, Vec::new(), &lifecycle).is_err());
        assert!(ResourcePlan::build(&policy(), Baseline::Hinted, Vec::new(), &lifecycle).is_ok());
    }

    #[test]
    fn test_no_diffs_is_empty_plan() {
        let plan = ResourcePlan::build(&policy(), Baseline::Observed, Vec::new(), &[]).unwrap();
        assert!(plan.is_empty());
        assert!(plan.to_string().contains("no changes"));
    }

    #[test]
    fn test_updates_grouped_by_operation() {
        let diffs = vec![update("workerConfig.maxInstances"), update("basicAlgorithm.cooldownPeriod")];
        let plan = ResourcePlan::build(&policy(), Baseline::Observed, diffs, &[]).unwrap();
        assert_eq!(plan.update_count(), 1);
        let PlannedOperation::Update { name, diffs } = &plan.operations[0] else {
            panic!("expected an update");
        };
        assert_eq!(*name, UPDATE_AUTOSCALING_POLICY);
        assert_eq!(diffs[0].path, "workerConfig.maxInstances");
    }

    #[test]
    fn test_recreate_diff_is_infeasible() {
        let diffs = vec![update("workerConfig.maxInstances"), recreate("id")];
        let err = ResourcePlan::build(&policy(), Baseline::Observed, diffs, &[]).unwrap_err();
        assert!(err.to_string().contains("'id'"));
    }

    #[test]
    fn test_block_modification() {
        let err = ResourcePlan::build(
            &policy(),
            Baseline::Hinted,
            vec![update("workerConfig.maxInstances")],
            &[LifecycleParam::BlockModification],
        )
        .unwrap_err();
        assert!(err.to_string().contains("modification is blocked"));
    }

    #[test]
    fn test_unknown_operation() {
        let mut diff = update("workerConfig.maxInstances");
        diff.remediation = Remediation::Update("UpdateSomethingElse");
        let err = ResourcePlan::build(&policy(), Baseline::Observed, vec![diff], &[]).unwrap_err();
        assert!(matches!(err, PlanError::UnknownOperation { .. }));
    }

    #[test]
    fn test_deletion_plan() {
        let plan = ResourcePlan::deletion(&policy());
        assert_eq!(plan.operations, vec![PlannedOperation::Delete]);
        assert_eq!(plan.operations[0].verb(), "delete");
    }
}
