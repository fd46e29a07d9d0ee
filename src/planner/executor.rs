//! Plan executor.
//!
//! Runs the operations of a [`ResourcePlan`] in order against the
//! provisioner, stopping at the first failure.

use serde_json::Value;
use std::fmt;
use tracing::{error, info};

use crate::api::ResourceProvisioner;
use crate::error::{PlanError, Result};
use crate::model::Resource;

use super::plan::{PlannedOperation, ResourcePlan};

/// Executor for resource plans.
#[derive(Debug)]
pub struct PlanExecutor<'a> {
    /// Provisioner issuing the calls.
    provisioner: &'a ResourceProvisioner,
}

/// Result of executing a single operation.
#[derive(Debug, Clone)]
pub struct OperationResult {
    /// Operation index in the plan.
    pub index: usize,
    /// Operation that was executed.
    pub operation: PlannedOperation,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error message, if failed.
    pub error: Option<String>,
}

/// Result of executing a whole plan.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    /// Individual operation results.
    pub results: Vec<OperationResult>,
    /// Inline response of a create call, if the plan created the resource.
    pub create_response: Option<Value>,
}

impl<'a> PlanExecutor<'a> {
    /// Creates a new plan executor.
    #[must_use]
    pub const fn new(provisioner: &'a ResourceProvisioner) -> Self {
        Self { provisioner }
    }

    /// Executes `plan` for `desired`.
    ///
    /// # Errors
    ///
    /// Returns the error of the first operation that fails; later operations
    /// are not attempted.
    pub async fn execute<R: Resource>(&self, plan: &ResourcePlan, desired: &R) -> Result<ExecutionReport> {
        let mut report = ExecutionReport::default();
        if plan.is_empty() {
            return Ok(report);
        }

        info!(
            "Executing plan for {} {} with {} operation(s)",
            plan.kind,
            plan.identity,
            plan.operations.len()
        );

        for (index, operation) in plan.operations.iter().enumerate() {
            info!("Executing operation {index}: {operation}");
            let outcome = self.execute_operation(operation, desired, &mut report).await;
            let error = outcome.as_ref().err().map(ToString::to_string);
            report.results.push(OperationResult {
                index,
                operation: operation.clone(),
                success: error.is_none(),
                error,
            });
            if let Err(e) = outcome {
                error!("Operation {index} ({}) failed for {}: {e}", operation.verb(), plan.identity);
                return Err(e);
            }
        }

        info!("{report}");
        Ok(report)
    }

    async fn execute_operation<R: Resource>(
        &self,
        operation: &PlannedOperation,
        desired: &R,
        report: &mut ExecutionReport,
    ) -> Result<()> {
        match operation {
            PlannedOperation::Create => {
                report.create_response = self.provisioner.create(desired).await?;
            }
            PlannedOperation::Update { name, diffs } => {
                let update = R::update_operation(name).ok_or_else(|| PlanError::UnknownOperation {
                    kind: R::KIND.to_string(),
                    operation: (*name).to_string(),
                })?;
                self.provisioner.update(desired, update, diffs).await?;
            }
            PlannedOperation::Delete => {
                self.provisioner.delete(desired).await?;
            }
        }
        Ok(())
    }
}

impl ExecutionReport {
    /// Number of successful operations.
    #[must_use]
    pub fn successful(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }
}

impl fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Executed {} operation(s): {} successful",
            self.results.len(),
            self.successful()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::retry::RetryPolicy;
    use crate::api::transport::{ApiResponse, MockTransport};
    use crate::api::DataprocClient;
    use crate::model::{AutoscalingPolicy, HttpMethod};
    use crate::planner::Baseline;
    use std::sync::Arc;
    use std::time::Duration;

    fn policy() -> AutoscalingPolicy {
        AutoscalingPolicy {
            name: Some(String::from("p1")),
            project: Some(String::from("my-project")),
            location: Some(String::from("us-central1")),
            ..AutoscalingPolicy::default()
        }
    }

    fn provisioner(transport: MockTransport) -> ResourceProvisioner {
        ResourceProvisioner::new(
            DataprocClient::new(Arc::new(transport))
                .with_base_path("https://example.test/v1/")
                .with_retry(RetryPolicy::fixed(2, Duration::from_millis(1))),
        )
    }

    #[tokio::test]
    async fn test_empty_plan_makes_no_calls() {
        let transport = MockTransport::new();
        let provisioner = provisioner(transport);
        let plan = ResourcePlan::build(&policy(), Baseline::Observed, Vec::new(), &[]).unwrap();
        let report = PlanExecutor::new(&provisioner).execute(&plan, &policy()).await.unwrap();
        assert!(report.results.is_empty());
        assert!(report.create_response.is_none());
    }

    #[tokio::test]
    async fn test_create_keeps_inline_response() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .times(1)
            .withf(|r| r.method == HttpMethod::Post)
            .returning(|_| Ok(ApiResponse::new(200, r#"{"id":"p1","name":"projects/my-project/locations/us-central1/autoscalingPolicies/p1"}"#)));
        let provisioner = provisioner(transport);
        let plan = ResourcePlan::build(&policy(), Baseline::Missing, Vec::new(), &[]).unwrap();

        let report = PlanExecutor::new(&provisioner).execute(&plan, &policy()).await.unwrap();
        assert_eq!(report.successful(), 1);
        assert_eq!(report.create_response.unwrap()["id"], "p1");
    }

    #[tokio::test]
    async fn test_failure_is_returned() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_| Ok(ApiResponse::new(400, "invalid argument")));
        let provisioner = provisioner(transport);
        let plan = ResourcePlan::build(&policy(), Baseline::Missing, Vec::new(), &[]).unwrap();

        let err = PlanExecutor::new(&provisioner).execute(&plan, &policy()).await.unwrap_err();
        assert!(err.to_string().contains("invalid argument"));
    }
}
