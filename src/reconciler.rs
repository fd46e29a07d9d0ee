//! Apply driver.
//!
//! Converges one resource to its desired state: validate, fetch the initial
//! state, canonicalize, diff, plan, execute, then re-fetch and verify that no
//! differences remain. A conflict anywhere in the pass restarts it from the
//! fetch, bounded by the retry policy.

use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

use crate::api::{DataprocClient, ResourceObserver, ResourceProvisioner, RetryPolicy};
use crate::error::{ReconcileError, Result};
use crate::model::{Fingerprinter, Identity, Resource, codec};
use crate::planner::{Baseline, FieldDiff, LifecycleParam, PlanExecutor, PlannedOperation, ResourcePlan};

/// Options for a single apply.
#[derive(Debug, Clone)]
pub struct ApplyOptions<R> {
    /// Previously applied state used instead of fetching the initial state.
    pub state_hint: Option<R>,
    /// Remediation paths the caller forbids.
    pub lifecycle: Vec<LifecycleParam>,
    /// Conflict retry policy; the client's policy when unset.
    pub retry: Option<RetryPolicy>,
}

impl<R> Default for ApplyOptions<R> {
    fn default() -> Self {
        Self {
            state_hint: None,
            lifecycle: Vec::new(),
            retry: None,
        }
    }
}

impl<R> ApplyOptions<R> {
    /// Sets the state hint.
    #[must_use]
    pub fn with_state_hint(mut self, hint: Option<R>) -> Self {
        self.state_hint = hint;
        self
    }

    /// Adds a lifecycle parameter.
    #[must_use]
    pub fn with_lifecycle(mut self, param: LifecycleParam) -> Self {
        if !self.lifecycle.contains(&param) {
            self.lifecycle.push(param);
        }
        self
    }

    /// Overrides the conflict retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }
}

/// Result of a successful apply.
#[derive(Debug, Clone)]
pub struct ApplyOutcome<R> {
    /// Canonical observed state after apply.
    pub state: R,
    /// The plan that was executed.
    pub plan: ResourcePlan,
    /// Number of passes, counting conflict restarts.
    pub attempts: u32,
}

impl<R: Resource> fmt::Display for ApplyOutcome<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.plan.is_empty() {
            write!(f, "{} {} is up to date", R::KIND, self.plan.identity)
        } else {
            write!(
                f,
                "{} {} converged after {} operation(s) in {} attempt(s)",
                R::KIND,
                self.plan.identity,
                self.plan.operations.len(),
                self.attempts
            )
        }
    }
}

/// Type-erased summary of an apply, for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ApplySummary {
    /// Resource kind.
    pub kind: &'static str,
    /// Resource identity.
    pub identity: Identity,
    /// Operations executed, by verb.
    pub operations: Vec<&'static str>,
    /// Number of passes.
    pub attempts: u32,
    /// Fingerprint of the converged state.
    pub fingerprint: String,
}

impl<R: Resource> From<&ApplyOutcome<R>> for ApplySummary {
    fn from(outcome: &ApplyOutcome<R>) -> Self {
        Self {
            kind: R::KIND,
            identity: outcome.state.identity(),
            operations: outcome.plan.operations.iter().map(PlannedOperation::verb).collect(),
            attempts: outcome.attempts,
            fingerprint: Fingerprinter::new().fingerprint(&outcome.state),
        }
    }
}

/// Reconciler for Dataproc resources.
#[derive(Debug, Clone)]
pub struct Reconciler {
    observer: ResourceObserver,
    provisioner: ResourceProvisioner,
    retry: RetryPolicy,
}

impl Reconciler {
    /// Creates a reconciler over a client.
    #[must_use]
    pub fn new(client: DataprocClient) -> Self {
        let retry = client.retry();
        let provisioner = ResourceProvisioner::new(client);
        Self {
            observer: provisioner.observer().clone(),
            provisioner,
            retry,
        }
    }

    /// Observer used for reads.
    #[must_use]
    pub const fn observer(&self) -> &ResourceObserver {
        &self.observer
    }

    /// Provisioner used for writes.
    #[must_use]
    pub const fn provisioner(&self) -> &ResourceProvisioner {
        &self.provisioner
    }

    /// Converges `desired`.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any call, a plan error if the change
    /// is infeasible, [`ReconcileError::DiffAfterApply`] if the resource did
    /// not converge, [`ReconcileError::MaxRetriesExceeded`] if conflicts
    /// persist, or any API error.
    pub async fn apply<R: Resource>(&self, desired: &R, options: &ApplyOptions<R>) -> Result<ApplyOutcome<R>> {
        desired.validate()?;
        let retry = options.retry.unwrap_or(self.retry);
        let mut hint = options.state_hint.as_ref();
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!("Apply attempt {attempt}/{} for {} {}", retry.max_attempts, R::KIND, desired.identity());

            match self.apply_once(desired, hint, &options.lifecycle).await {
                Ok((state, plan)) => {
                    let outcome = ApplyOutcome {
                        state,
                        plan,
                        attempts: attempt,
                    };
                    info!("{outcome}");
                    return Ok(outcome);
                }
                Err(e) if e.is_conflict() => {
                    if !retry.allows(attempt) {
                        return Err(ReconcileError::MaxRetriesExceeded {
                            attempts: attempt,
                            resource: format!("{} {}", R::KIND, desired.identity()),
                            last_error: e.to_string(),
                        }
                        .into());
                    }
                    let delay = retry.backoff(attempt);
                    warn!("Conflict applying {} {}: {e}, restarting in {delay:?}", R::KIND, desired.identity());
                    tokio::time::sleep(delay).await;
                    hint = None;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Builds the plan `apply` would execute, without mutating anything.
    ///
    /// # Errors
    ///
    /// Returns a validation or plan error, or the error of the initial fetch.
    pub async fn plan<R: Resource>(&self, desired: &R, options: &ApplyOptions<R>) -> Result<ResourcePlan> {
        desired.validate()?;
        let (baseline, initial) = self.fetch_initial(desired, options.state_hint.as_ref()).await?;
        let (_, plan) = Self::build_plan(desired, baseline, initial.as_ref(), &options.lifecycle)?;
        Ok(plan)
    }

    /// Deletes `resource`; returns false if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::NotDeleted`] if the resource does not go
    /// away, or any API error.
    pub async fn delete<R: Resource>(&self, resource: &R) -> Result<bool> {
        self.provisioner.delete(resource).await
    }

    async fn apply_once<R: Resource>(
        &self,
        desired: &R,
        hint: Option<&R>,
        lifecycle: &[LifecycleParam],
    ) -> Result<(R, ResourcePlan)> {
        let (baseline, initial) = self.fetch_initial(desired, hint).await?;
        let (canonical_desired, plan) = Self::build_plan(desired, baseline, initial.as_ref(), lifecycle)?;
        debug!("{plan}");

        let report = PlanExecutor::new(&self.provisioner)
            .execute(&plan, &canonical_desired)
            .await?;

        let mut raw = self.observer.fetch(desired).await?;
        if let Some(inline) = &report.create_response {
            codec::merge_missing(&mut raw, inline);
        }
        let raw_new: R = codec::flatten(raw, &desired.identity())?;
        let canonical_new = R::canonicalize_new(&raw_new, desired);

        let new_desired = R::canonicalize_desired(desired, Some(&canonical_new));
        let residual = R::diff(&new_desired, &canonical_new);
        if !residual.is_empty() {
            for diff in &residual {
                warn!("Residual diff on {} {}: {diff}", R::KIND, desired.identity());
            }
            return Err(ReconcileError::DiffAfterApply {
                kind: R::KIND.to_string(),
                name: desired.name(),
                diffs: residual,
            }
            .into());
        }

        Ok((canonical_new, plan))
    }

    async fn fetch_initial<R: Resource>(&self, desired: &R, hint: Option<&R>) -> Result<(Baseline, Option<R>)> {
        if let Some(hint) = hint {
            debug!("Using state hint for {} {}", R::KIND, desired.identity());
            return Ok((Baseline::Hinted, Some(hint.clone())));
        }
        Ok(match self.observer.find(desired).await? {
            Some(found) => (Baseline::Observed, Some(found)),
            None => (Baseline::Missing, None),
        })
    }

    fn build_plan<R: Resource>(
        desired: &R,
        baseline: Baseline,
        initial: Option<&R>,
        lifecycle: &[LifecycleParam],
    ) -> Result<(R, ResourcePlan)> {
        let initial = initial.map(|i| R::canonicalize_initial(i, desired));
        let canonical_desired = R::canonicalize_desired(desired, initial.as_ref());
        let diffs: Vec<FieldDiff> = initial
            .as_ref()
            .map(|actual| R::diff(&canonical_desired, actual))
            .unwrap_or_default();
        let plan = ResourcePlan::build(&canonical_desired, baseline, diffs, lifecycle)?;
        Ok((canonical_desired, plan))
    }
}
