//! Mutating calls against Dataproc resources.
//!
//! Creates, updates and deletes go through here. Long-running calls are
//! awaited before returning, and deletes are confirmed by polling until the
//! resource is gone.

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::{ReconcileError, Result};
use crate::model::{HttpMethod, Resource, UpdateOperation, codec};
use crate::planner::FieldDiff;

use super::client::DataprocClient;
use super::observer::ResourceObserver;
use super::transport::ApiRequest;

/// Number of post-delete polls before giving up.
pub const DELETE_POLLS: u32 = 10;

/// Issues mutating calls.
#[derive(Debug, Clone)]
pub struct ResourceProvisioner {
    client: DataprocClient,
    observer: ResourceObserver,
}

impl ResourceProvisioner {
    /// Creates a provisioner.
    #[must_use]
    pub fn new(client: DataprocClient) -> Self {
        let observer = ResourceObserver::new(client.clone());
        Self { client, observer }
    }

    /// Observer sharing this provisioner's client.
    #[must_use]
    pub const fn observer(&self) -> &ResourceObserver {
        &self.observer
    }

    /// Creates `desired` and returns the inline response, if any.
    ///
    /// For long-running resources the inline response is the finished
    /// operation's `response`.
    ///
    /// # Errors
    ///
    /// Returns an error if the call or the operation fails.
    pub async fn create<R: Resource>(&self, desired: &R) -> Result<Option<Value>> {
        info!("Creating {} {}", R::KIND, desired.identity());
        let body = codec::expand(desired)?;
        let url = self.client.url(&desired.parent_path()?);
        let response = self
            .client
            .call(ApiRequest::new(HttpMethod::Post, url).with_body(Value::Object(body)))
            .await?;

        if R::LONG_RUNNING {
            return self.client.wait_for_operation(response).await;
        }
        Ok((!response.is_null()).then_some(response))
    }

    /// Runs a named update operation for the diffs it remediates.
    ///
    /// # Errors
    ///
    /// Returns an error if the call or the operation fails.
    pub async fn update<R: Resource>(
        &self,
        desired: &R,
        operation: &UpdateOperation,
        diffs: &[FieldDiff],
    ) -> Result<()> {
        info!(
            "Updating {} {} via {} ({} field(s))",
            R::KIND,
            desired.identity(),
            operation.name,
            diffs.len()
        );
        let update = codec::update_request(desired, operation, diffs)?;
        let mut request = ApiRequest::new(operation.method, self.client.url(&desired.resource_path()?))
            .with_body(Value::Object(update.body));
        if let Some(mask) = update.update_mask {
            debug!("updateMask={mask}");
            request = request.with_query("updateMask", mask);
        }

        let response = self.client.call(request).await?;
        if R::LONG_RUNNING {
            self.client.wait_for_operation(response).await?;
        }
        Ok(())
    }

    /// Deletes `resource` and waits until it is gone.
    ///
    /// Returns false, without sending a delete, if the resource does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::NotDeleted`] if the resource is still
    /// visible after every poll, or any API error.
    pub async fn delete<R: Resource>(&self, resource: &R) -> Result<bool> {
        if self.observer.find(resource).await?.is_none() {
            info!("{} {} does not exist, nothing to delete", R::KIND, resource.identity());
            return Ok(false);
        }

        info!("Deleting {} {}", R::KIND, resource.identity());
        let url = self.client.url(&resource.resource_path()?);
        let response = self.client.call(ApiRequest::new(HttpMethod::Delete, url)).await?;
        if R::LONG_RUNNING {
            self.client.wait_for_operation(response).await?;
        }

        let retry = self.client.retry();
        for poll in 1..=DELETE_POLLS {
            if self.observer.find(resource).await?.is_none() {
                info!("Deleted {} {}", R::KIND, resource.identity());
                return Ok(true);
            }
            if poll < DELETE_POLLS {
                let delay = retry.backoff(poll);
                debug!("{} {} still visible, polling again in {delay:?}", R::KIND, resource.identity());
                tokio::time::sleep(delay).await;
            }
        }

        warn!("{} {} still exists after {DELETE_POLLS} polls", R::KIND, resource.identity());
        Err(ReconcileError::NotDeleted {
            kind: R::KIND.to_string(),
            name: resource.name(),
            polls: DELETE_POLLS,
        }
        .into())
    }

    /// Deletes every resource under a project and location matching `filter`.
    ///
    /// Failures do not stop the sweep; they are collected and reported together.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::BulkDeleteFailed`] if any deletion failed, or
    /// the list error if listing fails.
    pub async fn delete_all<R, F>(&self, project: &str, location: &str, filter: F) -> Result<usize>
    where
        R: Resource,
        F: Fn(&R) -> bool,
    {
        let resources = self.observer.list_all::<R>(project, location).await?;
        let mut deleted = 0;
        let mut failures = Vec::new();

        for resource in resources.iter().filter(|r| filter(r)) {
            match self.delete(resource).await {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    error!("Failed to delete {} {}: {e}", R::KIND, resource.identity());
                    failures.push(format!("{}: {e}", resource.name()));
                }
            }
        }

        if failures.is_empty() {
            info!("Deleted {deleted} {} resource(s)", R::KIND);
            Ok(deleted)
        } else {
            Err(ReconcileError::BulkDeleteFailed {
                kind: R::KIND.to_string(),
                failures,
            }
            .into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::retry::RetryPolicy;
    use crate::api::transport::{ApiResponse, MockTransport};
    use crate::error::DataprocError;
    use crate::model::{AutoscalingPolicy, InstanceGroupBounds, Nested};
    use mockall::Sequence;
    use std::sync::Arc;
    use std::time::Duration;

    fn provisioner(transport: MockTransport) -> ResourceProvisioner {
        ResourceProvisioner::new(
            DataprocClient::new(Arc::new(transport))
                .with_base_path("https://example.test/v1/")
                .with_retry(RetryPolicy::fixed(3, Duration::from_millis(1))),
        )
    }

    fn policy() -> AutoscalingPolicy {
        AutoscalingPolicy {
            name: Some(String::from("p1")),
            project: Some(String::from("my-project")),
            location: Some(String::from("us-central1")),
            worker_config: Nested::value(InstanceGroupBounds {
                max_instances: Some(10),
                ..InstanceGroupBounds::default()
            }),
            ..AutoscalingPolicy::default()
        }
    }

    #[tokio::test]
    async fn test_delete_missing_sends_no_delete() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .times(1)
            .withf(|r| r.method == HttpMethod::Get)
            .returning(|_| Ok(ApiResponse::new(404, "")));
        assert!(!provisioner(transport).delete(&policy()).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_gives_up_after_polls() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .withf(|r| r.method == HttpMethod::Get)
            .returning(|_| Ok(ApiResponse::new(200, r#"{"id":"p1"}"#)));
        transport
            .expect_send()
            .times(1)
            .withf(|r| r.method == HttpMethod::Delete)
            .returning(|_| Ok(ApiResponse::new(200, "{}")));

        let err = provisioner(transport).delete(&policy()).await.unwrap_err();
        assert!(matches!(
            err,
            DataprocError::Reconcile(ReconcileError::NotDeleted { polls: DELETE_POLLS, .. })
        ));
    }

    #[tokio::test]
    async fn test_update_sends_top_level_body() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .times(1)
            .withf(|r| {
                r.method == HttpMethod::Put
                    && r.url == "https://example.test/v1/projects/my-project/locations/us-central1/autoscalingPolicies/p1"
                    && r.query.is_empty()
                    && r.body.as_ref().is_some_and(|b| b["id"] == "p1" && b["workerConfig"]["maxInstances"] == 10)
            })
            .returning(|_| Ok(ApiResponse::new(200, "{}")));

        let desired = policy();
        let operation = AutoscalingPolicy::update_operation(crate::model::UPDATE_AUTOSCALING_POLICY).unwrap();
        let mut actual = policy();
        actual.worker_config = Nested::value(InstanceGroupBounds {
            max_instances: Some(5),
            ..InstanceGroupBounds::default()
        });
        let diffs = AutoscalingPolicy::diff(&desired, &actual);
        assert_eq!(diffs.len(), 1);
        provisioner(transport).update(&desired, operation, &diffs).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_all_continues_past_failures() {
        const COLLECTION: &str = "https://example.test/v1/projects/my-project/locations/us-central1/autoscalingPolicies";
        let mut transport = MockTransport::new();
        let mut seq = Sequence::new();
        transport
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|r| r.method == HttpMethod::Get && r.url == COLLECTION)
            .returning(|_| Ok(ApiResponse::new(200, r#"{"policies":[{"id":"p1"},{"id":"p2"}]}"#)));
        transport
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|r| r.method == HttpMethod::Get && r.url.ends_with("/p1"))
            .returning(|_| Ok(ApiResponse::new(200, r#"{"id":"p1"}"#)));
        transport
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|r| r.method == HttpMethod::Delete && r.url.ends_with("/p1"))
            .returning(|_| Ok(ApiResponse::new(200, "{}")));
        transport
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|r| r.method == HttpMethod::Get && r.url.ends_with("/p1"))
            .returning(|_| Ok(ApiResponse::new(404, "")));
        transport
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|r| r.method == HttpMethod::Get && r.url.ends_with("/p2"))
            .returning(|_| Ok(ApiResponse::new(200, r#"{"id":"p2"}"#)));
        transport
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|r| r.method == HttpMethod::Delete && r.url.ends_with("/p2"))
            .returning(|_| Ok(ApiResponse::new(403, "permission denied")));

        let err = provisioner(transport)
            .delete_all::<AutoscalingPolicy, _>("my-project", "us-central1", |_| true)
            .await
            .unwrap_err();
        let DataprocError::Reconcile(ReconcileError::BulkDeleteFailed { kind, failures }) = err else {
            panic!("expected a bulk delete failure, got {err}");
        };
        assert_eq!(kind, "AutoscalingPolicy");
        assert_eq!(failures.len(), 1);
        assert!(failures[0].starts_with("p2: "));
    }
}
