//! Integration tests for the reconciler against a mocked Dataproc API
//!
//! These tests drive the real `reqwest` transport through wiremock and check
//! which HTTP calls each reconciliation path issues.

use dataproc_reconciler::api::{DataprocClient, RetryPolicy};
use dataproc_reconciler::config::{ClientConfig, CredentialsMode};
use dataproc_reconciler::error::{DataprocError, PlanError};
use dataproc_reconciler::model::{
    AutoscalingPolicy, BasicAlgorithm, Cluster, ClusterConfig, ClusterSelector, InstanceGroupBounds,
    InstanceGroupConfig, Nested, OrderedJob, TemplatePlacement, WorkflowTemplate, YarnConfig,
};
use dataproc_reconciler::planner::PlannedOperation;
use dataproc_reconciler::reconciler::{ApplyOptions, Reconciler};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::time::Duration;
use wiremock::matchers::{bearer_token, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const POLICY_PATH: &str = "/v1/projects/my-project/locations/us-central1/autoscalingPolicies/p1";
const POLICIES_PATH: &str = "/v1/projects/my-project/locations/us-central1/autoscalingPolicies";
const CLUSTER_PATH: &str = "/v1/projects/my-project/regions/us-central1/clusters/analytics";
const CLUSTERS_PATH: &str = "/v1/projects/my-project/regions/us-central1/clusters";
const TEMPLATE_PATH: &str = "/v1/projects/my-project/locations/us-central1/workflowTemplates/nightly";
const TEMPLATES_PATH: &str = "/v1/projects/my-project/locations/us-central1/workflowTemplates";

async fn reconciler(server: &MockServer) -> Reconciler {
    let config = ClientConfig {
        base_path: format!("{}/v1/", server.uri()),
        token: Some(String::from("test-token")),
        credentials: CredentialsMode::Token,
        retry: RetryPolicy::fixed(3, Duration::from_millis(1)),
        ..ClientConfig::default()
    };
    let client = DataprocClient::from_config(&config)
        .await
        .expect("Client should build");
    Reconciler::new(client)
}

fn policy(max_instances: i64) -> AutoscalingPolicy {
    AutoscalingPolicy {
        name: Some(String::from("p1")),
        project: Some(String::from("my-project")),
        location: Some(String::from("us-central1")),
        basic_algorithm: Nested::value(BasicAlgorithm {
            yarn_config: Nested::value(YarnConfig {
                graceful_decommission_timeout: Some(String::from("3600s")),
                scale_up_factor: Some(0.5),
                scale_down_factor: Some(0.5),
                ..YarnConfig::default()
            }),
            cooldown_period: None,
        }),
        worker_config: Nested::value(InstanceGroupBounds {
            max_instances: Some(max_instances),
            ..InstanceGroupBounds::default()
        }),
        ..AutoscalingPolicy::default()
    }
}

/// Policy as the server reports it, defaults filled in.
fn policy_json(max_instances: i64) -> Value {
    json!({
        "id": "p1",
        "name": "projects/my-project/locations/us-central1/autoscalingPolicies/p1",
        "basicAlgorithm": {
            "yarnConfig": {
                "gracefulDecommissionTimeout": "3600s",
                "scaleUpFactor": 0.5,
                "scaleDownFactor": 0.5
            },
            "cooldownPeriod": "120s"
        },
        "workerConfig": {"minInstances": 0, "maxInstances": max_instances, "weight": 1}
    })
}

fn cluster(master_machine: &str) -> Cluster {
    Cluster {
        project: Some(String::from("my-project")),
        name: Some(String::from("analytics")),
        location: Some(String::from("us-central1")),
        config: Nested::value(ClusterConfig {
            master_config: Nested::value(InstanceGroupConfig {
                num_instances: Some(1),
                machine_type: Some(master_machine.to_string()),
                ..InstanceGroupConfig::default()
            }),
            worker_config: Nested::value(InstanceGroupConfig {
                num_instances: Some(2),
                machine_type: Some(String::from("n1-standard-4")),
                ..InstanceGroupConfig::default()
            }),
            ..ClusterConfig::default()
        }),
        labels: BTreeMap::from([(String::from("env"), String::from("prod"))]),
        ..Cluster::default()
    }
}

fn cluster_json(master_machine: &str) -> Value {
    json!({
        "projectId": "my-project",
        "clusterName": "analytics",
        "clusterUuid": "7f1c-uuid",
        "config": {
            "masterConfig": {"numInstances": 1, "machineTypeUri": master_machine},
            "workerConfig": {"numInstances": 2, "machineTypeUri": "n1-standard-4"}
        },
        "labels": {"env": "prod", "goog-dataproc-cluster-name": "analytics"},
        "status": {"state": "RUNNING"}
    })
}

async fn requests(server: &MockServer) -> Vec<Request> {
    server.received_requests().await.unwrap_or_default()
}

fn count(requests: &[Request], verb: &str, request_path: &str) -> usize {
    requests
        .iter()
        .filter(|r| r.method.as_str() == verb && r.url.path() == request_path)
        .count()
}

/// Test module for the apply path
mod apply_tests {
    use super::*;

    /// Missing policy is created once, then verified with a fresh GET
    #[tokio::test]
    async fn test_create_missing_policy() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(POLICY_PATH))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(POLICIES_PATH))
            .and(bearer_token("test-token"))
            .and(header_exists("x-request-id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(policy_json(10)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(POLICY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(policy_json(10)))
            .mount(&server)
            .await;

        let outcome = reconciler(&server)
            .await
            .apply(&policy(10), &ApplyOptions::default())
            .await
            .expect("Apply should succeed");

        assert_eq!(outcome.plan.operations, vec![PlannedOperation::Create]);
        assert_eq!(
            outcome.state.worker_config.as_value().and_then(|w| w.min_instances),
            Some(0)
        );

        let received = requests(&server).await;
        let create = received
            .iter()
            .find(|r| r.method.as_str() == "POST")
            .expect("Create should be sent");
        let body: Value = create.body_json().expect("Create body should be JSON");
        assert_eq!(body["id"], "p1");
        assert_eq!(body["workerConfig"]["maxInstances"], 10);
    }

    /// Changing maxInstances issues one PUT carrying only workerConfig and id
    #[tokio::test]
    async fn test_update_sends_only_changed_top_level_field() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(POLICY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(policy_json(10)))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(POLICY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(policy_json(20)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(POLICY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(policy_json(20)))
            .mount(&server)
            .await;

        let outcome = reconciler(&server)
            .await
            .apply(&policy(20), &ApplyOptions::default())
            .await
            .expect("Apply should succeed");
        assert_eq!(outcome.plan.update_count(), 1);

        let received = requests(&server).await;
        let update = received
            .iter()
            .find(|r| r.method.as_str() == "PUT")
            .expect("Update should be sent");
        let body: Value = update.body_json().expect("Update body should be JSON");
        let mut keys: Vec<&String> = body.as_object().expect("object body").keys().collect();
        keys.sort();
        assert_eq!(keys, ["id", "workerConfig"]);
        assert_eq!(body["workerConfig"]["maxInstances"], 20);
    }

    /// Creating then re-applying the same configuration plans nothing the second time
    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(POLICY_PATH))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(POLICIES_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(policy_json(10)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(POLICY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(policy_json(10)))
            .mount(&server)
            .await;

        let reconciler = reconciler(&server).await;
        let first = reconciler
            .apply(&policy(10), &ApplyOptions::default())
            .await
            .expect("First apply should succeed");
        let second = reconciler
            .apply(&policy(10), &ApplyOptions::default())
            .await
            .expect("Second apply should succeed");

        assert_eq!(first.plan.operations, vec![PlannedOperation::Create]);
        assert!(second.plan.is_empty());
        assert!(second.plan.diffs.is_empty());
        assert_eq!(second.state, first.state);

        let received = requests(&server).await;
        assert_eq!(count(&received, "POST", POLICIES_PATH), 1);
        assert_eq!(count(&received, "PUT", POLICY_PATH), 0);
        // Create path: 404, re-fetch. Second pass: fetch, re-fetch.
        assert_eq!(count(&received, "GET", POLICY_PATH), 4);
    }

    /// A template whose job echo drops empty fields still converges
    #[tokio::test]
    async fn test_template_create_tolerates_job_echo() {
        let server = MockServer::start().await;
        let echoed = json!({
            "id": "nightly",
            "name": "projects/my-project/locations/us-central1/workflowTemplates/nightly",
            "version": 1,
            "createTime": "2024-01-01T00:00:00Z",
            "updateTime": "2024-01-01T00:00:00Z",
            "placement": {"clusterSelector": {"zone": "us-central1-a", "clusterLabels": {"env": "prod"}}},
            "jobs": [{"stepId": "ingest", "hadoopJob": {"mainJarFileUri": "gs://b/x.jar"}}]
        });

        Mock::given(method("GET"))
            .and(path(TEMPLATE_PATH))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(TEMPLATES_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(echoed.clone()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(TEMPLATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(echoed))
            .mount(&server)
            .await;

        let desired = WorkflowTemplate {
            name: Some(String::from("nightly")),
            project: Some(String::from("my-project")),
            location: Some(String::from("us-central1")),
            placement: Nested::value(TemplatePlacement {
                cluster_selector: Nested::value(ClusterSelector {
                    cluster_labels: BTreeMap::from([(String::from("env"), String::from("prod"))]),
                    ..ClusterSelector::default()
                }),
                ..TemplatePlacement::default()
            }),
            jobs: vec![OrderedJob {
                step_id: Some(String::from("ingest")),
                hadoop_job: Some(json!({"mainJarFileUri": "gs://b/x.jar", "args": []})),
                ..OrderedJob::default()
            }],
            ..WorkflowTemplate::default()
        };

        let reconciler = reconciler(&server).await;
        let first = reconciler
            .apply(&desired, &ApplyOptions::default())
            .await
            .expect("Create should converge");
        assert_eq!(first.plan.operations, vec![PlannedOperation::Create]);

        let second = reconciler
            .apply(&desired, &ApplyOptions::default().with_state_hint(Some(first.state)))
            .await
            .expect("Re-apply should be a no-op");
        assert!(second.plan.is_empty());
        assert_eq!(count(&requests(&server).await, "POST", TEMPLATES_PATH), 1);
    }

    /// A machine type change is infeasible and nothing is mutated
    #[tokio::test]
    async fn test_recreate_diff_fails_without_mutation() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(CLUSTER_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(cluster_json("n1-highmem-8")))
            .mount(&server)
            .await;

        let err = reconciler(&server)
            .await
            .apply(&cluster("n1-standard-4"), &ApplyOptions::default())
            .await
            .expect_err("Apply should fail");

        assert!(matches!(err, DataprocError::Plan(PlanError::InfeasibleUpdate { .. })));
        let received = requests(&server).await;
        assert_eq!(received.len(), 1);
        assert_eq!(count(&received, "GET", CLUSTER_PATH), 1);
    }

    /// Cluster create waits for the long-running operation
    #[tokio::test]
    async fn test_cluster_create_waits_for_operation() {
        let server = MockServer::start().await;
        let operation = "projects/my-project/regions/us-central1/operations/op-1";

        Mock::given(method("GET"))
            .and(path(CLUSTER_PATH))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(CLUSTERS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": operation, "done": false})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/v1/{operation}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": operation,
                "done": true,
                "response": cluster_json("n1-standard-4")
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(CLUSTER_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(cluster_json("n1-standard-4")))
            .mount(&server)
            .await;

        let outcome = reconciler(&server)
            .await
            .apply(&cluster("n1-standard-4"), &ApplyOptions::default())
            .await
            .expect("Apply should succeed");

        assert_eq!(outcome.plan.operations, vec![PlannedOperation::Create]);
        let received = requests(&server).await;
        let create = received
            .iter()
            .find(|r| r.method.as_str() == "POST")
            .expect("Create should be sent");
        let body: Value = create.body_json().expect("Create body should be JSON");
        assert!(body.get("clusterUuid").is_none());
        assert!(body.get("status").is_none());
        assert_eq!(body["config"]["masterConfig"]["machineTypeUri"], "n1-standard-4");
    }

    /// A failed operation surfaces its code and message
    #[tokio::test]
    async fn test_failed_operation_is_reported() {
        let server = MockServer::start().await;
        let operation = "projects/my-project/regions/us-central1/operations/op-2";

        Mock::given(method("GET"))
            .and(path(CLUSTER_PATH))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(CLUSTERS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": operation,
                "done": true,
                "error": {"code": 8, "message": "Insufficient CPU quota"}
            })))
            .mount(&server)
            .await;

        let err = reconciler(&server)
            .await
            .apply(&cluster("n1-standard-4"), &ApplyOptions::default())
            .await
            .expect_err("Apply should fail");

        assert!(err.to_string().contains("Insufficient CPU quota"));
    }
}

/// Test module for delete and list
mod lifecycle_tests {
    use super::*;

    /// Delete polls until the resource disappears
    #[tokio::test]
    async fn test_delete_polls_until_gone() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(POLICY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(policy_json(10)))
            .up_to_n_times(3)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(POLICY_PATH))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(POLICY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let deleted = reconciler(&server)
            .await
            .delete(&policy(10))
            .await
            .expect("Delete should succeed");

        assert!(deleted);
        // One existence check, two polls still seeing it, one poll seeing it gone.
        assert_eq!(count(&requests(&server).await, "GET", POLICY_PATH), 4);
    }

    /// Deleting a missing resource sends no DELETE
    #[tokio::test]
    async fn test_delete_missing_is_noop() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(POLICY_PATH))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let deleted = reconciler(&server)
            .await
            .delete(&policy(10))
            .await
            .expect("Delete should succeed");
        assert!(!deleted);
    }

    /// Listing follows page tokens and stamps the parent identity
    #[tokio::test]
    async fn test_list_follows_pages() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(POLICIES_PATH))
            .and(query_param("pageToken", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "policies": [{"id": "b", "workerConfig": {"maxInstances": 4}}]
            })))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(POLICIES_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "policies": [{"id": "a", "workerConfig": {"maxInstances": 2}}],
                "nextPageToken": "page-2"
            })))
            .mount(&server)
            .await;

        let reconciler = reconciler(&server).await;
        let policies = reconciler
            .observer()
            .list_all::<AutoscalingPolicy>("my-project", "us-central1")
            .await
            .expect("List should succeed");

        let names: Vec<_> = policies.iter().filter_map(|p| p.name.as_deref()).collect();
        assert_eq!(names, ["a", "b"]);
        assert!(policies.iter().all(|p| p.location.as_deref() == Some("us-central1")));

        let received = requests(&server).await;
        assert!(received.iter().all(|r| !r.url.query().unwrap_or("").contains("pageSize")));
    }

    /// A 403 surfaces as a request failure with the status
    #[tokio::test]
    async fn test_permission_denied_is_not_retried_as_conflict() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(POLICY_PATH))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {"code": 403, "message": "Permission denied"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = reconciler(&server)
            .await
            .apply(&policy(10), &ApplyOptions::default())
            .await
            .expect_err("Apply should fail");

        assert!(!err.is_conflict());
        assert!(err.to_string().contains("403"));
    }
}
