//! Dataproc autoscaling policies.
//!
//! Every configuration field is updatable in place through a single `PUT`;
//! only identity changes force recreation.

use serde::{Deserialize, Serialize};

use super::nested::Nested;
use super::resource::{HttpMethod, Identity, Resource, UpdateBody, UpdateOperation};
use super::validate::Validator;
use crate::error::ConfigError;
use crate::planner::canonical;
use crate::planner::{Differ, FieldDiff, FieldRule};

/// Name of the single update operation.
pub const UPDATE_AUTOSCALING_POLICY: &str = "UpdateAutoscalingPolicy";

/// An autoscaling policy.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalingPolicy {
    /// Policy name.
    #[serde(rename = "id", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// YARN scaling algorithm.
    #[serde(default, skip_serializing_if = "Nested::is_absent")]
    pub basic_algorithm: Nested<BasicAlgorithm>,
    /// Primary worker bounds.
    #[serde(default, skip_serializing_if = "Nested::is_absent")]
    pub worker_config: Nested<InstanceGroupBounds>,
    /// Secondary worker bounds.
    #[serde(default, skip_serializing_if = "Nested::is_absent")]
    pub secondary_worker_config: Nested<InstanceGroupBounds>,
    /// Project.
    #[serde(skip)]
    pub project: Option<String>,
    /// Location.
    #[serde(skip)]
    pub location: Option<String>,
}

/// Basic autoscaling algorithm.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicAlgorithm {
    /// YARN-based scaling configuration.
    #[serde(default, skip_serializing_if = "Nested::is_absent")]
    pub yarn_config: Nested<YarnConfig>,
    /// Duration between scaling events, e.g. `120s`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_period: Option<String>,
}

/// YARN scaling parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YarnConfig {
    /// Timeout for graceful YARN decommissioning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graceful_decommission_timeout: Option<String>,
    /// Fraction of pending memory to add when scaling up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_up_factor: Option<f64>,
    /// Fraction of available memory to remove when scaling down.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_down_factor: Option<f64>,
    /// Minimum scale-up as a fraction of the worker count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_up_min_worker_fraction: Option<f64>,
    /// Minimum scale-down as a fraction of the worker count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_down_min_worker_fraction: Option<f64>,
}

/// Instance bounds for a worker group.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceGroupBounds {
    /// Minimum instances.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_instances: Option<i64>,
    /// Maximum instances.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_instances: Option<i64>,
    /// Relative weight against the other group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i64>,
}

reconciled_object!(BasicAlgorithm {
    yarn_config: nested "yarnConfig" => FieldRule::inherit(),
    cooldown_period: string "cooldownPeriod" => FieldRule::inherit().server_default(),
});

reconciled_object!(YarnConfig {
    graceful_decommission_timeout: string "gracefulDecommissionTimeout" => FieldRule::inherit(),
    scale_up_factor: scalar "scaleUpFactor" => FieldRule::inherit(),
    scale_down_factor: scalar "scaleDownFactor" => FieldRule::inherit(),
    scale_up_min_worker_fraction: scalar "scaleUpMinWorkerFraction" => FieldRule::inherit(),
    scale_down_min_worker_fraction: scalar "scaleDownMinWorkerFraction" => FieldRule::inherit(),
});

reconciled_object!(InstanceGroupBounds {
    min_instances: scalar "minInstances" => FieldRule::inherit().server_default(),
    max_instances: scalar "maxInstances" => FieldRule::inherit(),
    weight: scalar "weight" => FieldRule::inherit().server_default(),
});

impl Resource for AutoscalingPolicy {
    const KIND: &'static str = "AutoscalingPolicy";
    const LIST_KEY: &'static str = "policies";
    const ID_KEY: Option<&'static str> = Some("id");
    const UPDATE_OPERATIONS: &'static [UpdateOperation] = &[UpdateOperation {
        name: UPDATE_AUTOSCALING_POLICY,
        method: HttpMethod::Put,
        body: UpdateBody::TopLevel,
    }];

    fn identity(&self) -> Identity {
        Identity {
            project: self.project.clone(),
            location: self.location.clone(),
            name: self.name.clone(),
        }
    }

    fn set_identity(&mut self, identity: &Identity) {
        self.project.clone_from(&identity.project);
        self.location.clone_from(&identity.location);
        self.name.clone_from(&identity.name);
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut v = Validator::new(Self::KIND);
        v.require_string("id", self.name.as_ref());
        v.require_nested("basicAlgorithm", &self.basic_algorithm);
        v.require_nested("workerConfig", &self.worker_config);
        v.require_string("project", self.project.as_ref());
        v.require_string("location", self.location.as_ref());
        v.nested("basicAlgorithm", &self.basic_algorithm, |v, algorithm| {
            v.require_nested("yarnConfig", &algorithm.yarn_config);
            v.nested("yarnConfig", &algorithm.yarn_config, |v, yarn| {
                v.require_string("gracefulDecommissionTimeout", yarn.graceful_decommission_timeout.as_ref());
                v.require("scaleUpFactor", yarn.scale_up_factor.as_ref());
                v.require("scaleDownFactor", yarn.scale_down_factor.as_ref());
                for (field, value) in [
                    ("scaleUpFactor", yarn.scale_up_factor),
                    ("scaleDownFactor", yarn.scale_down_factor),
                    ("scaleUpMinWorkerFraction", yarn.scale_up_min_worker_fraction),
                    ("scaleDownMinWorkerFraction", yarn.scale_down_min_worker_fraction),
                ] {
                    v.check(
                        value.is_none_or(|f| (0.0..=1.0).contains(&f)),
                        field,
                        "must be between 0.0 and 1.0",
                    );
                }
            });
        });
        v.nested("workerConfig", &self.worker_config, |v, worker| {
            v.require("maxInstances", worker.max_instances.as_ref());
            check_bounds(v, worker);
        });
        v.nested("secondaryWorkerConfig", &self.secondary_worker_config, check_bounds);
        v.finish()
    }

    fn collection_path(project: &str, location: &str) -> String {
        format!("projects/{project}/locations/{location}/autoscalingPolicies")
    }

    fn canonicalize_desired(raw_desired: &Self, initial: Option<&Self>) -> Self {
        let Some(initial) = initial else {
            return Self {
                basic_algorithm: canonical::desired_nested_alone(&raw_desired.basic_algorithm),
                worker_config: canonical::desired_nested_alone(&raw_desired.worker_config),
                secondary_worker_config: canonical::desired_nested_alone(&raw_desired.secondary_worker_config),
                ..raw_desired.clone()
            };
        };
        Self {
            name: canonical::desired_string(&raw_desired.name, &initial.name),
            basic_algorithm: canonical::desired_nested(&raw_desired.basic_algorithm, &initial.basic_algorithm),
            worker_config: canonical::desired_nested(&raw_desired.worker_config, &initial.worker_config),
            secondary_worker_config: canonical::desired_nested(
                &raw_desired.secondary_worker_config,
                &initial.secondary_worker_config,
            ),
            project: canonical::desired_string(&raw_desired.project, &initial.project),
            location: canonical::desired_string(&raw_desired.location, &initial.location),
        }
    }

    fn canonicalize_new(raw_new: &Self, raw_desired: &Self) -> Self {
        Self {
            name: raw_desired.name.clone(),
            basic_algorithm: canonical::new_nested(&raw_new.basic_algorithm, &raw_desired.basic_algorithm),
            worker_config: canonical::new_nested(&raw_new.worker_config, &raw_desired.worker_config),
            secondary_worker_config: canonical::new_nested(
                &raw_new.secondary_worker_config,
                &raw_desired.secondary_worker_config,
            ),
            project: raw_desired.project.clone(),
            location: raw_desired.location.clone(),
        }
    }

    fn diff(desired: &Self, actual: &Self) -> Vec<FieldDiff> {
        let update = FieldRule::triggers(UPDATE_AUTOSCALING_POLICY);
        let mut d = Differ::new();
        d.string("id", &desired.name, &actual.name, FieldRule::recreate());
        d.nested("basicAlgorithm", &desired.basic_algorithm, &actual.basic_algorithm, update);
        d.nested("workerConfig", &desired.worker_config, &actual.worker_config, update);
        d.nested(
            "secondaryWorkerConfig",
            &desired.secondary_worker_config,
            &actual.secondary_worker_config,
            update,
        );
        d.string("project", &desired.project, &actual.project, FieldRule::recreate());
        d.string("location", &desired.location, &actual.location, FieldRule::recreate());
        d.finish()
    }
}

fn check_bounds(v: &mut Validator, bounds: &InstanceGroupBounds) {
    if let (Some(min), Some(max)) = (bounds.min_instances, bounds.max_instances) {
        v.check(min <= max, "minInstances", "must not exceed maxInstances");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn policy(max: i64) -> AutoscalingPolicy {
        AutoscalingPolicy {
            name: Some(String::from("p1")),
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
                max_instances: Some(max),
                ..InstanceGroupBounds::default()
            }),
            secondary_worker_config: Nested::Absent,
            project: Some(String::from("my-project")),
            location: Some(String::from("us-central1")),
        }
    }

    #[test]
    fn test_wire_names() {
        let wire = serde_json::to_value(policy(10)).unwrap();
        assert_eq!(wire["id"], json!("p1"));
        assert_eq!(wire["workerConfig"]["maxInstances"], json!(10));
        assert_eq!(
            wire["basicAlgorithm"]["yarnConfig"]["gracefulDecommissionTimeout"],
            json!("3600s")
        );
        assert!(wire.get("project").is_none());
        assert!(wire.get("secondaryWorkerConfig").is_none());
    }

    #[test]
    fn test_validate() {
        assert!(policy(10).validate().is_ok());

        let mut missing = policy(10);
        missing.worker_config = Nested::value(InstanceGroupBounds::default());
        let err = missing.validate().unwrap_err();
        assert!(err.to_string().contains("workerConfig.maxInstances"));

        let mut no_location = policy(10);
        no_location.location = None;
        assert!(no_location.validate().is_err());
    }

    #[test]
    fn test_diff_equal_is_empty() {
        let p = policy(10);
        assert!(AutoscalingPolicy::diff(&p, &p).is_empty());
    }

    #[test]
    fn test_max_instances_change_triggers_update() {
        let diffs = AutoscalingPolicy::diff(&policy(20), &policy(10));
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].path, "workerConfig.maxInstances");
        assert_eq!(diffs[0].remediation.operation(), Some(UPDATE_AUTOSCALING_POLICY));
    }

    #[test]
    fn test_name_change_requires_recreate() {
        let mut renamed = policy(10);
        renamed.name = Some(String::from("p2"));
        let diffs = AutoscalingPolicy::diff(&renamed, &policy(10));
        assert_eq!(diffs.len(), 1);
        assert!(diffs[0].requires_recreate());
    }

    #[test]
    fn test_server_defaults_do_not_diff() {
        let desired = policy(10);
        let mut observed = policy(10);
        if let Nested::Value(worker) = &mut observed.worker_config {
            worker.weight = Some(1);
            worker.min_instances = Some(0);
        }
        if let Nested::Value(algorithm) = &mut observed.basic_algorithm {
            algorithm.cooldown_period = Some(String::from("120s"));
        }
        let new = AutoscalingPolicy::canonicalize_new(&observed, &desired);
        let canonical = AutoscalingPolicy::canonicalize_desired(&desired, None);
        assert!(AutoscalingPolicy::diff(&canonical, &new).is_empty());
    }

    #[test]
    fn test_canonicalize_desired_inherits_unset_fields() {
        let mut desired = policy(20);
        desired.basic_algorithm = Nested::Absent;
        let initial = policy(10);
        let canonical = AutoscalingPolicy::canonicalize_desired(&desired, Some(&initial));
        assert_eq!(canonical.basic_algorithm, initial.basic_algorithm);
        assert_eq!(
            canonical.worker_config.as_value().and_then(|w| w.max_instances),
            Some(20)
        );
    }
}
