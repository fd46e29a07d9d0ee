//! Dataproc workflow templates.
//!
//! Templates are immutable: any difference is remediated by deleting and
//! recreating the template.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use super::cluster::ClusterConfig;
use super::nested::Nested;
use super::resource::{Identity, Resource};
use super::validate::Validator;
use crate::error::ConfigError;
use crate::planner::canonical;
use crate::planner::{Differ, FieldDiff, FieldRule};

/// A workflow template.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTemplate {
    /// Template name.
    #[serde(rename = "id", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Server version (output only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    /// Creation time (output only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    /// Last update time (output only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
    /// Labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Where the jobs run.
    #[serde(default, skip_serializing_if = "Nested::is_absent")]
    pub placement: Nested<TemplatePlacement>,
    /// The job DAG.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jobs: Vec<OrderedJob>,
    /// Template parameters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<TemplateParameter>,
    /// Timeout for the whole DAG.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dag_timeout: Option<String>,
    /// Project.
    #[serde(skip)]
    pub project: Option<String>,
    /// Location.
    #[serde(skip)]
    pub location: Option<String>,
}

/// Exactly one of a managed cluster or a cluster selector.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplatePlacement {
    /// A cluster created for the workflow and deleted afterwards.
    #[serde(default, skip_serializing_if = "Nested::is_absent")]
    pub managed_cluster: Nested<ManagedCluster>,
    /// An existing cluster chosen by labels.
    #[serde(default, skip_serializing_if = "Nested::is_absent")]
    pub cluster_selector: Nested<ClusterSelector>,
}

/// A workflow-scoped cluster.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedCluster {
    /// Cluster name prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
    /// Cluster configuration.
    #[serde(default, skip_serializing_if = "Nested::is_absent")]
    pub config: Nested<ClusterConfig>,
    /// Cluster labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Selects an existing cluster.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSelector {
    /// Zone to search.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    /// Labels the cluster must carry.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cluster_labels: BTreeMap<String, String>,
}

/// One step of the job DAG.
///
/// Job payloads are kept as raw JSON and compared as a unit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderedJob {
    /// Step id, unique within the template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    /// Hadoop job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hadoop_job: Option<Value>,
    /// Spark job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spark_job: Option<Value>,
    /// PySpark job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pyspark_job: Option<Value>,
    /// Hive job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hive_job: Option<Value>,
    /// Pig job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pig_job: Option<Value>,
    /// SparkR job.
    #[serde(rename = "sparkRJob", default, skip_serializing_if = "Option::is_none")]
    pub spark_r_job: Option<Value>,
    /// Spark SQL job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spark_sql_job: Option<Value>,
    /// Presto job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presto_job: Option<Value>,
    /// Job labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Restart policy.
    #[serde(default, skip_serializing_if = "Nested::is_absent")]
    pub scheduling: Nested<JobScheduling>,
    /// Steps that must finish first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prerequisite_step_ids: Vec<String>,
}

impl OrderedJob {
    fn payload_count(&self) -> usize {
        [
            &self.hadoop_job,
            &self.spark_job,
            &self.pyspark_job,
            &self.hive_job,
            &self.pig_job,
            &self.spark_r_job,
            &self.spark_sql_job,
            &self.presto_job,
        ]
        .iter()
        .filter(|job| job.is_some())
        .count()
    }
}

/// Job restart policy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobScheduling {
    /// Restarts allowed per hour.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_failures_per_hour: Option<i64>,
    /// Restarts allowed in total.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_failures_total: Option<i64>,
}

/// A template parameter substituted at instantiation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateParameter {
    /// Parameter name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Field paths the parameter replaces.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Accepted values.
    #[serde(default, skip_serializing_if = "Nested::is_absent")]
    pub validation: Nested<ParameterValidation>,
}

/// Parameter validation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterValidation {
    /// Regex validation.
    #[serde(default, skip_serializing_if = "Nested::is_absent")]
    pub regex: Nested<RegexValidation>,
    /// Allowed values.
    #[serde(default, skip_serializing_if = "Nested::is_absent")]
    pub values: Nested<ValueValidation>,
}

/// Regex validation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegexValidation {
    /// A value must match one of these.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regexes: Vec<String>,
}

/// Allowed values.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueValidation {
    /// Allowed values.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

reconciled_object!(TemplatePlacement {
    managed_cluster: nested "managedCluster" => FieldRule::inherit(),
    cluster_selector: nested "clusterSelector" => FieldRule::inherit(),
});

reconciled_object!(ManagedCluster {
    cluster_name: string "clusterName" => FieldRule::inherit(),
    config: nested "config" => FieldRule::inherit(),
    labels: map "labels" => FieldRule::inherit(),
});

reconciled_object!(ClusterSelector {
    zone: string "zone" => FieldRule::inherit().server_default(),
    cluster_labels: map "clusterLabels" => FieldRule::inherit(),
});

reconciled_object!(OrderedJob {
    step_id: string "stepId" => FieldRule::inherit(),
    hadoop_job: json "hadoopJob" => FieldRule::inherit(),
    spark_job: json "sparkJob" => FieldRule::inherit(),
    pyspark_job: json "pysparkJob" => FieldRule::inherit(),
    hive_job: json "hiveJob" => FieldRule::inherit(),
    pig_job: json "pigJob" => FieldRule::inherit(),
    spark_r_job: json "sparkRJob" => FieldRule::inherit(),
    spark_sql_job: json "sparkSqlJob" => FieldRule::inherit(),
    presto_job: json "prestoJob" => FieldRule::inherit(),
    labels: map "labels" => FieldRule::inherit(),
    scheduling: nested "scheduling" => FieldRule::inherit(),
    prerequisite_step_ids: string_list "prerequisiteStepIds" => FieldRule::inherit(),
});

reconciled_object!(JobScheduling {
    max_failures_per_hour: scalar "maxFailuresPerHour" => FieldRule::inherit(),
    max_failures_total: scalar "maxFailuresTotal" => FieldRule::inherit(),
});

reconciled_object!(TemplateParameter {
    name: string "name" => FieldRule::inherit(),
    fields: string_list "fields" => FieldRule::inherit(),
    description: string "description" => FieldRule::inherit(),
    validation: nested "validation" => FieldRule::inherit(),
});

reconciled_object!(ParameterValidation {
    regex: nested "regex" => FieldRule::inherit(),
    values: nested "values" => FieldRule::inherit(),
});

reconciled_object!(RegexValidation {
    regexes: string_list "regexes" => FieldRule::inherit(),
});

reconciled_object!(ValueValidation {
    values: string_list "values" => FieldRule::inherit(),
});

impl Resource for WorkflowTemplate {
    const KIND: &'static str = "WorkflowTemplate";
    const LIST_KEY: &'static str = "templates";
    const ID_KEY: Option<&'static str> = Some("id");
    const OUTPUT_ONLY: &'static [&'static str] = &[
        "version",
        "createTime",
        "updateTime",
        "placement.managedCluster.config.masterConfig.instanceNames",
        "placement.managedCluster.config.masterConfig.isPreemptible",
        "placement.managedCluster.config.masterConfig.managedGroupConfig",
        "placement.managedCluster.config.workerConfig.instanceNames",
        "placement.managedCluster.config.workerConfig.isPreemptible",
        "placement.managedCluster.config.workerConfig.managedGroupConfig",
        "placement.managedCluster.config.secondaryWorkerConfig.instanceNames",
        "placement.managedCluster.config.secondaryWorkerConfig.isPreemptible",
        "placement.managedCluster.config.secondaryWorkerConfig.managedGroupConfig",
        "placement.managedCluster.config.lifecycleConfig.idleStartTime",
        "placement.managedCluster.config.endpointConfig.httpPorts",
    ];

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
        v.require_nested("placement", &self.placement);
        v.check(!self.jobs.is_empty(), "jobs", "at least one job is required");
        v.require_string("project", self.project.as_ref());
        v.require_string("location", self.location.as_ref());

        v.nested("placement", &self.placement, |v, placement| {
            v.check(
                placement.managed_cluster.is_absent() != placement.cluster_selector.is_absent(),
                "placement",
                "exactly one of managedCluster or clusterSelector must be set",
            );
            v.nested("managedCluster", &placement.managed_cluster, |v, managed| {
                v.require_string("clusterName", managed.cluster_name.as_ref());
                v.require_nested("config", &managed.config);
            });
            v.nested("clusterSelector", &placement.cluster_selector, |v, selector| {
                v.check(!selector.cluster_labels.is_empty(), "clusterLabels", "required field is not set");
            });
        });

        let step_ids: BTreeSet<&str> = self.jobs.iter().filter_map(|job| job.step_id.as_deref()).collect();
        v.check(step_ids.len() == self.jobs.len(), "jobs", "step ids must be set and unique");
        v.each("jobs", &self.jobs, |v, job| {
            v.require_string("stepId", job.step_id.as_ref());
            if let Some(step_id) = job.step_id.as_deref().filter(|s| !s.is_empty()) {
                v.check(
                    is_valid_step_id(step_id),
                    "stepId",
                    "must be 3-50 letters, digits, underscores or hyphens, not starting or ending with '_' or '-'",
                );
            }
            v.check(job.payload_count() == 1, "jobs", "exactly one job type must be set");
            for prerequisite in &job.prerequisite_step_ids {
                v.check(
                    step_ids.contains(prerequisite.as_str()),
                    "prerequisiteStepIds",
                    format!("unknown step id '{prerequisite}'"),
                );
            }
        });

        v.each("parameters", &self.parameters, |v, parameter| {
            v.require_string("name", parameter.name.as_ref());
            v.check(!parameter.fields.is_empty(), "fields", "required field is not set");
        });
        v.finish()
    }

    fn collection_path(project: &str, location: &str) -> String {
        format!("projects/{project}/locations/{location}/workflowTemplates")
    }

    fn canonicalize_desired(raw_desired: &Self, initial: Option<&Self>) -> Self {
        let Some(initial) = initial else {
            return Self {
                placement: canonical::desired_nested_alone(&raw_desired.placement),
                jobs: raw_desired
                    .jobs
                    .iter()
                    .map(|job| canonical::Canonicalize::canonicalize_desired(job, None))
                    .collect(),
                parameters: raw_desired
                    .parameters
                    .iter()
                    .map(|parameter| canonical::Canonicalize::canonicalize_desired(parameter, None))
                    .collect(),
                ..raw_desired.clone()
            };
        };
        Self {
            name: canonical::desired_string(&raw_desired.name, &initial.name),
            labels: canonical::desired_map(&raw_desired.labels, &initial.labels),
            placement: canonical::desired_nested(&raw_desired.placement, &initial.placement),
            jobs: canonical::desired_nested_list(&raw_desired.jobs, &initial.jobs),
            parameters: canonical::desired_nested_list(&raw_desired.parameters, &initial.parameters),
            dag_timeout: canonical::desired_string(&raw_desired.dag_timeout, &initial.dag_timeout),
            project: canonical::desired_string(&raw_desired.project, &initial.project),
            location: canonical::desired_string(&raw_desired.location, &initial.location),
            ..raw_desired.clone()
        }
    }

    fn canonicalize_new(raw_new: &Self, raw_desired: &Self) -> Self {
        Self {
            name: raw_desired.name.clone(),
            placement: canonical::new_nested(&raw_new.placement, &raw_desired.placement),
            jobs: canonical::new_nested_list(&raw_new.jobs, &raw_desired.jobs),
            parameters: canonical::new_nested_list(&raw_new.parameters, &raw_desired.parameters),
            dag_timeout: canonical::new_string(&raw_new.dag_timeout, &raw_desired.dag_timeout),
            project: raw_desired.project.clone(),
            location: raw_desired.location.clone(),
            ..raw_new.clone()
        }
    }

    fn diff(desired: &Self, actual: &Self) -> Vec<FieldDiff> {
        let mut d = Differ::new();
        d.string("id", &desired.name, &actual.name, FieldRule::recreate());
        d.scalar("version", &desired.version, &actual.version, FieldRule::recreate().output_only());
        d.string("createTime", &desired.create_time, &actual.create_time, FieldRule::recreate().output_only());
        d.string("updateTime", &desired.update_time, &actual.update_time, FieldRule::recreate().output_only());
        d.map("labels", &desired.labels, &actual.labels, FieldRule::recreate());
        d.nested("placement", &desired.placement, &actual.placement, FieldRule::recreate());
        d.nested_list("jobs", &desired.jobs, &actual.jobs, FieldRule::recreate());
        d.nested_list("parameters", &desired.parameters, &actual.parameters, FieldRule::recreate());
        d.string("dagTimeout", &desired.dag_timeout, &actual.dag_timeout, FieldRule::recreate());
        d.string("project", &desired.project, &actual.project, FieldRule::recreate());
        d.string("location", &desired.location, &actual.location, FieldRule::recreate());
        d.finish()
    }
}

fn is_valid_step_id(step_id: &str) -> bool {
    (3..=50).contains(&step_id.len())
        && !step_id.starts_with(['_', '-'])
        && !step_id.ends_with(['_', '-'])
        && step_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
