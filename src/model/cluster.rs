//! Dataproc clusters.
//!
//! Clusters are long-running: create, update and delete each return an
//! operation that must finish before the cluster reflects the change. Most
//! of the configuration is immutable; labels, worker counts, the autoscaling
//! policy and the scheduled-deletion TTLs are patched in place with an
//! `updateMask`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::nested::Nested;
use super::resource::{HttpMethod, Identity, Resource, UpdateBody, UpdateOperation};
use super::validate::Validator;
use crate::error::ConfigError;
use crate::planner::canonical;
use crate::planner::{Differ, FieldDiff, FieldRule, Remediation};

/// Name of the cluster patch operation.
pub const UPDATE_CLUSTER: &str = "UpdateCluster";

/// Diff paths patchable in place, with their `updateMask` entries.
const UPDATE_MASKS: &[(&str, &str)] = &[
    ("labels", "labels"),
    ("config.workerConfig.numInstances", "config.worker_config.num_instances"),
    (
        "config.secondaryWorkerConfig.numInstances",
        "config.secondary_worker_config.num_instances",
    ),
    ("config.autoscalingConfig.policyUri", "config.autoscaling_config.policy_uri"),
    ("config.lifecycleConfig.idleDeleteTtl", "config.lifecycle_config.idle_delete_ttl"),
    ("config.lifecycleConfig.autoDeleteTtl", "config.lifecycle_config.auto_delete_ttl"),
    ("config.lifecycleConfig.autoDeleteTime", "config.lifecycle_config.auto_delete_time"),
];

/// Labels the service attaches to every cluster.
const SERVICE_LABEL_PREFIX: &str = "goog-dataproc-";

/// A Dataproc cluster.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    /// Project.
    #[serde(rename = "projectId", default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// Cluster name.
    #[serde(rename = "clusterName", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Cluster configuration.
    #[serde(default, skip_serializing_if = "Nested::is_absent")]
    pub config: Nested<ClusterConfig>,
    /// User labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Current status.
    #[serde(default, skip_serializing_if = "Nested::is_absent")]
    pub status: Nested<ClusterStatus>,
    /// Previous statuses.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status_history: Vec<ClusterStatus>,
    /// Server-assigned UUID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_uuid: Option<String>,
    /// HDFS and YARN metrics.
    #[serde(default, skip_serializing_if = "Nested::is_absent")]
    pub metrics: Nested<ClusterMetrics>,
    /// Region.
    #[serde(skip)]
    pub location: Option<String>,
}

/// Cluster configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    /// Staging bucket.
    #[serde(rename = "configBucket", default, skip_serializing_if = "Option::is_none")]
    pub staging_bucket: Option<String>,
    /// Temporary data bucket.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_bucket: Option<String>,
    /// Compute Engine settings shared by all instances.
    #[serde(default, skip_serializing_if = "Nested::is_absent")]
    pub gce_cluster_config: Nested<GceClusterConfig>,
    /// Master instance group.
    #[serde(default, skip_serializing_if = "Nested::is_absent")]
    pub master_config: Nested<InstanceGroupConfig>,
    /// Primary worker instance group.
    #[serde(default, skip_serializing_if = "Nested::is_absent")]
    pub worker_config: Nested<InstanceGroupConfig>,
    /// Secondary worker instance group.
    #[serde(default, skip_serializing_if = "Nested::is_absent")]
    pub secondary_worker_config: Nested<InstanceGroupConfig>,
    /// Image version and component settings.
    #[serde(default, skip_serializing_if = "Nested::is_absent")]
    pub software_config: Nested<SoftwareConfig>,
    /// Scripts run on each node after setup.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub initialization_actions: Vec<InitializationAction>,
    /// Disk encryption.
    #[serde(default, skip_serializing_if = "Nested::is_absent")]
    pub encryption_config: Nested<EncryptionConfig>,
    /// Attached autoscaling policy.
    #[serde(default, skip_serializing_if = "Nested::is_absent")]
    pub autoscaling_config: Nested<AutoscalingConfig>,
    /// Kerberos settings.
    #[serde(default, skip_serializing_if = "Nested::is_absent")]
    pub security_config: Nested<SecurityConfig>,
    /// Scheduled deletion.
    #[serde(default, skip_serializing_if = "Nested::is_absent")]
    pub lifecycle_config: Nested<LifecycleConfig>,
    /// Component gateway.
    #[serde(default, skip_serializing_if = "Nested::is_absent")]
    pub endpoint_config: Nested<EndpointConfig>,
}

/// Private IPv6 Google access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrivateIpv6GoogleAccess {
    /// Unspecified.
    #[default]
    PrivateIpv6GoogleAccessUnspecified,
    /// Inherit from the subnetwork.
    InheritFromSubnetwork,
    /// Outbound only.
    Outbound,
    /// Both directions.
    Bidirectional,
}

/// Compute Engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GceClusterConfig {
    /// Zone.
    #[serde(rename = "zoneUri", default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    /// Network.
    #[serde(rename = "networkUri", default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// Subnetwork.
    #[serde(rename = "subnetworkUri", default, skip_serializing_if = "Option::is_none")]
    pub subnetwork: Option<String>,
    /// Internal IP addresses only.
    #[serde(rename = "internalIpOnly", default, skip_serializing_if = "Option::is_none")]
    pub internal_ip_only: Option<bool>,
    /// Private IPv6 Google access.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_ipv6_google_access: Option<PrivateIpv6GoogleAccess>,
    /// Service account used by the VMs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,
    /// OAuth scopes of the service account.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_account_scopes: Vec<String>,
    /// Network tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Instance metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    /// Reservation to consume.
    #[serde(default, skip_serializing_if = "Nested::is_absent")]
    pub reservation_affinity: Nested<ReservationAffinity>,
    /// Sole-tenant node group.
    #[serde(default, skip_serializing_if = "Nested::is_absent")]
    pub node_group_affinity: Nested<NodeGroupAffinity>,
}

/// Reservation consumption type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsumeReservationType {
    /// Unspecified.
    #[default]
    TypeUnspecified,
    /// Never consume a reservation.
    NoReservation,
    /// Consume any matching reservation.
    AnyReservation,
    /// Consume the named reservation only.
    SpecificReservation,
}

/// Reservation affinity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationAffinity {
    /// Consumption type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consume_reservation_type: Option<ConsumeReservationType>,
    /// Reservation label key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Reservation label values.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

/// Node group affinity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroupAffinity {
    /// Node group.
    #[serde(rename = "nodeGroupUri", default, skip_serializing_if = "Option::is_none")]
    pub node_group: Option<String>,
}

/// Preemptibility of an instance group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Preemptibility {
    /// Unspecified.
    #[default]
    PreemptibilityUnspecified,
    /// Standard VMs.
    NonPreemptible,
    /// Preemptible VMs.
    Preemptible,
}

/// An instance group.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceGroupConfig {
    /// Number of VMs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_instances: Option<i64>,
    /// Instance names (output only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instance_names: Vec<String>,
    /// Image.
    #[serde(rename = "imageUri", default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Machine type.
    #[serde(rename = "machineTypeUri", default, skip_serializing_if = "Option::is_none")]
    pub machine_type: Option<String>,
    /// Disks.
    #[serde(default, skip_serializing_if = "Nested::is_absent")]
    pub disk_config: Nested<DiskConfig>,
    /// Whether the instances are preemptible (output only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_preemptible: Option<bool>,
    /// Preemptibility.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preemptibility: Option<Preemptibility>,
    /// Managed instance group (output only).
    #[serde(default, skip_serializing_if = "Nested::is_absent")]
    pub managed_group_config: Nested<ManagedGroupConfig>,
    /// Attached accelerators.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accelerators: Vec<Accelerator>,
    /// Minimum CPU platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_cpu_platform: Option<String>,
}

/// Disk settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskConfig {
    /// Boot disk type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_disk_type: Option<String>,
    /// Boot disk size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_disk_size_gb: Option<i64>,
    /// Local SSD count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_local_ssds: Option<i64>,
}

/// Managed instance group details.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedGroupConfig {
    /// Instance template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_template_name: Option<String>,
    /// Instance group manager.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_group_manager_name: Option<String>,
}

/// An accelerator attachment.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Accelerator {
    /// Accelerator type.
    #[serde(rename = "acceleratorTypeUri", default, skip_serializing_if = "Option::is_none")]
    pub accelerator_type: Option<String>,
    /// Number of accelerators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accelerator_count: Option<i64>,
}

/// Software settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoftwareConfig {
    /// Image version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_version: Option<String>,
    /// Daemon config properties.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
    /// Optional components.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub optional_components: Vec<String>,
}

/// An initialization action.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializationAction {
    /// Cloud Storage URI of the script.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable_file: Option<String>,
    /// Execution timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_timeout: Option<String>,
}

/// Encryption settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionConfig {
    /// KMS key for persistent disks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gce_pd_kms_key_name: Option<String>,
}

/// Autoscaling attachment.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalingConfig {
    /// Autoscaling policy.
    #[serde(rename = "policyUri", default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
}

/// Security settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConfig {
    /// Kerberos.
    #[serde(default, skip_serializing_if = "Nested::is_absent")]
    pub kerberos_config: Nested<KerberosConfig>,
}

/// Kerberos settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KerberosConfig {
    /// Enable Kerberos.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_kerberos: Option<bool>,
    /// Root principal password.
    #[serde(rename = "rootPrincipalPasswordUri", default, skip_serializing_if = "Option::is_none")]
    pub root_principal_password: Option<String>,
    /// KMS key.
    #[serde(rename = "kmsKeyUri", default, skip_serializing_if = "Option::is_none")]
    pub kms_key: Option<String>,
    /// Keystore.
    #[serde(rename = "keystoreUri", default, skip_serializing_if = "Option::is_none")]
    pub keystore: Option<String>,
    /// Truststore.
    #[serde(rename = "truststoreUri", default, skip_serializing_if = "Option::is_none")]
    pub truststore: Option<String>,
    /// Keystore password.
    #[serde(rename = "keystorePasswordUri", default, skip_serializing_if = "Option::is_none")]
    pub keystore_password: Option<String>,
    /// Key password.
    #[serde(rename = "keyPasswordUri", default, skip_serializing_if = "Option::is_none")]
    pub key_password: Option<String>,
    /// Truststore password.
    #[serde(rename = "truststorePasswordUri", default, skip_serializing_if = "Option::is_none")]
    pub truststore_password: Option<String>,
    /// Remote realm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_realm_trust_realm: Option<String>,
    /// Remote KDC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_realm_trust_kdc: Option<String>,
    /// Remote admin server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_realm_trust_admin_server: Option<String>,
    /// Shared password.
    #[serde(rename = "crossRealmTrustSharedPasswordUri", default, skip_serializing_if = "Option::is_none")]
    pub cross_realm_trust_shared_password: Option<String>,
    /// KDC database key.
    #[serde(rename = "kdcDbKeyUri", default, skip_serializing_if = "Option::is_none")]
    pub kdc_db_key: Option<String>,
    /// Ticket lifetime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tgt_lifetime_hours: Option<i64>,
    /// Realm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
}

/// Scheduled deletion.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleConfig {
    /// Idle time before deletion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_delete_ttl: Option<String>,
    /// Absolute deletion time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_delete_time: Option<String>,
    /// Lifetime before deletion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_delete_ttl: Option<String>,
    /// When the cluster became idle (output only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_start_time: Option<String>,
}

/// Component gateway.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    /// Gateway URLs by port (output only).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub http_ports: BTreeMap<String, String>,
    /// Enable the component gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_http_port_access: Option<bool>,
}

/// Cluster status.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// State, e.g. `RUNNING`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// When the state was entered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_start_time: Option<String>,
    /// Substate, e.g. `UNHEALTHY`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substate: Option<String>,
}

/// Cluster metrics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMetrics {
    /// HDFS metrics.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hdfs_metrics: BTreeMap<String, String>,
    /// YARN metrics.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub yarn_metrics: BTreeMap<String, String>,
}

reconciled_object!(ClusterConfig {
    staging_bucket: string "configBucket" => FieldRule::inherit().server_default(),
    temp_bucket: string "tempBucket" => FieldRule::inherit().server_default(),
    gce_cluster_config: nested "gceClusterConfig" => FieldRule::inherit(),
    master_config: nested "masterConfig" => FieldRule::inherit(),
    worker_config: nested "workerConfig" => FieldRule::inherit(),
    secondary_worker_config: nested "secondaryWorkerConfig" => FieldRule::inherit(),
    software_config: nested "softwareConfig" => FieldRule::inherit(),
    initialization_actions: nested_list "initializationActions" => FieldRule::inherit(),
    encryption_config: nested "encryptionConfig" => FieldRule::inherit(),
    autoscaling_config: nested "autoscalingConfig" => FieldRule::inherit(),
    security_config: nested "securityConfig" => FieldRule::inherit(),
    lifecycle_config: nested "lifecycleConfig" => FieldRule::inherit(),
    endpoint_config: nested "endpointConfig" => FieldRule::inherit(),
});

reconciled_object!(GceClusterConfig {
    zone: string "zoneUri" => FieldRule::inherit().server_default(),
    network: string "networkUri" => FieldRule::inherit().server_default(),
    subnetwork: string "subnetworkUri" => FieldRule::inherit().server_default(),
    internal_ip_only: scalar "internalIpOnly" => FieldRule::inherit().server_default(),
    private_ipv6_google_access: scalar "privateIpv6GoogleAccess" => FieldRule::inherit().server_default(),
    service_account: string "serviceAccount" => FieldRule::inherit().server_default(),
    service_account_scopes: string_set "serviceAccountScopes" => FieldRule::inherit().server_default(),
    tags: string_set "tags" => FieldRule::inherit(),
    metadata: map "metadata" => FieldRule::inherit(),
    reservation_affinity: nested "reservationAffinity" => FieldRule::inherit(),
    node_group_affinity: nested "nodeGroupAffinity" => FieldRule::inherit(),
});

reconciled_object!(ReservationAffinity {
    consume_reservation_type: scalar "consumeReservationType" => FieldRule::inherit(),
    key: string "key" => FieldRule::inherit(),
    values: string_list "values" => FieldRule::inherit(),
});

reconciled_object!(NodeGroupAffinity {
    node_group: string "nodeGroupUri" => FieldRule::inherit(),
});

reconciled_object!(InstanceGroupConfig {
    num_instances: scalar "numInstances" => FieldRule::inherit().server_default(),
    instance_names: string_list "instanceNames" => FieldRule::inherit().output_only(),
    image: string "imageUri" => FieldRule::inherit().server_default(),
    machine_type: string "machineTypeUri" => FieldRule::inherit().server_default(),
    disk_config: nested "diskConfig" => FieldRule::inherit(),
    is_preemptible: scalar "isPreemptible" => FieldRule::inherit().output_only(),
    preemptibility: scalar "preemptibility" => FieldRule::inherit().server_default(),
    managed_group_config: nested "managedGroupConfig" => FieldRule::inherit().output_only(),
    accelerators: nested_list "accelerators" => FieldRule::inherit(),
    min_cpu_platform: string "minCpuPlatform" => FieldRule::inherit().server_default(),
});

reconciled_object!(DiskConfig {
    boot_disk_type: string "bootDiskType" => FieldRule::inherit().server_default(),
    boot_disk_size_gb: scalar "bootDiskSizeGb" => FieldRule::inherit().server_default(),
    num_local_ssds: scalar "numLocalSsds" => FieldRule::inherit().server_default(),
});

reconciled_object!(ManagedGroupConfig {
    instance_template_name: string "instanceTemplateName" => FieldRule::inherit().output_only(),
    instance_group_manager_name: string "instanceGroupManagerName" => FieldRule::inherit().output_only(),
});

reconciled_object!(Accelerator {
    accelerator_type: string "acceleratorTypeUri" => FieldRule::inherit(),
    accelerator_count: scalar "acceleratorCount" => FieldRule::inherit(),
});

reconciled_object!(SoftwareConfig {
    image_version: string "imageVersion" => FieldRule::inherit().server_default(),
    properties: map "properties" => FieldRule::inherit().server_default(),
    optional_components: string_set "optionalComponents" => FieldRule::inherit(),
});

reconciled_object!(InitializationAction {
    executable_file: string "executableFile" => FieldRule::inherit(),
    execution_timeout: string "executionTimeout" => FieldRule::inherit().server_default(),
});

reconciled_object!(EncryptionConfig {
    gce_pd_kms_key_name: string "gcePdKmsKeyName" => FieldRule::inherit(),
});

reconciled_object!(AutoscalingConfig {
    policy: string "policyUri" => FieldRule::inherit(),
});

reconciled_object!(SecurityConfig {
    kerberos_config: nested "kerberosConfig" => FieldRule::inherit(),
});

reconciled_object!(KerberosConfig {
    enable_kerberos: scalar "enableKerberos" => FieldRule::inherit(),
    root_principal_password: string "rootPrincipalPasswordUri" => FieldRule::inherit(),
    kms_key: string "kmsKeyUri" => FieldRule::inherit(),
    keystore: string "keystoreUri" => FieldRule::inherit(),
    truststore: string "truststoreUri" => FieldRule::inherit(),
    keystore_password: string "keystorePasswordUri" => FieldRule::inherit(),
    key_password: string "keyPasswordUri" => FieldRule::inherit(),
    truststore_password: string "truststorePasswordUri" => FieldRule::inherit(),
    cross_realm_trust_realm: string "crossRealmTrustRealm" => FieldRule::inherit(),
    cross_realm_trust_kdc: string "crossRealmTrustKdc" => FieldRule::inherit(),
    cross_realm_trust_admin_server: string "crossRealmTrustAdminServer" => FieldRule::inherit(),
    cross_realm_trust_shared_password: string "crossRealmTrustSharedPasswordUri" => FieldRule::inherit(),
    kdc_db_key: string "kdcDbKeyUri" => FieldRule::inherit(),
    tgt_lifetime_hours: scalar "tgtLifetimeHours" => FieldRule::inherit().server_default(),
    realm: string "realm" => FieldRule::inherit().server_default(),
});

reconciled_object!(LifecycleConfig {
    idle_delete_ttl: string "idleDeleteTtl" => FieldRule::inherit(),
    auto_delete_time: string "autoDeleteTime" => FieldRule::inherit(),
    auto_delete_ttl: string "autoDeleteTtl" => FieldRule::inherit(),
    idle_start_time: string "idleStartTime" => FieldRule::inherit().output_only(),
});

reconciled_object!(EndpointConfig {
    http_ports: map "httpPorts" => FieldRule::inherit().output_only(),
    enable_http_port_access: scalar "enableHttpPortAccess" => FieldRule::inherit(),
});

reconciled_object!(ClusterStatus {
    state: string "state" => FieldRule::inherit().output_only(),
    detail: string "detail" => FieldRule::inherit().output_only(),
    state_start_time: string "stateStartTime" => FieldRule::inherit().output_only(),
    substate: string "substate" => FieldRule::inherit().output_only(),
});

reconciled_object!(ClusterMetrics {
    hdfs_metrics: map "hdfsMetrics" => FieldRule::inherit(),
    yarn_metrics: map "yarnMetrics" => FieldRule::inherit(),
});

impl Resource for Cluster {
    const KIND: &'static str = "Cluster";
    const LIST_KEY: &'static str = "clusters";
    const LONG_RUNNING: bool = true;
    const OUTPUT_ONLY: &'static [&'static str] = &[
        "status",
        "statusHistory",
        "clusterUuid",
        "metrics",
        "config.masterConfig.instanceNames",
        "config.masterConfig.isPreemptible",
        "config.masterConfig.managedGroupConfig",
        "config.workerConfig.instanceNames",
        "config.workerConfig.isPreemptible",
        "config.workerConfig.managedGroupConfig",
        "config.secondaryWorkerConfig.instanceNames",
        "config.secondaryWorkerConfig.isPreemptible",
        "config.secondaryWorkerConfig.managedGroupConfig",
        "config.lifecycleConfig.idleStartTime",
        "config.endpointConfig.httpPorts",
    ];
    const UPDATE_OPERATIONS: &'static [UpdateOperation] = &[UpdateOperation {
        name: UPDATE_CLUSTER,
        method: HttpMethod::Patch,
        body: UpdateBody::Masked,
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
        v.require_string("projectId", self.project.as_ref());
        v.require_string("clusterName", self.name.as_ref());
        v.require_string("location", self.location.as_ref());
        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            v.check(
                is_valid_cluster_name(name),
                "clusterName",
                "must start with a lowercase letter and contain only lowercase letters, digits and hyphens (max 51)",
            );
        }
        v.nested("config", &self.config, |v, config| {
            for (field, group) in [
                ("masterConfig", &config.master_config),
                ("workerConfig", &config.worker_config),
                ("secondaryWorkerConfig", &config.secondary_worker_config),
            ] {
                v.nested(field, group, |v, group| {
                    v.check(
                        group.num_instances.is_none_or(|n| n >= 0),
                        "numInstances",
                        "must not be negative",
                    );
                    v.each("accelerators", &group.accelerators, |v, accelerator| {
                        v.require_string("acceleratorTypeUri", accelerator.accelerator_type.as_ref());
                        v.check(
                            accelerator.accelerator_count.is_none_or(|n| n > 0),
                            "acceleratorCount",
                            "must be positive",
                        );
                    });
                });
            }
            v.each("initializationActions", &config.initialization_actions, |v, action| {
                v.require_string("executableFile", action.executable_file.as_ref());
            });
            v.nested("securityConfig", &config.security_config, |v, security| {
                v.nested("kerberosConfig", &security.kerberos_config, |v, kerberos| {
                    if kerberos.enable_kerberos == Some(true) {
                        v.require_string("rootPrincipalPasswordUri", kerberos.root_principal_password.as_ref());
                        v.require_string("kmsKeyUri", kerberos.kms_key.as_ref());
                    }
                });
            });
        });
        v.finish()
    }

    fn collection_path(project: &str, location: &str) -> String {
        format!("projects/{project}/regions/{location}/clusters")
    }

    fn update_mask_path(wire_path: &str) -> Option<&'static str> {
        UPDATE_MASKS
            .iter()
            .find(|(path, _)| *path == wire_path)
            .map(|(_, mask)| *mask)
    }

    fn canonicalize_desired(raw_desired: &Self, initial: Option<&Self>) -> Self {
        let Some(initial) = initial else {
            return Self {
                config: canonical::desired_nested_alone(&raw_desired.config),
                ..raw_desired.clone()
            };
        };
        Self {
            project: canonical::desired_string(&raw_desired.project, &initial.project),
            name: canonical::desired_string(&raw_desired.name, &initial.name),
            config: canonical::desired_nested(&raw_desired.config, &initial.config),
            labels: canonical::desired_map(&raw_desired.labels, &user_labels(&initial.labels)),
            location: canonical::desired_string(&raw_desired.location, &initial.location),
            ..raw_desired.clone()
        }
    }

    fn canonicalize_new(raw_new: &Self, raw_desired: &Self) -> Self {
        Self {
            project: raw_desired.project.clone(),
            name: raw_desired.name.clone(),
            config: canonical::new_nested(&raw_new.config, &raw_desired.config),
            location: raw_desired.location.clone(),
            ..raw_new.clone()
        }
    }

    fn diff(desired: &Self, actual: &Self) -> Vec<FieldDiff> {
        let mut d = Differ::new();
        d.string("projectId", &desired.project, &actual.project, FieldRule::recreate());
        d.string("clusterName", &desired.name, &actual.name, FieldRule::recreate());
        d.nested("config", &desired.config, &actual.config, FieldRule::recreate());
        d.map(
            "labels",
            &desired.labels,
            &actual.labels,
            FieldRule::triggers(UPDATE_CLUSTER).ignore_prefix(SERVICE_LABEL_PREFIX),
        );
        d.nested("status", &desired.status, &actual.status, FieldRule::recreate().output_only());
        d.nested_list(
            "statusHistory",
            &desired.status_history,
            &actual.status_history,
            FieldRule::recreate().output_only(),
        );
        d.string("clusterUuid", &desired.cluster_uuid, &actual.cluster_uuid, FieldRule::recreate().output_only());
        d.nested("metrics", &desired.metrics, &actual.metrics, FieldRule::recreate().output_only());
        d.string("location", &desired.location, &actual.location, FieldRule::recreate());

        let mut diffs = d.finish();
        for diff in &mut diffs {
            if Self::update_mask_path(&diff.path).is_some() {
                diff.remediation = Remediation::Update(UPDATE_CLUSTER);
            }
        }
        diffs
    }
}

fn user_labels(labels: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    labels
        .iter()
        .filter(|(key, _)| !key.starts_with(SERVICE_LABEL_PREFIX))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn is_valid_cluster_name(name: &str) -> bool {
    name.len() <= 51
        && name.starts_with(|c: char| c.is_ascii_lowercase())
        && !name.ends_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::codec;
    use serde_json::json;

    fn cluster(workers: i64) -> Cluster {
        Cluster {
            project: Some(String::from("my-project")),
            name: Some(String::from("analytics")),
            config: Nested::value(ClusterConfig {
                master_config: Nested::value(InstanceGroupConfig {
                    num_instances: Some(1),
                    machine_type: Some(String::from("n1-standard-4")),
                    ..InstanceGroupConfig::default()
                }),
                worker_config: Nested::value(InstanceGroupConfig {
                    num_instances: Some(workers),
                    machine_type: Some(String::from("n1-standard-4")),
                    ..InstanceGroupConfig::default()
                }),
                ..ClusterConfig::default()
            }),
            labels: BTreeMap::from([(String::from("env"), String::from("prod"))]),
            location: Some(String::from("us-central1")),
            ..Cluster::default()
        }
    }

    #[test]
    fn test_wire_names_and_output_only_stripping() {
        let mut observed = cluster(2);
        observed.cluster_uuid = Some(String::from("uuid-1"));
        if let Nested::Value(config) = &mut observed.config {
            if let Nested::Value(master) = &mut config.master_config {
                master.instance_names = vec![String::from("analytics-m")];
            }
        }

        let body = codec::expand(&observed).unwrap();
        assert_eq!(body["projectId"], json!("my-project"));
        assert_eq!(body["clusterName"], json!("analytics"));
        assert_eq!(body["config"]["masterConfig"]["machineTypeUri"], json!("n1-standard-4"));
        assert!(body.get("clusterUuid").is_none());
        assert!(body["config"]["masterConfig"].get("instanceNames").is_none());
    }

    #[test]
    fn test_worker_count_change_is_patched() {
        let diffs = Cluster::diff(&cluster(5), &cluster(2));
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].path, "config.workerConfig.numInstances");
        assert_eq!(diffs[0].remediation, Remediation::Update(UPDATE_CLUSTER));
        assert_eq!(
            Cluster::update_mask_path(&diffs[0].path),
            Some("config.worker_config.num_instances")
        );
    }

    #[test]
    fn test_machine_type_change_requires_recreate() {
        let desired = cluster(2);
        let mut actual = cluster(2);
        if let Nested::Value(config) = &mut actual.config {
            if let Nested::Value(master) = &mut config.master_config {
                master.machine_type = Some(String::from("n1-highmem-8"));
            }
        }
        let diffs = Cluster::diff(&desired, &actual);
        assert_eq!(diffs.len(), 1);
        assert!(diffs[0].requires_recreate());
    }

    #[test]
    fn test_service_labels_and_self_links_do_not_diff() {
        let desired = cluster(2);
        let mut observed = cluster(2);
        observed
            .labels
            .insert(String::from("goog-dataproc-cluster-name"), String::from("analytics"));
        observed.status = Nested::value(ClusterStatus {
            state: Some(String::from("RUNNING")),
            ..ClusterStatus::default()
        });
        if let Nested::Value(config) = &mut observed.config {
            config.staging_bucket = Some(String::from("dataproc-staging-us-central1"));
            if let Nested::Value(master) = &mut config.master_config {
                master.machine_type = Some(String::from(
                    "https://www.googleapis.com/compute/v1/projects/my-project/zones/us-central1-a/machineTypes/n1-standard-4",
                ));
            }
        }

        let canonical_desired = Cluster::canonicalize_desired(&desired, None);
        let new = Cluster::canonicalize_new(&observed, &desired);
        assert!(Cluster::diff(&canonical_desired, &new).is_empty());
    }

    #[test]
    fn test_validate_cluster_name() {
        assert!(cluster(2).validate().is_ok());
        let mut bad = cluster(2);
        bad.name = Some(String::from("Analytics_1"));
        assert!(bad.validate().is_err());
        assert!(!is_valid_cluster_name("trailing-"));
    }

    #[test]
    fn test_decode_sets_location_from_context() {
        let payload = json!({
            "projectId": "my-project",
            "clusterName": "analytics",
            "config": {},
            "status": {"state": "RUNNING"}
        });
        let decoded: Cluster =
            codec::flatten(payload, &Identity::new("my-project", "europe-west1", "analytics")).unwrap();
        assert_eq!(decoded.location.as_deref(), Some("europe-west1"));
        assert_eq!(decoded.config, Nested::Empty);
    }
}
