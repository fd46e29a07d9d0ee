//! Typed Dataproc resources and their wire codec.
//!
//! Every resource implements [`Resource`], the descriptor the generic
//! engine in [`crate::planner`] and [`crate::reconciler`] runs over.

#[macro_use]
mod fields;

mod autoscaling_policy;
mod cluster;
pub mod codec;
mod hash;
mod nested;
mod resource;
mod validate;
mod workflow_template;

pub use autoscaling_policy::{
    AutoscalingPolicy, BasicAlgorithm, InstanceGroupBounds, UPDATE_AUTOSCALING_POLICY, YarnConfig,
};
pub use cluster::{
    Accelerator, AutoscalingConfig, Cluster, ClusterConfig, ClusterMetrics, ClusterStatus,
    ConsumeReservationType, DiskConfig, EncryptionConfig, EndpointConfig, GceClusterConfig,
    InitializationAction, InstanceGroupConfig, KerberosConfig, LifecycleConfig, ManagedGroupConfig,
    NodeGroupAffinity, Preemptibility, PrivateIpv6GoogleAccess, ReservationAffinity, SecurityConfig,
    SoftwareConfig, UPDATE_CLUSTER,
};
pub use hash::Fingerprinter;
pub use nested::Nested;
pub use resource::{HttpMethod, Identity, Resource, UpdateBody, UpdateOperation};
pub use validate::{ValidationIssue, Validator};
pub use workflow_template::{
    ClusterSelector, JobScheduling, ManagedCluster, OrderedJob, ParameterValidation, RegexValidation,
    TemplateParameter, TemplatePlacement, ValueValidation, WorkflowTemplate,
};
