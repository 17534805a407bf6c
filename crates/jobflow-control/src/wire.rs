//! Request and response bodies of the orchestration API.
//!
//! Field names follow the service's PascalCase JSON protocol. Response
//! structs default every optional field so that partial responses still
//! deserialize; the callers decide which absences are errors.

use std::collections::BTreeMap;

use jobflow_core::{ClusterState, StepState};
use serde::{Deserialize, Serialize};

/// What the cluster does when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailurePolicy {
    /// Shut the cluster down.
    #[serde(alias = "TERMINATE_JOB_FLOW")]
    TerminateCluster,
    /// Keep running the remaining steps.
    Continue,
}

impl FailurePolicy {
    /// Policy for a `terminate_on_failure` flag.
    #[must_use]
    pub const fn from_terminate_flag(terminate_on_failure: bool) -> Self {
        if terminate_on_failure {
            Self::TerminateCluster
        } else {
            Self::Continue
        }
    }

    /// The wire-level string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TerminateCluster => "TERMINATE_CLUSTER",
            Self::Continue => "CONTINUE",
        }
    }
}

/// Purchasing option for an instance group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Market {
    /// On-demand instances.
    OnDemand,
    /// Spot instances.
    #[default]
    Spot,
}

/// Role of an instance group in the cluster topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceRole {
    /// The single coordinating node.
    Master,
    /// Nodes running tasks and storing HDFS data.
    Core,
    /// Nodes running tasks only.
    Task,
}

/// A volume attached to each instance of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VolumeSpecification {
    /// Volume type, e.g. `gp2`.
    pub volume_type: String,
    /// Size of each volume in GiB.
    #[serde(rename = "SizeInGB")]
    pub size_in_gb: u32,
}

/// Block device configuration of an instance group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EbsBlockDeviceConfig {
    /// Volume shape.
    pub volume_specification: VolumeSpecification,
    /// Number of such volumes per instance.
    pub volumes_per_instance: u32,
}

/// EBS storage of an instance group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EbsConfiguration {
    /// Attached devices.
    pub ebs_block_device_configs: Vec<EbsBlockDeviceConfig>,
}

/// One instance group of the cluster topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InstanceGroupConfig {
    /// Display name of the group.
    pub name: String,
    /// Purchasing option.
    pub market: Market,
    /// Role in the cluster.
    pub instance_role: InstanceRole,
    /// Instance type, e.g. `m5.2xlarge`.
    pub instance_type: String,
    /// Number of instances.
    pub instance_count: u32,
    /// Attached storage.
    pub ebs_configuration: EbsConfiguration,
}

/// Instance settings of a new cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobFlowInstancesConfig {
    /// Topology.
    pub instance_groups: Vec<InstanceGroupConfig>,
    /// SSH key pair installed on the nodes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ec2_key_name: Option<String>,
    /// Keep the cluster alive once its steps are done.
    pub keep_job_flow_alive_when_no_steps: bool,
    /// Protect the cluster from termination.
    pub termination_protected: bool,
    /// Subnet to launch into.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ec2_subnet_id: Option<String>,
    /// Security group for the master node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emr_managed_master_security_group: Option<String>,
    /// Security group for core and task nodes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emr_managed_slave_security_group: Option<String>,
}

/// An application installed on the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Application {
    /// Application name, e.g. `Spark`.
    pub name: String,
}

/// A configuration classification applied at launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Configuration {
    /// Classification, e.g. `spark`.
    pub classification: String,
    /// Properties set within the classification.
    pub properties: BTreeMap<String, String>,
}

/// The jar a step runs and its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HadoopJarStepConfig {
    /// Jar to run, e.g. `command-runner.jar`.
    pub jar: String,
    /// Ordered argument list.
    #[serde(default)]
    pub args: Vec<String>,
}

/// A step to submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StepConfig {
    /// Display name.
    pub name: String,
    /// What happens to the cluster if the step fails.
    pub action_on_failure: FailurePolicy,
    /// Command to run.
    pub hadoop_jar_step: HadoopJarStepConfig,
}

/// `RunJobFlow` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RunJobFlowRequest {
    /// Cluster name.
    pub name: String,
    /// Where the service writes cluster and step logs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_uri: Option<String>,
    /// Software release, e.g. `emr-5.27.0`.
    pub release_label: String,
    /// Installed applications.
    pub applications: Vec<Application>,
    /// Instance settings.
    pub instances: JobFlowInstancesConfig,
    /// Steps to run right after launch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepConfig>,
    /// Instance profile for the nodes.
    pub job_flow_role: String,
    /// Service role of the orchestrator.
    pub service_role: String,
    /// Role used by automatic scaling.
    pub auto_scaling_role: String,
    /// Root volume size in GiB.
    pub ebs_root_volume_size: u32,
    /// Scale-down behaviour.
    pub scale_down_behavior: String,
    /// Configuration classifications.
    pub configurations: Vec<Configuration>,
    /// Whether every user of the account can see the cluster.
    pub visible_to_all_users: bool,
}

/// `RunJobFlow` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RunJobFlowResponse {
    /// Identifier of the new cluster.
    #[serde(default)]
    pub job_flow_id: Option<String>,
    /// ARN of the new cluster.
    #[serde(default)]
    pub cluster_arn: Option<String>,
}

/// Failure details attached to a failed step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FailureDetailsWire {
    /// Short reason.
    #[serde(default)]
    pub reason: Option<String>,
    /// Longer message.
    #[serde(default)]
    pub message: Option<String>,
    /// Object path of the step's log directory or file.
    #[serde(default)]
    pub log_file: Option<String>,
}

/// Status of a step as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StepStatusWire {
    /// Lifecycle state.
    pub state: StepState,
    /// Present when the step failed.
    #[serde(default)]
    pub failure_details: Option<FailureDetailsWire>,
}

/// A step as returned by `DescribeStep` and `ListSteps`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StepDescription {
    /// Step identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Command the step runs.
    pub config: HadoopJarStepConfig,
    /// Failure policy.
    pub action_on_failure: FailurePolicy,
    /// Current status.
    pub status: StepStatusWire,
}

/// Why a cluster last changed state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StateChangeReason {
    /// Machine-readable code.
    #[serde(default)]
    pub code: Option<String>,
    /// Human-readable message.
    #[serde(default)]
    pub message: Option<String>,
}

/// Status of a cluster as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClusterStatusWire {
    /// Lifecycle state.
    pub state: ClusterState,
    /// Reason for the last state change.
    #[serde(default)]
    pub state_change_reason: Option<StateChangeReason>,
}

/// A cluster as returned by `DescribeCluster`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClusterDescription {
    /// Cluster identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Current status.
    pub status: ClusterStatusWire,
}
