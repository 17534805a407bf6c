//! Configuration for the cluster manager.
//!
//! Region, endpoints and polling behaviour are passed explicitly at
//! construction; nothing is read from process-wide state except through
//! [`ManagerConfig::from_env`].

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ControlError, Result};
use crate::wire::{
    Application, Configuration, EbsBlockDeviceConfig, EbsConfiguration, InstanceGroupConfig,
    InstanceRole, Market, VolumeSpecification,
};

/// Configuration for the cluster manager and its remote clients.
#[derive(Debug, Clone, Deserialize)]
pub struct ManagerConfig {
    /// Service region, e.g. `us-east-1`.
    #[serde(default = "ManagerConfig::default_region")]
    pub region: String,

    /// Orchestration endpoint. Derived from the region when absent.
    #[serde(default)]
    pub emr_endpoint: Option<String>,

    /// Object storage endpoint. Derived from the region when absent.
    #[serde(default)]
    pub s3_endpoint: Option<String>,

    /// Where the service writes cluster logs (and step stderr).
    #[serde(default)]
    pub log_uri: Option<String>,

    /// SSH key pair installed on cluster nodes.
    #[serde(default)]
    pub key_pair_name: Option<String>,

    /// Seconds between two status polls of a watched step.
    #[serde(default = "ManagerConfig::default_poll_interval")]
    pub poll_interval_seconds: u64,

    /// Consecutive failed polls tolerated before a watch gives up.
    #[serde(default = "ManagerConfig::default_max_poll_failures")]
    pub max_poll_failures: u32,

    /// Per-listener buffer of the watch channel.
    #[serde(default = "ManagerConfig::default_channel_capacity")]
    pub channel_capacity: usize,

    /// Timeout for a single remote request in seconds.
    #[serde(default = "ManagerConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Subnet clusters launch into.
    #[serde(default)]
    pub subnet_id: Option<String>,

    /// Managed security group of the master node.
    #[serde(default)]
    pub master_security_group: Option<String>,

    /// Managed security group of core and task nodes.
    #[serde(default)]
    pub slave_security_group: Option<String>,

    /// Software and role settings of launched clusters.
    #[serde(default)]
    pub template: ClusterTemplate,

    /// Instance topology of launched clusters.
    #[serde(default)]
    pub topology: ClusterTopology,
}

impl ManagerConfig {
    fn default_region() -> String {
        "us-east-1".to_string()
    }

    const fn default_poll_interval() -> u64 {
        60
    }

    const fn default_max_poll_failures() -> u32 {
        5
    }

    const fn default_channel_capacity() -> usize {
        16
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `JOBFLOW_REGION`: service region
    /// - `JOBFLOW_EMR_ENDPOINT`: orchestration endpoint override
    /// - `JOBFLOW_S3_ENDPOINT`: object storage endpoint override
    /// - `JOBFLOW_LOG_URI`: cluster log location
    /// - `JOBFLOW_KEY_PAIR`: SSH key pair name
    /// - `JOBFLOW_POLL_INTERVAL_SECONDS`: polling interval
    /// - `JOBFLOW_MAX_POLL_FAILURES`: tolerated consecutive poll failures
    /// - `JOBFLOW_SUBNET_ID`, `JOBFLOW_MASTER_SG`, `JOBFLOW_SLAVE_SG`: networking
    /// - `JOBFLOW_CORE_COUNT`, `JOBFLOW_TASK_COUNT`, `JOBFLOW_INSTANCE_TYPE`: topology
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().merge_env()
    }

    /// Load configuration from a JSON file, then apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Validation` if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ControlError::Validation(format!("cannot read config {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            ControlError::Validation(format!("invalid config {}: {e}", path.display()))
        })?;
        Ok(config.merge_env())
    }

    fn merge_env(mut self) -> Self {
        fn var(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.is_empty())
        }

        if let Some(val) = var("JOBFLOW_REGION") {
            self.region = val;
        }
        if let Some(val) = var("JOBFLOW_EMR_ENDPOINT") {
            self.emr_endpoint = Some(val);
        }
        if let Some(val) = var("JOBFLOW_S3_ENDPOINT") {
            self.s3_endpoint = Some(val);
        }
        if let Some(val) = var("JOBFLOW_LOG_URI") {
            self.log_uri = Some(val);
        }
        if let Some(val) = var("JOBFLOW_KEY_PAIR") {
            self.key_pair_name = Some(val);
        }
        if let Some(n) = var("JOBFLOW_POLL_INTERVAL_SECONDS").and_then(|v| v.parse().ok()) {
            self.poll_interval_seconds = n;
        }
        if let Some(n) = var("JOBFLOW_MAX_POLL_FAILURES").and_then(|v| v.parse().ok()) {
            self.max_poll_failures = n;
        }
        if let Some(val) = var("JOBFLOW_SUBNET_ID") {
            self.subnet_id = Some(val);
        }
        if let Some(val) = var("JOBFLOW_MASTER_SG") {
            self.master_security_group = Some(val);
        }
        if let Some(val) = var("JOBFLOW_SLAVE_SG") {
            self.slave_security_group = Some(val);
        }
        if let Some(n) = var("JOBFLOW_CORE_COUNT").and_then(|v| v.parse().ok()) {
            self.topology.core_count = n;
        }
        if let Some(n) = var("JOBFLOW_TASK_COUNT").and_then(|v| v.parse().ok()) {
            self.topology.task_count = n;
        }
        if let Some(val) = var("JOBFLOW_INSTANCE_TYPE") {
            self.topology.instance_type = val;
        }

        self
    }

    /// Check the settings that would otherwise fail at runtime.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Validation` for a zero interval, capacity or
    /// failure tolerance, or an empty region.
    pub fn validate(&self) -> Result<()> {
        if self.region.trim().is_empty() {
            return Err(ControlError::Validation("region must not be empty".into()));
        }
        if self.poll_interval_seconds == 0 {
            return Err(ControlError::Validation(
                "poll_interval_seconds must be at least 1".into(),
            ));
        }
        if self.max_poll_failures == 0 {
            return Err(ControlError::Validation(
                "max_poll_failures must be at least 1".into(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ControlError::Validation(
                "channel_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Interval between two polls.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    /// Timeout of a single remote request.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Orchestration endpoint, derived from the region unless overridden.
    #[must_use]
    pub fn emr_endpoint(&self) -> String {
        self.emr_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://elasticmapreduce.{}.amazonaws.com", self.region))
    }

    /// Object storage endpoint, derived from the region unless overridden.
    #[must_use]
    pub fn s3_endpoint(&self) -> String {
        self.s3_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", self.region))
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            region: Self::default_region(),
            emr_endpoint: None,
            s3_endpoint: None,
            log_uri: None,
            key_pair_name: None,
            poll_interval_seconds: Self::default_poll_interval(),
            max_poll_failures: Self::default_max_poll_failures(),
            channel_capacity: Self::default_channel_capacity(),
            request_timeout_seconds: Self::default_request_timeout(),
            subnet_id: None,
            master_security_group: None,
            slave_security_group: None,
            template: ClusterTemplate::default(),
            topology: ClusterTopology::default(),
        }
    }
}

/// Software, roles and step defaults of launched clusters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClusterTemplate {
    /// Software release label.
    pub release_label: String,
    /// Installed applications.
    pub applications: Vec<String>,
    /// Instance profile of the nodes.
    pub job_flow_role: String,
    /// Service role.
    pub service_role: String,
    /// Automatic scaling role.
    pub auto_scaling_role: String,
    /// Root volume size in GiB.
    pub ebs_root_volume_size: u32,
    /// Scale-down behaviour.
    pub scale_down_behavior: String,
    /// Packages passed to `spark-submit --packages`.
    pub spark_packages: String,
    /// Driver result size limit used for steps submitted at launch.
    pub driver_max_result_size: String,
}

impl Default for ClusterTemplate {
    fn default() -> Self {
        Self {
            release_label: "emr-5.27.0".to_string(),
            applications: ["Hadoop", "Hive", "Pig", "Hue", "Spark"]
                .into_iter()
                .map(String::from)
                .collect(),
            job_flow_role: "EMR_EC2_DefaultRole".to_string(),
            service_role: "EMR_DefaultRole".to_string(),
            auto_scaling_role: "EMR_AutoScaling_DefaultRole".to_string(),
            ebs_root_volume_size: 10,
            scale_down_behavior: "TERMINATE_AT_TASK_COMPLETION".to_string(),
            spark_packages: "org.apache.spark:spark-avro_2.11:2.4.4".to_string(),
            driver_max_result_size: "4g".to_string(),
        }
    }
}

impl ClusterTemplate {
    /// Applications in request form.
    #[must_use]
    pub fn applications(&self) -> Vec<Application> {
        self.applications
            .iter()
            .map(|name| Application { name: name.clone() })
            .collect()
    }

    /// Configuration classifications applied at launch.
    #[must_use]
    pub fn configurations(&self) -> Vec<Configuration> {
        vec![Configuration {
            classification: "spark".to_string(),
            properties: [("maximizeResourceAllocation".to_string(), "true".to_string())]
                .into_iter()
                .collect(),
        }]
    }
}

/// Fixed three-group topology: one master, `core_count` core and
/// `task_count` task nodes, all of the same type and storage.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClusterTopology {
    /// Number of core nodes.
    pub core_count: u32,
    /// Number of task nodes.
    pub task_count: u32,
    /// Instance type of every node.
    pub instance_type: String,
    /// Purchasing option of every group.
    pub market: Market,
    /// EBS volume type.
    pub volume_type: String,
    /// Size of each EBS volume in GiB.
    pub volume_size_gb: u32,
    /// EBS volumes per instance.
    pub volumes_per_instance: u32,
}

impl Default for ClusterTopology {
    fn default() -> Self {
        Self {
            core_count: 2,
            task_count: 32,
            instance_type: "m5.2xlarge".to_string(),
            market: Market::Spot,
            volume_type: "gp2".to_string(),
            volume_size_gb: 32,
            volumes_per_instance: 4,
        }
    }
}

impl ClusterTopology {
    /// Instance groups in request form: core, master, task.
    #[must_use]
    pub fn instance_groups(&self) -> Vec<InstanceGroupConfig> {
        [
            (InstanceRole::Core, self.core_count, "Core - 2"),
            (InstanceRole::Master, 1, "Master - 1"),
            (InstanceRole::Task, self.task_count, "Task - 3"),
        ]
        .into_iter()
        .filter(|(_, count, _)| *count > 0)
        .map(|(role, count, name)| self.group(role, count, name))
        .collect()
    }

    fn group(&self, role: InstanceRole, count: u32, name: &str) -> InstanceGroupConfig {
        InstanceGroupConfig {
            name: name.to_string(),
            market: self.market,
            instance_role: role,
            instance_type: self.instance_type.clone(),
            instance_count: count,
            ebs_configuration: EbsConfiguration {
                ebs_block_device_configs: vec![EbsBlockDeviceConfig {
                    volume_specification: VolumeSpecification {
                        volume_type: self.volume_type.clone(),
                        size_in_gb: self.volume_size_gb,
                    },
                    volumes_per_instance: self.volumes_per_instance,
                }],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config() {
        let config = ManagerConfig::default();
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
        assert_eq!(config.max_poll_failures, 5);
        assert_eq!(config.channel_capacity, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn endpoints_follow_region() {
        let config = ManagerConfig {
            region: "eu-west-1".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.emr_endpoint(),
            "https://elasticmapreduce.eu-west-1.amazonaws.com"
        );
        assert_eq!(config.s3_endpoint(), "https://s3.eu-west-1.amazonaws.com");

        let overridden = ManagerConfig {
            emr_endpoint: Some("http://localhost:4566".to_string()),
            ..Default::default()
        };
        assert_eq!(overridden.emr_endpoint(), "http://localhost:4566");
    }

    #[test]
    fn validate_rejects_zero_values() {
        let zero_interval = ManagerConfig {
            poll_interval_seconds: 0,
            ..Default::default()
        };
        assert!(zero_interval.validate().is_err());

        let zero_capacity = ManagerConfig {
            channel_capacity: 0,
            ..Default::default()
        };
        assert!(zero_capacity.validate().is_err());

        let zero_failures = ManagerConfig {
            max_poll_failures: 0,
            ..Default::default()
        };
        assert!(zero_failures.validate().is_err());
    }

    #[test]
    fn from_file_applies_field_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"poll_interval_seconds": 15, "topology": {{"task_count": 4}}}}"#
        )
        .unwrap();

        let config = ManagerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.poll_interval_seconds, 15);
        assert_eq!(config.topology.task_count, 4);
        assert_eq!(config.topology.core_count, 2);
        assert_eq!(config.template.release_label, "emr-5.27.0");
    }

    #[test]
    fn from_file_reports_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = ManagerConfig::from_file(file.path()).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn default_topology_groups() {
        let groups = ClusterTopology::default().instance_groups();
        assert_eq!(groups.len(), 3);

        let master = groups
            .iter()
            .find(|g| g.instance_role == InstanceRole::Master)
            .unwrap();
        assert_eq!(master.instance_count, 1);

        let task = groups
            .iter()
            .find(|g| g.instance_role == InstanceRole::Task)
            .unwrap();
        assert_eq!(task.instance_count, 32);
        assert_eq!(task.market, Market::Spot);
        assert_eq!(
            task.ebs_configuration.ebs_block_device_configs[0]
                .volume_specification
                .size_in_gb,
            32
        );
    }

    #[test]
    fn topology_without_task_nodes() {
        let topology = ClusterTopology {
            task_count: 0,
            ..Default::default()
        };
        let groups = topology.instance_groups();
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|g| g.instance_role != InstanceRole::Task));
    }
}
