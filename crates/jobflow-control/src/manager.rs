//! Cluster manager service implementation.
//!
//! This module provides the `ClusterManager` trait and the
//! `ClusterManagerService` implementation that launches and terminates
//! clusters, submits steps, and runs watch sessions over them.

use std::sync::Arc;

use async_trait::async_trait;
use jobflow_core::{ClusterId, StepId, StepState, WatchId};
use jobflow_storage::{HttpObjectStore, ObjectStore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::channel::{channel, Publisher};
use crate::config::ManagerConfig;
use crate::dispatcher::{DispatchOutcome, Listener, OnState};
use crate::emr_client::{EmrClient, HttpEmrClient};
use crate::error::{ControlError, Result};
use crate::lifecycle;
use crate::normalizer::StatusNormalizer;
use crate::poller::{PollOutcome, Poller};
use crate::registry::{WatchInfo, WatchRegistry};
use crate::steps::{spark_step, JobSpec};
use crate::types::{ClusterStatus, LaunchedCluster, StepStatus, StepSummary};
use crate::wire::{FailurePolicy, JobFlowInstancesConfig, RunJobFlowRequest, StepConfig};

/// Suffix of clusters launched together with their steps.
const STEP_CLUSTER_SUFFIX: &str = "-m2x";

/// Result of [`ClusterManager::watch_step`].
#[derive(Debug)]
pub enum Watch {
    /// No callback was given: the single state read from the channel.
    Peeked(StepState),
    /// A callback watch running in the background.
    Started(WatchHandle),
}

/// Handle to a callback watch running in the background.
#[derive(Debug)]
pub struct WatchHandle {
    id: WatchId,
    cancel: CancellationToken,
    task: JoinHandle<Result<DispatchOutcome>>,
}

impl WatchHandle {
    /// Identifier of the watch.
    #[must_use]
    pub const fn id(&self) -> WatchId {
        self.id
    }

    /// Stop the watch. The callback does not fire afterwards, even for
    /// states already delivered but not yet consumed, unless it already
    /// matched.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns true once the watch has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the watch to end.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Internal` if the watch task panicked or broke
    /// its state machine.
    pub async fn join(self) -> Result<DispatchOutcome> {
        self.task
            .await
            .map_err(|e| ControlError::Internal(format!("watch task failed: {e}")))?
    }
}

/// Trait defining the cluster manager operations.
///
/// This trait provides the complete API for managing clusters and their
/// steps. Remote calls go through an [`EmrClient`]; diagnostic logs are read
/// through an [`ObjectStore`].
#[async_trait]
pub trait ClusterManager: Send + Sync {
    // =========================================================================
    // Cluster Operations
    // =========================================================================

    /// Launch a cluster that stays alive with no steps.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::MissingIdentifier` if the service did not
    /// return the new cluster's id.
    async fn launch_cluster(&self, name: &str) -> Result<ClusterId>;

    /// Launch a cluster that runs the given jobs and then shuts down.
    ///
    /// The cluster is named `{name}-m2x`. Each step terminates the cluster
    /// on failure.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Validation` if `jobs` is empty.
    async fn launch_cluster_with_steps(
        &self,
        assembly_path: &str,
        jobs: &[JobSpec],
        name: &str,
    ) -> Result<LaunchedCluster>;

    /// Request termination of a cluster.
    async fn terminate_cluster(&self, cluster_id: &ClusterId) -> Result<()>;

    /// Current status of a cluster and its steps.
    async fn cluster_status(&self, cluster_id: &ClusterId) -> Result<ClusterStatus>;

    // =========================================================================
    // Step Operations
    // =========================================================================

    /// Submit jobs to a running cluster, returning step ids in submission
    /// order.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Validation` if `jobs` is empty.
    async fn run_steps(
        &self,
        assembly_path: &str,
        cluster_id: &ClusterId,
        jobs: &[JobSpec],
        terminate_on_failure: bool,
    ) -> Result<Vec<StepId>>;

    /// Current status of a step, including its diagnostic log.
    async fn step_status(&self, step_id: &StepId, cluster_id: &ClusterId) -> Result<StepStatus>;

    /// Wait until a step is terminal and return that state.
    async fn report_step(&self, step_id: &StepId, cluster_id: &ClusterId) -> Result<StepState>;

    // =========================================================================
    // Watches
    // =========================================================================

    /// Watch a step.
    ///
    /// With a callback, returns immediately with a [`WatchHandle`]; the
    /// callback fires once if the step reaches `target`. Without one, waits
    /// for the first observed state and returns it; `target` is optional
    /// then.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Validation` if `target` is not a step state,
    /// or if a callback is given without a target. Nothing is started in
    /// that case.
    async fn watch_step(
        &self,
        step_id: &StepId,
        cluster_id: &ClusterId,
        target: Option<&str>,
        on_state: Option<OnState>,
    ) -> Result<Watch>;

    /// Cancel a watch. Returns false if it was not active.
    fn cancel_watch(&self, id: &WatchId) -> bool;

    /// Every active watch.
    fn active_watches(&self) -> Vec<WatchInfo>;

    /// Cancel every active watch, returning how many there were.
    fn shutdown(&self) -> usize;
}

/// The main cluster manager implementation.
pub struct ClusterManagerService {
    emr: Arc<dyn EmrClient>,
    normalizer: StatusNormalizer,
    poller: Poller,
    registry: Arc<WatchRegistry>,
    config: ManagerConfig,
}

impl ClusterManagerService {
    /// Create a new cluster manager over the given clients.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Validation` if the configuration is invalid.
    pub fn new(
        emr: Arc<dyn EmrClient>,
        store: Arc<dyn ObjectStore>,
        config: ManagerConfig,
    ) -> Result<Self> {
        config.validate()?;

        let normalizer = StatusNormalizer::new(Arc::clone(&emr), store);
        let poller = Poller::new(
            normalizer.clone(),
            config.poll_interval(),
            config.max_poll_failures,
        );

        Ok(Self {
            emr,
            normalizer,
            poller,
            registry: Arc::new(WatchRegistry::new()),
            config,
        })
    }

    /// Create a cluster manager talking HTTP to the configured endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a client cannot
    /// be created.
    pub fn from_config(config: ManagerConfig) -> Result<Self> {
        let emr = HttpEmrClient::new(config.emr_endpoint(), config.request_timeout())?;
        let store = HttpObjectStore::new(&config.s3_endpoint(), config.request_timeout())?;
        Self::new(Arc::new(emr), Arc::new(store), config)
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &ManagerConfig {
        &self.config
    }

    fn launch_request(
        &self,
        name: String,
        steps: Vec<StepConfig>,
        keep_alive: bool,
    ) -> RunJobFlowRequest {
        let template = &self.config.template;

        RunJobFlowRequest {
            name,
            log_uri: self.config.log_uri.clone(),
            release_label: template.release_label.clone(),
            applications: template.applications(),
            instances: JobFlowInstancesConfig {
                instance_groups: self.config.topology.instance_groups(),
                ec2_key_name: self.config.key_pair_name.clone(),
                keep_job_flow_alive_when_no_steps: keep_alive,
                termination_protected: false,
                ec2_subnet_id: self.config.subnet_id.clone(),
                emr_managed_master_security_group: self.config.master_security_group.clone(),
                emr_managed_slave_security_group: self.config.slave_security_group.clone(),
            },
            steps,
            job_flow_role: template.job_flow_role.clone(),
            service_role: template.service_role.clone(),
            auto_scaling_role: template.auto_scaling_role.clone(),
            ebs_root_volume_size: template.ebs_root_volume_size,
            scale_down_behavior: template.scale_down_behavior.clone(),
            configurations: template.configurations(),
            visible_to_all_users: true,
        }
    }

    async fn run_job_flow(&self, request: &RunJobFlowRequest) -> Result<ClusterId> {
        let response = self.emr.run_job_flow(request).await?;
        let id = response.job_flow_id.ok_or(ControlError::MissingIdentifier {
            operation: "RunJobFlow",
            field: "JobFlowId",
        })?;

        ClusterId::new(id).map_err(|e| ControlError::Remote {
            operation: "RunJobFlow",
            message: format!("service returned an invalid cluster id: {e}"),
        })
    }

    /// Steps of a cluster in submission order.
    async fn list_steps_in_order(&self, cluster_id: &ClusterId) -> Result<Vec<StepSummary>> {
        let mut steps = self.emr.list_steps(cluster_id).await?;
        steps.reverse();

        steps
            .into_iter()
            .map(|step| {
                let id = StepId::new(step.id).map_err(|e| ControlError::Remote {
                    operation: "ListSteps",
                    message: format!("service returned an invalid step id: {e}"),
                })?;
                Ok(StepSummary {
                    id,
                    name: step.name,
                    state: step.status.state,
                })
            })
            .collect()
    }

    fn spawn_poller(
        &self,
        step_id: &StepId,
        cluster_id: &ClusterId,
        publisher: Publisher,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<PollOutcome>> {
        let poller = self.poller.clone();
        let step_id = step_id.clone();
        let cluster_id = cluster_id.clone();

        tokio::spawn(async move {
            poller
                .run(&step_id, &cluster_id, Some(publisher), &cancel)
                .await
        })
    }

    async fn peek(
        &self,
        step_id: &StepId,
        cluster_id: &ClusterId,
        target: Option<StepState>,
    ) -> Result<StepState> {
        let (publisher, mut subscription) = channel(self.config.channel_capacity);
        let (id, cancel) = self
            .registry
            .register(step_id.clone(), cluster_id.clone(), target);
        let poll = self.spawn_poller(step_id, cluster_id, publisher, cancel.clone());

        let observed = subscription.recv().await;
        cancel.cancel();
        drop(subscription);
        let polled = poll.await;
        self.registry.remove(&id);

        if let Some(state) = observed {
            tracing::debug!(
                step_id = %step_id,
                cluster_id = %cluster_id,
                state = %state,
                "Peeked step state"
            );
            return Ok(state);
        }

        match polled {
            Ok(Err(e)) => Err(e),
            Ok(Ok(outcome)) => Err(ControlError::Internal(format!(
                "poll ended without publishing a state: {outcome:?}"
            ))),
            Err(e) => Err(ControlError::Internal(format!("poll task failed: {e}"))),
        }
    }

    fn start_watch(
        &self,
        step_id: &StepId,
        cluster_id: &ClusterId,
        target: StepState,
        on_state: OnState,
    ) -> WatchHandle {
        let (publisher, subscription) = channel(self.config.channel_capacity);
        let (id, cancel) = self
            .registry
            .register(step_id.clone(), cluster_id.clone(), Some(target));
        let poll = self.spawn_poller(step_id, cluster_id, publisher, cancel.clone());
        let listener = Listener::new(step_id.clone(), cluster_id.clone(), target, subscription)
            .with_cancel(cancel.clone());

        let registry = Arc::clone(&self.registry);
        let poll_cancel = cancel.clone();
        let (step_id, cluster_id) = (step_id.clone(), cluster_id.clone());

        let task = tokio::spawn(async move {
            let outcome = listener.run(on_state).await;
            poll_cancel.cancel();

            match poll.await {
                Ok(Ok(poll_outcome)) => tracing::debug!(
                    watch_id = %id,
                    outcome = ?poll_outcome,
                    "Poller stopped"
                ),
                Ok(Err(e)) => tracing::warn!(
                    watch_id = %id,
                    step_id = %step_id,
                    cluster_id = %cluster_id,
                    error = %e,
                    "Poller gave up"
                ),
                Err(e) => tracing::warn!(watch_id = %id, error = %e, "Poll task failed"),
            }

            registry.remove(&id);
            tracing::info!(
                watch_id = %id,
                step_id = %step_id,
                cluster_id = %cluster_id,
                matched = outcome.as_ref().is_ok_and(DispatchOutcome::is_matched),
                "Watch finished"
            );
            outcome
        });

        WatchHandle { id, cancel, task }
    }
}

fn require_jobs(jobs: &[JobSpec]) -> Result<()> {
    if jobs.is_empty() {
        return Err(ControlError::Validation(
            "step list must contain at least one job".to_string(),
        ));
    }
    Ok(())
}

#[async_trait]
impl ClusterManager for ClusterManagerService {
    // =========================================================================
    // Cluster Operations
    // =========================================================================

    async fn launch_cluster(&self, name: &str) -> Result<ClusterId> {
        let request = self.launch_request(name.to_string(), Vec::new(), true);
        let cluster_id = self.run_job_flow(&request).await?;

        tracing::info!(cluster_id = %cluster_id, name = %name, "Launched cluster");

        Ok(cluster_id)
    }

    async fn launch_cluster_with_steps(
        &self,
        assembly_path: &str,
        jobs: &[JobSpec],
        name: &str,
    ) -> Result<LaunchedCluster> {
        require_jobs(jobs)?;

        let steps = jobs
            .iter()
            .map(|job| {
                spark_step(
                    job,
                    assembly_path,
                    FailurePolicy::TerminateCluster,
                    &self.config.template,
                    true,
                )
            })
            .collect();
        let request = self.launch_request(format!("{name}{STEP_CLUSTER_SUFFIX}"), steps, false);
        let cluster_id = self.run_job_flow(&request).await?;

        let step_ids: Vec<StepId> = self
            .list_steps_in_order(&cluster_id)
            .await?
            .into_iter()
            .map(|step| step.id)
            .collect();

        tracing::info!(
            cluster_id = %cluster_id,
            name = %request.name,
            steps = step_ids.len(),
            "Launched cluster with steps"
        );

        Ok(LaunchedCluster {
            cluster_id,
            step_ids,
        })
    }

    async fn terminate_cluster(&self, cluster_id: &ClusterId) -> Result<()> {
        self.emr
            .terminate_job_flows(std::slice::from_ref(cluster_id))
            .await?;
        self.registry.mark_termination_requested(cluster_id.clone());

        tracing::info!(cluster_id = %cluster_id, "Requested cluster termination");

        Ok(())
    }

    async fn cluster_status(&self, cluster_id: &ClusterId) -> Result<ClusterStatus> {
        let description = self.emr.describe_cluster(cluster_id).await?;
        let steps = self.list_steps_in_order(cluster_id).await?;
        let state = description.status.state;

        let termination_cause = if state.has_termination_cause() {
            description
                .status
                .state_change_reason
                .and_then(|reason| reason.message)
        } else {
            None
        };

        Ok(ClusterStatus {
            id: cluster_id.clone(),
            name: description.name,
            state,
            steps,
            termination_requested: self.registry.termination_requested(cluster_id),
            termination_cause,
        })
    }

    // =========================================================================
    // Step Operations
    // =========================================================================

    async fn run_steps(
        &self,
        assembly_path: &str,
        cluster_id: &ClusterId,
        jobs: &[JobSpec],
        terminate_on_failure: bool,
    ) -> Result<Vec<StepId>> {
        require_jobs(jobs)?;

        let policy = FailurePolicy::from_terminate_flag(terminate_on_failure);
        let steps: Vec<StepConfig> = jobs
            .iter()
            .map(|job| spark_step(job, assembly_path, policy, &self.config.template, false))
            .collect();

        let step_ids = self.emr.add_job_flow_steps(cluster_id, &steps).await?;
        if step_ids.len() != steps.len() {
            return Err(ControlError::Remote {
                operation: "AddJobFlowSteps",
                message: format!(
                    "submitted {} steps but received {} ids",
                    steps.len(),
                    step_ids.len()
                ),
            });
        }

        tracing::info!(
            cluster_id = %cluster_id,
            steps = step_ids.len(),
            policy = policy.as_str(),
            "Submitted steps"
        );

        Ok(step_ids)
    }

    async fn step_status(&self, step_id: &StepId, cluster_id: &ClusterId) -> Result<StepStatus> {
        self.normalizer.normalize(step_id, cluster_id).await
    }

    async fn report_step(&self, step_id: &StepId, cluster_id: &ClusterId) -> Result<StepState> {
        let state = self.poller.await_terminal(step_id, cluster_id).await?;

        tracing::info!(
            step_id = %step_id,
            cluster_id = %cluster_id,
            state = %state,
            "Step finished"
        );

        Ok(state)
    }

    // =========================================================================
    // Watches
    // =========================================================================

    async fn watch_step(
        &self,
        step_id: &StepId,
        cluster_id: &ClusterId,
        target: Option<&str>,
        on_state: Option<OnState>,
    ) -> Result<Watch> {
        let target = target.map(lifecycle::parse_target).transpose()?;

        match on_state {
            None => Ok(Watch::Peeked(self.peek(step_id, cluster_id, target).await?)),
            Some(on_state) => {
                let target = target.ok_or_else(|| {
                    ControlError::Validation(
                        "a watch with a callback needs a target state".to_string(),
                    )
                })?;
                let handle = self.start_watch(step_id, cluster_id, target, on_state);
                tracing::info!(
                    watch_id = %handle.id(),
                    step_id = %step_id,
                    cluster_id = %cluster_id,
                    target = %target,
                    "Started watch"
                );
                Ok(Watch::Started(handle))
            }
        }
    }

    fn cancel_watch(&self, id: &WatchId) -> bool {
        let cancelled = self.registry.cancel(id);
        if cancelled {
            tracing::info!(watch_id = %id, "Cancelled watch");
        }
        cancelled
    }

    fn active_watches(&self) -> Vec<WatchInfo> {
        self.registry.active()
    }

    fn shutdown(&self) -> usize {
        let cancelled = self.registry.cancel_all();
        tracing::info!(watches = cancelled, "Cancelled every active watch");
        cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emr_client::mock::MockEmrClient;
    use crate::wire::InstanceRole;
    use jobflow_core::ClusterState;
    use jobflow_storage::MemoryObjectStore;
    use parking_lot::Mutex;

    fn setup() -> (ClusterManagerService, Arc<MockEmrClient>) {
        let emr = Arc::new(MockEmrClient::new());
        let config = ManagerConfig {
            key_pair_name: Some("ops".to_string()),
            ..Default::default()
        };
        let manager =
            ClusterManagerService::new(emr.clone(), Arc::new(MemoryObjectStore::new()), config)
                .unwrap();
        (manager, emr)
    }

    fn jobs() -> Vec<JobSpec> {
        vec![
            JobSpec::new("com.example.Extract", ["--day", "1"]),
            JobSpec::new("com.example.Load", Vec::<String>::new()),
        ]
    }

    fn recorder() -> (OnState, Arc<Mutex<Vec<StepState>>>) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        (Box::new(move |state| sink.lock().push(state)), fired)
    }

    fn started(watch: Watch) -> WatchHandle {
        match watch {
            Watch::Started(handle) => handle,
            Watch::Peeked(state) => panic!("expected a started watch, got peek {state}"),
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ManagerConfig {
            poll_interval_seconds: 0,
            ..Default::default()
        };
        let result = ClusterManagerService::new(
            Arc::new(MockEmrClient::new()),
            Arc::new(MemoryObjectStore::new()),
            config,
        );
        assert!(matches!(result, Err(ControlError::Validation(_))));
    }

    #[tokio::test]
    async fn launch_cluster_keeps_alive() {
        let (manager, emr) = setup();

        let cluster_id = manager.launch_cluster("adhoc").await.unwrap();
        assert!(cluster_id.as_str().starts_with("j-"));

        let requests = emr.launch_requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.name, "adhoc");
        assert!(request.steps.is_empty());
        assert!(request.instances.keep_job_flow_alive_when_no_steps);
        assert_eq!(request.instances.ec2_key_name.as_deref(), Some("ops"));
        assert_eq!(request.release_label, "emr-5.27.0");

        let roles: Vec<_> = request
            .instances
            .instance_groups
            .iter()
            .map(|g| (g.instance_role, g.instance_count))
            .collect();
        assert_eq!(
            roles,
            [
                (InstanceRole::Core, 2),
                (InstanceRole::Master, 1),
                (InstanceRole::Task, 32)
            ]
        );
    }

    #[tokio::test]
    async fn launch_without_identifier_is_an_error() {
        let (manager, emr) = setup();
        emr.omit_job_flow_id(true);

        let err = manager.launch_cluster("adhoc").await.unwrap_err();
        assert!(matches!(
            err,
            ControlError::MissingIdentifier {
                operation: "RunJobFlow",
                field: "JobFlowId"
            }
        ));
    }

    #[tokio::test]
    async fn launch_with_steps_reports_submission_order() {
        let (manager, emr) = setup();

        let launched = manager
            .launch_cluster_with_steps("s3://jars/etl.jar", &jobs(), "nightly")
            .await
            .unwrap();
        assert_eq!(launched.step_ids.len(), 2);

        let request = &emr.launch_requests()[0];
        assert_eq!(request.name, "nightly-m2x");
        assert!(!request.instances.keep_job_flow_alive_when_no_steps);
        assert!(request
            .steps
            .iter()
            .all(|s| s.action_on_failure == FailurePolicy::TerminateCluster));
        assert!(request.steps[0]
            .hadoop_jar_step
            .args
            .contains(&"spark.driver.maxResultSize=4g".to_string()));

        let status = manager.cluster_status(&launched.cluster_id).await.unwrap();
        let names: Vec<_> = status.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Extract", "Load"]);
        let ids: Vec<_> = status.steps.iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids, launched.step_ids);
    }

    #[tokio::test]
    async fn empty_job_lists_are_rejected_before_any_call() {
        let (manager, emr) = setup();

        let err = manager
            .launch_cluster_with_steps("app.jar", &[], "nightly")
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(emr.launch_requests().is_empty());

        let cluster_id = emr.insert_cluster("existing", ClusterState::Waiting);
        let err = manager
            .run_steps("app.jar", &cluster_id, &[], true)
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn run_steps_uses_requested_policy() {
        let (manager, emr) = setup();
        let cluster_id = emr.insert_cluster("existing", ClusterState::Waiting);

        let step_ids = manager
            .run_steps("app.jar", &cluster_id, &jobs(), false)
            .await
            .unwrap();
        assert_eq!(step_ids.len(), 2);

        let status = manager.step_status(&step_ids[0], &cluster_id).await.unwrap();
        assert_eq!(status.record.name, "Extract");
        assert_eq!(status.record.failure_policy, FailurePolicy::Continue);
        assert_eq!(status.state(), StepState::Pending);
        assert!(!status
            .record
            .parameters
            .iter()
            .any(|arg| arg.starts_with("spark.driver.maxResultSize")));
    }

    #[tokio::test]
    async fn run_steps_on_unknown_cluster() {
        let (manager, _emr) = setup();
        let err = manager
            .run_steps("app.jar", &ClusterId::new("j-NOPE").unwrap(), &jobs(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::NotFound(_)));
    }

    #[tokio::test]
    async fn termination_cause_only_while_terminating() {
        let (manager, emr) = setup();
        let cluster_id = emr.insert_cluster("existing", ClusterState::Running);
        emr.set_cluster_state(&cluster_id, ClusterState::Running, Some("Running step"));

        let status = manager.cluster_status(&cluster_id).await.unwrap();
        assert_eq!(status.state, ClusterState::Running);
        assert!(status.termination_cause.is_none());
        assert!(!status.termination_requested);

        manager.terminate_cluster(&cluster_id).await.unwrap();
        assert_eq!(emr.terminated(), [cluster_id.clone()]);

        let status = manager.cluster_status(&cluster_id).await.unwrap();
        assert_eq!(status.state, ClusterState::Terminating);
        assert!(status.termination_requested);
        assert_eq!(
            status.termination_cause.as_deref(),
            Some("Terminated by user request")
        );
    }

    #[tokio::test]
    async fn bogus_target_starts_nothing() {
        let (manager, emr) = setup();
        let cluster_id = emr.insert_cluster("existing", ClusterState::Running);
        let step_id = StepId::new("s-1").unwrap();
        let (callback, fired) = recorder();

        let err = manager
            .watch_step(&step_id, &cluster_id, Some("BOGUS"), Some(callback))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("COMPLETED"));
        assert!(manager.active_watches().is_empty());
        assert_eq!(emr.describe_step_calls(), 0);
        assert!(fired.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn peek_reads_a_single_state() {
        let (manager, emr) = setup();
        let cluster_id = emr.insert_cluster("existing", ClusterState::Running);
        let step_id = StepId::new("s-1").unwrap();
        emr.script_states(
            &cluster_id,
            &step_id,
            &[StepState::Running, StepState::Running, StepState::Completed],
        );

        let watch = manager
            .watch_step(&step_id, &cluster_id, None, None)
            .await
            .unwrap();
        assert!(matches!(watch, Watch::Peeked(StepState::Running)));
        assert_eq!(emr.describe_step_calls(), 1);
        assert!(manager.active_watches().is_empty());

        let watch = manager
            .watch_step(&step_id, &cluster_id, Some("COMPLETED"), None)
            .await
            .unwrap();
        assert!(matches!(watch, Watch::Peeked(StepState::Running)));
        assert_eq!(emr.describe_step_calls(), 2);
    }

    #[tokio::test]
    async fn callback_requires_target() {
        let (manager, emr) = setup();
        let cluster_id = emr.insert_cluster("existing", ClusterState::Running);
        let step_id = StepId::new("s-1").unwrap();
        let (callback, fired) = recorder();

        let err = manager
            .watch_step(&step_id, &cluster_id, None, Some(callback))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(manager.active_watches().is_empty());
        assert_eq!(emr.describe_step_calls(), 0);
        assert!(fired.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_step_is_reported_without_waiting() {
        let (manager, emr) = setup();
        let cluster_id = emr.insert_cluster("existing", ClusterState::Running);
        let step_id = StepId::new("s-nope").unwrap();
        let start = tokio::time::Instant::now();

        let err = manager
            .watch_step(&step_id, &cluster_id, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::NotFound(_)));
        assert!(manager.active_watches().is_empty());

        let err = manager.report_step(&step_id, &cluster_id).await.unwrap_err();
        assert!(matches!(err, ControlError::NotFound(_)));

        assert_eq!(start.elapsed(), std::time::Duration::ZERO);
        assert_eq!(emr.describe_step_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn callback_fires_once_on_target() {
        let (manager, emr) = setup();
        let cluster_id = emr.insert_cluster("existing", ClusterState::Running);
        let step_id = StepId::new("s-1").unwrap();
        emr.script_states(
            &cluster_id,
            &step_id,
            &[StepState::Running, StepState::Running, StepState::Completed],
        );
        let (callback, fired) = recorder();

        let handle = started(
            manager
                .watch_step(&step_id, &cluster_id, Some("COMPLETED"), Some(callback))
                .await
                .unwrap(),
        );
        assert_eq!(manager.active_watches().len(), 1);
        assert_eq!(manager.active_watches()[0].id, handle.id());

        let outcome = handle.join().await.unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome::Matched {
                state: StepState::Completed,
                observations: 3
            }
        );
        assert_eq!(*fired.lock(), [StepState::Completed]);
        assert!(manager.active_watches().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn callback_skipped_when_step_fails() {
        let (manager, emr) = setup();
        let cluster_id = emr.insert_cluster("existing", ClusterState::Running);
        let step_id = StepId::new("s-1").unwrap();
        emr.script_states(&cluster_id, &step_id, &[StepState::Running, StepState::Failed]);
        let (callback, fired) = recorder();

        let handle = started(
            manager
                .watch_step(&step_id, &cluster_id, Some("COMPLETED"), Some(callback))
                .await
                .unwrap(),
        );

        let outcome = handle.join().await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Closed { observations: 2 });
        assert!(fired.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_watch_never_fires() {
        let (manager, emr) = setup();
        let cluster_id = emr.insert_cluster("existing", ClusterState::Running);
        let step_id = StepId::new("s-1").unwrap();
        emr.script_states(&cluster_id, &step_id, &[StepState::Running]);
        let (callback, fired) = recorder();

        let handle = started(
            manager
                .watch_step(&step_id, &cluster_id, Some("COMPLETED"), Some(callback))
                .await
                .unwrap(),
        );
        tokio::time::sleep(std::time::Duration::from_secs(300)).await;

        assert!(manager.cancel_watch(&handle.id()));
        assert!(!manager.cancel_watch(&handle.id()));

        let outcome = handle.join().await.unwrap();
        assert!(!outcome.is_matched());
        assert!(fired.lock().is_empty());
        assert!(manager.active_watches().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_every_watch() {
        let (manager, emr) = setup();
        let cluster_id = emr.insert_cluster("existing", ClusterState::Running);
        let first = StepId::new("s-1").unwrap();
        let second = StepId::new("s-2").unwrap();
        emr.script_states(&cluster_id, &first, &[StepState::Running]);
        emr.script_states(&cluster_id, &second, &[StepState::Pending]);

        let mut handles = Vec::new();
        for step_id in [&first, &second] {
            let (callback, _) = recorder();
            handles.push(started(
                manager
                    .watch_step(step_id, &cluster_id, Some("COMPLETED"), Some(callback))
                    .await
                    .unwrap(),
            ));
        }

        assert_eq!(manager.shutdown(), 2);
        for handle in handles {
            assert!(!handle.join().await.unwrap().is_matched());
        }
        assert!(manager.active_watches().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn report_step_waits_for_terminal_state() {
        let (manager, emr) = setup();
        let cluster_id = emr.insert_cluster("existing", ClusterState::Running);
        let step_id = StepId::new("s-1").unwrap();
        emr.script_states(
            &cluster_id,
            &step_id,
            &[StepState::Pending, StepState::Running, StepState::Interrupted],
        );

        let state = manager.report_step(&step_id, &cluster_id).await.unwrap();
        assert_eq!(state, StepState::Interrupted);
        assert_eq!(emr.describe_step_calls(), 3);
    }
}
