//! Client for the cluster orchestration API.
//!
//! This module provides the [`EmrClient`] trait and an HTTP implementation
//! speaking the service's JSON protocol: every operation is a `POST /` with
//! an `X-Amz-Target: ElasticMapReduce.<Operation>` header and a PascalCase
//! JSON body. Request signing is left to the endpoint (a signing proxy or a
//! local emulator).

use std::time::Duration;

use async_trait::async_trait;
use jobflow_core::{ClusterId, StepId};
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, Result};
use crate::wire::{
    ClusterDescription, RunJobFlowRequest, RunJobFlowResponse, StepConfig, StepDescription,
};

/// Header naming the remote operation.
const TARGET_HEADER: &str = "X-Amz-Target";

/// Content type of the JSON protocol.
const JSON_CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// Trait for orchestration service communication.
///
/// This trait abstracts the remote API so the manager and the watch
/// machinery can run against a mock in tests.
#[async_trait]
pub trait EmrClient: Send + Sync {
    /// Launch a new cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the service rejects it.
    async fn run_job_flow(&self, request: &RunJobFlowRequest) -> Result<RunJobFlowResponse>;

    /// Request termination of the given clusters.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    async fn terminate_job_flows(&self, cluster_ids: &[ClusterId]) -> Result<()>;

    /// Submit steps to a running cluster, returning their identifiers in
    /// submission order.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the cluster does not exist.
    async fn add_job_flow_steps(
        &self,
        cluster_id: &ClusterId,
        steps: &[StepConfig],
    ) -> Result<Vec<StepId>>;

    /// List every step of a cluster, most recent first (the service's order).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the cluster does not exist.
    async fn list_steps(&self, cluster_id: &ClusterId) -> Result<Vec<StepDescription>>;

    /// Describe a single step.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the step does not exist.
    async fn describe_step(
        &self,
        cluster_id: &ClusterId,
        step_id: &StepId,
    ) -> Result<StepDescription>;

    /// Describe a cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the cluster does not exist.
    async fn describe_cluster(&self, cluster_id: &ClusterId) -> Result<ClusterDescription>;
}

/// HTTP client for the orchestration service.
#[derive(Debug, Clone)]
pub struct HttpEmrClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpEmrClient {
    /// Create a new client for the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Internal` if the HTTP client cannot be created.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ControlError::Internal(format!("failed to create HTTP client: {e}")))?;

        Ok(Self::with_client(client, endpoint))
    }

    /// Create a new client with a custom reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    /// Get the endpoint of the orchestration service.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call<Req, Resp>(&self, operation: &'static str, body: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let remote = |message: String| ControlError::Remote { operation, message };

        let response = self
            .client
            .post(format!("{}/", self.endpoint))
            .header(TARGET_HEADER, format!("ElasticMapReduce.{operation}"))
            .header(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE))
            .json(body)
            .send()
            .await
            .map_err(|e| remote(format!("request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| remote(format!("failed to read response: {e}")))?;

        if status.is_success() {
            let text = if text.trim().is_empty() { "{}" } else { &text };
            return serde_json::from_str(text)
                .map_err(|e| remote(format!("failed to parse response: {e}")));
        }

        let error = serde_json::from_str::<ErrorResponse>(&text).unwrap_or_default();
        let message = error
            .message
            .clone()
            .unwrap_or_else(|| format!("service returned status {status}"));

        tracing::debug!(
            operation,
            status = %status,
            error_type = ?error.error_type,
            message = %message,
            "Orchestration request rejected"
        );

        if error.is_not_found() {
            Err(ControlError::NotFound(message))
        } else {
            Err(remote(message))
        }
    }
}

/// Error body of the JSON protocol.
#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(rename = "__type")]
    error_type: Option<String>,
    #[serde(alias = "Message")]
    message: Option<String>,
}

impl ErrorResponse {
    fn is_not_found(&self) -> bool {
        let type_matches = self
            .error_type
            .as_deref()
            .is_some_and(|t| t.ends_with("ResourceNotFoundException"));
        let message_matches = self.message.as_deref().is_some_and(|m| {
            let m = m.to_ascii_lowercase();
            m.contains("does not exist") || m.contains("not found")
        });
        type_matches || message_matches
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct TerminateJobFlowsRequest<'a> {
    job_flow_ids: &'a [ClusterId],
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct AddJobFlowStepsRequest<'a> {
    job_flow_id: &'a ClusterId,
    steps: &'a [StepConfig],
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AddJobFlowStepsResponse {
    #[serde(default)]
    step_ids: Option<Vec<String>>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ListStepsRequest<'a> {
    cluster_id: &'a ClusterId,
    #[serde(skip_serializing_if = "Option::is_none")]
    marker: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListStepsResponse {
    #[serde(default)]
    steps: Vec<StepDescription>,
    #[serde(default)]
    marker: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeStepRequest<'a> {
    cluster_id: &'a ClusterId,
    step_id: &'a StepId,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeStepResponse {
    #[serde(default)]
    step: Option<StepDescription>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeClusterRequest<'a> {
    cluster_id: &'a ClusterId,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeClusterResponse {
    #[serde(default)]
    cluster: Option<ClusterDescription>,
}

#[derive(Deserialize)]
struct Empty {}

fn parse_step_ids(operation: &'static str, ids: Vec<String>) -> Result<Vec<StepId>> {
    ids.into_iter()
        .map(|id| {
            StepId::new(id).map_err(|e| ControlError::Remote {
                operation,
                message: format!("service returned an invalid step id: {e}"),
            })
        })
        .collect()
}

#[async_trait]
impl EmrClient for HttpEmrClient {
    async fn run_job_flow(&self, request: &RunJobFlowRequest) -> Result<RunJobFlowResponse> {
        let response: RunJobFlowResponse = self.call("RunJobFlow", request).await?;
        tracing::debug!(
            name = %request.name,
            job_flow_id = ?response.job_flow_id,
            "RunJobFlow accepted"
        );
        Ok(response)
    }

    async fn terminate_job_flows(&self, cluster_ids: &[ClusterId]) -> Result<()> {
        let _: Empty = self
            .call(
                "TerminateJobFlows",
                &TerminateJobFlowsRequest {
                    job_flow_ids: cluster_ids,
                },
            )
            .await?;
        Ok(())
    }

    async fn add_job_flow_steps(
        &self,
        cluster_id: &ClusterId,
        steps: &[StepConfig],
    ) -> Result<Vec<StepId>> {
        const OPERATION: &str = "AddJobFlowSteps";

        let response: AddJobFlowStepsResponse = self
            .call(
                OPERATION,
                &AddJobFlowStepsRequest {
                    job_flow_id: cluster_id,
                    steps,
                },
            )
            .await?;

        let ids = response.step_ids.ok_or(ControlError::MissingIdentifier {
            operation: OPERATION,
            field: "StepIds",
        })?;
        parse_step_ids(OPERATION, ids)
    }

    async fn list_steps(&self, cluster_id: &ClusterId) -> Result<Vec<StepDescription>> {
        let mut steps = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let page: ListStepsResponse = self
                .call(
                    "ListSteps",
                    &ListStepsRequest {
                        cluster_id,
                        marker: marker.as_deref(),
                    },
                )
                .await?;

            steps.extend(page.steps);
            match page.marker {
                Some(next) if !next.is_empty() => marker = Some(next),
                _ => break,
            }
        }

        Ok(steps)
    }

    async fn describe_step(
        &self,
        cluster_id: &ClusterId,
        step_id: &StepId,
    ) -> Result<StepDescription> {
        let response: DescribeStepResponse = self
            .call(
                "DescribeStep",
                &DescribeStepRequest {
                    cluster_id,
                    step_id,
                },
            )
            .await?;

        response
            .step
            .ok_or_else(|| ControlError::step_not_found(cluster_id, step_id))
    }

    async fn describe_cluster(&self, cluster_id: &ClusterId) -> Result<ClusterDescription> {
        let response: DescribeClusterResponse = self
            .call("DescribeCluster", &DescribeClusterRequest { cluster_id })
            .await?;

        response
            .cluster
            .ok_or_else(|| ControlError::cluster_not_found(cluster_id))
    }
}

/// A mock orchestration client for testing without a real service.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use crate::wire::{
        ClusterStatusWire, FailureDetailsWire, FailurePolicy, HadoopJarStepConfig,
        StateChangeReason, StepStatusWire,
    };
    use jobflow_core::{ClusterState, StepState};
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};

    /// Build a step description in the given state.
    #[must_use]
    pub fn step_description(step_id: &StepId, state: StepState) -> StepDescription {
        StepDescription {
            id: step_id.to_string(),
            name: "MockStep".to_string(),
            config: HadoopJarStepConfig {
                jar: "command-runner.jar".to_string(),
                args: vec!["spark-submit".to_string(), "--class".to_string()],
            },
            action_on_failure: FailurePolicy::Continue,
            status: StepStatusWire {
                state,
                failure_details: None,
            },
        }
    }

    /// Build a failed step description carrying failure details.
    #[must_use]
    pub fn failed_step_description(
        step_id: &StepId,
        reason: Option<&str>,
        log_file: Option<&str>,
    ) -> StepDescription {
        let mut step = step_description(step_id, StepState::Failed);
        step.status.failure_details = Some(FailureDetailsWire {
            reason: reason.map(String::from),
            message: None,
            log_file: log_file.map(String::from),
        });
        step
    }

    struct MockCluster {
        name: String,
        state: ClusterState,
        reason: Option<String>,
        steps: Vec<StepId>,
    }

    #[derive(Default)]
    struct Inner {
        clusters: HashMap<ClusterId, MockCluster>,
        scripts: HashMap<(ClusterId, StepId), VecDeque<StepDescription>>,
        launches: Vec<RunJobFlowRequest>,
        terminated: Vec<ClusterId>,
        describe_calls: usize,
        failing_describes: u32,
        omit_job_flow_id: bool,
        next_id: u32,
    }

    /// A mock orchestration service that keeps clusters and steps in memory.
    ///
    /// Each step follows a script of descriptions: every `describe_step`
    /// pops the next one, and the last one repeats forever.
    #[derive(Default)]
    pub struct MockEmrClient {
        inner: Mutex<Inner>,
    }

    impl MockEmrClient {
        /// Create an empty mock service.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Register an existing cluster.
        ///
        /// # Panics
        ///
        /// Panics if the generated id is invalid (never happens).
        pub fn insert_cluster(&self, name: &str, state: ClusterState) -> ClusterId {
            let mut inner = self.inner.lock();
            let id = next_cluster_id(&mut inner);
            inner.clusters.insert(
                id.clone(),
                MockCluster {
                    name: name.to_string(),
                    state,
                    reason: None,
                    steps: Vec::new(),
                },
            );
            id
        }

        /// Change a cluster's state and state-change message.
        pub fn set_cluster_state(
            &self,
            cluster_id: &ClusterId,
            state: ClusterState,
            reason: Option<&str>,
        ) {
            if let Some(cluster) = self.inner.lock().clusters.get_mut(cluster_id) {
                cluster.state = state;
                cluster.reason = reason.map(String::from);
            }
        }

        /// Script a step through the given states.
        pub fn script_states(&self, cluster_id: &ClusterId, step_id: &StepId, states: &[StepState]) {
            let script = states
                .iter()
                .map(|state| step_description(step_id, *state))
                .collect();
            self.script_step(cluster_id, step_id, script);
        }

        /// Script a step through the given descriptions.
        pub fn script_step(
            &self,
            cluster_id: &ClusterId,
            step_id: &StepId,
            script: Vec<StepDescription>,
        ) {
            let mut inner = self.inner.lock();
            if let Some(cluster) = inner.clusters.get_mut(cluster_id) {
                if !cluster.steps.contains(step_id) {
                    cluster.steps.push(step_id.clone());
                }
            }
            inner
                .scripts
                .insert((cluster_id.clone(), step_id.clone()), script.into());
        }

        /// Make the next `count` `describe_step` calls fail.
        pub fn fail_next_describes(&self, count: u32) {
            self.inner.lock().failing_describes = count;
        }

        /// Drop `JobFlowId` from `run_job_flow` responses.
        pub fn omit_job_flow_id(&self, omit: bool) {
            self.inner.lock().omit_job_flow_id = omit;
        }

        /// Every `run_job_flow` request received.
        #[must_use]
        pub fn launch_requests(&self) -> Vec<RunJobFlowRequest> {
            self.inner.lock().launches.clone()
        }

        /// Every cluster id passed to `terminate_job_flows`.
        #[must_use]
        pub fn terminated(&self) -> Vec<ClusterId> {
            self.inner.lock().terminated.clone()
        }

        /// Number of `describe_step` calls so far.
        #[must_use]
        pub fn describe_step_calls(&self) -> usize {
            self.inner.lock().describe_calls
        }
    }

    #[allow(clippy::expect_used)]
    fn next_cluster_id(inner: &mut Inner) -> ClusterId {
        inner.next_id += 1;
        ClusterId::new(format!("j-MOCK{:04}", inner.next_id)).expect("valid mock cluster id")
    }

    #[allow(clippy::expect_used)]
    fn next_step_id(inner: &mut Inner) -> StepId {
        inner.next_id += 1;
        StepId::new(format!("s-MOCK{:04}", inner.next_id)).expect("valid mock step id")
    }

    fn add_steps(inner: &mut Inner, cluster_id: &ClusterId, steps: &[StepConfig]) -> Vec<StepId> {
        let mut ids = Vec::with_capacity(steps.len());
        for step in steps {
            let step_id = next_step_id(inner);
            let mut description = step_description(&step_id, StepState::Pending);
            description.name.clone_from(&step.name);
            description.config = step.hadoop_jar_step.clone();
            description.action_on_failure = step.action_on_failure;
            inner
                .scripts
                .insert((cluster_id.clone(), step_id.clone()), [description].into());
            ids.push(step_id);
        }
        if let Some(cluster) = inner.clusters.get_mut(cluster_id) {
            cluster.steps.extend(ids.iter().cloned());
        }
        ids
    }

    #[async_trait]
    impl EmrClient for MockEmrClient {
        async fn run_job_flow(&self, request: &RunJobFlowRequest) -> Result<RunJobFlowResponse> {
            let mut inner = self.inner.lock();
            inner.launches.push(request.clone());

            let id = next_cluster_id(&mut inner);
            inner.clusters.insert(
                id.clone(),
                MockCluster {
                    name: request.name.clone(),
                    state: ClusterState::Starting,
                    reason: None,
                    steps: Vec::new(),
                },
            );
            add_steps(&mut inner, &id, &request.steps);

            Ok(RunJobFlowResponse {
                job_flow_id: (!inner.omit_job_flow_id).then(|| id.to_string()),
                cluster_arn: None,
            })
        }

        async fn terminate_job_flows(&self, cluster_ids: &[ClusterId]) -> Result<()> {
            let mut inner = self.inner.lock();
            for id in cluster_ids {
                inner.terminated.push(id.clone());
                if let Some(cluster) = inner.clusters.get_mut(id) {
                    cluster.state = ClusterState::Terminating;
                    cluster.reason = Some("Terminated by user request".to_string());
                }
            }
            Ok(())
        }

        async fn add_job_flow_steps(
            &self,
            cluster_id: &ClusterId,
            steps: &[StepConfig],
        ) -> Result<Vec<StepId>> {
            let mut inner = self.inner.lock();
            if !inner.clusters.contains_key(cluster_id) {
                return Err(ControlError::cluster_not_found(cluster_id));
            }
            Ok(add_steps(&mut inner, cluster_id, steps))
        }

        async fn list_steps(&self, cluster_id: &ClusterId) -> Result<Vec<StepDescription>> {
            let inner = self.inner.lock();
            let cluster = inner
                .clusters
                .get(cluster_id)
                .ok_or_else(|| ControlError::cluster_not_found(cluster_id))?;

            Ok(cluster
                .steps
                .iter()
                .rev()
                .filter_map(|step_id| {
                    inner
                        .scripts
                        .get(&(cluster_id.clone(), step_id.clone()))
                        .and_then(|script| script.front().cloned())
                })
                .collect())
        }

        async fn describe_step(
            &self,
            cluster_id: &ClusterId,
            step_id: &StepId,
        ) -> Result<StepDescription> {
            let mut inner = self.inner.lock();
            inner.describe_calls += 1;

            if inner.failing_describes > 0 {
                inner.failing_describes -= 1;
                return Err(ControlError::Remote {
                    operation: "DescribeStep",
                    message: "injected failure".to_string(),
                });
            }

            let script = inner
                .scripts
                .get_mut(&(cluster_id.clone(), step_id.clone()))
                .ok_or_else(|| ControlError::step_not_found(cluster_id, step_id))?;

            if script.len() > 1 {
                script
                    .pop_front()
                    .ok_or_else(|| ControlError::Internal("empty step script".to_string()))
            } else {
                script
                    .front()
                    .cloned()
                    .ok_or_else(|| ControlError::Internal("empty step script".to_string()))
            }
        }

        async fn describe_cluster(&self, cluster_id: &ClusterId) -> Result<ClusterDescription> {
            let inner = self.inner.lock();
            let cluster = inner
                .clusters
                .get(cluster_id)
                .ok_or_else(|| ControlError::cluster_not_found(cluster_id))?;

            Ok(ClusterDescription {
                id: cluster_id.to_string(),
                name: cluster.name.clone(),
                status: ClusterStatusWire {
                    state: cluster.state,
                    state_change_reason: cluster.reason.as_ref().map(|message| {
                        StateChangeReason {
                            code: None,
                            message: Some(message.clone()),
                        }
                    }),
                },
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobflow_core::StepState;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> HttpEmrClient {
        HttpEmrClient::new(server.uri(), Duration::from_secs(5)).unwrap()
    }

    fn ids() -> (ClusterId, StepId) {
        (ClusterId::new("j-1").unwrap(), StepId::new("s-1").unwrap())
    }

    #[test]
    fn http_client_creation() {
        let client = HttpEmrClient::new("http://localhost:4566/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:4566");
    }

    #[tokio::test]
    async fn describe_step_sends_target_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("X-Amz-Target", "ElasticMapReduce.DescribeStep"))
            .and(header("content-type", "application/x-amz-json-1.1"))
            .and(body_partial_json(serde_json::json!({
                "ClusterId": "j-1",
                "StepId": "s-1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Step": {
                    "Id": "s-1",
                    "Name": "Aggregate",
                    "Config": {"Jar": "command-runner.jar", "Args": ["spark-submit"]},
                    "ActionOnFailure": "TERMINATE_CLUSTER",
                    "Status": {"State": "RUNNING"}
                }
            })))
            .mount(&server)
            .await;

        let (cluster_id, step_id) = ids();
        let step = client_for(&server)
            .describe_step(&cluster_id, &step_id)
            .await
            .unwrap();
        assert_eq!(step.name, "Aggregate");
        assert_eq!(step.status.state, StepState::Running);
    }

    #[tokio::test]
    async fn not_found_errors_are_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "__type": "com.amazonaws.elasticmapreduce#InvalidRequestException",
                "Message": "Cluster id 'j-1' does not exist."
            })))
            .mount(&server)
            .await;

        let (cluster_id, _) = ids();
        let err = client_for(&server)
            .describe_cluster(&cluster_id)
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::NotFound(_)), "{err:?}");
    }

    #[tokio::test]
    async fn service_errors_are_remote() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
            .mount(&server)
            .await;

        let (cluster_id, _) = ids();
        let err = client_for(&server)
            .terminate_job_flows(&[cluster_id])
            .await
            .unwrap_err();
        assert!(
            matches!(
                err,
                ControlError::Remote {
                    operation: "TerminateJobFlows",
                    ..
                }
            ),
            "{err:?}"
        );
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn terminate_accepts_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("X-Amz-Target", "ElasticMapReduce.TerminateJobFlows"))
            .and(body_partial_json(serde_json::json!({"JobFlowIds": ["j-1"]})))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let (cluster_id, _) = ids();
        client_for(&server)
            .terminate_job_flows(&[cluster_id])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn add_steps_without_ids_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let (cluster_id, _) = ids();
        let err = client_for(&server)
            .add_job_flow_steps(&cluster_id, &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ControlError::MissingIdentifier {
                field: "StepIds",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn list_steps_follows_marker() {
        let server = MockServer::start().await;
        let step = |id: &str| {
            serde_json::json!({
                "Id": id,
                "Name": "Job",
                "Config": {"Jar": "command-runner.jar", "Args": []},
                "ActionOnFailure": "CONTINUE",
                "Status": {"State": "PENDING"}
            })
        };

        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"Marker": "page-2"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"Steps": [step("s-1")]})),
            )
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Steps": [step("s-2")],
                "Marker": "page-2"
            })))
            .with_priority(2)
            .mount(&server)
            .await;

        let (cluster_id, _) = ids();
        let steps = client_for(&server).list_steps(&cluster_id).await.unwrap();
        let ids: Vec<_> = steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["s-2", "s-1"]);
    }

    #[tokio::test]
    async fn mock_script_repeats_last_state() {
        let client = mock::MockEmrClient::new();
        let cluster_id = client.insert_cluster("test", jobflow_core::ClusterState::Running);
        let step_id = StepId::new("s-42").unwrap();
        client.script_states(&cluster_id, &step_id, &[StepState::Pending, StepState::Running]);

        let states = [
            client.describe_step(&cluster_id, &step_id).await.unwrap().status.state,
            client.describe_step(&cluster_id, &step_id).await.unwrap().status.state,
            client.describe_step(&cluster_id, &step_id).await.unwrap().status.state,
        ];
        assert_eq!(states, [StepState::Pending, StepState::Running, StepState::Running]);
        assert_eq!(client.describe_step_calls(), 3);
    }
}
