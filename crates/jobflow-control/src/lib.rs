//! Cluster and step lifecycle management for jobflow.
//!
//! This crate launches and terminates clusters, submits Spark steps, and
//! tracks steps until they finish. Each piece below is usable on its own.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   ClusterManagerService                      │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐   │
//! │  │  Launch /   │ │   Watch     │ │    Watch            │   │
//! │  │  Terminate  │ │   Registry  │ │    State Machine    │   │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//!          │                   │
//!          │                   ▼
//!          │     ┌──────────┐  channel  ┌──────────┐
//!          │     │  Poller  │──────────▶│ Listener │──▶ callback
//!          │     └────┬─────┘           └──────────┘
//!          │          ▼
//!          │   ┌─────────────┐
//!          │   │ Normalizer  │──────────────┐
//!          │   └──────┬──────┘              │
//!          ▼          ▼                     ▼
//!        ┌───────────────────┐     ┌─────────────────┐
//!        │    EmrClient      │     │   ObjectStore   │
//!        │ (orchestration)   │     │ (stderr logs)   │
//!        └───────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use jobflow_control::{
//!     ClusterManager, ClusterManagerService, JobSpec, ManagerConfig, StepState, Watch,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ClusterManagerService::from_config(ManagerConfig::from_env())?;
//!
//! let jobs = vec![JobSpec::new("com.example.jobs.Aggregate", ["--day", "2019-10-01"])];
//! let launched = manager
//!     .launch_cluster_with_steps("s3://jars/etl.jar", &jobs, "nightly")
//!     .await?;
//!
//! let step_id = &launched.step_ids[0];
//! let watch = manager
//!     .watch_step(
//!         step_id,
//!         &launched.cluster_id,
//!         Some("COMPLETED"),
//!         Some(Box::new(|state: StepState| println!("step reached {state}"))),
//!     )
//!     .await?;
//!
//! if let Watch::Started(handle) = watch {
//!     handle.join().await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Watch Sessions
//!
//! A watch validates its target state before anything starts, then moves
//! from `Watching` to either `Matched` (callback fired once) or `Closed`
//! (the step finished in another state). See the [`lifecycle`] module.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod emr_client;
pub mod error;
pub mod lifecycle;
pub mod manager;
pub mod normalizer;
pub mod poller;
pub mod registry;
pub mod steps;
pub mod types;
pub mod wire;

pub use channel::{channel, NoSubscribers, Publisher, Subscription};
pub use config::{ClusterTemplate, ClusterTopology, ManagerConfig};
pub use dispatcher::{DispatchOutcome, Listener, OnState};
pub use emr_client::{EmrClient, HttpEmrClient};
pub use error::{ControlError, Result};
pub use lifecycle::WatchPhase;
pub use manager::{ClusterManager, ClusterManagerService, Watch, WatchHandle};
pub use normalizer::StatusNormalizer;
pub use poller::{PollOutcome, Poller};
pub use registry::{WatchInfo, WatchRegistry};
pub use steps::{parse_job_list, JobSpec};
pub use types::{
    ClusterStatus, Diagnostic, DiagnosticError, FailureDetails, LaunchedCluster, StatusRecord,
    StepStatus, StepSummary,
};
pub use wire::FailurePolicy;

#[cfg(any(test, feature = "test-utils"))]
pub use emr_client::mock::MockEmrClient;

// Re-export commonly used types from dependencies for convenience
pub use jobflow_core::{ClusterId, ClusterState, StepId, StepState, WatchId};
