//! jobflow CLI - launch clusters, submit Spark steps and track them.
//!
//! This is the entry point for the `jobflow` binary. Every command prints
//! JSON on stdout; logs go to stderr.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use jobflow_control::{
    parse_job_list, ClusterId, ClusterManager, ClusterManagerService, DispatchOutcome, JobSpec,
    ManagerConfig, OnState, StepId, StepState, Watch,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

/// jobflow - ephemeral cluster and step lifecycle management.
#[derive(Parser, Debug)]
#[command(name = "jobflow")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file.
    #[arg(long, env = "JOBFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Service region, overriding the configuration.
    #[arg(long)]
    region: Option<String>,

    /// Enable debug logging.
    #[arg(long, default_value = "false")]
    debug: bool,

    /// Command to execute.
    #[command(subcommand)]
    command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Launch a cluster that stays up until terminated.
    Launch {
        /// Cluster name.
        name: String,
    },

    /// Launch a cluster that runs the given steps, then shuts down.
    LaunchWithSteps {
        /// Cluster name; `-m2x` is appended.
        name: String,

        /// Path of the Spark assembly jar.
        #[arg(long)]
        assembly: String,

        /// JSON file holding the list of jobs.
        #[arg(long)]
        steps: PathBuf,
    },

    /// Submit steps to a running cluster.
    RunSteps {
        /// Cluster ID.
        cluster: ClusterId,

        /// Path of the Spark assembly jar.
        #[arg(long)]
        assembly: String,

        /// JSON file holding the list of jobs.
        #[arg(long)]
        steps: PathBuf,

        /// Keep the cluster running if a step fails.
        #[arg(long)]
        continue_on_failure: bool,
    },

    /// Request termination of a cluster.
    Terminate {
        /// Cluster ID.
        cluster: ClusterId,
    },

    /// Show a cluster and its steps.
    Status {
        /// Cluster ID.
        cluster: ClusterId,
    },

    /// Show a step, including its stderr log if it failed.
    StepStatus {
        /// Cluster ID.
        cluster: ClusterId,

        /// Step ID.
        step: StepId,
    },

    /// Block until a step finishes and print its final state.
    Wait {
        /// Cluster ID.
        cluster: ClusterId,

        /// Step ID.
        step: StepId,
    },

    /// Watch a step.
    ///
    /// Without `--until`, prints the first observed state. With it, waits
    /// until the step reaches that state or finishes; Ctrl-C cancels.
    Watch {
        /// Cluster ID.
        cluster: ClusterId,

        /// Step ID.
        step: StepId,

        /// State to wait for, e.g. `COMPLETED`.
        #[arg(long)]
        until: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug {
        "info,jobflow=debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(args.config.as_deref(), args.region)?;
    let manager = ClusterManagerService::from_config(config)?;

    run(&manager, args.command).await
}

fn load_config(path: Option<&Path>, region: Option<String>) -> anyhow::Result<ManagerConfig> {
    let mut config = match path {
        Some(path) => ManagerConfig::from_file(path)?,
        None => ManagerConfig::from_env(),
    };
    if let Some(region) = region {
        config.region = region;
    }
    config.validate()?;
    Ok(config)
}

fn load_jobs(path: &Path) -> anyhow::Result<Vec<JobSpec>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read steps file {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("steps file {} is not valid JSON", path.display()))?;
    Ok(parse_job_list(&value)?)
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(manager: &ClusterManagerService, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Launch { name } => {
            let cluster_id = manager.launch_cluster(&name).await?;
            print_json(&json!({ "cluster_id": cluster_id }))
        }
        Command::LaunchWithSteps {
            name,
            assembly,
            steps,
        } => {
            let jobs = load_jobs(&steps)?;
            let launched = manager
                .launch_cluster_with_steps(&assembly, &jobs, &name)
                .await?;
            print_json(&launched)
        }
        Command::RunSteps {
            cluster,
            assembly,
            steps,
            continue_on_failure,
        } => {
            let jobs = load_jobs(&steps)?;
            let step_ids = manager
                .run_steps(&assembly, &cluster, &jobs, !continue_on_failure)
                .await?;
            print_json(&json!({ "cluster_id": cluster, "step_ids": step_ids }))
        }
        Command::Terminate { cluster } => {
            manager.terminate_cluster(&cluster).await?;
            print_json(&json!({ "cluster_id": cluster, "termination_requested": true }))
        }
        Command::Status { cluster } => print_json(&manager.cluster_status(&cluster).await?),
        Command::StepStatus { cluster, step } => {
            print_json(&manager.step_status(&step, &cluster).await?)
        }
        Command::Wait { cluster, step } => {
            let state = manager.report_step(&step, &cluster).await?;
            print_json(&json!({ "step_id": step, "state": state }))
        }
        Command::Watch {
            cluster,
            step,
            until,
        } => watch(manager, &cluster, &step, until.as_deref()).await,
    }
}

async fn watch(
    manager: &ClusterManagerService,
    cluster: &ClusterId,
    step: &StepId,
    until: Option<&str>,
) -> anyhow::Result<()> {
    let on_state = until.map(|_| -> OnState {
        Box::new(|state: StepState| {
            tracing::info!(state = %state, "Step reached target state");
        })
    });

    let handle = match manager.watch_step(step, cluster, until, on_state).await? {
        Watch::Peeked(state) => return print_json(&json!({ "step_id": step, "state": state })),
        Watch::Started(handle) => handle,
    };

    let watch_id = handle.id();
    let join = handle.join();
    tokio::pin!(join);

    let outcome = tokio::select! {
        outcome = &mut join => outcome?,
        _ = tokio::signal::ctrl_c() => {
            manager.cancel_watch(&watch_id);
            join.await?
        }
    };

    let report = match outcome {
        DispatchOutcome::Matched {
            state,
            observations,
        } => json!({
            "step_id": step,
            "matched": true,
            "state": state,
            "observations": observations,
        }),
        DispatchOutcome::Closed { observations } => json!({
            "step_id": step,
            "matched": false,
            "observations": observations,
        }),
    };
    print_json(&report)
}
