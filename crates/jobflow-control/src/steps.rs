//! Spark job descriptions and the steps built from them.

use serde::{Deserialize, Serialize};

use crate::config::ClusterTemplate;
use crate::error::{ControlError, Result};
use crate::wire::{FailurePolicy, HadoopJarStepConfig, StepConfig};

/// Jar that runs arbitrary commands on the master node.
pub const COMMAND_RUNNER_JAR: &str = "command-runner.jar";

/// A Spark job: the main class inside the assembly and its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Fully qualified main class, e.g. `com.example.jobs.Aggregate`.
    pub main_class: String,
    /// Arguments appended after the assembly path.
    #[serde(default)]
    pub args: Vec<String>,
}

impl JobSpec {
    /// Create a job with the given main class and arguments.
    #[must_use]
    pub fn new<I, S>(main_class: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            main_class: main_class.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Step display name: the last dot-separated segment of the main class.
    #[must_use]
    pub fn step_name(&self) -> &str {
        self.main_class
            .rsplit_once('.')
            .map_or(self.main_class.as_str(), |(_, name)| name)
    }
}

/// Parse a step list from JSON.
///
/// Each element is either an object `{"main_class": ..., "args": [...]}` or a
/// pair `["main.Class", [args...]]`. Anything other than a non-empty array is
/// rejected instead of being coerced.
///
/// # Errors
///
/// Returns `ControlError::Validation` if the input is not a non-empty array or
/// an element has the wrong shape.
pub fn parse_job_list(value: &serde_json::Value) -> Result<Vec<JobSpec>> {
    let serde_json::Value::Array(items) = value else {
        return Err(ControlError::Validation(
            "steps must be provided as a list; for a single job, pass [job]".to_string(),
        ));
    };

    if items.is_empty() {
        return Err(ControlError::Validation(
            "step list must contain at least one job".to_string(),
        ));
    }

    items
        .iter()
        .enumerate()
        .map(|(index, item)| parse_job(item).map_err(|reason| {
            ControlError::Validation(format!("step {index}: {reason}"))
        }))
        .collect()
}

fn parse_job(item: &serde_json::Value) -> std::result::Result<JobSpec, String> {
    match item {
        serde_json::Value::Object(_) => {
            serde_json::from_value(item.clone()).map_err(|e| e.to_string())
        }
        serde_json::Value::Array(pair) => {
            let [class, args] = pair.as_slice() else {
                return Err("expected [main_class, [args...]]".to_string());
            };
            let class = class
                .as_str()
                .ok_or_else(|| "main class must be a string".to_string())?;
            let args = args
                .as_array()
                .ok_or_else(|| "arguments must be a list".to_string())?
                .iter()
                .map(|arg| match arg {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>();
            Ok(JobSpec::new(class, args))
        }
        _ => Err("expected an object or a [main_class, [args...]] pair".to_string()),
    }
}

/// Build the `spark-submit` step for a job.
///
/// Steps submitted together with a new cluster also cap the driver result
/// size (`with_driver_limit`); steps added to a running cluster do not.
#[must_use]
pub fn spark_step(
    job: &JobSpec,
    assembly_path: &str,
    policy: FailurePolicy,
    template: &ClusterTemplate,
    with_driver_limit: bool,
) -> StepConfig {
    let mut args = vec!["spark-submit".to_string()];
    if with_driver_limit {
        args.push("--conf".to_string());
        args.push(format!(
            "spark.driver.maxResultSize={}",
            template.driver_max_result_size
        ));
    }
    args.extend(
        [
            "--packages",
            template.spark_packages.as_str(),
            "--deploy-mode",
            "cluster",
            "--master",
            "yarn",
            "--class",
            job.main_class.as_str(),
            assembly_path,
        ]
        .map(String::from),
    );
    args.extend(job.args.iter().cloned());

    StepConfig {
        name: job.step_name().to_string(),
        action_on_failure: policy,
        hadoop_jar_step: HadoopJarStepConfig {
            jar: COMMAND_RUNNER_JAR.to_string(),
            args,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_name_is_last_class_segment() {
        assert_eq!(JobSpec::new("com.example.Aggregate", ["a"]).step_name(), "Aggregate");
        assert_eq!(JobSpec::new("Standalone", Vec::<String>::new()).step_name(), "Standalone");
    }

    #[test]
    fn parse_rejects_non_list() {
        let err = parse_job_list(&json!({"main_class": "a.B"})).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("for a single job, pass [job]"));

        assert!(parse_job_list(&json!("a.B")).is_err());
        assert!(parse_job_list(&json!([])).is_err());
    }

    #[test]
    fn parse_accepts_objects_and_pairs() {
        let jobs = parse_job_list(&json!([
            {"main_class": "com.example.First", "args": ["--day", "2019-10-01"]},
            ["com.example.Second", ["s3://in/", 42]],
        ]))
        .unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].args, vec!["--day", "2019-10-01"]);
        assert_eq!(jobs[1].main_class, "com.example.Second");
        assert_eq!(jobs[1].args, vec!["s3://in/", "42"]);
    }

    #[test]
    fn parse_reports_bad_element() {
        let err = parse_job_list(&json!([["only.Class"]])).unwrap_err();
        assert!(err.to_string().contains("step 0"));
    }

    #[test]
    fn spark_step_arguments() {
        let template = ClusterTemplate::default();
        let job = JobSpec::new("com.example.Aggregate", ["--day", "1"]);

        let step = spark_step(
            &job,
            "s3://jars/app.jar",
            FailurePolicy::Continue,
            &template,
            false,
        );
        assert_eq!(step.name, "Aggregate");
        assert_eq!(step.action_on_failure, FailurePolicy::Continue);
        assert_eq!(step.hadoop_jar_step.jar, COMMAND_RUNNER_JAR);
        assert_eq!(
            step.hadoop_jar_step.args,
            vec![
                "spark-submit",
                "--packages",
                "org.apache.spark:spark-avro_2.11:2.4.4",
                "--deploy-mode",
                "cluster",
                "--master",
                "yarn",
                "--class",
                "com.example.Aggregate",
                "s3://jars/app.jar",
                "--day",
                "1",
            ]
        );
    }

    #[test]
    fn spark_step_driver_limit() {
        let template = ClusterTemplate::default();
        let job = JobSpec::new("a.B", Vec::<String>::new());
        let step = spark_step(
            &job,
            "app.jar",
            FailurePolicy::TerminateCluster,
            &template,
            true,
        );
        assert_eq!(
            &step.hadoop_jar_step.args[..3],
            ["spark-submit", "--conf", "spark.driver.maxResultSize=4g"]
        );
    }
}
