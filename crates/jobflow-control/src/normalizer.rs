//! Step status normalization.
//!
//! Turns a raw step description into a [`StepStatus`] and, for failed steps,
//! resolves the gzip-compressed stderr log from object storage.

use std::io::Read;
use std::sync::Arc;

use chrono::Utc;
use flate2::read::GzDecoder;
use jobflow_core::{ClusterId, StepId};
use jobflow_storage::{ObjectStore, S3Path, StorageError};

use crate::emr_client::EmrClient;
use crate::error::Result;
use crate::types::{Diagnostic, DiagnosticError, FailureDetails, StatusRecord, StepStatus};
use crate::wire::StepDescription;

/// File name of the step's stderr log inside its log directory.
pub const STDERR_LOG: &str = "stderr.gz";

/// Reason reported when the service gave none.
const UNKNOWN_REASON: &str = "Unknown";

/// Builds step status snapshots. Holds no state between calls.
#[derive(Clone)]
pub struct StatusNormalizer {
    emr: Arc<dyn EmrClient>,
    store: Arc<dyn ObjectStore>,
}

impl StatusNormalizer {
    /// Create a normalizer over the given clients.
    #[must_use]
    pub fn new(emr: Arc<dyn EmrClient>, store: Arc<dyn ObjectStore>) -> Self {
        Self { emr, store }
    }

    /// Query the step and build its status.
    ///
    /// Problems reading the diagnostic log are carried in
    /// [`StepStatus::diagnostic`]; only the step query itself can fail.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::NotFound` or `ControlError::Remote` if the step
    /// cannot be described.
    pub async fn normalize(&self, step_id: &StepId, cluster_id: &ClusterId) -> Result<StepStatus> {
        let description = self.emr.describe_step(cluster_id, step_id).await?;
        let record = status_record(description);

        let diagnostic = match record
            .failure
            .as_ref()
            .and_then(|f| f.logfile_path.as_deref())
        {
            Some(logfile_path) => self.read_log(logfile_path, step_id, cluster_id).await,
            None => Diagnostic::NotApplicable,
        };

        Ok(StepStatus { record, diagnostic })
    }

    async fn read_log(
        &self,
        logfile_path: &str,
        step_id: &StepId,
        cluster_id: &ClusterId,
    ) -> Diagnostic {
        let path = match S3Path::parse(logfile_path) {
            Ok(path) => path.with_key_suffix(STDERR_LOG),
            Err(e) => return Diagnostic::Failed(DiagnosticError::DataFormat(e.to_string())),
        };

        match self.store.get_object(&path.bucket, &path.key).await {
            Ok(bytes) => match decompress(&bytes) {
                Ok(text) => Diagnostic::Text(text),
                Err(e) => {
                    tracing::warn!(
                        step_id = %step_id,
                        cluster_id = %cluster_id,
                        path = %path,
                        error = %e,
                        "Diagnostic log is not valid gzip"
                    );
                    Diagnostic::Failed(e)
                }
            },
            Err(StorageError::NotFound { .. }) => {
                tracing::info!(
                    step_id = %step_id,
                    cluster_id = %cluster_id,
                    path = %path,
                    "Diagnostic log not written yet, retry the status query later"
                );
                Diagnostic::NotYetWritten
            }
            Err(e) => {
                tracing::warn!(
                    step_id = %step_id,
                    cluster_id = %cluster_id,
                    path = %path,
                    error = %e,
                    "Failed to read diagnostic log"
                );
                Diagnostic::Failed(DiagnosticError::Io(e.to_string()))
            }
        }
    }
}

fn status_record(description: StepDescription) -> StatusRecord {
    let failure = description.status.failure_details.map(|details| FailureDetails {
        reason: details
            .reason
            .unwrap_or_else(|| UNKNOWN_REASON.to_string()),
        logfile_path: details.log_file,
    });

    StatusRecord {
        name: description.name,
        parameters: description.config.args,
        failure_policy: description.action_on_failure,
        state: description.status.state,
        failure,
        observed_at: Utc::now(),
    }
}

fn decompress(bytes: &[u8]) -> std::result::Result<String, DiagnosticError> {
    let mut out = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut out)
        .map_err(|e| DiagnosticError::DataFormat(e.to_string()))?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}
