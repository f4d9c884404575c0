//! Asynchronous job tracking
//!
//! Long-running calls answer with a `job_id`. The job is polled at
//! `v1/{project_id}/jobs/{job_id}` until its `status` is `SUCCESS` or `FAIL`.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use serde_json::Value as JsonValue;
use stratus_core::jsonpath::path_search_str;
use stratus_core::refresh::{
    COMPLETED, Classified, ClassifyError, FAILED, PENDING, StatusClassifier, StatusProbe,
    StatusTable,
};
use stratus_core::transport::{Transport, TransportError};
use stratus_core::waiter::{WaitConfig, WaitError, wait_for_status};
use tokio_util::sync::CancellationToken;

pub const JOB_DELAY: Duration = Duration::from_secs(10);
pub const JOB_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Classifier for job objects. A failed job carries its `fail_reason` in
/// the reported status.
pub struct JobStatus {
    table: StatusTable,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self {
            table: StatusTable::new("status")
                .success(&["SUCCESS"])
                .failure(&["FAIL"]),
        }
    }
}

impl StatusClassifier for JobStatus {
    fn classify(&self, body: &JsonValue) -> Result<Classified, ClassifyError> {
        let mut classified = self.table.classify(body)?;
        if classified.label == FAILED {
            let reason = path_search_str("fail_reason", body, "");
            if !reason.is_empty() {
                classified.status = format!("{}: {}", classified.status, reason);
            }
        }
        Ok(classified)
    }
}

pub fn job_path(job_id: &str) -> String {
    format!("v1/{{project_id}}/jobs/{}", job_id)
}

/// Wait parameters for a job, with the usual 10s delay and interval
pub fn job_wait_config(job_id: &str, timeout: Duration) -> WaitConfig {
    WaitConfig::new(format!("job ({})", job_id), &[PENDING], &[COMPLETED])
        .with_timeout(timeout)
        .with_delay(JOB_DELAY)
        .with_poll_interval(JOB_POLL_INTERVAL)
}

/// Wait for a job of `service` and return the final job object
pub async fn wait_for_job(
    transport: Arc<dyn Transport>,
    service: &str,
    job_id: &str,
    config: &WaitConfig,
    cancel: &CancellationToken,
) -> Result<JsonValue, WaitError<TransportError>> {
    info!("Waiting for {} job {}", service, job_id);
    let probe = StatusProbe::new(transport, service, job_path(job_id), JobStatus::default());
    let job = wait_for_status(&probe, config, cancel).await?;
    debug!("{} job {} finished", service, job_id);
    Ok(job.unwrap_or(JsonValue::Null))
}
