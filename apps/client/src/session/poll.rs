//! Job polling — cancellable status loops with backoff and a hard timeout.
//!
//! Each poll is keyed to one `(job_id, version_id)` pair and mutates only
//! that version's entry, so polls for different versions cannot corrupt each
//! other. The handle aborts its task on drop; session teardown leaves no
//! timers running.

use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::Config;
use crate::errors::ClientError;
use crate::models::job::JobStatusResponse;
use crate::session::controller::RefinementBackend;
use crate::session::state::{SessionState, VersionId, VersionOutcome};

/// Polling parameters. Intervals back off exponentially up to
/// `max_interval`; the whole poll is abandoned after `timeout`.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            initial_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(15),
            timeout: Duration::from_secs(300),
        }
    }
}

impl PollConfig {
    pub fn from_config(config: &Config) -> Self {
        PollConfig {
            initial_interval: Duration::from_millis(config.poll_interval_ms),
            max_interval: Duration::from_millis(config.poll_max_interval_ms),
            timeout: Duration::from_secs(config.poll_timeout_secs),
        }
    }
}

/// Handle to a running poll task. Aborting is idempotent; dropping the
/// handle aborts the task.
pub struct PollHandle {
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawns a poll loop for `job_id` that reconciles its terminal outcome into
/// the version entry identified by `target`.
///
/// Transient request failures are logged and retried on the next tick; only
/// the timeout turns them into a version error.
pub(crate) fn spawn_poll(
    backend: Arc<dyn RefinementBackend>,
    state: Arc<Mutex<SessionState>>,
    config: PollConfig,
    job_id: String,
    target: VersionId,
) -> PollHandle {
    let task = tokio::spawn(async move {
        let started = Instant::now();
        let mut interval = config.initial_interval;

        loop {
            tokio::time::sleep(interval).await;

            if started.elapsed() >= config.timeout {
                warn!("Job {job_id} did not finish within {}s, abandoning poll", config.timeout.as_secs());
                let outcome = VersionOutcome::Failed {
                    detail: format!(
                        "Timed out waiting for job {job_id} after {}s",
                        config.timeout.as_secs()
                    ),
                };
                apply(&state, target, &outcome);
                break;
            }

            match backend.job_status(&job_id).await {
                Ok(response) => {
                    if let Some(outcome) = VersionOutcome::from_status(&response) {
                        debug!("Job {job_id} reached terminal state '{}'", response.status);
                        apply(&state, target, &outcome);
                        break;
                    }
                }
                Err(e) => {
                    warn!("Status check for job {job_id} failed: {e}");
                }
            }

            interval = (interval * 2).min(config.max_interval);
        }
    });

    PollHandle { task }
}

/// Polls a job to its terminal status and returns the final response.
/// Used by flows that need the result itself (e.g. the optimize step)
/// rather than reconciliation into a version entry.
pub async fn await_job(
    backend: &dyn RefinementBackend,
    job_id: &str,
    config: &PollConfig,
) -> Result<JobStatusResponse, ClientError> {
    let started = Instant::now();
    let mut interval = config.initial_interval;

    loop {
        tokio::time::sleep(interval).await;

        if started.elapsed() >= config.timeout {
            return Err(ClientError::JobTimeout {
                job_id: job_id.to_string(),
                seconds: config.timeout.as_secs(),
            });
        }

        match backend.job_status(job_id).await {
            Ok(response) if response.state().is_terminal() => return Ok(response),
            Ok(_) => {}
            Err(e) if e.is_transient() => warn!("Status check for job {job_id} failed: {e}"),
            Err(e) => return Err(e),
        }

        interval = (interval * 2).min(config.max_interval);
    }
}

fn apply(state: &Mutex<SessionState>, target: VersionId, outcome: &VersionOutcome) {
    state
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .apply_poll_result(target, outcome, Utc::now());
}
