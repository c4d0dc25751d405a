//! The refinement session controller.
//!
//! Translates user refinement intents into backend job submissions, tracks
//! outstanding jobs to completion, and keeps the version collection
//! consistent with job outcomes regardless of which version is currently
//! being viewed. The shell only reads the state exposed here and calls the
//! operations; it never mutates version state itself.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

use crate::actions::{CompileRequest, RefineRequest};
use crate::errors::ClientError;
use crate::models::job::{JobStatusResponse, JobSubmission};
use crate::session::poll::{spawn_poll, PollConfig, PollHandle};
use crate::session::state::{SeedVersion, SessionState, Version, VersionId, VersionOutcome};

/// Summary label for versions produced by manual LaTeX edits.
pub const MANUAL_EDIT_SUMMARY: &str = "Manual Edit";

/// The remote side of a refinement session: job submission, status checks,
/// and artifact location. `ApiClient` implements this against the live
/// backend; tests script it.
#[async_trait]
pub trait RefinementBackend: Send + Sync {
    async fn submit_refinement(&self, req: &RefineRequest) -> Result<JobSubmission, ClientError>;
    async fn submit_compile(&self, req: &CompileRequest) -> Result<JobSubmission, ClientError>;
    async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, ClientError>;
    fn artifact_url(&self, workflow_id: Uuid, version: VersionId, filename: &str) -> String;
}

/// Download locations for one version's generated artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocations {
    pub pdf: String,
    pub tex: String,
    pub log: String,
}

/// One refinement session over a workflow. Owns the version state and all
/// outstanding poll tasks; dropping the session aborts every poll.
pub struct RefinementSession {
    backend: Arc<dyn RefinementBackend>,
    state: Arc<Mutex<SessionState>>,
    poll: PollConfig,
    workflow_id: Uuid,
    job_description: String,
    handles: Mutex<Vec<PollHandle>>,
}

impl RefinementSession {
    pub fn new(
        backend: Arc<dyn RefinementBackend>,
        poll: PollConfig,
        workflow_id: Uuid,
        job_description: String,
        seed: SeedVersion,
    ) -> Self {
        RefinementSession {
            backend,
            state: Arc::new(Mutex::new(SessionState::seed(seed, Utc::now()))),
            poll,
            workflow_id,
            job_description,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn workflow_id(&self) -> Uuid {
        self.workflow_id
    }

    pub fn job_description(&self) -> &str {
        &self.job_description
    }

    /// Snapshot of the version collection, newest first.
    pub fn versions(&self) -> Vec<Version> {
        self.lock_state().versions().to_vec()
    }

    pub fn version(&self, id: VersionId) -> Option<Version> {
        self.lock_state().get(id).cloned()
    }

    pub fn selected(&self) -> Version {
        self.lock_state().selected_version().clone()
    }

    pub fn selected_id(&self) -> VersionId {
        self.lock_state().selected_id()
    }

    /// True while a submission round-trip is in flight.
    pub fn is_submitting(&self) -> bool {
        self.lock_state().is_submitting()
    }

    /// True while a submission is in flight *or* a version is generating.
    /// The shell uses this to serialize submissions (one generating version
    /// at a time is a UI-level throttle, not a state-type constraint).
    pub fn is_busy(&self) -> bool {
        let state = self.lock_state();
        state.is_submitting() || state.has_generating()
    }

    /// Switches the active version. No-op when the id is unknown.
    pub fn select_version(&self, id: VersionId) -> bool {
        self.lock_state().select_version(id)
    }

    /// Download locations for the currently selected version's artifacts.
    pub fn active_artifacts(&self) -> ArtifactLocations {
        let version = self.selected();
        let locate = |ext: &str| {
            self.backend.artifact_url(
                self.workflow_id,
                version.id,
                &format!("{}.{ext}", version.artifact_name),
            )
        };
        ArtifactLocations {
            pdf: locate("pdf"),
            tex: locate("tex"),
            log: locate("log"),
        }
    }

    /// Submits a free-text refinement request against the currently selected
    /// version. Inserts the optimistic pending version, issues the job, and
    /// begins polling (or reconciles immediately on the synchronous path).
    ///
    /// Returns the new version's id, or `None` for an empty request. Failures
    /// are resolved into the version's error state, never returned.
    pub async fn submit_refinement(&self, request: &str) -> Option<VersionId> {
        let trimmed = request.trim();
        if trimmed.is_empty() {
            return None;
        }

        let (id, req) = {
            let mut state = self.lock_state();
            let source = state.selected_version().clone();
            let id = state.apply_submission(trimmed, &source.artifact_name);
            let output_filename = state
                .get(id)
                .map(|v| v.artifact_name.clone())
                .unwrap_or_default();
            (
                id,
                RefineRequest {
                    workflow_id: self.workflow_id,
                    current_version: source.id.to_string(),
                    current_tex_filename: source.artifact_name,
                    user_request: trimmed.to_string(),
                    output_filename,
                    job_description: self.job_description.clone(),
                    target_version: id.to_string(),
                },
            )
        };

        let submission = self.backend.submit_refinement(&req).await;
        self.settle(id, submission);
        Some(id)
    }

    /// Submits user-edited LaTeX as a new version. Same discipline as
    /// `submit_refinement`, with a fixed summary label. Empty source is a
    /// no-op.
    pub async fn submit_manual_compile(&self, latex_source: &str) -> Option<VersionId> {
        if latex_source.trim().is_empty() {
            return None;
        }

        let (id, req) = {
            let mut state = self.lock_state();
            let source_artifact = state.selected_version().artifact_name.clone();
            let id = state.apply_submission(MANUAL_EDIT_SUMMARY, &source_artifact);
            let output_filename = state
                .get(id)
                .map(|v| v.artifact_name.clone())
                .unwrap_or_default();
            (
                id,
                CompileRequest {
                    workflow_id: self.workflow_id,
                    latex_code: latex_source.to_string(),
                    target_version: id.to_string(),
                    output_filename,
                },
            )
        };

        let submission = self.backend.submit_compile(&req).await;
        self.settle(id, submission);
        Some(id)
    }

    /// Stops every outstanding poll. Called on teardown; also implied by
    /// dropping the session (poll handles abort on drop).
    pub fn shutdown(&self) {
        self.lock_handles().clear();
    }

    /// Number of polls still running (finished tasks are not counted).
    pub fn outstanding_polls(&self) -> usize {
        self.lock_handles()
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }

    /// Resolves an accepted/rejected submission into polling or version
    /// state. A rejection must never leave the version stuck generating.
    fn settle(&self, id: VersionId, submission: Result<JobSubmission, ClientError>) {
        let mut state = self.lock_state();
        state.finish_submission();

        match submission {
            Ok(JobSubmission::Queued { job_id }) => {
                drop(state);
                info!("Job {job_id} accepted for {id}, polling");
                let handle = spawn_poll(
                    Arc::clone(&self.backend),
                    Arc::clone(&self.state),
                    self.poll.clone(),
                    job_id,
                    id,
                );
                self.track(handle);
            }
            Ok(JobSubmission::Sync(payload)) => {
                let outcome = VersionOutcome::from_result(&payload);
                state.apply_poll_result(id, &outcome, Utc::now());
            }
            Err(e) => {
                warn!("Submission for {id} rejected: {e}");
                let outcome = VersionOutcome::Failed {
                    detail: format!("Submission failed: {e}"),
                };
                state.apply_poll_result(id, &outcome, Utc::now());
            }
        }
    }

    fn track(&self, handle: PollHandle) {
        let mut handles = self.lock_handles();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_handles(&self) -> MutexGuard<'_, Vec<PollHandle>> {
        self.handles.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::state::VersionStatus;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Scripted backend: submissions pop from a queue, status checks walk a
    /// sequence and repeat the last entry.
    struct ScriptedBackend {
        submissions: Mutex<VecDeque<Result<JobSubmission, ClientError>>>,
        statuses: Mutex<VecDeque<JobStatusResponse>>,
        status_calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(
            submissions: Vec<Result<JobSubmission, ClientError>>,
            statuses: Vec<JobStatusResponse>,
        ) -> Arc<Self> {
            Arc::new(ScriptedBackend {
                submissions: Mutex::new(submissions.into()),
                statuses: Mutex::new(statuses.into()),
                status_calls: AtomicUsize::new(0),
            })
        }

        fn status_calls(&self) -> usize {
            self.status_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RefinementBackend for ScriptedBackend {
        async fn submit_refinement(
            &self,
            _req: &RefineRequest,
        ) -> Result<JobSubmission, ClientError> {
            self.submissions
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected refine submission")
        }

        async fn submit_compile(&self, _req: &CompileRequest) -> Result<JobSubmission, ClientError> {
            self.submissions
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected compile submission")
        }

        async fn job_status(&self, _job_id: &str) -> Result<JobStatusResponse, ClientError> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            let mut statuses = self.statuses.lock().unwrap();
            if statuses.len() > 1 {
                Ok(statuses.pop_front().unwrap())
            } else {
                statuses
                    .front()
                    .cloned()
                    .ok_or(ClientError::NotFound("no scripted status".to_string()))
            }
        }

        fn artifact_url(&self, workflow_id: Uuid, version: VersionId, filename: &str) -> String {
            format!("fake://{workflow_id}/{version}/{filename}")
        }
    }

    fn status(raw: serde_json::Value) -> JobStatusResponse {
        serde_json::from_value(raw).unwrap()
    }

    fn pending() -> JobStatusResponse {
        status(json!({ "job_id": "task-1", "status": "PENDING" }))
    }

    fn queued() -> Result<JobSubmission, ClientError> {
        Ok(JobSubmission::Queued {
            job_id: "task-1".to_string(),
        })
    }

    fn session(backend: Arc<ScriptedBackend>) -> RefinementSession {
        RefinementSession::new(
            backend,
            PollConfig::default(),
            Uuid::nil(),
            "Backend engineer, Rust".to_string(),
            SeedVersion {
                id: VersionId::SEED,
                artifact_name: "Resume_Optimized_v1".to_string(),
                score: 72,
                error: None,
            },
        )
    }

    async fn wait_for_terminal(session: &RefinementSession, id: VersionId) {
        tokio::time::timeout(Duration::from_secs(3600), async {
            loop {
                if session
                    .version(id)
                    .map(|v| v.status.is_terminal())
                    .unwrap_or(false)
                {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .expect("version never reached a terminal state");
    }

    #[tokio::test(start_paused = true)]
    async fn test_refine_polls_to_completion() {
        let backend = ScriptedBackend::new(
            vec![queued()],
            vec![
                pending(),
                pending(),
                status(json!({
                    "job_id": "task-1",
                    "status": "SUCCESS",
                    "result": {
                        "analysis": { "ats_score": 85 },
                        "refinement": { "summary": "Added Python to skills" },
                        "compilation": { "success": true, "output_filename": "Resume_Optimized_v2" }
                    }
                })),
            ],
        );
        let session = session(Arc::clone(&backend));

        let id = session.submit_refinement("Add Python keyword").await.unwrap();
        assert_eq!(id, VersionId::new(2));
        assert_eq!(session.selected_id(), id);
        assert_eq!(session.version(id).unwrap().status, VersionStatus::Generating);

        wait_for_terminal(&session, id).await;

        let v2 = session.version(id).unwrap();
        assert_eq!(v2.status, VersionStatus::Completed);
        assert_eq!(v2.score, 85);
        assert_eq!(v2.summary, "Added Python to skills");
        assert_eq!(v2.artifact_name, "Resume_Optimized_v2");
        assert!(backend.status_calls() >= 3);
        assert_eq!(session.versions().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_submission_resolves_to_error() {
        let backend = ScriptedBackend::new(
            vec![Err(ClientError::Api {
                status: 502,
                message: "bad gateway".to_string(),
            })],
            vec![],
        );
        let session = session(Arc::clone(&backend));

        let id = session.submit_refinement("tighten summary").await.unwrap();

        let version = session.version(id).unwrap();
        let detail = version.status.error_detail().expect("must be an error");
        assert!(detail.starts_with("Submission failed"));
        assert!(!session.is_submitting());
        // No job id was ever issued, so nothing polls.
        assert_eq!(backend.status_calls(), 0);
        assert_eq!(session.outstanding_polls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_compile_reconciles_without_polling() {
        let sync_failure = JobSubmission::Sync(
            serde_json::from_value(json!({
                "compilation": { "success": false, "error": "! Undefined control sequence" }
            }))
            .unwrap(),
        );
        let backend = ScriptedBackend::new(vec![Ok(sync_failure)], vec![]);
        let session = session(Arc::clone(&backend));

        let id = session
            .submit_manual_compile("\\documentclass{article}")
            .await
            .unwrap();

        let version = session.version(id).unwrap();
        assert_eq!(version.summary, MANUAL_EDIT_SUMMARY);
        assert_eq!(
            version.status.error_detail(),
            Some("! Undefined control sequence")
        );
        assert_eq!(backend.status_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_inputs_are_noops() {
        let backend = ScriptedBackend::new(vec![], vec![]);
        let session = session(backend);

        assert!(session.submit_manual_compile("   \n").await.is_none());
        assert!(session.submit_refinement("").await.is_none());
        assert_eq!(session.versions().len(), 1);
        assert!(!session.is_submitting());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_timeout_marks_version_error() {
        // Backend never leaves PENDING.
        let backend = ScriptedBackend::new(vec![queued()], vec![pending()]);
        let session = session(Arc::clone(&backend));

        let id = session.submit_refinement("never finishes").await.unwrap();
        wait_for_terminal(&session, id).await;

        let detail = session
            .version(id)
            .unwrap()
            .status
            .error_detail()
            .expect("timeout must resolve to error")
            .to_string();
        assert!(detail.contains("Timed out"), "got: {detail}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_outstanding_polls() {
        let backend = ScriptedBackend::new(vec![queued()], vec![pending()]);
        let session = session(Arc::clone(&backend));

        session.submit_refinement("slow request").await.unwrap();
        assert_eq!(session.outstanding_polls(), 1);

        // Let the poll make at least one status check, then tear down.
        tokio::time::sleep(Duration::from_secs(5)).await;
        let calls_at_shutdown = backend.status_calls();
        session.shutdown();
        assert_eq!(session.outstanding_polls(), 0);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(backend.status_calls(), calls_at_shutdown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_selection_is_independent_of_outstanding_poll() {
        let backend = ScriptedBackend::new(vec![queued()], vec![pending()]);
        let session = session(Arc::clone(&backend));

        let id = session.submit_refinement("add keywords").await.unwrap();
        assert_eq!(session.selected_id(), id);

        // Inspect the completed seed while v2 is still generating.
        assert!(session.select_version(VersionId::SEED));
        let locations = session.active_artifacts();
        assert_eq!(
            locations.pdf,
            format!("fake://{}/v1/Resume_Optimized_v1.pdf", Uuid::nil())
        );
        assert_eq!(
            locations.tex,
            format!("fake://{}/v1/Resume_Optimized_v1.tex", Uuid::nil())
        );

        // The generating version is untouched by selection changes.
        assert_eq!(session.version(id).unwrap().status, VersionStatus::Generating);
        session.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_while_generating_idle_after_terminal() {
        let backend = ScriptedBackend::new(
            vec![queued()],
            vec![status(json!({
                "job_id": "task-1",
                "status": "SUCCESS",
                "result": { "analysis": { "ats_score": 90 } }
            }))],
        );
        let session = session(backend);

        let id = session.submit_refinement("polish wording").await.unwrap();
        assert!(session.is_busy());

        wait_for_terminal(&session, id).await;
        assert!(!session.is_busy());
    }
}
