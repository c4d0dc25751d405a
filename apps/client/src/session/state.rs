//! Version state for a refinement session.
//!
//! `SessionState` is the single source of truth for the view layer: an
//! ordered version collection (newest first), the selected version id, and
//! the in-flight submission flag. All mutation goes through the transition
//! methods here; they perform no I/O, so the whole lifecycle is testable
//! without a backend or a rendered view.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

use crate::models::job::{JobResult, JobState, JobStatusResponse};
use crate::session::naming::versioned_artifact;

/// Ordinal version identifier, rendered as `v1`, `v2`, … on the wire.
/// Monotonically increasing per session; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionId(u32);

impl VersionId {
    pub const SEED: VersionId = VersionId(1);

    pub fn new(n: u32) -> Self {
        VersionId(n)
    }

    pub fn number(self) -> u32 {
        self.0
    }

    pub fn next(self) -> Self {
        VersionId(self.0 + 1)
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl FromStr for VersionId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix('v').or_else(|| s.strip_prefix('V')).unwrap_or(s);
        digits
            .parse::<u32>()
            .map(VersionId)
            .map_err(|_| format!("'{s}' is not a version id"))
    }
}

/// Status of a single version. The error detail lives inside the variant, so
/// it exists exactly when the version is in the error state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionStatus {
    Generating,
    Completed,
    Error(String),
}

impl VersionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, VersionStatus::Generating)
    }

    pub fn error_detail(&self) -> Option<&str> {
        match self {
            VersionStatus::Error(detail) => Some(detail),
            _ => None,
        }
    }
}

/// One generated artifact in a refinement session.
#[derive(Debug, Clone)]
pub struct Version {
    pub id: VersionId,
    /// True artifact base name for this version, stored at creation time and
    /// never re-derived from the id.
    pub artifact_name: String,
    /// Quality score; 0 until the backend reports one.
    pub score: u32,
    /// Resolution timestamp; `None` while the version is still in progress.
    pub created_at: Option<DateTime<Utc>>,
    /// User request text while pending; backend summary once resolved.
    pub summary: String,
    pub status: VersionStatus,
}

/// Terminal outcome of a job, reduced from the wire payload. This is the
/// only event that moves a version out of `Generating`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionOutcome {
    Completed {
        score: u32,
        summary: Option<String>,
        artifact_name: Option<String>,
    },
    Failed {
        detail: String,
    },
}

impl VersionOutcome {
    /// Reduces a poll response. `None` while the job is still pending.
    ///
    /// A job that succeeded but whose document failed to compile is a
    /// failure of the *version*, with the compiler diagnostic attached —
    /// distinct from the job process itself failing.
    pub fn from_status(response: &JobStatusResponse) -> Option<VersionOutcome> {
        match response.state() {
            JobState::Pending => None,
            JobState::Success => Some(match &response.result {
                Some(result) => VersionOutcome::from_result(result),
                None => VersionOutcome::Completed {
                    score: 0,
                    summary: None,
                    artifact_name: None,
                },
            }),
            JobState::Failed => Some(VersionOutcome::Failed {
                detail: response
                    .error
                    .clone()
                    .unwrap_or_else(|| "Job failed".to_string()),
            }),
        }
    }

    /// Reduces a synchronous (legacy path) job result.
    pub fn from_result(result: &JobResult) -> VersionOutcome {
        if result.compiled_ok() {
            VersionOutcome::Completed {
                score: result.score(),
                summary: result
                    .refinement
                    .as_ref()
                    .and_then(|r| r.summary.clone()),
                artifact_name: result
                    .compilation
                    .as_ref()
                    .and_then(|c| c.output_filename.clone()),
            }
        } else {
            VersionOutcome::Failed {
                detail: result
                    .compilation
                    .as_ref()
                    .and_then(|c| c.error.clone())
                    .unwrap_or_else(|| "Unknown compilation error".to_string()),
            }
        }
    }
}

/// Parameters seeding a session's initial version.
#[derive(Debug, Clone)]
pub struct SeedVersion {
    pub id: VersionId,
    pub artifact_name: String,
    pub score: u32,
    /// Compilation error carried over from the optimize step, if any.
    pub error: Option<String>,
}

impl SeedVersion {
    /// Builds the seed from the triggering optimize (or historical) job
    /// result. The true artifact name is taken from the compilation report
    /// when present; otherwise it is derived once, here, from the requested
    /// output name — never re-derived later.
    pub fn from_result(result: &JobResult, requested_output: &str) -> SeedVersion {
        let id = result
            .version
            .as_deref()
            .and_then(|v| v.parse().ok())
            .unwrap_or(VersionId::SEED);
        let artifact_name = result
            .compilation
            .as_ref()
            .and_then(|c| c.output_filename.clone())
            .unwrap_or_else(|| versioned_artifact(requested_output, id));
        let error = if result.compiled_ok() {
            None
        } else {
            Some(
                result
                    .compilation
                    .as_ref()
                    .and_then(|c| c.error.clone())
                    .unwrap_or_else(|| "Unknown compilation error".to_string()),
            )
        };
        SeedVersion {
            id,
            artifact_name,
            score: result.score(),
            error,
        }
    }
}

/// Owned state container for one refinement session.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Newest first. Never empty: the seed version is inserted at
    /// construction and versions are never deleted within a session.
    versions: Vec<Version>,
    selected: VersionId,
    submitting: bool,
}

impl SessionState {
    /// Seeds the session from the triggering optimize result. The seed is
    /// created synchronously in a terminal state and is never polled.
    pub fn seed(seed: SeedVersion, now: DateTime<Utc>) -> Self {
        let status = match seed.error {
            Some(detail) => VersionStatus::Error(detail),
            None => VersionStatus::Completed,
        };
        SessionState {
            versions: vec![Version {
                id: seed.id,
                artifact_name: seed.artifact_name,
                score: seed.score,
                created_at: Some(now),
                summary: "Initial Optimization".to_string(),
                status,
            }],
            selected: seed.id,
            submitting: false,
        }
    }

    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    pub fn get(&self, id: VersionId) -> Option<&Version> {
        self.versions.iter().find(|v| v.id == id)
    }

    pub fn selected_id(&self) -> VersionId {
        self.selected
    }

    /// The currently selected version, falling back to the first entry if
    /// the selected id is somehow absent.
    pub fn selected_version(&self) -> &Version {
        self.get(self.selected)
            .unwrap_or_else(|| &self.versions[0])
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn has_generating(&self) -> bool {
        self.versions
            .iter()
            .any(|v| v.status == VersionStatus::Generating)
    }

    /// Next ordinal id: max existing + 1, deliberately not collection
    /// length, so out-of-order arrivals never collide.
    pub fn next_id(&self) -> VersionId {
        self.versions
            .iter()
            .map(|v| v.id)
            .max()
            .map(VersionId::next)
            .unwrap_or(VersionId::SEED)
    }

    /// Optimistic insert for an accepted submission: allocates the next id,
    /// derives the new artifact name from the source version's, inserts the
    /// pending entry at the front, and switches selection to it.
    ///
    /// Returns the new version's id.
    pub fn apply_submission(&mut self, summary: &str, source_artifact: &str) -> VersionId {
        let id = self.next_id();
        let artifact_name = versioned_artifact(source_artifact, id);
        self.versions.insert(
            0,
            Version {
                id,
                artifact_name,
                score: 0,
                created_at: None,
                summary: summary.to_string(),
                status: VersionStatus::Generating,
            },
        );
        self.selected = id;
        self.submitting = true;
        id
    }

    /// Marks the submission round-trip finished (accepted or rejected).
    pub fn finish_submission(&mut self) {
        self.submitting = false;
    }

    /// Applies a terminal job outcome to the version with the given id.
    ///
    /// Mutates by id, never by position, so concurrent polls for different
    /// versions cannot touch each other's entries. Idempotent: a version
    /// already in a terminal state is left untouched, so a stray duplicate
    /// tick is harmless. Returns whether anything changed.
    pub fn apply_poll_result(
        &mut self,
        id: VersionId,
        outcome: &VersionOutcome,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(version) = self.versions.iter_mut().find(|v| v.id == id) else {
            return false;
        };
        if version.status.is_terminal() {
            return false;
        }

        match outcome {
            VersionOutcome::Completed {
                score,
                summary,
                artifact_name,
            } => {
                version.score = *score;
                if let Some(summary) = summary {
                    version.summary = summary.clone();
                }
                if let Some(artifact_name) = artifact_name {
                    version.artifact_name = artifact_name.clone();
                }
                version.status = VersionStatus::Completed;
            }
            VersionOutcome::Failed { detail } => {
                version.status = VersionStatus::Error(detail.clone());
            }
        }
        version.created_at = Some(now);
        true
    }

    /// Switches the active version. No-op when the id is not present.
    pub fn select_version(&mut self, id: VersionId) -> bool {
        if self.get(id).is_some() {
            self.selected = id;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seeded(score: u32) -> SessionState {
        SessionState::seed(
            SeedVersion {
                id: VersionId::SEED,
                artifact_name: "Resume_Optimized_v1".to_string(),
                score,
                error: None,
            },
            Utc::now(),
        )
    }

    fn success_response(raw: serde_json::Value) -> JobStatusResponse {
        serde_json::from_value(json!({
            "job_id": "task-1",
            "status": "SUCCESS",
            "result": raw
        }))
        .unwrap()
    }

    #[test]
    fn test_version_id_display_and_parse() {
        assert_eq!(VersionId::new(3).to_string(), "v3");
        assert_eq!("v3".parse::<VersionId>().unwrap(), VersionId::new(3));
        assert_eq!("12".parse::<VersionId>().unwrap(), VersionId::new(12));
        assert!("vFinal".parse::<VersionId>().is_err());
    }

    #[test]
    fn test_seed_with_error_starts_in_error_state() {
        let state = SessionState::seed(
            SeedVersion {
                id: VersionId::SEED,
                artifact_name: "Resume_v1".to_string(),
                score: 0,
                error: Some("LaTeX Error: File not found".to_string()),
            },
            Utc::now(),
        );
        assert_eq!(
            state.selected_version().status.error_detail(),
            Some("LaTeX Error: File not found")
        );
    }

    #[test]
    fn test_n_submissions_yield_n_plus_one_versions_with_unique_increasing_ids() {
        let mut state = seeded(72);
        for i in 0..5 {
            state.apply_submission(&format!("request {i}"), "Resume_Optimized_v1");
            state.finish_submission();
            state.apply_poll_result(
                state.selected_id(),
                &VersionOutcome::Completed {
                    score: 80,
                    summary: None,
                    artifact_name: None,
                },
                Utc::now(),
            );
        }
        assert_eq!(state.versions().len(), 6);

        // Newest first; ids strictly decreasing down the list, all unique.
        let ids: Vec<u32> = state.versions().iter().map(|v| v.id.number()).collect();
        assert_eq!(ids, vec![6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_id_allocation_uses_max_not_length() {
        let mut state = seeded(72);
        // Force a gap by seeding at v1 and inserting two pending versions.
        state.apply_submission("first", "Resume_Optimized_v1");
        state.apply_submission("second", "Resume_Optimized_v2");
        // 3 versions, max id 3 → next must be 4 even though len() is 3.
        assert_eq!(state.next_id(), VersionId::new(4));
    }

    #[test]
    fn test_submission_inserts_generating_version_and_selects_it() {
        let mut state = seeded(72);
        let id = state.apply_submission("Add Python keyword", "Resume_Optimized_v1");

        assert_eq!(id, VersionId::new(2));
        assert_eq!(state.selected_id(), id);
        assert!(state.is_submitting());

        let version = state.get(id).unwrap();
        assert_eq!(version.status, VersionStatus::Generating);
        assert_eq!(version.score, 0);
        assert_eq!(version.created_at, None);
        assert_eq!(version.summary, "Add Python keyword");
        assert_eq!(version.artifact_name, "Resume_Optimized_v2");
        // Newest first.
        assert_eq!(state.versions()[0].id, id);
    }

    #[test]
    fn test_refine_success_scenario() {
        // Seed v1 (score 72), refine, backend reports success with score 85.
        let mut state = seeded(72);
        let id = state.apply_submission("Add Python keyword", "Resume_Optimized_v1");
        state.finish_submission();

        let response = success_response(json!({
            "analysis": { "ats_score": 85 },
            "refinement": { "summary": "Added Python to skills" }
        }));
        let outcome = VersionOutcome::from_status(&response).unwrap();
        assert!(state.apply_poll_result(id, &outcome, Utc::now()));

        let v2 = state.get(id).unwrap();
        assert_eq!(v2.status, VersionStatus::Completed);
        assert_eq!(v2.score, 85);
        assert_eq!(v2.summary, "Added Python to skills");
        assert!(v2.created_at.is_some());
    }

    #[test]
    fn test_job_failure_touches_only_its_target() {
        let mut state = seeded(72);
        let id = state.apply_submission("tighten summary", "Resume_Optimized_v1");

        let outcome = VersionOutcome::Failed {
            detail: "Missing \\usepackage".to_string(),
        };
        state.apply_poll_result(id, &outcome, Utc::now());

        assert_eq!(
            state.get(id).unwrap().status.error_detail(),
            Some("Missing \\usepackage")
        );
        // v1 untouched.
        let v1 = state.get(VersionId::SEED).unwrap();
        assert_eq!(v1.status, VersionStatus::Completed);
        assert_eq!(v1.score, 72);
    }

    #[test]
    fn test_apply_poll_result_is_idempotent() {
        let mut state = seeded(72);
        let id = state.apply_submission("more keywords", "Resume_Optimized_v1");
        let outcome = VersionOutcome::Completed {
            score: 90,
            summary: Some("Added keywords".to_string()),
            artifact_name: Some("Resume_Optimized_v2".to_string()),
        };

        assert!(state.apply_poll_result(id, &outcome, Utc::now()));
        let after_first = state.get(id).unwrap().clone();

        // Stray duplicate tick.
        assert!(!state.apply_poll_result(id, &outcome, Utc::now()));
        let after_second = state.get(id).unwrap();

        assert_eq!(after_second.status, after_first.status);
        assert_eq!(after_second.score, after_first.score);
        assert_eq!(after_second.summary, after_first.summary);
        assert_eq!(after_second.created_at, after_first.created_at);
    }

    #[test]
    fn test_terminal_state_never_reverts() {
        let mut state = seeded(72);
        let id = state.apply_submission("request", "Resume_Optimized_v1");
        state.apply_poll_result(
            id,
            &VersionOutcome::Failed {
                detail: "boom".to_string(),
            },
            Utc::now(),
        );

        // A late success result must not resurrect the version.
        let changed = state.apply_poll_result(
            id,
            &VersionOutcome::Completed {
                score: 99,
                summary: None,
                artifact_name: None,
            },
            Utc::now(),
        );
        assert!(!changed);
        assert!(state.get(id).unwrap().status.error_detail().is_some());
    }

    #[test]
    fn test_select_version_is_pure_and_defensive() {
        let mut state = seeded(72);
        state.apply_submission("request", "Resume_Optimized_v1");
        let before: Vec<Version> = state.versions().to_vec();

        assert!(state.select_version(VersionId::SEED));
        assert_eq!(state.selected_id(), VersionId::SEED);

        // Unknown id: no-op, selection unchanged.
        assert!(!state.select_version(VersionId::new(99)));
        assert_eq!(state.selected_id(), VersionId::SEED);

        // Selection never mutates any version's fields.
        for (before, after) in before.iter().zip(state.versions()) {
            assert_eq!(before.status, after.status);
            assert_eq!(before.score, after.score);
            assert_eq!(before.summary, after.summary);
        }
    }

    #[test]
    fn test_outcome_from_pending_is_none() {
        let response: JobStatusResponse = serde_json::from_value(json!({
            "job_id": "task-1",
            "status": "PENDING"
        }))
        .unwrap();
        assert_eq!(VersionOutcome::from_status(&response), None);
    }

    #[test]
    fn test_outcome_from_failed_uses_backend_error() {
        let response: JobStatusResponse = serde_json::from_value(json!({
            "job_id": "task-1",
            "status": "FAILURE",
            "error": "Missing \\usepackage"
        }))
        .unwrap();
        assert_eq!(
            VersionOutcome::from_status(&response),
            Some(VersionOutcome::Failed {
                detail: "Missing \\usepackage".to_string()
            })
        );
    }

    #[test]
    fn test_outcome_from_failed_defaults_generic_message() {
        let response: JobStatusResponse = serde_json::from_value(json!({
            "job_id": "task-1",
            "status": "failed"
        }))
        .unwrap();
        assert_eq!(
            VersionOutcome::from_status(&response),
            Some(VersionOutcome::Failed {
                detail: "Job failed".to_string()
            })
        );
    }

    #[test]
    fn test_outcome_compile_failure_is_distinct_from_job_failure() {
        // The job process succeeded, the document did not build.
        let response = success_response(json!({
            "analysis": { "ats_score": 80 },
            "compilation": { "success": false, "error": "! Undefined control sequence" }
        }));
        assert_eq!(
            VersionOutcome::from_status(&response),
            Some(VersionOutcome::Failed {
                detail: "! Undefined control sequence".to_string()
            })
        );
    }

    #[test]
    fn test_outcome_success_updates_artifact_name() {
        let response = success_response(json!({
            "analysis": { "ats_score": 88 },
            "compilation": { "success": true, "output_filename": "Resume_Optimized_v2" }
        }));
        assert_eq!(
            VersionOutcome::from_status(&response),
            Some(VersionOutcome::Completed {
                score: 88,
                summary: None,
                artifact_name: Some("Resume_Optimized_v2".to_string()),
            })
        );
    }

    #[test]
    fn test_seed_from_result_prefers_reported_artifact_name() {
        let result: JobResult = serde_json::from_value(json!({
            "optimization": { "final_score": 78, "summary": ["Reordered skills"] },
            "compilation": { "success": true, "output_filename": "Optimized_Resume_v1" },
            "version": "v1"
        }))
        .unwrap();
        let seed = SeedVersion::from_result(&result, "Optimized_Resume");
        assert_eq!(seed.id, VersionId::SEED);
        assert_eq!(seed.artifact_name, "Optimized_Resume_v1");
        assert_eq!(seed.score, 78);
        assert_eq!(seed.error, None);
    }

    #[test]
    fn test_seed_from_result_derives_name_when_unreported() {
        let result: JobResult = serde_json::from_value(json!({
            "optimization": { "final_score": 70 },
            "version": "v3"
        }))
        .unwrap();
        let seed = SeedVersion::from_result(&result, "Optimized_Resume");
        assert_eq!(seed.id, VersionId::new(3));
        assert_eq!(seed.artifact_name, "Optimized_Resume_v3");
    }

    #[test]
    fn test_seed_from_result_carries_compile_error() {
        let result: JobResult = serde_json::from_value(json!({
            "compilation": { "success": false, "error": "LaTeX Error: Missing \\begin{document}" }
        }))
        .unwrap();
        let seed = SeedVersion::from_result(&result, "Optimized_Resume");
        assert_eq!(
            seed.error.as_deref(),
            Some("LaTeX Error: Missing \\begin{document}")
        );
    }

    #[test]
    fn test_selected_version_falls_back_to_first_entry() {
        let mut state = seeded(72);
        state.apply_submission("request", "Resume_Optimized_v1");
        // Force an impossible selection to exercise the fallback.
        state.selected = VersionId::new(42);
        assert_eq!(state.selected_version().id, state.versions()[0].id);
    }
}
