use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unified job state. The backend reports Celery states (`PENDING`,
/// `SUCCESS`, `FAILURE`) for live tasks and lowercase db states
/// (`processing`, `completed`, `failed`) for recorded ones; both vocabularies
/// collapse onto this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Success,
    Failed,
}

impl JobState {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "success" | "completed" => JobState::Success,
            "failed" | "failure" => JobState::Failed,
            _ => JobState::Pending,
        }
    }

    pub fn is_terminal(self) -> bool {
        self != JobState::Pending
    }
}

/// Response shape of `GET /actions/jobs/{job_id}` (and the entries of
/// `GET /actions/jobs`).
#[derive(Debug, Clone, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: String,
    #[serde(default)]
    pub result: Option<JobResult>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub workflow_id: Option<Uuid>,
}

impl JobStatusResponse {
    pub fn state(&self) -> JobState {
        JobState::parse(&self.status)
    }
}

/// How the backend accepted a job submission: queued with an id to poll, or
/// answered synchronously (the legacy path, still used by manual compile).
#[derive(Debug, Clone)]
pub enum JobSubmission {
    Queued { job_id: String },
    Sync(JobResult),
}

/// Payload produced by the optimize/refine worker tasks. Every section is
/// optional: optimize jobs carry `optimization`, refine jobs carry
/// `analysis` + `refinement`, and both carry `compilation`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobResult {
    #[serde(default)]
    pub analysis: Option<AnalysisSummary>,
    #[serde(default)]
    pub refinement: Option<RefinementSummary>,
    #[serde(default)]
    pub optimization: Option<OptimizationReport>,
    #[serde(default)]
    pub compilation: Option<CompilationReport>,
    #[serde(default)]
    pub workflow_id: Option<Uuid>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl JobResult {
    /// Whether the generated document itself built. An absent compilation
    /// section counts as success — only an explicit `success: false` means
    /// the document failed to compile.
    pub fn compiled_ok(&self) -> bool {
        self.compilation.as_ref().map_or(true, |c| c.success)
    }

    /// Best available quality score for this result.
    pub fn score(&self) -> u32 {
        if let Some(analysis) = &self.analysis {
            return analysis.ats_score;
        }
        if let Some(optimization) = &self.optimization {
            return optimization.final_score;
        }
        0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisSummary {
    #[serde(default)]
    pub ats_score: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefinementSummary {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub final_score: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptimizationReport {
    #[serde(default)]
    pub final_score: u32,
    #[serde(default)]
    pub summary: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilationReport {
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default)]
    pub output_filename: Option<String>,
    #[serde(default)]
    pub pdf_path: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for CompilationReport {
    fn default() -> Self {
        CompilationReport {
            success: true,
            output_filename: None,
            pdf_path: None,
            error: None,
        }
    }
}
