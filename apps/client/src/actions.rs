//! Typed wrappers for the backend's action endpoints: analyze, optimize,
//! refine, manual compile, job status, and workflow history.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::ApiClient;
use crate::errors::ClientError;
use crate::files;
use crate::models::analysis::AnalysisReport;
use crate::models::job::{JobResult, JobStatusResponse, JobSubmission};
use crate::models::workflow::WorkflowSummary;
use crate::session::controller::RefinementBackend;
use crate::session::state::VersionId;

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeRequest {
    pub template_filename: String,
    pub profile_filename: String,
    pub job_description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizeRequest {
    pub template_filename: String,
    pub profile_filename: String,
    pub job_description: String,
    /// The analyze result, passed back verbatim.
    pub analysis_result: AnalysisReport,
    pub output_filename: String,
    pub ignored_keywords: Vec<String>,
    pub manual_keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefineRequest {
    pub workflow_id: Uuid,
    /// Id of the version being refined from, e.g. `"v1"`.
    pub current_version: String,
    /// Artifact base name of that source version, without extension.
    pub current_tex_filename: String,
    pub user_request: String,
    pub output_filename: String,
    /// Job description text, re-sent for re-analysis of the refined output.
    pub job_description: String,
    pub target_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompileRequest {
    pub workflow_id: Uuid,
    pub latex_code: String,
    pub target_version: String,
    pub output_filename: String,
}

/// Response of the submission endpoints. Either carries a `job_id` to poll,
/// or the result payload inline on the synchronous path.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub workflow_id: Option<Uuid>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub payload: JobResult,
}

impl SubmitResponse {
    pub fn into_submission(mut self) -> JobSubmission {
        match self.job_id.take() {
            Some(job_id) => JobSubmission::Queued { job_id },
            None => {
                // The outer fields shadow the flattened payload's; carry
                // them over so the synchronous result is self-contained.
                if self.payload.workflow_id.is_none() {
                    self.payload.workflow_id = self.workflow_id;
                }
                if self.payload.version.is_none() {
                    self.payload.version = self.version;
                }
                JobSubmission::Sync(self.payload)
            }
        }
    }
}

pub async fn analyze(api: &ApiClient, req: &AnalyzeRequest) -> Result<AnalysisReport, ClientError> {
    api.post_json("/actions/analyze", req).await
}

pub async fn optimize(api: &ApiClient, req: &OptimizeRequest) -> Result<SubmitResponse, ClientError> {
    api.post_json("/actions/optimize", req).await
}

pub async fn refine(api: &ApiClient, req: &RefineRequest) -> Result<SubmitResponse, ClientError> {
    api.post_json("/actions/refine", req).await
}

pub async fn compile_new_version(
    api: &ApiClient,
    req: &CompileRequest,
) -> Result<SubmitResponse, ClientError> {
    api.post_json("/actions/compile_new_version", req).await
}

pub async fn job_status(api: &ApiClient, job_id: &str) -> Result<JobStatusResponse, ClientError> {
    api.get_json(&format!("/actions/jobs/{job_id}")).await
}

pub async fn recent_jobs(api: &ApiClient) -> Result<Vec<JobStatusResponse>, ClientError> {
    api.get_json("/actions/jobs").await
}

pub async fn workflows(api: &ApiClient) -> Result<Vec<WorkflowSummary>, ClientError> {
    api.get_json("/actions/workflows").await
}

pub async fn workflow_detail(api: &ApiClient, id: Uuid) -> Result<WorkflowSummary, ClientError> {
    api.get_json(&format!("/actions/workflows/{id}")).await
}

/// The live backend is the refinement session's job queue.
#[async_trait]
impl RefinementBackend for ApiClient {
    async fn submit_refinement(&self, req: &RefineRequest) -> Result<JobSubmission, ClientError> {
        Ok(refine(self, req).await?.into_submission())
    }

    async fn submit_compile(&self, req: &CompileRequest) -> Result<JobSubmission, ClientError> {
        Ok(compile_new_version(self, req).await?.into_submission())
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, ClientError> {
        job_status(self, job_id).await
    }

    fn artifact_url(&self, workflow_id: Uuid, version: VersionId, filename: &str) -> String {
        self.shareable_url(&files::artifact_path(workflow_id, &version.to_string(), filename))
    }
}
