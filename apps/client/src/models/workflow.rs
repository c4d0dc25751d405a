#![allow(dead_code)]

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::models::job::JobResult;

/// One row of `GET /actions/workflows` — a workflow plus its recorded jobs.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowSummary {
    pub id: Uuid,
    #[serde(default)]
    pub job_description: String,
    #[serde(default)]
    pub template_filename: Option<String>,
    #[serde(default)]
    pub profile_filename: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub jobs: Vec<JobRecord>,
}

/// A recorded job attempt inside a workflow.
#[derive(Debug, Clone, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub result_data: Option<JobResult>,
    #[serde(default)]
    pub error_message: Option<String>,
}
