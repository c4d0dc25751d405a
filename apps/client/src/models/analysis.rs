use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of the analyze step: keyword match report for a template/profile
/// pair against a job description.
///
/// Fields beyond the ones the client renders are kept in `extra` so the full
/// payload round-trips into the optimize request unchanged (the backend
/// expects its own analysis back, verbatim).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    #[serde(default)]
    pub ats_score: u32,
    #[serde(default)]
    pub matched_keywords: Vec<String>,
    #[serde(default)]
    pub missing_keywords: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}
