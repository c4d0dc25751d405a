#![allow(dead_code)]

use thiserror::Error;

/// Client-level error type for everything that crosses the HTTP boundary.
///
/// Errors inside a refinement session (submission rejected, job failed,
/// compilation failed, poll timeout) are *not* represented here — the session
/// controller resolves those by moving the affected version into its error
/// state, and the shell only ever reads version state.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Not authenticated — log in first")]
    Unauthenticated,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timed out waiting for job {job_id} after {seconds}s")]
    JobTimeout { job_id: String, seconds: u64 },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// True when retrying the same request might succeed (rate limit or
    /// server-side hiccup). Mirrors the retry predicate in `api::ApiClient`.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Http(e) => e.is_timeout() || e.is_connect(),
            ClientError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
