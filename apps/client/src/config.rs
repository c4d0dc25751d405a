use anyhow::{Context, Result};

/// Client configuration loaded from environment variables.
/// `API_BASE_URL` is required; everything else has a sensible default.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend base URL including the API prefix, e.g. `http://localhost:8000/api/v1`.
    pub api_base_url: String,
    /// Per-request timeout for the HTTP client, in seconds.
    pub request_timeout_secs: u64,
    /// Initial job-poll interval, in milliseconds.
    pub poll_interval_ms: u64,
    /// Cap for the backed-off poll interval, in milliseconds.
    pub poll_max_interval_ms: u64,
    /// Overall budget for a single job poll before it is abandoned, in seconds.
    pub poll_timeout_secs: u64,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            api_base_url: require_env("API_BASE_URL")?
                .trim_end_matches('/')
                .to_string(),
            request_timeout_secs: parse_env("REQUEST_TIMEOUT_SECS", 30)?,
            poll_interval_ms: parse_env("POLL_INTERVAL_MS", 2_000)?,
            poll_max_interval_ms: parse_env("POLL_MAX_INTERVAL_MS", 15_000)?,
            poll_timeout_secs: parse_env("POLL_TIMEOUT_SECS", 300)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env(key: &str, default: u64) -> Result<u64> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("'{key}' must be a positive integer")),
        Err(_) => Ok(default),
    }
}
