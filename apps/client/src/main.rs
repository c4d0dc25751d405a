mod actions;
mod api;
mod auth;
mod config;
mod errors;
mod files;
mod models;
mod session;
mod shell;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::api::ApiClient;
use crate::config::Config;
use crate::session::poll::PollConfig;
use crate::shell::Shell;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Resume Studio client v{}", env!("CARGO_PKG_VERSION"));

    let api = Arc::new(ApiClient::new(
        &config.api_base_url,
        Duration::from_secs(config.request_timeout_secs),
    )?);
    info!("API client initialized ({})", config.api_base_url);

    let poll = PollConfig::from_config(&config);

    let mut shell = Shell::new(api, poll)?;
    shell.run().await
}
