use anyhow::{Context, Result};
use std::time::Duration;
use taskhub_core::WorkerOptions;
use taskhub_models::ReplicaRole;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub orchestration_dispatchers: usize,
    pub activity_dispatchers: usize,
    pub graceful_stop_timeout: Duration,
    pub initial_role: ReplicaRole,
    pub api_url: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys take their defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let server_port = var("TASKHUB_PORT", "8080");
        Ok(Self {
            server_host: var("TASKHUB_HOST", "0.0.0.0"),
            server_port: server_port
                .parse()
                .context("TASKHUB_PORT must be a valid port number")?,
            orchestration_dispatchers: var("TASKHUB_ORCHESTRATION_DISPATCHERS", "5")
                .parse()
                .context("TASKHUB_ORCHESTRATION_DISPATCHERS must be a number")?,
            activity_dispatchers: var("TASKHUB_ACTIVITY_DISPATCHERS", "5")
                .parse()
                .context("TASKHUB_ACTIVITY_DISPATCHERS must be a number")?,
            graceful_stop_timeout: Duration::from_secs(
                var("TASKHUB_GRACEFUL_STOP_SECS", "30")
                    .parse()
                    .context("TASKHUB_GRACEFUL_STOP_SECS must be a number of seconds")?,
            ),
            initial_role: var("TASKHUB_INITIAL_ROLE", "primary")
                .parse()
                .map_err(anyhow::Error::msg)
                .context("TASKHUB_INITIAL_ROLE must be a replica role")?,
            api_url: var("TASKHUB_API_URL", "http://localhost:8080"),
        })
    }

    pub fn worker_options(&self) -> WorkerOptions {
        WorkerOptions {
            orchestration_dispatchers: self.orchestration_dispatchers,
            activity_dispatchers: self.activity_dispatchers,
            graceful_stop_timeout: self.graceful_stop_timeout,
            ..WorkerOptions::default()
        }
    }
}
