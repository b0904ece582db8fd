// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;

/// Device-farm controller API.
#[derive(Debug, Parser)]
#[command(name = "farm-api", version, about)]
pub struct Config {
    /// Host address to bind to.
    #[arg(long, env = "FARM_API_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// HTTP port to listen on.
    #[arg(long, env = "FARM_API_PORT", default_value = "8000")]
    pub port: u16,

    /// NATS broker URL.
    #[arg(long, env = "FARM_BROKER_URL", default_value = "nats://127.0.0.1:4222")]
    pub broker_url: String,

    /// NATS auth token.
    #[arg(long, env = "FARM_BROKER_TOKEN")]
    pub broker_token: Option<String>,

    /// State snapshot path. Without it, state lives only in memory.
    #[arg(long, env = "FARM_STATE_PATH")]
    pub state_path: Option<PathBuf>,

    /// UI-automation server URL for the `/api/appium/*` probes.
    #[arg(long, env = "FARM_AUTOMATION_URL", default_value = "http://127.0.0.1:4723")]
    pub automation_url: String,

    /// Queue asked for session-pool metrics.
    #[arg(long, env = "FARM_METRICS_QUEUE", default_value = "host01")]
    pub metrics_queue: String,

    /// Log format (json or text).
    #[arg(long, env = "FARM_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "FARM_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.port == 0 {
            anyhow::bail!("--port must be non-zero");
        }
        if self.metrics_queue.trim().is_empty() {
            anyhow::bail!("--metrics-queue must not be empty");
        }
        Ok(())
    }
}
