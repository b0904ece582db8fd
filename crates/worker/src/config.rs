// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use farm_core::fleet::queue_name;

/// Per-host device-farm worker.
#[derive(Debug, Parser)]
#[command(name = "farm-worker", version, about)]
pub struct Config {
    /// Host number this worker runs on (e.g. HOST01).
    #[arg(long, env = "FARM_HOST_NUMBER", default_value = "HOST01")]
    pub host_number: String,

    /// Broker queue to consume. Defaults to the lower-cased host number.
    #[arg(long, env = "FARM_WORKER_QUEUE")]
    pub queue: Option<String>,

    /// NATS broker URL.
    #[arg(long, env = "FARM_BROKER_URL", default_value = "nats://127.0.0.1:4222")]
    pub broker_url: String,

    /// NATS auth token.
    #[arg(long, env = "FARM_BROKER_TOKEN")]
    pub broker_token: Option<String>,

    /// Controller API base URL (heartbeats).
    #[arg(long, env = "FARM_API_URL", default_value = "http://127.0.0.1:8000")]
    pub api_url: String,

    /// UI-automation server URL.
    #[arg(long, env = "FARM_AUTOMATION_URL", default_value = "http://127.0.0.1:4723")]
    pub automation_url: String,

    /// ADB executable path.
    #[arg(long, env = "FARM_ADB_PATH", default_value = "adb")]
    pub adb_path: String,

    /// ADB command timeout in seconds.
    #[arg(long, env = "FARM_ADB_TIMEOUT", default_value = "30")]
    pub adb_timeout: u64,

    /// Maximum concurrently running device-bound jobs.
    #[arg(long, env = "FARM_MAX_CONCURRENT_ADB", default_value = "5")]
    pub max_concurrent: usize,

    /// APK storage directory.
    #[arg(long, env = "FARM_APK_DIR", default_value = "/opt/farm/apk")]
    pub apk_dir: PathBuf,

    /// Evidence base directory.
    #[arg(long, env = "FARM_EVIDENCE_DIR", default_value = "/tmp/doai-evidence")]
    pub evidence_dir: PathBuf,

    /// Hard time limit for install/device tasks in seconds.
    #[arg(long, env = "FARM_TASK_TIME_LIMIT", default_value = "300")]
    pub task_time_limit: u64,

    /// Hard time limit for YouTube jobs in seconds.
    #[arg(long, env = "FARM_YOUTUBE_TIME_LIMIT", default_value = "660")]
    pub youtube_time_limit: u64,

    /// Whole-task retries for automation jobs.
    #[arg(long, env = "FARM_MAX_RETRIES", default_value = "2")]
    pub max_retries: u32,

    /// Maximum concurrent automation sessions.
    #[arg(long, env = "FARM_MAX_SESSIONS", default_value = "10")]
    pub max_sessions: usize,

    /// First UiAutomator2 service port.
    #[arg(long, env = "FARM_SERVICE_PORT_START", default_value = "8200")]
    pub service_port_start: u16,

    /// Last UiAutomator2 service port (inclusive).
    #[arg(long, env = "FARM_SERVICE_PORT_END", default_value = "8300")]
    pub service_port_end: u16,

    /// Idle session timeout in seconds.
    #[arg(long, env = "FARM_SESSION_IDLE_TIMEOUT", default_value = "300")]
    pub session_idle_timeout: u32,

    /// Log format (json or text).
    #[arg(long, env = "FARM_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "FARM_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.host_number.trim().is_empty() {
            anyhow::bail!("--host-number must not be empty");
        }
        if self.service_port_start >= self.service_port_end {
            anyhow::bail!(
                "service port range is empty: {}..{}",
                self.service_port_start,
                self.service_port_end
            );
        }
        if self.max_concurrent == 0 {
            anyhow::bail!("--max-concurrent must be at least 1");
        }
        if self.max_sessions == 0 {
            anyhow::bail!("--max-sessions must be at least 1");
        }
        Ok(())
    }

    /// Effective queue name: explicit override or the lower-cased host number.
    pub fn effective_queue(&self) -> String {
        self.queue.clone().unwrap_or_else(|| queue_name(&self.host_number))
    }

    pub fn adb_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.adb_timeout)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
