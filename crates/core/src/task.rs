// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task wire contract: kinds, lifecycle statuses, the persisted record, and
//! the broker envelope with its typed parameter records.
//!
//! Task kinds keep their dotted wire names so routing and observability read
//! the same on both sides of the broker. Parameter records reject unknown
//! fields — a mis-built payload fails at the edge, not inside a job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Task lifecycle status.
///
/// Transitions: `pending → running → {success, failed, cancelled}`, with
/// `pending → retrying → running` loops on worker-level retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failed,
    Retrying,
    Cancelled,
}

impl TaskStatus {
    /// A terminal status is never followed by a non-terminal one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Retrying => "retrying",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispatchable task kinds, named by their dotted wire path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    #[serde(rename = "tasks.device_tasks.scan_devices")]
    ScanDevices,
    #[serde(rename = "tasks.device_tasks.health_check")]
    HealthCheck,
    #[serde(rename = "tasks.device_tasks.batch_health_check")]
    BatchHealthCheck,
    #[serde(rename = "tasks.device_tasks.reboot_device")]
    RebootDevice,
    #[serde(rename = "tasks.device_tasks.collect_logs")]
    CollectLogs,
    #[serde(rename = "tasks.install_tasks.install_apk")]
    InstallApk,
    #[serde(rename = "tasks.install_tasks.batch_install")]
    BatchInstall,
    #[serde(rename = "tasks.install_tasks.uninstall_apk")]
    UninstallApk,
    #[serde(rename = "tasks.install_tasks.check_installed_apps")]
    CheckInstalledApps,
    #[serde(rename = "tasks.install_tasks.install_all_required")]
    InstallAllRequired,
    #[serde(rename = "tasks.youtube_tasks.run_bot")]
    RunBot,
    #[serde(rename = "tasks.youtube_tasks.stop_bot")]
    StopBot,
    #[serde(rename = "tasks.youtube_tasks.push_script")]
    PushScript,
    #[serde(rename = "tasks.youtube_tasks.get_bot_logs")]
    GetBotLogs,
    #[serde(rename = "tasks.appium_tasks.run_youtube")]
    RunYoutube,
    #[serde(rename = "tasks.appium_tasks.stop_session")]
    StopSession,
    #[serde(rename = "tasks.appium_tasks.health_check")]
    AutomationHealthCheck,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScanDevices => "tasks.device_tasks.scan_devices",
            Self::HealthCheck => "tasks.device_tasks.health_check",
            Self::BatchHealthCheck => "tasks.device_tasks.batch_health_check",
            Self::RebootDevice => "tasks.device_tasks.reboot_device",
            Self::CollectLogs => "tasks.device_tasks.collect_logs",
            Self::InstallApk => "tasks.install_tasks.install_apk",
            Self::BatchInstall => "tasks.install_tasks.batch_install",
            Self::UninstallApk => "tasks.install_tasks.uninstall_apk",
            Self::CheckInstalledApps => "tasks.install_tasks.check_installed_apps",
            Self::InstallAllRequired => "tasks.install_tasks.install_all_required",
            Self::RunBot => "tasks.youtube_tasks.run_bot",
            Self::StopBot => "tasks.youtube_tasks.stop_bot",
            Self::PushScript => "tasks.youtube_tasks.push_script",
            Self::GetBotLogs => "tasks.youtube_tasks.get_bot_logs",
            Self::RunYoutube => "tasks.appium_tasks.run_youtube",
            Self::StopSession => "tasks.appium_tasks.stop_session",
            Self::AutomationHealthCheck => "tasks.appium_tasks.health_check",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// -- Parameter records --------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanDevicesParams {
    pub host_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthCheckParams {
    pub device_id: Uuid,
    pub serial: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchHealthCheckParams {
    pub host_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RebootDeviceParams {
    pub serial: String,
    #[serde(default)]
    pub device_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectLogsParams {
    pub host_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstallApkParams {
    pub serial: String,
    pub apk_name: String,
    #[serde(default)]
    pub device_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchInstallParams {
    pub apk_name: String,
    /// Explicit target serials; when absent the worker installs on every
    /// device currently visible to its ADB server.
    #[serde(default)]
    pub serials: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UninstallApkParams {
    pub serial: String,
    pub package_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckInstalledAppsParams {
    pub serial: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstallAllRequiredParams {
    pub serial: String,
    #[serde(default)]
    pub device_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunBotParams {
    pub serial: String,
    pub script_name: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub device_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StopBotParams {
    pub serial: String,
    #[serde(default)]
    pub device_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PushScriptParams {
    pub serial: String,
    pub local_path: String,
    #[serde(default)]
    pub script_name: Option<String>,
}

fn default_log_lines() -> u32 {
    100
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetBotLogsParams {
    pub serial: String,
    #[serde(default = "default_log_lines")]
    pub lines: u32,
}

fn default_duration_sec() -> u32 {
    180
}

fn default_duration_min_pct() -> u8 {
    30
}

fn default_duration_max_pct() -> u8 {
    90
}

/// Parameters for one YouTube viewing assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct YoutubeJobParams {
    /// Device identifier the session is keyed by (`ip:port` or serial).
    pub device_udid: String,
    pub assignment_id: String,
    #[serde(default)]
    pub target_url: Option<String>,
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub video_title: Option<String>,
    #[serde(default = "default_duration_sec")]
    pub duration_sec: u32,
    #[serde(default = "default_duration_min_pct")]
    pub duration_min_pct: u8,
    #[serde(default = "default_duration_max_pct")]
    pub duration_max_pct: u8,
    #[serde(default)]
    pub prob_like: u8,
    #[serde(default)]
    pub prob_comment: u8,
    #[serde(default)]
    pub prob_subscribe: u8,
    #[serde(default)]
    pub prob_playlist: u8,
    #[serde(default)]
    pub comment_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StopSessionParams {
    pub device_udid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AutomationHealthCheckParams {}

// -- Envelope -----------------------------------------------------------------

/// Kind-tagged task body. The tag value is the dotted wire name, so a raw
/// broker message reads the same as a Celery task did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum TaskSpec {
    #[serde(rename = "tasks.device_tasks.scan_devices")]
    ScanDevices(ScanDevicesParams),
    #[serde(rename = "tasks.device_tasks.health_check")]
    HealthCheck(HealthCheckParams),
    #[serde(rename = "tasks.device_tasks.batch_health_check")]
    BatchHealthCheck(BatchHealthCheckParams),
    #[serde(rename = "tasks.device_tasks.reboot_device")]
    RebootDevice(RebootDeviceParams),
    #[serde(rename = "tasks.device_tasks.collect_logs")]
    CollectLogs(CollectLogsParams),
    #[serde(rename = "tasks.install_tasks.install_apk")]
    InstallApk(InstallApkParams),
    #[serde(rename = "tasks.install_tasks.batch_install")]
    BatchInstall(BatchInstallParams),
    #[serde(rename = "tasks.install_tasks.uninstall_apk")]
    UninstallApk(UninstallApkParams),
    #[serde(rename = "tasks.install_tasks.check_installed_apps")]
    CheckInstalledApps(CheckInstalledAppsParams),
    #[serde(rename = "tasks.install_tasks.install_all_required")]
    InstallAllRequired(InstallAllRequiredParams),
    #[serde(rename = "tasks.youtube_tasks.run_bot")]
    RunBot(RunBotParams),
    #[serde(rename = "tasks.youtube_tasks.stop_bot")]
    StopBot(StopBotParams),
    #[serde(rename = "tasks.youtube_tasks.push_script")]
    PushScript(PushScriptParams),
    #[serde(rename = "tasks.youtube_tasks.get_bot_logs")]
    GetBotLogs(GetBotLogsParams),
    #[serde(rename = "tasks.appium_tasks.run_youtube")]
    RunYoutube(YoutubeJobParams),
    #[serde(rename = "tasks.appium_tasks.stop_session")]
    StopSession(StopSessionParams),
    #[serde(rename = "tasks.appium_tasks.health_check")]
    AutomationHealthCheck(AutomationHealthCheckParams),
}

impl TaskSpec {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::ScanDevices(_) => TaskKind::ScanDevices,
            Self::HealthCheck(_) => TaskKind::HealthCheck,
            Self::BatchHealthCheck(_) => TaskKind::BatchHealthCheck,
            Self::RebootDevice(_) => TaskKind::RebootDevice,
            Self::CollectLogs(_) => TaskKind::CollectLogs,
            Self::InstallApk(_) => TaskKind::InstallApk,
            Self::BatchInstall(_) => TaskKind::BatchInstall,
            Self::UninstallApk(_) => TaskKind::UninstallApk,
            Self::CheckInstalledApps(_) => TaskKind::CheckInstalledApps,
            Self::InstallAllRequired(_) => TaskKind::InstallAllRequired,
            Self::RunBot(_) => TaskKind::RunBot,
            Self::StopBot(_) => TaskKind::StopBot,
            Self::PushScript(_) => TaskKind::PushScript,
            Self::GetBotLogs(_) => TaskKind::GetBotLogs,
            Self::RunYoutube(_) => TaskKind::RunYoutube,
            Self::StopSession(_) => TaskKind::StopSession,
            Self::AutomationHealthCheck(_) => TaskKind::AutomationHealthCheck,
        }
    }
}

/// One broker message: identity plus the typed body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub task_id: Uuid,
    pub broker_id: String,
    pub queue: String,
    #[serde(flatten)]
    pub spec: TaskSpec,
}

// -- Persisted record ---------------------------------------------------------

/// One row of the `tasks` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Uuid,
    pub broker_id: String,
    pub kind: TaskKind,
    pub queue: String,
    #[serde(default)]
    pub device_id: Option<Uuid>,
    #[serde(default)]
    pub host_id: Option<Uuid>,
    pub status: TaskStatus,
    pub payload: Value,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub progress_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
}

/// Aggregated counts over the task table (the `task_stats` view).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStats {
    pub total: u64,
    pub pending: u64,
    pub running: u64,
    pub success: u64,
    pub failed: u64,
    pub retrying: u64,
    pub cancelled: u64,
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
