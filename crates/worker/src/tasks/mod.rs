// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task execution adapters: bridge a broker-delivered envelope to the code
//! that does the work, and write the terminal state back as events.

pub mod bot;
pub mod device;
pub mod install;
pub mod youtube;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use farm_core::task::{TaskEnvelope, TaskSpec, TaskStatus};

use crate::adb::Adb;
use crate::report::Reporter;
use crate::session::SessionPool;

/// Everything a task needs from the worker process.
#[derive(Clone)]
pub struct TaskContext {
    pub host_number: String,
    pub queue: String,
    pub adb: Arc<dyn Adb>,
    pub pool: Arc<SessionPool>,
    pub reporter: Arc<dyn Reporter>,
    pub http: reqwest::Client,
    pub automation_url: String,
    pub evidence_dir: PathBuf,
    pub apk_dir: PathBuf,
    /// Whole-task retries for automation jobs.
    pub max_retries: u32,
    /// Fixed back-off between whole-task retries.
    pub retry_backoff: Duration,
}

/// How a task ended.
#[derive(Debug, Clone)]
pub struct Completion {
    pub status: TaskStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl Completion {
    pub fn success(result: Value) -> Self {
        Self { status: TaskStatus::Success, result: Some(result), error: None }
    }

    pub fn failed(error: impl Into<String>, result: Option<Value>) -> Self {
        Self { status: TaskStatus::Failed, result, error: Some(error.into()) }
    }

    pub fn cancelled() -> Self {
        Self { status: TaskStatus::Cancelled, result: None, error: Some("cancelled".into()) }
    }
}

/// Run one envelope to completion and publish its lifecycle events.
pub async fn execute(ctx: &TaskContext, envelope: &TaskEnvelope, cancel: CancellationToken) {
    let task_id = envelope.task_id;
    info!(
        task = %task_id,
        broker_id = %envelope.broker_id,
        kind = %envelope.spec.kind(),
        "task started"
    );
    ctx.reporter.started(task_id).await;

    let completion = run_spec(ctx, envelope, &cancel).await;

    info!(task = %task_id, status = %completion.status, "task finished");
    ctx.reporter
        .finished(task_id, completion.status, completion.result, completion.error)
        .await;
}

async fn run_spec(
    ctx: &TaskContext,
    envelope: &TaskEnvelope,
    cancel: &CancellationToken,
) -> Completion {
    let task_id = envelope.task_id;
    match &envelope.spec {
        TaskSpec::ScanDevices(params) => device::scan_devices(ctx, task_id, params).await,
        TaskSpec::HealthCheck(params) => device::health_check(ctx, task_id, params).await,
        TaskSpec::BatchHealthCheck(params) => {
            device::batch_health_check(ctx, task_id, params).await
        }
        TaskSpec::RebootDevice(params) => device::reboot_device(ctx, task_id, params).await,
        TaskSpec::CollectLogs(params) => device::collect_logs(ctx, task_id, params).await,
        TaskSpec::InstallApk(params) => install::install_apk(ctx, task_id, params, cancel).await,
        TaskSpec::BatchInstall(params) => {
            install::batch_install(ctx, task_id, params, cancel).await
        }
        TaskSpec::UninstallApk(params) => install::uninstall_apk(ctx, task_id, params).await,
        TaskSpec::CheckInstalledApps(params) => {
            install::check_installed_apps(ctx, task_id, params).await
        }
        TaskSpec::InstallAllRequired(params) => {
            install::install_all_required(ctx, task_id, params, cancel).await
        }
        TaskSpec::RunBot(params) => bot::run_bot(ctx, task_id, params).await,
        TaskSpec::StopBot(params) => bot::stop_bot(ctx, task_id, params).await,
        TaskSpec::PushScript(params) => bot::push_script(ctx, task_id, params).await,
        TaskSpec::GetBotLogs(params) => bot::get_bot_logs(ctx, task_id, params).await,
        TaskSpec::RunYoutube(params) => youtube::run_youtube(ctx, task_id, params, cancel).await,
        TaskSpec::StopSession(params) => youtube::stop_session(ctx, params).await,
        TaskSpec::AutomationHealthCheck(_) => youtube::automation_health_check(ctx).await,
    }
}
