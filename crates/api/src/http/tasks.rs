// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task listing and the dispatch endpoints.
//!
//! Every dispatch endpoint validates its target, resolves the queue from the
//! owning host's number, and returns `{task_id, broker_id}` without waiting
//! for the work.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use farm_core::fleet::{queue_name, Device, DeviceStatus};
use farm_core::task::{
    AutomationHealthCheckParams, BatchHealthCheckParams, BatchInstallParams, HealthCheckParams,
    InstallApkParams, RunBotParams, ScanDevicesParams, StopBotParams, StopSessionParams,
    TaskKind, TaskRecord, TaskSpec, TaskStatus, YoutubeJobParams,
};

use crate::error::ApiError;
use crate::store::{Page, TaskFilter};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct TaskListQuery {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub task_name: Option<TaskKind>,
    #[serde(default)]
    pub device_id: Option<Uuid>,
    #[serde(default)]
    pub host_id: Option<Uuid>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub queue_name: Option<String>,
    #[serde(default)]
    pub created_after: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_before: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub items: Vec<TaskRecord>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

/// `GET /api/tasks`
pub async fn list_tasks(
    State(s): State<Arc<AppState>>,
    Query(query): Query<TaskListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = Page {
        page: query.page.unwrap_or(1),
        page_size: query.page_size.unwrap_or(50).min(200),
    };
    let filter = TaskFilter {
        kind: query.task_name,
        device_id: query.device_id,
        host_id: query.host_id,
        status: query.status,
        queue: query.queue_name.map(|q| q.to_lowercase()),
        created_after: query.created_after,
        created_before: query.created_before,
    };
    let (items, total) = s.store.list_tasks(filter, page).await?;
    Ok(Json(TaskListResponse { items, total, page: page.page, page_size: page.page_size }))
}

/// `GET /api/tasks/stats`
pub async fn task_stats(State(s): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(s.store.task_stats().await?))
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// `GET /api/tasks/recent`
pub async fn recent_tasks(
    State(s): State<Arc<AppState>>,
    Query(query): Query<RecentQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let items = s.store.recent_tasks(query.limit.unwrap_or(20).min(100)).await?;
    let total = items.len();
    Ok(Json(serde_json::json!({ "items": items, "total": total })))
}

/// `GET /api/tasks/{id}`
pub async fn get_task(
    State(s): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let task = s
        .store
        .get_task(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".into()))?;
    Ok(Json(task))
}

/// `GET /api/tasks/{id}/celery-status`
pub async fn celery_status(
    State(s): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(s.dispatcher.celery_status(id).await?))
}

/// `POST /api/tasks/{id}/cancel`
pub async fn cancel_task(
    State(s): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(s.dispatcher.cancel(id).await?))
}

// -- Dispatch helpers ---------------------------------------------------------

/// Resolve a device that must be assigned to a host; returns the queue too.
async fn assigned_device(s: &AppState, device_id: Uuid) -> Result<(Device, String), ApiError> {
    let device = s
        .store
        .get_device(device_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Device not found".into()))?;
    let host_number = device
        .host_number
        .clone()
        .ok_or_else(|| ApiError::BadRequest("device is not assigned to a host".into()))?;
    Ok((device, queue_name(&host_number)))
}

fn require_serial(device: &Device) -> Result<String, ApiError> {
    device
        .serial
        .clone()
        .ok_or_else(|| ApiError::BadRequest("device has no ADB serial".into()))
}

fn require_online(device: &Device) -> Result<(), ApiError> {
    if device.status != DeviceStatus::Online {
        return Err(ApiError::BadRequest(format!(
            "device is {} — must be online",
            device.status.as_str()
        )));
    }
    Ok(())
}

/// Resolve a host by id or number from a dispatch body.
async fn resolve_host(
    s: &AppState,
    host_id: Option<Uuid>,
    host_number: Option<&str>,
) -> Result<farm_core::fleet::Host, ApiError> {
    if let Some(id) = host_id {
        return s
            .store
            .get_host(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Host not found".into()));
    }
    if let Some(number) = host_number {
        let number = number.to_uppercase();
        return s
            .store
            .get_host_by_number(&number)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Host {number} not found")));
    }
    Err(ApiError::BadRequest("host_id or host_number is required".into()))
}

// -- Dispatch endpoints -------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct InstallRequest {
    pub device_id: Uuid,
    pub apk_name: String,
}

/// `POST /api/tasks/install`
pub async fn dispatch_install(
    State(s): State<Arc<AppState>>,
    Json(body): Json<InstallRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (device, queue) = assigned_device(&s, body.device_id).await?;
    let serial = require_serial(&device)?;
    let ack = s
        .dispatcher
        .dispatch(
            &queue,
            TaskSpec::InstallApk(InstallApkParams {
                serial,
                apk_name: body.apk_name,
                device_id: Some(device.id),
            }),
            Some(device.id),
            device.host_id,
        )
        .await?;
    Ok(Json(ack))
}

#[derive(Debug, Deserialize)]
pub struct BatchInstallRequest {
    #[serde(default)]
    pub host_id: Option<Uuid>,
    #[serde(default)]
    pub host_number: Option<String>,
    pub apk_name: String,
    #[serde(default)]
    pub serials: Option<Vec<String>>,
}

/// `POST /api/tasks/batch-install`
pub async fn dispatch_batch_install(
    State(s): State<Arc<AppState>>,
    Json(body): Json<BatchInstallRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let host = resolve_host(&s, body.host_id, body.host_number.as_deref()).await?;
    let ack = s
        .dispatcher
        .dispatch(
            &host.queue(),
            TaskSpec::BatchInstall(BatchInstallParams {
                apk_name: body.apk_name,
                serials: body.serials,
            }),
            None,
            Some(host.id),
        )
        .await?;
    Ok(Json(ack))
}

#[derive(Debug, Deserialize)]
pub struct DeviceTargetRequest {
    pub device_id: Uuid,
}

/// `POST /api/tasks/health-check`
pub async fn dispatch_health_check(
    State(s): State<Arc<AppState>>,
    Json(body): Json<DeviceTargetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (device, queue) = assigned_device(&s, body.device_id).await?;
    let serial = require_serial(&device)?;
    let ack = s
        .dispatcher
        .dispatch(
            &queue,
            TaskSpec::HealthCheck(HealthCheckParams { device_id: device.id, serial }),
            Some(device.id),
            device.host_id,
        )
        .await?;
    Ok(Json(ack))
}

#[derive(Debug, Deserialize)]
pub struct HostTargetRequest {
    #[serde(default)]
    pub host_id: Option<Uuid>,
    #[serde(default)]
    pub host_number: Option<String>,
}

/// `POST /api/tasks/batch-health-check`
pub async fn dispatch_batch_health_check(
    State(s): State<Arc<AppState>>,
    Json(body): Json<HostTargetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let host = resolve_host(&s, body.host_id, body.host_number.as_deref()).await?;
    let ack = s
        .dispatcher
        .dispatch(
            &host.queue(),
            TaskSpec::BatchHealthCheck(BatchHealthCheckParams {
                host_number: host.number.clone(),
            }),
            None,
            Some(host.id),
        )
        .await?;
    Ok(Json(ack))
}

/// `POST /api/tasks/scan-devices`
pub async fn dispatch_scan_devices(
    State(s): State<Arc<AppState>>,
    Json(body): Json<HostTargetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let host = resolve_host(&s, body.host_id, body.host_number.as_deref()).await?;
    let ack = s
        .dispatcher
        .dispatch(
            &host.queue(),
            TaskSpec::ScanDevices(ScanDevicesParams { host_number: host.number.clone() }),
            None,
            Some(host.id),
        )
        .await?;
    Ok(Json(ack))
}

#[derive(Debug, Deserialize)]
pub struct RunBotRequest {
    pub device_id: Uuid,
    #[serde(default = "default_script_name")]
    pub script_name: String,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
}

fn default_script_name() -> String {
    "youtube_bot.js".to_owned()
}

/// `POST /api/tasks/run-bot`
pub async fn dispatch_run_bot(
    State(s): State<Arc<AppState>>,
    Json(body): Json<RunBotRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (device, queue) = assigned_device(&s, body.device_id).await?;
    require_online(&device)?;
    let serial = require_serial(&device)?;
    let ack = s
        .dispatcher
        .dispatch(
            &queue,
            TaskSpec::RunBot(RunBotParams {
                serial,
                script_name: body.script_name,
                params: body.params,
                device_id: Some(device.id),
            }),
            Some(device.id),
            device.host_id,
        )
        .await?;
    Ok(Json(ack))
}

/// `POST /api/tasks/stop-bot` — takes a JSON body like every other dispatch
/// endpoint.
pub async fn dispatch_stop_bot(
    State(s): State<Arc<AppState>>,
    Json(body): Json<DeviceTargetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (device, queue) = assigned_device(&s, body.device_id).await?;
    let serial = require_serial(&device)?;
    let ack = s
        .dispatcher
        .dispatch(
            &queue,
            TaskSpec::StopBot(StopBotParams { serial, device_id: Some(device.id) }),
            Some(device.id),
            device.host_id,
        )
        .await?;
    Ok(Json(ack))
}

#[derive(Debug, Deserialize)]
pub struct RunAppiumBotRequest {
    pub device_id: Uuid,
    pub assignment_id: String,
    #[serde(default)]
    pub target_url: Option<String>,
    #[serde(default)]
    pub keyword: Option<String>,
    #[serde(default)]
    pub video_title: Option<String>,
    #[serde(default)]
    pub duration_sec: Option<u32>,
    #[serde(default)]
    pub duration_min_pct: Option<u8>,
    #[serde(default)]
    pub duration_max_pct: Option<u8>,
    #[serde(default)]
    pub prob_like: Option<u8>,
    #[serde(default)]
    pub prob_comment: Option<u8>,
    #[serde(default)]
    pub prob_subscribe: Option<u8>,
    #[serde(default)]
    pub prob_playlist: Option<u8>,
    #[serde(default)]
    pub comment_text: Option<String>,
}

/// `POST /api/tasks/run-appium-bot`
pub async fn dispatch_run_appium_bot(
    State(s): State<Arc<AppState>>,
    Json(body): Json<RunAppiumBotRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (device, queue) = assigned_device(&s, body.device_id).await?;
    require_online(&device)?;
    let udid = device
        .udid()
        .map(str::to_owned)
        .ok_or_else(|| ApiError::BadRequest("device has no serial or address".into()))?;

    let params = YoutubeJobParams {
        device_udid: udid,
        assignment_id: body.assignment_id,
        target_url: body.target_url,
        keyword: body.keyword,
        video_title: body.video_title,
        duration_sec: body.duration_sec.unwrap_or(180),
        duration_min_pct: body.duration_min_pct.unwrap_or(30),
        duration_max_pct: body.duration_max_pct.unwrap_or(90),
        prob_like: body.prob_like.unwrap_or(0),
        prob_comment: body.prob_comment.unwrap_or(0),
        prob_subscribe: body.prob_subscribe.unwrap_or(0),
        prob_playlist: body.prob_playlist.unwrap_or(0),
        comment_text: body.comment_text,
    };

    let ack = s
        .dispatcher
        .dispatch(&queue, TaskSpec::RunYoutube(params), Some(device.id), device.host_id)
        .await?;
    Ok(Json(ack))
}

/// `POST /api/tasks/stop-appium-session`
pub async fn dispatch_stop_appium_session(
    State(s): State<Arc<AppState>>,
    Json(body): Json<DeviceTargetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (device, queue) = assigned_device(&s, body.device_id).await?;
    let udid = device
        .udid()
        .map(str::to_owned)
        .ok_or_else(|| ApiError::BadRequest("device has no serial or address".into()))?;
    let ack = s
        .dispatcher
        .dispatch(
            &queue,
            TaskSpec::StopSession(StopSessionParams { device_udid: udid }),
            Some(device.id),
            device.host_id,
        )
        .await?;
    Ok(Json(ack))
}

/// `POST /api/tasks/appium-health-check`
pub async fn dispatch_appium_health_check(
    State(s): State<Arc<AppState>>,
    Json(body): Json<HostTargetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let host = resolve_host(&s, body.host_id, body.host_number.as_deref()).await?;
    let ack = s
        .dispatcher
        .dispatch(
            &host.queue(),
            TaskSpec::AutomationHealthCheck(AutomationHealthCheckParams::default()),
            None,
            Some(host.id),
        )
        .await?;
    Ok(Json(ack))
}
