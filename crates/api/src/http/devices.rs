// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device management handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use farm_core::fleet::{queue_name, ConnectionKind, Device, DeviceStatus};
use farm_core::task::{ScanDevicesParams, TaskSpec};

use crate::error::ApiError;
use crate::store::{DeviceFilter, DeviceUpdate, NewDevice, Page};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct DeviceListQuery {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub host_id: Option<Uuid>,
    #[serde(default)]
    pub host_number: Option<String>,
    #[serde(default)]
    pub status: Option<DeviceStatus>,
    #[serde(default)]
    pub connection_type: Option<ConnectionKind>,
    #[serde(default)]
    pub unassigned_only: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct DeviceListResponse {
    pub items: Vec<Device>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub device_id: Uuid,
    pub host_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct BulkRegisterRequest {
    pub host_id: Uuid,
}

/// `GET /api/devices`
pub async fn list_devices(
    State(s): State<Arc<AppState>>,
    Query(query): Query<DeviceListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = Page {
        page: query.page.unwrap_or(1),
        page_size: query.page_size.unwrap_or(50).min(200),
    };
    let filter = DeviceFilter {
        host_id: query.host_id,
        host_number: query.host_number.map(|n| n.to_uppercase()),
        status: query.status,
        connection: query.connection_type,
        unassigned_only: query.unassigned_only.unwrap_or(false),
    };
    let (items, total) = s.store.list_devices(filter, page).await?;
    Ok(Json(DeviceListResponse { items, total, page: page.page, page_size: page.page_size }))
}

/// `POST /api/devices` — requires serial or address.
pub async fn create_device(
    State(s): State<Arc<AppState>>,
    Json(body): Json<NewDevice>,
) -> Result<impl IntoResponse, ApiError> {
    if body.serial.is_none() && body.address.is_none() {
        return Err(ApiError::BadRequest("either serial or address is required".into()));
    }
    let device = s.store.create_device(body).await?;
    Ok((StatusCode::CREATED, Json(device)))
}

/// `GET /api/devices/by-code/{code}`
pub async fn get_device_by_code(
    State(s): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let code = code.to_uppercase();
    let device = s
        .store
        .get_device_by_code(&code)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Device {code} not found")))?;
    Ok(Json(device))
}

/// `GET /api/devices/by-serial/{serial}`
pub async fn get_device_by_serial(
    State(s): State<Arc<AppState>>,
    Path(serial): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let device = s
        .store
        .get_device_by_serial(&serial)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Device with serial {serial} not found")))?;
    Ok(Json(device))
}

/// `GET /api/devices/by-ip/{ip}`
pub async fn get_device_by_ip(
    State(s): State<Arc<AppState>>,
    Path(ip): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let device = s
        .store
        .get_device_by_ip(&ip)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Device with IP {ip} not found")))?;
    Ok(Json(device))
}

/// `GET /api/devices/{id}`
pub async fn get_device(
    State(s): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let device = s
        .store
        .get_device(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Device not found".into()))?;
    Ok(Json(device))
}

/// `PATCH /api/devices/{id}`
pub async fn update_device(
    State(s): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<DeviceUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(s.store.update_device(id, body).await?))
}

/// `DELETE /api/devices/{id}`
pub async fn delete_device(
    State(s): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    s.store.delete_device(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/devices/assign` — the ordinal is allocated automatically.
pub async fn assign_device(
    State(s): State<Arc<AppState>>,
    Json(body): Json<AssignRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(s.store.assign_device(body.device_id, body.host_id).await?))
}

/// `POST /api/devices/{id}/unassign`
pub async fn unassign_device(
    State(s): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(s.store.unassign_device(id).await?))
}

/// `POST /api/devices/bulk-register` — dispatches a scan task to the host's
/// worker; registration happens as scan results flow back.
pub async fn bulk_register(
    State(s): State<Arc<AppState>>,
    Json(body): Json<BulkRegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let host = s
        .store
        .get_host(body.host_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Host not found".into()))?;

    let ack = s
        .dispatcher
        .dispatch(
            &queue_name(&host.number),
            TaskSpec::ScanDevices(ScanDevicesParams { host_number: host.number.clone() }),
            None,
            Some(host.id),
        )
        .await?;

    Ok(Json(serde_json::json!({
        "message": "Scan task dispatched",
        "task_id": ack.task_id,
        "broker_id": ack.broker_id,
    })))
}

/// `GET /api/devices/online/list`
pub async fn online_devices(
    State(s): State<Arc<AppState>>,
    Query(query): Query<OnlineQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let items = s.store.online_devices(query.host_id).await?;
    let total = items.len();
    Ok(Json(serde_json::json!({ "items": items, "total": total })))
}

#[derive(Debug, Deserialize)]
pub struct OnlineQuery {
    #[serde(default)]
    pub host_id: Option<Uuid>,
}
