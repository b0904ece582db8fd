// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host management handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use farm_core::fleet::{Device, Host, HostStatus};

use crate::error::ApiError;
use crate::store::{HostUpdate, NewHost, Page};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct HostListQuery {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub status: Option<HostStatus>,
}

#[derive(Debug, Serialize)]
pub struct HostListResponse {
    pub items: Vec<Host>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Serialize)]
pub struct HostWithDevices {
    #[serde(flatten)]
    pub host: Host,
    pub devices: Vec<Device>,
    pub device_count: usize,
}

/// `GET /api/hosts`
pub async fn list_hosts(
    State(s): State<Arc<AppState>>,
    Query(query): Query<HostListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = Page {
        page: query.page.unwrap_or(1),
        page_size: query.page_size.unwrap_or(20).min(100),
    };
    let (items, total) = s.store.list_hosts(query.status, page).await?;
    Ok(Json(HostListResponse { items, total, page: page.page, page_size: page.page_size }))
}

/// `POST /api/hosts` — the number is allocated server-side.
pub async fn create_host(
    State(s): State<Arc<AppState>>,
    Json(body): Json<NewHost>,
) -> Result<impl IntoResponse, ApiError> {
    let host = s.store.create_host(body).await?;
    Ok((StatusCode::CREATED, Json(host)))
}

/// `GET /api/hosts/summary`
pub async fn host_summary(
    State(s): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(s.store.host_summary().await?))
}

/// `GET /api/hosts/{number}` — detail with the host's devices.
pub async fn get_host(
    State(s): State<Arc<AppState>>,
    Path(number): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let host = s
        .store
        .get_host_by_number(&number.to_uppercase())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Host {number} not found")))?;
    let devices = s.store.host_devices(host.id).await?;
    let device_count = devices.len();
    Ok(Json(HostWithDevices { host, devices, device_count }))
}

/// `PATCH /api/hosts/{id}`
pub async fn update_host(
    State(s): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<HostUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(s.store.update_host(id, body).await?))
}

/// `DELETE /api/hosts/{id}` — refused while devices remain attached.
pub async fn delete_host(
    State(s): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    s.store.delete_host(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/hosts/{number}/heartbeat`
pub async fn heartbeat(
    State(s): State<Arc<AppState>>,
    Path(number): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let number = number.to_uppercase();
    s.store.heartbeat(&number).await?;
    Ok(Json(serde_json::json!({ "message": "Heartbeat updated", "host_number": number })))
}
