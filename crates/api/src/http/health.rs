// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health surface: readiness, liveness, system status, worker and queue
//! inspection.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use super::{AppState, APP_NAME, APP_VERSION};

/// `GET /api/health`
pub async fn health(State(_s): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "app": APP_NAME,
        "version": APP_VERSION,
    }))
}

/// `GET /api/health/status` — persistence + broker + workers + fleet + tasks.
/// Any subsystem failure degrades the overall verdict.
pub async fn system_status(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    let database = match s.store.ping().await {
        Ok(()) => "healthy".to_owned(),
        Err(e) => format!("error: {e}"),
    };

    let (broker, workers) = match s.broker.ping_workers().await {
        Ok(workers) if workers.is_empty() => ("no workers connected".to_owned(), workers),
        Ok(workers) => ("healthy".to_owned(), workers),
        Err(e) => (format!("error: {e}"), Vec::new()),
    };

    let fleet = s.store.host_summary().await.ok();
    let tasks = s.store.task_stats().await.ok();

    let overall = if database == "healthy" && broker == "healthy" {
        "healthy"
    } else {
        "degraded"
    };

    Json(json!({
        "api": "healthy",
        "database": database,
        "broker": broker,
        "workers": workers,
        "hosts": fleet,
        "tasks": tasks,
        "overall": overall,
    }))
}

/// `GET /api/health/ready` — one persistence round trip must succeed.
pub async fn ready(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    match s.store.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "ready": true }))),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "ready": false, "reason": "database not available" })),
        ),
    }
}

/// `GET /api/health/live`
pub async fn live() -> impl IntoResponse {
    Json(json!({ "alive": true }))
}

/// `GET /api/health/workers`
pub async fn workers(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    match s.broker.ping_workers().await {
        Ok(workers) => {
            let total = workers.len();
            Json(json!({ "workers": workers, "total": total }))
        }
        Err(e) => Json(json!({ "workers": [], "total": 0, "error": e.to_string() })),
    }
}

/// `GET /api/health/queues` — queue → subscribed workers, derived from pings.
pub async fn queues(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    match s.broker.ping_workers().await {
        Ok(workers) => {
            let mut queues: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for worker in &workers {
                for queue in &worker.queues {
                    queues.entry(queue.clone()).or_default().push(worker.name.clone());
                }
            }
            let queues: Vec<_> = queues
                .into_iter()
                .map(|(name, workers)| json!({ "name": name, "workers": workers }))
                .collect();
            let total = queues.len();
            Json(json!({ "queues": queues, "total": total }))
        }
        Err(e) => Json(json!({ "queues": [], "total": 0, "error": e.to_string() })),
    }
}
