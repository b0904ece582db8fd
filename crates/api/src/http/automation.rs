// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Automation-server observability: a direct `/status` probe unioned with
//! the worker's session-pool metrics.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};
use tracing::debug;

use super::AppState;

/// Direct probe timeout; the worker request has its own 3 s window.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

async fn probe_status(s: &AppState) -> Result<bool, String> {
    let url = format!("{}/status", s.automation_url.trim_end_matches('/'));
    let resp = s
        .http
        .get(&url)
        .timeout(PROBE_TIMEOUT)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    let body: Value = resp.json().await.map_err(|e| e.to_string())?;
    Ok(body
        .get("value")
        .and_then(|v| v.get("ready"))
        .and_then(Value::as_bool)
        .unwrap_or(false))
}

/// `GET /api/appium/metrics` — server probe unioned with one worker's pool
/// metrics. Either side may be down; the result reports what answered.
pub async fn automation_metrics(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    let (mut ready, error) = match probe_status(&s).await {
        Ok(ready) => (ready, None),
        Err(e) => {
            debug!(err = %e, "automation server unreachable");
            (false, Some(e))
        }
    };

    let pool = match s.broker.automation_metrics(&s.metrics_queue).await {
        Ok(pool) => pool,
        Err(e) => {
            debug!(err = %e, "worker metrics request failed");
            None
        }
    };

    if let Some(ref pool) = pool {
        // The worker's probe counts too; it sits next to the server.
        ready = ready || pool.ready;
    }

    let pool = pool.unwrap_or_default();
    Json(json!({
        "ready": ready,
        "error": error,
        "active_sessions": pool.active_sessions,
        "max_sessions": pool.max_sessions,
        "available_ports": pool.available_ports,
        "used_ports": pool.used_ports,
        "active_devices": pool.active_devices,
    }))
}

/// `GET /api/appium/health` — just the server probe.
pub async fn automation_health(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    match probe_status(&s).await {
        Ok(ready) => Json(json!({ "ready": ready, "automation_url": s.automation_url })),
        Err(e) => Json(json!({
            "ready": false,
            "automation_url": s.automation_url,
            "error": e,
        })),
    }
}
