// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Automation-server status probe.

use std::time::Duration;

use serde_json::Value;

/// Probe timeout; the status endpoint either answers fast or is down.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// `GET {url}/status` and read `value.ready`.
pub async fn probe_ready(http: &reqwest::Client, automation_url: &str) -> Result<bool, String> {
    let url = format!("{}/status", automation_url.trim_end_matches('/'));
    let resp = http
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
