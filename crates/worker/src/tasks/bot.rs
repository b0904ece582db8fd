// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Legacy script-bot tasks: start/stop the on-device script runner over ADB,
//! push script files, and pull its logs.

use std::path::Path;
use std::time::Duration;

use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use farm_core::event::FleetEvent;
use farm_core::fleet::DeviceStatus;
use farm_core::task::{GetBotLogsParams, PushScriptParams, RunBotParams, StopBotParams};

use crate::report::Reporter;

use super::{Completion, TaskContext};

pub const AUTOX_PACKAGE: &str = "org.autojs.autoxjs.v6";
pub const AUTOX_MAIN_ACTIVITY: &str = "org.autojs.autoxjs.ui.main.MainActivity";
pub const SCRIPT_REMOTE_PATH: &str = "/sdcard/Scripts";

/// Launch a script on the device via the runner app's broadcast interface.
pub async fn run_bot(ctx: &TaskContext, task_id: Uuid, params: &RunBotParams) -> Completion {
    info!(serial = %params.serial, script = %params.script_name, "running script bot");
    ctx.reporter
        .progress(task_id, "run_bot", 10, Some("Preparing script runner".into()))
        .await;

    // Make sure the runner app is up first.
    match ctx.adb.shell(&params.serial, &format!("pidof {AUTOX_PACKAGE}")).await {
        Ok(output) if !output.trim().is_empty() => {}
        _ => {
            let start = format!("am start -n {AUTOX_PACKAGE}/{AUTOX_MAIN_ACTIVITY}");
            if let Err(e) = ctx.adb.shell(&params.serial, &start).await {
                return Completion::failed(format!("failed to start script runner: {e}"), None);
            }
            tokio::time::sleep(Duration::from_secs(3)).await;
        }
    }

    ctx.reporter
        .progress(task_id, "run_bot", 30, Some("Starting script".into()))
        .await;

    let script_path = format!("{SCRIPT_REMOTE_PATH}/{}", params.script_name);
    let mut command = format!(
        "am broadcast -a com.stardust.autojs.action.EXEC_SCRIPT -e path {script_path}"
    );
    if let Some(extras) = params.params.as_ref().and_then(|v| v.as_object()) {
        for (key, value) in extras {
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            command.push_str(&format!(" -e {key} \"{rendered}\""));
        }
    }

    let output = match ctx.adb.shell(&params.serial, &command).await {
        Ok(output) => output,
        Err(e) => return Completion::failed(format!("broadcast failed: {e}"), None),
    };

    if output.contains("Broadcast completed") || output.contains("result=0") {
        if let Some(device_id) = params.device_id {
            ctx.reporter
                .fleet(FleetEvent::DeviceStatus {
                    device_id,
                    status: DeviceStatus::Busy,
                    battery_level: None,
                    error: None,
                })
                .await;
        }
        Completion::success(json!({
            "serial": params.serial,
            "script": params.script_name,
            "success": true,
        }))
    } else {
        Completion::failed(format!("broadcast rejected: {}", output.trim()), None)
    }
}

/// Stop the script runner and mark the device free again.
pub async fn stop_bot(ctx: &TaskContext, task_id: Uuid, params: &StopBotParams) -> Completion {
    info!(serial = %params.serial, "stopping script bot");
    ctx.reporter.progress(task_id, "stop_bot", 50, None).await;

    if let Err(e) = ctx.adb.shell(&params.serial, &format!("am force-stop {AUTOX_PACKAGE}")).await
    {
        return Completion::failed(format!("force-stop failed: {e}"), None);
    }

    if let Some(device_id) = params.device_id {
        ctx.reporter
            .fleet(FleetEvent::DeviceStatus {
                device_id,
                status: DeviceStatus::Online,
                battery_level: None,
                error: None,
            })
            .await;
    }
    Completion::success(json!({ "serial": params.serial, "success": true }))
}

/// Copy a script file onto the device's script directory.
pub async fn push_script(
    ctx: &TaskContext,
    task_id: Uuid,
    params: &PushScriptParams,
) -> Completion {
    info!(serial = %params.serial, local = %params.local_path, "pushing script");
    ctx.reporter.progress(task_id, "push_script", 30, None).await;

    let local = Path::new(&params.local_path);
    if !local.exists() {
        return Completion::failed(format!("script file not found: {}", params.local_path), None);
    }

    let remote_name = params
        .script_name
        .clone()
        .or_else(|| local.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "script.js".to_owned());
    let remote = format!("{SCRIPT_REMOTE_PATH}/{remote_name}");

    if let Err(e) = ctx.adb.shell(&params.serial, &format!("mkdir -p {SCRIPT_REMOTE_PATH}")).await
    {
        warn!(err = %e, "mkdir for script dir failed");
    }
    match ctx.adb.push(&params.serial, local, &remote).await {
        Ok(()) => Completion::success(json!({
            "serial": params.serial,
            "success": true,
            "remote_path": remote,
        })),
        Err(e) => Completion::failed(format!("push failed: {e}"), None),
    }
}

/// Tail the newest runner log file.
pub async fn get_bot_logs(
    ctx: &TaskContext,
    task_id: Uuid,
    params: &GetBotLogsParams,
) -> Completion {
    info!(serial = %params.serial, lines = params.lines, "collecting bot logs");
    ctx.reporter.progress(task_id, "bot_logs", 30, None).await;

    let log_dir = format!("/sdcard/Android/data/{AUTOX_PACKAGE}/files/logs");
    let find = format!("ls -t {log_dir}/*.log 2>/dev/null | head -1");
    let latest = match ctx.adb.shell(&params.serial, &find).await {
        Ok(output) => output.trim().to_owned(),
        Err(e) => return Completion::failed(format!("log lookup failed: {e}"), None),
    };

    if latest.is_empty() {
        return Completion::success(json!({
            "serial": params.serial,
            "success": true,
            "logs": "",
            "message": "No log files found",
        }));
    }

    match ctx.adb.shell(&params.serial, &format!("tail -n {} {latest}", params.lines)).await {
        Ok(logs) => Completion::success(json!({
            "serial": params.serial,
            "success": true,
            "log_file": latest,
            "logs": logs,
        })),
        Err(e) => Completion::failed(format!("log read failed: {e}"), None),
    }
}
