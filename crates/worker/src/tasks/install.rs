// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! APK install tasks. Batch installs run in bounded waves with a pause
//! between waves so twenty parallel `adb install`s don't melt the USB hub.

use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use farm_core::task::{
    BatchInstallParams, CheckInstalledAppsParams, InstallAllRequiredParams, InstallApkParams,
    UninstallApkParams,
};

use crate::adb::{installed_packages, package_version};
use crate::report::Reporter;

use super::{Completion, TaskContext};

/// Devices installed per wave.
pub const BATCH_SIZE: usize = 5;

/// Pause between waves.
pub const BATCH_PAUSE: Duration = Duration::from_secs(2);

/// In-task install attempts.
const INSTALL_ATTEMPTS: u32 = 3;

/// Fixed delay between install attempts.
const INSTALL_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Apps every handset must carry.
pub const REQUIRED_APPS: &[RequiredApp] = &[
    RequiredApp { key: "autox.js", package: "org.autojs.autoxjs.v6", apk: "autox.js.apk" },
    RequiredApp { key: "youtube", package: "com.google.android.youtube", apk: "youtube.apk" },
];

#[derive(Debug, Clone, Copy)]
pub struct RequiredApp {
    pub key: &'static str,
    pub package: &'static str,
    pub apk: &'static str,
}

fn package_for_apk(apk_name: &str) -> Option<&'static str> {
    REQUIRED_APPS.iter().find(|app| app.apk == apk_name).map(|app| app.package)
}

#[derive(Debug, Clone, Serialize)]
struct InstallOutcome {
    serial: String,
    apk: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Install one APK on one device, with in-task retries.
pub async fn install_apk(
    ctx: &TaskContext,
    task_id: Uuid,
    params: &InstallApkParams,
    cancel: &CancellationToken,
) -> Completion {
    info!(serial = %params.serial, apk = %params.apk_name, "installing apk");
    ctx.reporter
        .progress(task_id, "install", 10, Some(format!("Installing {}", params.apk_name)))
        .await;

    let apk_path = ctx.apk_dir.join(&params.apk_name);
    if !apk_path.exists() {
        let error = format!("APK not found: {}", apk_path.display());
        return Completion::failed(error, None);
    }

    ctx.reporter
        .progress(task_id, "install", 30, Some("Pushing APK to device".into()))
        .await;

    let mut attempt = 0u32;
    loop {
        match ctx.adb.install(&params.serial, &apk_path, true, true).await {
            Ok(()) => break,
            Err(e) => {
                attempt += 1;
                if attempt >= INSTALL_ATTEMPTS || cancel.is_cancelled() {
                    return Completion::failed(format!("install failed: {e}"), None);
                }
                warn!(serial = %params.serial, attempt, err = %e, "install failed, retrying");
                ctx.reporter
                    .retrying(
                        task_id,
                        attempt,
                        Some(format!("Retrying ({attempt}/{})", INSTALL_ATTEMPTS - 1)),
                    )
                    .await;
                tokio::select! {
                    _ = tokio::time::sleep(INSTALL_RETRY_DELAY) => {}
                    _ = cancel.cancelled() => return Completion::cancelled(),
                }
            }
        }
    }

    let version = match package_for_apk(&params.apk_name) {
        Some(package) => package_version(ctx.adb.as_ref(), &params.serial, package).await,
        None => None,
    };

    info!(serial = %params.serial, apk = %params.apk_name, ?version, "apk installed");
    ctx.reporter
        .progress(task_id, "install", 100, Some("Installation complete".into()))
        .await;
    Completion::success(json!({
        "serial": params.serial,
        "apk": params.apk_name,
        "success": true,
        "version": version,
    }))
}

/// One install inside a batch: no per-device task events, one attempt.
async fn install_one(ctx: &TaskContext, serial: &str, apk_name: &str) -> InstallOutcome {
    let apk_path = ctx.apk_dir.join(apk_name);
    if !apk_path.exists() {
        return InstallOutcome {
            serial: serial.to_owned(),
            apk: apk_name.to_owned(),
            success: false,
            version: None,
            error: Some(format!("APK not found: {}", apk_path.display())),
        };
    }
    match ctx.adb.install(serial, &apk_path, true, true).await {
        Ok(()) => {
            let version = match package_for_apk(apk_name) {
                Some(package) => package_version(ctx.adb.as_ref(), serial, package).await,
                None => None,
            };
            InstallOutcome {
                serial: serial.to_owned(),
                apk: apk_name.to_owned(),
                success: true,
                version,
                error: None,
            }
        }
        Err(e) => InstallOutcome {
            serial: serial.to_owned(),
            apk: apk_name.to_owned(),
            success: false,
            version: None,
            error: Some(e.to_string()),
        },
    }
}

/// Install one APK across many devices in waves of [`BATCH_SIZE`].
pub async fn batch_install(
    ctx: &TaskContext,
    task_id: Uuid,
    params: &BatchInstallParams,
    cancel: &CancellationToken,
) -> Completion {
    let targets = match &params.serials {
        Some(serials) => serials.clone(),
        None => match ctx.adb.devices().await {
            Ok(devices) => devices
                .into_iter()
                .filter(|d| d.state == "device")
                .map(|d| d.serial)
                .collect(),
            Err(e) => return Completion::failed(format!("adb list failed: {e}"), None),
        },
    };

    info!(apk = %params.apk_name, total = targets.len(), "batch install");
    let total = targets.len();
    let mut results: Vec<InstallOutcome> = Vec::with_capacity(total);

    for (wave_index, wave) in targets.chunks(BATCH_SIZE).enumerate() {
        if cancel.is_cancelled() {
            return Completion::cancelled();
        }
        if wave_index > 0 {
            tokio::select! {
                _ = tokio::time::sleep(BATCH_PAUSE) => {}
                _ = cancel.cancelled() => return Completion::cancelled(),
            }
        }

        let wave_results = join_all(
            wave.iter().map(|serial| install_one(ctx, serial, &params.apk_name)),
        )
        .await;
        results.extend(wave_results);

        let pct = (results.len() * 100 / total.max(1)) as u8;
        ctx.reporter
            .progress(
                task_id,
                "batch_install",
                pct,
                Some(format!("{}/{total} devices", results.len())),
            )
            .await;
    }

    let success = results.iter().filter(|r| r.success).count();
    info!(success, total, "batch install complete");
    Completion::success(json!({
        "apk": params.apk_name,
        "total": total,
        "success": success,
        "failed": total - success,
        "results": results,
    }))
}

pub async fn uninstall_apk(
    ctx: &TaskContext,
    task_id: Uuid,
    params: &UninstallApkParams,
) -> Completion {
    info!(serial = %params.serial, package = %params.package_name, "uninstalling");
    ctx.reporter.progress(task_id, "uninstall", 50, None).await;

    match ctx.adb.uninstall(&params.serial, &params.package_name).await {
        Ok(()) => Completion::success(json!({
            "serial": params.serial,
            "package": params.package_name,
            "success": true,
        })),
        Err(e) => Completion::failed(format!("uninstall failed: {e}"), None),
    }
}

/// Report install state of every required app on one device.
pub async fn check_installed_apps(
    ctx: &TaskContext,
    task_id: Uuid,
    params: &CheckInstalledAppsParams,
) -> Completion {
    info!(serial = %params.serial, "checking installed apps");
    ctx.reporter.progress(task_id, "check_apps", 30, None).await;

    let installed = match installed_packages(ctx.adb.as_ref(), &params.serial).await {
        Ok(installed) => installed,
        Err(e) => return Completion::failed(format!("package list failed: {e}"), None),
    };

    let mut apps = serde_json::Map::new();
    let mut missing: Vec<&str> = Vec::new();
    for app in REQUIRED_APPS {
        let is_installed = installed.iter().any(|p| p == app.package);
        let version = if is_installed {
            package_version(ctx.adb.as_ref(), &params.serial, app.package).await
        } else {
            missing.push(app.key);
            None
        };
        apps.insert(
            app.key.to_owned(),
            json!({
                "package": app.package,
                "installed": is_installed,
                "version": version,
            }),
        );
    }

    Completion::success(json!({
        "serial": params.serial,
        "apps": apps,
        "missing": missing,
        "all_installed": missing.is_empty(),
    }))
}

/// Check required apps, then install whatever is missing.
pub async fn install_all_required(
    ctx: &TaskContext,
    task_id: Uuid,
    params: &InstallAllRequiredParams,
    cancel: &CancellationToken,
) -> Completion {
    info!(serial = %params.serial, "installing all required apps");
    ctx.reporter.progress(task_id, "install_all", 10, None).await;

    let installed = match installed_packages(ctx.adb.as_ref(), &params.serial).await {
        Ok(installed) => installed,
        Err(e) => return Completion::failed(format!("package list failed: {e}"), None),
    };

    let mut done: Vec<serde_json::Value> = Vec::new();
    let mut skipped: Vec<serde_json::Value> = Vec::new();
    let mut failed: Vec<serde_json::Value> = Vec::new();

    for (i, app) in REQUIRED_APPS.iter().enumerate() {
        if cancel.is_cancelled() {
            return Completion::cancelled();
        }
        if installed.iter().any(|p| p == app.package) {
            let version = package_version(ctx.adb.as_ref(), &params.serial, app.package).await;
            skipped.push(json!({ "app": app.key, "version": version }));
        } else {
            let outcome = install_one(ctx, &params.serial, app.apk).await;
            if outcome.success {
                done.push(json!({ "app": app.key, "version": outcome.version }));
            } else {
                failed.push(json!({ "app": app.key, "error": outcome.error }));
            }
        }
        let pct = 10 + ((i + 1) * 90 / REQUIRED_APPS.len()) as u8;
        ctx.reporter.progress(task_id, "install_all", pct, None).await;
    }

    let all_ok = failed.is_empty();
    let result = json!({
        "serial": params.serial,
        "installed": done,
        "skipped": skipped,
        "failed": failed,
        "success": all_ok,
    });
    if all_ok {
        Completion::success(result)
    } else {
        Completion::failed("some required apps failed to install", Some(result))
    }
}

#[cfg(test)]
#[path = "install_tests.rs"]
mod tests;
