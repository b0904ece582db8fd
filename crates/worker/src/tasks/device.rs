// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device management tasks: scan, health checks, reboot, log collection.

use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use farm_core::event::FleetEvent;
use farm_core::fleet::{ConnectionKind, DeviceStatus};
use farm_core::task::{
    BatchHealthCheckParams, CollectLogsParams, HealthCheckParams, RebootDeviceParams,
    ScanDevicesParams,
};

use crate::adb::{inspect_device, parse_battery};
use crate::report::Reporter;

use super::{Completion, TaskContext};

/// Enumerate attached devices and publish what was seen.
pub async fn scan_devices(
    ctx: &TaskContext,
    task_id: Uuid,
    params: &ScanDevicesParams,
) -> Completion {
    info!(host = %params.host_number, "starting device scan");
    ctx.reporter.progress(task_id, "scan", 10, Some("Scanning ADB devices".into())).await;

    let devices = match ctx.adb.devices().await {
        Ok(devices) => devices,
        Err(e) => return Completion::failed(format!("adb scan failed: {e}"), None),
    };

    let mut serials = Vec::new();
    let mut errors: Vec<String> = Vec::new();
    let total = devices.len();

    for (i, device) in devices.iter().enumerate() {
        let facts = inspect_device(ctx.adb.as_ref(), &device.serial).await;
        let status = if device.state == "device" {
            DeviceStatus::Online
        } else {
            errors.push(format!("{}: state {}", device.serial, device.state));
            DeviceStatus::Error
        };
        let connection =
            if facts.wifi_ip.is_some() { ConnectionKind::Wifi } else { ConnectionKind::Usb };

        ctx.reporter
            .fleet(FleetEvent::DeviceSeen {
                host_number: params.host_number.clone(),
                serial: device.serial.clone(),
                model: facts.model,
                os_version: facts.os_version,
                battery_level: facts.battery_level,
                connection,
                address: facts.wifi_ip,
                status,
            })
            .await;
        serials.push(device.serial.clone());

        let pct = 10 + ((i + 1) * 80 / total.max(1)) as u8;
        ctx.reporter.progress(task_id, "scan", pct, None).await;
    }

    ctx.reporter.fleet(FleetEvent::Heartbeat { host_number: params.host_number.clone() }).await;

    info!(found = serials.len(), "device scan complete");
    Completion::success(json!({
        "host_number": params.host_number,
        "found": serials.len(),
        "serials": serials,
        "errors": errors,
    }))
}

/// Health-check one device and write its status back.
pub async fn health_check(
    ctx: &TaskContext,
    task_id: Uuid,
    params: &HealthCheckParams,
) -> Completion {
    info!(serial = %params.serial, "health check");
    ctx.reporter.progress(task_id, "health_check", 20, None).await;

    let (status, battery, error) = check_one(ctx, &params.serial).await;
    ctx.reporter
        .fleet(FleetEvent::DeviceStatus {
            device_id: params.device_id,
            status,
            battery_level: battery,
            error: error.clone(),
        })
        .await;

    Completion::success(json!({
        "device_id": params.device_id,
        "serial": params.serial,
        "status": status,
        "battery_level": battery,
        "error": error,
    }))
}

/// Probe one serial: connection state plus battery level.
async fn check_one(ctx: &TaskContext, serial: &str) -> (DeviceStatus, Option<u8>, Option<String>) {
    let attached = match ctx.adb.devices().await {
        Ok(devices) => devices.iter().any(|d| d.serial == serial && d.state == "device"),
        Err(e) => {
            warn!(serial, err = %e, "device list failed");
            return (DeviceStatus::Error, None, Some(e.to_string()));
        }
    };
    if !attached {
        return (DeviceStatus::Offline, None, None);
    }

    match ctx.adb.shell(serial, "dumpsys battery").await {
        Ok(output) => {
            let (level, _) = parse_battery(&output);
            (DeviceStatus::Online, Some(level), None)
        }
        Err(e) => {
            warn!(serial, err = %e, "battery check failed");
            (DeviceStatus::Error, None, Some(e.to_string()))
        }
    }
}

/// Health-check every attached device; used by the beat schedule.
pub async fn batch_health_check(
    ctx: &TaskContext,
    task_id: Uuid,
    params: &BatchHealthCheckParams,
) -> Completion {
    info!(host = %params.host_number, "batch health check");

    let devices = match ctx.adb.devices().await {
        Ok(devices) => devices,
        Err(e) => return Completion::failed(format!("adb list failed: {e}"), None),
    };

    let total = devices.len();
    let mut online = 0usize;
    let mut offline = 0usize;
    let mut errors: Vec<String> = Vec::new();

    for (i, device) in devices.iter().enumerate() {
        let (status, _, error) = check_one(ctx, &device.serial).await;
        match status {
            DeviceStatus::Online => online += 1,
            _ => {
                offline += 1;
                if let Some(error) = error {
                    errors.push(format!("{}: {error}", device.serial));
                }
            }
        }
        let pct = ((i + 1) * 100 / total.max(1)) as u8;
        ctx.reporter.progress(task_id, "health_check", pct, None).await;
    }

    ctx.reporter.fleet(FleetEvent::Heartbeat { host_number: params.host_number.clone() }).await;

    info!(total, online, offline, "batch health check complete");
    Completion::success(json!({
        "host_number": params.host_number,
        "total": total,
        "online": online,
        "offline": offline,
        "errors": errors,
    }))
}

pub async fn reboot_device(
    ctx: &TaskContext,
    task_id: Uuid,
    params: &RebootDeviceParams,
) -> Completion {
    info!(serial = %params.serial, "rebooting device");
    ctx.reporter.progress(task_id, "reboot", 50, None).await;

    match ctx.adb.reboot(&params.serial).await {
        Ok(()) => {
            if let Some(device_id) = params.device_id {
                ctx.reporter
                    .fleet(FleetEvent::DeviceStatus {
                        device_id,
                        status: DeviceStatus::Offline,
                        battery_level: None,
                        error: None,
                    })
                    .await;
            }
            Completion::success(json!({ "serial": params.serial, "success": true }))
        }
        Err(e) => Completion::failed(format!("reboot failed: {e}"), None),
    }
}

/// Pull the recent logcat tail from every attached device.
pub async fn collect_logs(
    ctx: &TaskContext,
    task_id: Uuid,
    params: &CollectLogsParams,
) -> Completion {
    info!(host = %params.host_number, "collecting device logs");
    ctx.reporter.progress(task_id, "collect_logs", 10, None).await;

    let devices = match ctx.adb.devices().await {
        Ok(devices) => devices,
        Err(e) => return Completion::failed(format!("adb list failed: {e}"), None),
    };

    let mut collected = 0usize;
    let mut errors: Vec<String> = Vec::new();
    for device in &devices {
        match ctx.adb.shell(&device.serial, "logcat -d -t 100").await {
            Ok(_) => collected += 1,
            Err(e) => errors.push(format!("{}: {e}", device.serial)),
        }
    }

    info!(collected, "log collection complete");
    Completion::success(json!({
        "host_number": params.host_number,
        "collected": collected,
        "errors": errors,
    }))
}
