// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP request/response types and axum handler implementations.

mod automation;
mod devices;
mod health;
mod hosts;
mod tasks;

pub use automation::*;
pub use devices::*;
pub use health::*;
pub use hosts::*;
pub use tasks::*;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::broker::Broker;
use crate::dispatch::Dispatcher;
use crate::store::Store;

pub const APP_NAME: &str = "Device Farm API";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared application state passed to all handlers via axum `State`.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub broker: Arc<dyn Broker>,
    pub dispatcher: Dispatcher,
    pub http: reqwest::Client,
    /// Automation-server base URL probed by `/api/appium/*`.
    pub automation_url: String,
    /// Queue asked for session-pool metrics.
    pub metrics_queue: String,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        broker: Arc<dyn Broker>,
        automation_url: String,
        metrics_queue: String,
    ) -> Arc<Self> {
        let dispatcher = Dispatcher::new(store.clone(), broker.clone());
        Arc::new(Self {
            store,
            broker,
            dispatcher,
            http: reqwest::Client::new(),
            automation_url,
            metrics_queue,
        })
    }
}

/// Build the axum `Router` with every API route.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/hosts", get(hosts::list_hosts).post(hosts::create_host))
        .route("/api/hosts/summary", get(hosts::host_summary))
        .route(
            "/api/hosts/{id}",
            get(hosts::get_host).patch(hosts::update_host).delete(hosts::delete_host),
        )
        .route("/api/hosts/{id}/heartbeat", post(hosts::heartbeat))
        .route("/api/devices", get(devices::list_devices).post(devices::create_device))
        .route("/api/devices/assign", post(devices::assign_device))
        .route("/api/devices/bulk-register", post(devices::bulk_register))
        .route("/api/devices/online/list", get(devices::online_devices))
        .route("/api/devices/by-code/{code}", get(devices::get_device_by_code))
        .route("/api/devices/by-serial/{serial}", get(devices::get_device_by_serial))
        .route("/api/devices/by-ip/{ip}", get(devices::get_device_by_ip))
        .route(
            "/api/devices/{id}",
            get(devices::get_device)
                .patch(devices::update_device)
                .delete(devices::delete_device),
        )
        .route("/api/devices/{id}/unassign", post(devices::unassign_device))
        .route("/api/tasks", get(tasks::list_tasks))
        .route("/api/tasks/stats", get(tasks::task_stats))
        .route("/api/tasks/recent", get(tasks::recent_tasks))
        .route("/api/tasks/install", post(tasks::dispatch_install))
        .route("/api/tasks/batch-install", post(tasks::dispatch_batch_install))
        .route("/api/tasks/health-check", post(tasks::dispatch_health_check))
        .route("/api/tasks/batch-health-check", post(tasks::dispatch_batch_health_check))
        .route("/api/tasks/scan-devices", post(tasks::dispatch_scan_devices))
        .route("/api/tasks/run-bot", post(tasks::dispatch_run_bot))
        .route("/api/tasks/stop-bot", post(tasks::dispatch_stop_bot))
        .route("/api/tasks/run-appium-bot", post(tasks::dispatch_run_appium_bot))
        .route("/api/tasks/stop-appium-session", post(tasks::dispatch_stop_appium_session))
        .route("/api/tasks/appium-health-check", post(tasks::dispatch_appium_health_check))
        .route("/api/tasks/{id}", get(tasks::get_task))
        .route("/api/tasks/{id}/celery-status", get(tasks::celery_status))
        .route("/api/tasks/{id}/cancel", post(tasks::cancel_task))
        .route("/api/health", get(health::health))
        .route("/api/health/status", get(health::system_status))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/api/health/workers", get(health::workers))
        .route("/api/health/queues", get(health::queues))
        .route("/api/appium/metrics", get(automation::automation_metrics))
        .route("/api/appium/health", get(automation::automation_health))
        .with_state(state)
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
