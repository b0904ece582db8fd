// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status reconciler: applies worker-published task and fleet events to the
//! store. Unknown ids are logged and dropped; the store's first-terminal-wins
//! rule makes application idempotent, so replayed or late events are safe.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use farm_core::event::{FleetEvent, TaskEvent};
use farm_core::subject;
use farm_core::task::TaskStatus;

use crate::store::{SeenDevice, StatusUpdate, Store, StoreError};

/// Subscribe to the event subjects and apply until shutdown.
pub async fn run(
    client: async_nats::Client,
    store: Arc<dyn Store>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let mut task_events = client.subscribe(subject::TASK_EVENTS).await?;
    let mut fleet_events = client.subscribe(subject::FLEET_EVENTS).await?;
    info!("reconciler started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = task_events.next() => {
                let Some(msg) = msg else { break };
                match serde_json::from_slice::<TaskEvent>(&msg.payload) {
                    Ok(event) => apply_task_event(store.as_ref(), event).await,
                    Err(e) => warn!(err = %e, "malformed task event"),
                }
            }
            msg = fleet_events.next() => {
                let Some(msg) = msg else { break };
                match serde_json::from_slice::<FleetEvent>(&msg.payload) {
                    Ok(event) => apply_fleet_event(store.as_ref(), event).await,
                    Err(e) => warn!(err = %e, "malformed fleet event"),
                }
            }
        }
    }
    info!("reconciler stopped");
    Ok(())
}

/// Apply one task lifecycle event.
pub async fn apply_task_event(store: &dyn Store, event: TaskEvent) {
    let outcome = match event {
        TaskEvent::Started { task_id } => {
            store
                .update_task_status(
                    task_id,
                    StatusUpdate {
                        status: Some(TaskStatus::Running),
                        ..StatusUpdate::default()
                    },
                )
                .await
                .map(|_| ())
        }
        TaskEvent::Progress { task_id, step, progress, message } => {
            let message = match message {
                Some(message) => Some(message),
                None => Some(step),
            };
            store
                .update_task_status(
                    task_id,
                    StatusUpdate {
                        // A progress event from the worker means the task is
                        // running again, whatever retry state preceded it.
                        status: Some(TaskStatus::Running),
                        progress: Some(progress),
                        progress_message: message,
                        ..StatusUpdate::default()
                    },
                )
                .await
                .map(|_| ())
        }
        TaskEvent::Retrying { task_id, message, .. } => {
            let result = store.increment_task_retry(task_id).await;
            match result {
                Ok(_) => store
                    .update_task_status(
                        task_id,
                        StatusUpdate {
                            status: Some(TaskStatus::Retrying),
                            progress_message: message,
                            ..StatusUpdate::default()
                        },
                    )
                    .await
                    .map(|_| ()),
                Err(e) => Err(e),
            }
        }
        TaskEvent::Finished { task_id, status, result, error } => store
            .update_task_status(
                task_id,
                StatusUpdate { status: Some(status), result, error, ..StatusUpdate::default() },
            )
            .await
            .map(|_| ()),
    };

    match outcome {
        Ok(()) => {}
        Err(StoreError::NotFound(detail)) => debug!(detail, "task event for unknown row"),
        Err(e) => warn!(err = %e, "task event application failed"),
    }
}

/// Apply one fleet fact.
pub async fn apply_fleet_event(store: &dyn Store, event: FleetEvent) {
    let outcome = match event {
        FleetEvent::Heartbeat { host_number } => {
            store.heartbeat(&host_number).await.map(|_| ())
        }
        FleetEvent::DeviceSeen {
            host_number,
            serial,
            model,
            os_version,
            battery_level,
            connection,
            address,
            status,
        } => store
            .upsert_seen_device(SeenDevice {
                host_number,
                serial,
                model,
                os_version,
                battery_level,
                connection,
                address,
                status,
            })
            .await
            .map(|_| ()),
        FleetEvent::DeviceStatus { device_id, status, battery_level, error } => store
            .set_device_status(device_id, status, battery_level, error)
            .await
            .map(|_| ()),
    };

    match outcome {
        Ok(()) => {}
        Err(StoreError::NotFound(detail)) => debug!(detail, "fleet event for unknown entity"),
        Err(e) => warn!(err = %e, "fleet event application failed"),
    }
}

#[cfg(test)]
#[path = "reconcile_tests.rs"]
mod tests;
