// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use uuid::Uuid;

use farm_core::event::{FleetEvent, TaskEvent};
use farm_core::fleet::{ConnectionKind, DeviceStatus, HostStatus};
use farm_core::task::{TaskKind, TaskStatus};

use crate::store::mem::MemStore;
use crate::store::{NewDevice, NewHost, NewTask, Store};

use super::{apply_fleet_event, apply_task_event};

async fn seeded_task(store: &MemStore) -> Uuid {
    let id = Uuid::new_v4();
    store
        .insert_task(NewTask {
            id,
            broker_id: Uuid::new_v4().to_string(),
            kind: TaskKind::RunYoutube,
            queue: "host01".into(),
            device_id: None,
            host_id: None,
            payload: serde_json::json!({}),
        })
        .await
        .unwrap();
    id
}

#[tokio::test]
async fn lifecycle_events_walk_the_row_through_its_states() {
    let store = MemStore::new();
    let id = seeded_task(&store).await;

    apply_task_event(&store, TaskEvent::Started { task_id: id }).await;
    let row = store.get_task(id).await.unwrap().unwrap();
    assert_eq!(row.status, TaskStatus::Running);
    assert!(row.started_at.is_some());

    apply_task_event(
        &store,
        TaskEvent::Progress {
            task_id: id,
            step: "watching".into(),
            progress: 42,
            message: Some("Watching: 60/120s".into()),
        },
    )
    .await;
    let row = store.get_task(id).await.unwrap().unwrap();
    assert_eq!(row.progress, 42);
    assert_eq!(row.progress_message.as_deref(), Some("Watching: 60/120s"));

    apply_task_event(
        &store,
        TaskEvent::Retrying { task_id: id, retries: 1, message: Some("E2004".into()) },
    )
    .await;
    let row = store.get_task(id).await.unwrap().unwrap();
    assert_eq!(row.status, TaskStatus::Retrying);
    assert_eq!(row.retries, 1);

    // Progress after a retry means the task is running again.
    apply_task_event(
        &store,
        TaskEvent::Progress { task_id: id, step: "watching".into(), progress: 50, message: None },
    )
    .await;
    assert_eq!(store.get_task(id).await.unwrap().unwrap().status, TaskStatus::Running);

    apply_task_event(
        &store,
        TaskEvent::Finished {
            task_id: id,
            status: TaskStatus::Success,
            result: Some(serde_json::json!({ "did_like": true })),
            error: None,
        },
    )
    .await;
    let row = store.get_task(id).await.unwrap().unwrap();
    assert_eq!(row.status, TaskStatus::Success);
    assert!(row.completed_at.is_some());
    assert_eq!(row.result.unwrap()["did_like"], true);
}

#[tokio::test]
async fn late_events_after_cancel_are_ignored() {
    let store = MemStore::new();
    let id = seeded_task(&store).await;

    apply_task_event(
        &store,
        TaskEvent::Finished {
            task_id: id,
            status: TaskStatus::Cancelled,
            result: None,
            error: None,
        },
    )
    .await;

    apply_task_event(&store, TaskEvent::Started { task_id: id }).await;
    apply_task_event(
        &store,
        TaskEvent::Finished { task_id: id, status: TaskStatus::Success, result: None, error: None },
    )
    .await;

    assert_eq!(store.get_task(id).await.unwrap().unwrap().status, TaskStatus::Cancelled);
}

#[tokio::test]
async fn events_for_unknown_tasks_are_dropped() {
    let store = MemStore::new();
    // Nothing to assert beyond "does not panic / does not create rows".
    apply_task_event(&store, TaskEvent::Started { task_id: Uuid::new_v4() }).await;
    assert_eq!(store.task_stats().await.unwrap().total, 0);
}

#[tokio::test]
async fn heartbeat_event_marks_the_host_online() {
    let store = MemStore::new();
    store.create_host(NewHost::default()).await.unwrap();

    apply_fleet_event(&store, FleetEvent::Heartbeat { host_number: "HOST01".into() }).await;

    let host = store.get_host_by_number("HOST01").await.unwrap().unwrap();
    assert_eq!(host.status, HostStatus::Online);
    assert!(host.last_heartbeat.is_some());
}

#[tokio::test]
async fn device_seen_event_registers_the_device() {
    let store = MemStore::new();
    store.create_host(NewHost::default()).await.unwrap();

    apply_fleet_event(
        &store,
        FleetEvent::DeviceSeen {
            host_number: "HOST01".into(),
            serial: "R58M41ABC".into(),
            model: Some("SM-G960N".into()),
            os_version: Some("10".into()),
            battery_level: Some(66),
            connection: ConnectionKind::Usb,
            address: None,
            status: DeviceStatus::Online,
        },
    )
    .await;

    let device = store.get_device_by_serial("R58M41ABC").await.unwrap().unwrap();
    assert_eq!(device.code.as_deref(), Some("HOST01-001"));
    assert_eq!(device.status, DeviceStatus::Online);
}

#[tokio::test]
async fn device_status_event_applies_error_writeback() {
    let store = MemStore::new();
    let device = store
        .create_device(NewDevice { serial: Some("s1".into()), ..NewDevice::default() })
        .await
        .unwrap();

    apply_fleet_event(
        &store,
        FleetEvent::DeviceStatus {
            device_id: device.id,
            status: DeviceStatus::Error,
            battery_level: None,
            error: Some("adb timeout".into()),
        },
    )
    .await;

    let updated = store.get_device(device.id).await.unwrap().unwrap();
    assert_eq!(updated.status, DeviceStatus::Error);
    assert_eq!(updated.error_count, 1);
}
