// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use uuid::Uuid;

use farm_core::fleet::{ConnectionKind, DeviceStatus, HostStatus};
use farm_core::task::{TaskKind, TaskStatus};

use super::super::{
    DeviceFilter, NewDevice, NewHost, NewTask, Page, SeenDevice, StatusUpdate, Store, StoreError,
};
use super::MemStore;

fn new_task(kind: TaskKind, queue: &str) -> NewTask {
    NewTask {
        id: Uuid::new_v4(),
        broker_id: Uuid::new_v4().to_string(),
        kind,
        queue: queue.to_owned(),
        device_id: None,
        host_id: None,
        payload: serde_json::json!({}),
    }
}

async fn host(store: &MemStore) -> farm_core::fleet::Host {
    store.create_host(NewHost::default()).await.unwrap()
}

async fn device(store: &MemStore, serial: &str, host_id: Option<Uuid>) -> farm_core::fleet::Device {
    store
        .create_device(NewDevice { host_id, serial: Some(serial.to_owned()), ..NewDevice::default() })
        .await
        .unwrap()
}

#[tokio::test]
async fn host_numbers_are_monotone_even_across_deletes() {
    let store = MemStore::new();
    let a = host(&store).await;
    let b = host(&store).await;
    assert_eq!(a.number, "HOST01");
    assert_eq!(b.number, "HOST02");

    store.delete_host(b.id).await.unwrap();
    let c = host(&store).await;
    // Numbers never get reused.
    assert_eq!(c.number, "HOST03");
}

#[tokio::test]
async fn heartbeat_is_idempotent_modulo_timestamp() {
    let store = MemStore::new();
    let created = host(&store).await;
    assert_eq!(created.status, HostStatus::Offline);

    let first = store.heartbeat("HOST01").await.unwrap();
    let second = store.heartbeat("HOST01").await.unwrap();

    assert_eq!(first.status, HostStatus::Online);
    assert_eq!(second.status, HostStatus::Online);
    assert_eq!(first.number, second.number);
    assert!(second.last_heartbeat >= first.last_heartbeat);
}

#[tokio::test]
async fn heartbeat_for_unknown_host_fails() {
    let store = MemStore::new();
    assert!(matches!(
        store.heartbeat("HOST99").await.unwrap_err(),
        StoreError::NotFound(_)
    ));
}

#[tokio::test]
async fn device_requires_serial_or_address() {
    let store = MemStore::new();
    let err = store.create_device(NewDevice::default()).await.unwrap_err();
    assert!(matches!(err, StoreError::Invalid(_)));

    // Address alone is fine.
    store
        .create_device(NewDevice {
            address: Some("192.168.1.40:5555".to_owned()),
            ..NewDevice::default()
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn duplicate_serials_are_rejected() {
    let store = MemStore::new();
    device(&store, "R58M41ABC", None).await;
    let err = store
        .create_device(NewDevice {
            serial: Some("R58M41ABC".to_owned()),
            ..NewDevice::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[tokio::test]
async fn assignment_allocates_smallest_free_ordinal() {
    let store = MemStore::new();
    let h = host(&store).await;
    let a = device(&store, "serial-a", Some(h.id)).await;
    let b = device(&store, "serial-b", Some(h.id)).await;
    assert_eq!(a.ordinal, Some(1));
    assert_eq!(a.code.as_deref(), Some("HOST01-001"));
    assert_eq!(b.ordinal, Some(2));

    // Freeing ordinal 1 makes it the next allocation again.
    store.unassign_device(a.id).await.unwrap();
    let c = device(&store, "serial-c", Some(h.id)).await;
    assert_eq!(c.ordinal, Some(1));
    assert_eq!(c.code.as_deref(), Some("HOST01-001"));

    let a_again = store.assign_device(a.id, h.id).await.unwrap();
    assert_eq!(a_again.ordinal, Some(3));
}

#[tokio::test]
async fn unassign_clears_host_and_ordinal() {
    let store = MemStore::new();
    let h = host(&store).await;
    let d = device(&store, "serial-a", Some(h.id)).await;

    let unassigned = store.unassign_device(d.id).await.unwrap();
    assert!(unassigned.host_id.is_none());
    assert!(unassigned.host_number.is_none());
    assert!(unassigned.ordinal.is_none());
    assert!(unassigned.code.is_none());
}

#[tokio::test]
async fn host_capacity_bounds_assignment() {
    let store = MemStore::new();
    let h = store
        .create_host(NewHost { max_devices: Some(2), ..NewHost::default() })
        .await
        .unwrap();
    device(&store, "s1", Some(h.id)).await;
    device(&store, "s2", Some(h.id)).await;

    let d3 = device(&store, "s3", None).await;
    let err = store.assign_device(d3.id, h.id).await.unwrap_err();
    assert!(matches!(err, StoreError::Invalid(_)));
}

#[tokio::test]
async fn host_delete_refused_while_devices_attached() {
    let store = MemStore::new();
    let h = host(&store).await;
    let d = device(&store, "s1", Some(h.id)).await;

    assert!(store.delete_host(h.id).await.is_err());
    store.delete_device(d.id).await.unwrap();
    store.delete_host(h.id).await.unwrap();
}

#[tokio::test]
async fn device_filters_compose() {
    let store = MemStore::new();
    let h = host(&store).await;
    let a = device(&store, "s1", Some(h.id)).await;
    device(&store, "s2", None).await;

    store.set_device_status(a.id, DeviceStatus::Online, Some(80), None).await.unwrap();

    let (online, total) = store
        .list_devices(
            DeviceFilter { status: Some(DeviceStatus::Online), ..DeviceFilter::default() },
            Page::default(),
        )
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(online[0].serial.as_deref(), Some("s1"));

    let (unassigned, _) = store
        .list_devices(
            DeviceFilter { unassigned_only: true, ..DeviceFilter::default() },
            Page::default(),
        )
        .await
        .unwrap();
    assert_eq!(unassigned.len(), 1);
    assert_eq!(unassigned[0].serial.as_deref(), Some("s2"));

    let (by_number, _) = store
        .list_devices(
            DeviceFilter { host_number: Some("HOST01".into()), ..DeviceFilter::default() },
            Page::default(),
        )
        .await
        .unwrap();
    assert_eq!(by_number.len(), 1);
}

#[tokio::test]
async fn device_error_writeback_increments_error_count() {
    let store = MemStore::new();
    let d = device(&store, "s1", None).await;

    store
        .set_device_status(d.id, DeviceStatus::Error, None, Some("adb timeout".into()))
        .await
        .unwrap();
    let updated = store
        .set_device_status(d.id, DeviceStatus::Error, None, Some("adb timeout".into()))
        .await
        .unwrap();

    assert_eq!(updated.error_count, 2);
    assert_eq!(updated.last_error.as_deref(), Some("adb timeout"));
}

#[tokio::test]
async fn seen_device_is_created_and_then_updated() {
    let store = MemStore::new();
    host(&store).await;

    let seen = SeenDevice {
        host_number: "HOST01".into(),
        serial: "R58M41ABC".into(),
        model: Some("SM-G960N".into()),
        os_version: Some("10".into()),
        battery_level: Some(77),
        connection: ConnectionKind::Usb,
        address: None,
        status: DeviceStatus::Online,
    };
    let created = store.upsert_seen_device(seen.clone()).await.unwrap();
    assert_eq!(created.ordinal, Some(1));
    assert_eq!(created.battery_level, Some(77));

    let updated = store
        .upsert_seen_device(SeenDevice { battery_level: Some(55), ..seen })
        .await
        .unwrap();
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.battery_level, Some(55));
    assert_eq!(updated.ordinal, Some(1));
}

#[tokio::test]
async fn task_timestamps_follow_the_lifecycle() {
    let store = MemStore::new();
    let t = store.insert_task(new_task(TaskKind::InstallApk, "host01")).await.unwrap();
    assert_eq!(t.status, TaskStatus::Pending);
    assert!(t.started_at.is_none());
    assert!(t.completed_at.is_none());

    let running = store
        .update_task_status(
            t.id,
            StatusUpdate { status: Some(TaskStatus::Running), ..StatusUpdate::default() },
        )
        .await
        .unwrap();
    assert!(running.started_at.is_some());
    assert!(running.completed_at.is_none());

    let done = store
        .update_task_status(
            t.id,
            StatusUpdate { status: Some(TaskStatus::Success), ..StatusUpdate::default() },
        )
        .await
        .unwrap();
    assert!(done.completed_at.is_some());
    assert!(done.duration_seconds.is_some());
}

#[tokio::test]
async fn terminal_status_never_regresses() {
    let store = MemStore::new();
    let t = store.insert_task(new_task(TaskKind::RunYoutube, "host01")).await.unwrap();

    store
        .update_task_status(
            t.id,
            StatusUpdate { status: Some(TaskStatus::Cancelled), ..StatusUpdate::default() },
        )
        .await
        .unwrap();

    // A late worker event cannot resurrect the row.
    let after = store
        .update_task_status(
            t.id,
            StatusUpdate {
                status: Some(TaskStatus::Running),
                progress: Some(50),
                ..StatusUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(after.status, TaskStatus::Cancelled);
    assert_eq!(after.progress, 0);

    let after = store
        .update_task_status(
            t.id,
            StatusUpdate { status: Some(TaskStatus::Success), ..StatusUpdate::default() },
        )
        .await
        .unwrap();
    assert_eq!(after.status, TaskStatus::Cancelled);
}

#[tokio::test]
async fn retry_counter_increments_atomically() {
    let store = MemStore::new();
    let t = store.insert_task(new_task(TaskKind::RunYoutube, "host01")).await.unwrap();
    assert_eq!(store.increment_task_retry(t.id).await.unwrap(), 1);
    assert_eq!(store.increment_task_retry(t.id).await.unwrap(), 2);
}

#[tokio::test]
async fn stats_count_by_status() {
    let store = MemStore::new();
    let a = store.insert_task(new_task(TaskKind::InstallApk, "host01")).await.unwrap();
    store.insert_task(new_task(TaskKind::ScanDevices, "host01")).await.unwrap();
    store
        .update_task_status(
            a.id,
            StatusUpdate { status: Some(TaskStatus::Failed), ..StatusUpdate::default() },
        )
        .await
        .unwrap();

    let stats = store.task_stats().await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.failed, 1);
}

#[tokio::test]
async fn recent_tasks_are_newest_first() {
    let store = MemStore::new();
    for _ in 0..5 {
        store.insert_task(new_task(TaskKind::HealthCheck, "host01")).await.unwrap();
    }
    let recent = store.recent_tasks(3).await.unwrap();
    assert_eq!(recent.len(), 3);
    assert!(recent[0].created_at >= recent[1].created_at);
    assert!(recent[1].created_at >= recent[2].created_at);
}

#[tokio::test]
async fn snapshot_round_trips() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("state.json");

    {
        let store = MemStore::with_snapshot(&path);
        let h = store.create_host(NewHost::default()).await.unwrap();
        store
            .create_device(NewDevice {
                host_id: Some(h.id),
                serial: Some("s1".to_owned()),
                ..NewDevice::default()
            })
            .await
            .unwrap();
        store.insert_task(new_task(TaskKind::ScanDevices, "host01")).await.unwrap();
        store.save_snapshot();
    }

    let reloaded = MemStore::with_snapshot(&path);
    let (hosts, total) = reloaded.list_hosts(None, Page::default()).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(hosts[0].number, "HOST01");
    let device = reloaded.get_device_by_serial("s1").await.unwrap().unwrap();
    assert_eq!(device.code.as_deref(), Some("HOST01-001"));
    assert_eq!(reloaded.task_stats().await.unwrap().total, 1);

    // The sequence survives: the next host continues the numbering.
    let next = reloaded.create_host(NewHost::default()).await.unwrap();
    assert_eq!(next.number, "HOST02");
}
