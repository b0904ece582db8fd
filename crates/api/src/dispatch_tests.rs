// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use uuid::Uuid;

use farm_core::event::BrokerTaskView;
use farm_core::task::{ScanDevicesParams, TaskSpec, TaskStatus};

use crate::broker::fake::FakeBroker;
use crate::error::ApiError;
use crate::store::mem::MemStore;
use crate::store::Store;

use super::Dispatcher;

fn scan_spec() -> TaskSpec {
    TaskSpec::ScanDevices(ScanDevicesParams { host_number: "HOST01".into() })
}

fn harness() -> (Dispatcher, Arc<MemStore>, Arc<FakeBroker>) {
    let store = Arc::new(MemStore::new());
    let broker = FakeBroker::new();
    let dispatcher = Dispatcher::new(store.clone(), broker.clone());
    (dispatcher, store, broker)
}

#[tokio::test]
async fn dispatch_publishes_then_records_pending_row() {
    let (dispatcher, store, broker) = harness();

    let ack = dispatcher.dispatch("host01", scan_spec(), None, None).await.unwrap();

    let sent = broker.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].queue, "host01");
    assert_eq!(sent[0].broker_id, ack.broker_id);
    assert_eq!(sent[0].task_id, ack.task_id);

    let row = store.get_task(ack.task_id).await.unwrap().unwrap();
    assert_eq!(row.status, TaskStatus::Pending);
    assert_eq!(row.broker_id, ack.broker_id);
    assert_eq!(row.queue, "host01");
    assert!(row.started_at.is_none());
}

#[tokio::test]
async fn failed_publish_leaves_no_row() {
    let (dispatcher, store, broker) = harness();
    broker.fail_sends();

    let err = dispatcher.dispatch("host01", scan_spec(), None, None).await.unwrap_err();
    assert!(matches!(err, ApiError::BrokerUnavailable(_)));
    assert_eq!(store.task_stats().await.unwrap().total, 0);
}

#[tokio::test]
async fn cancel_revokes_with_terminate_and_marks_the_row() {
    let (dispatcher, store, broker) = harness();
    let ack = dispatcher.dispatch("host01", scan_spec(), None, None).await.unwrap();

    let record = dispatcher.cancel(ack.task_id).await.unwrap();

    assert_eq!(broker.revoked(), vec![(ack.broker_id.clone(), true)]);
    assert_eq!(record.status, TaskStatus::Cancelled);
    assert!(record.completed_at.is_some());

    let row = store.get_task(ack.task_id).await.unwrap().unwrap();
    assert_eq!(row.status, TaskStatus::Cancelled);
}

#[tokio::test]
async fn cancel_of_unknown_task_is_not_found() {
    let (dispatcher, _, broker) = harness();
    let err = dispatcher.cancel(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
    assert!(broker.revoked().is_empty());
}

#[tokio::test]
async fn celery_status_merges_broker_view_with_the_row() {
    let (dispatcher, _, broker) = harness();
    let ack = dispatcher.dispatch("host01", scan_spec(), None, None).await.unwrap();
    broker.views.lock().push(BrokerTaskView {
        broker_id: ack.broker_id.clone(),
        state: "started".into(),
        step: Some("scan".into()),
        progress: Some(40),
        message: None,
        ready: false,
    });

    let merged = dispatcher.celery_status(ack.task_id).await.unwrap();
    assert_eq!(merged["db_status"], "pending");
    assert_eq!(merged["broker_status"]["state"], "started");
    assert_eq!(merged["broker_status"]["progress"], 40);
}

#[tokio::test]
async fn celery_status_tolerates_a_silent_broker() {
    let (dispatcher, _, _) = harness();
    let ack = dispatcher.dispatch("host01", scan_spec(), None, None).await.unwrap();

    let merged = dispatcher.celery_status(ack.task_id).await.unwrap();
    assert!(merged["broker_status"].is_null());
}
