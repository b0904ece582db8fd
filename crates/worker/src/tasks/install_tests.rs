// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use farm_core::event::TaskEvent;
use farm_core::task::{BatchInstallParams, InstallApkParams, TaskStatus};

use crate::adb::fake::FakeAdb;
use crate::driver::fake::FakeDriverFactory;
use crate::report::fake::RecordingReporter;
use crate::session::SessionPool;
use crate::youtube::chains::{YOUTUBE_ACTIVITY, YOUTUBE_PACKAGE};

use super::super::TaskContext;
use super::{batch_install, install_apk, BATCH_SIZE};

struct Harness {
    ctx: TaskContext,
    adb: Arc<FakeAdb>,
    reporter: Arc<RecordingReporter>,
    _tmp: tempfile::TempDir,
}

fn harness() -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let apk_dir = tmp.path().join("apk");
    std::fs::create_dir_all(&apk_dir).unwrap();
    std::fs::write(apk_dir.join("youtube.apk"), b"apk-bytes").unwrap();

    let adb = FakeAdb::new();
    let reporter = RecordingReporter::new();
    let ctx = TaskContext {
        host_number: "HOST01".into(),
        queue: "host01".into(),
        adb: adb.clone(),
        pool: Arc::new(SessionPool::new(
            FakeDriverFactory::new(),
            8200,
            8300,
            10,
            300,
            YOUTUBE_PACKAGE,
            YOUTUBE_ACTIVITY,
        )),
        reporter: reporter.clone(),
        http: reqwest::Client::new(),
        automation_url: "http://127.0.0.1:1".into(),
        evidence_dir: tmp.path().join("evidence"),
        apk_dir,
        max_retries: 2,
        retry_backoff: Duration::from_secs(30),
    };
    Harness { ctx, adb, reporter, _tmp: tmp }
}

#[tokio::test(start_paused = true)]
async fn batch_install_runs_in_waves_with_a_pause() {
    let h = harness();
    let serials: Vec<String> = (0..12).map(|i| format!("dev-{i:02}")).collect();

    let start = tokio::time::Instant::now();
    let completion = batch_install(
        &h.ctx,
        Uuid::new_v4(),
        &BatchInstallParams { apk_name: "youtube.apk".into(), serials: Some(serials.clone()) },
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(completion.status, TaskStatus::Success);
    let result = completion.result.unwrap();
    assert_eq!(result["total"], 12);
    assert_eq!(result["success"], 12);
    assert_eq!(result["failed"], 0);

    // Waves of {5, 5, 2} with a 2s pause between waves.
    assert_eq!(h.adb.installs().len(), 12);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(4), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(6), "elapsed {elapsed:?}");

    // One progress event per wave.
    let waves = (serials.len() + BATCH_SIZE - 1) / BATCH_SIZE;
    let progress_events = h
        .reporter
        .tasks()
        .iter()
        .filter(|e| matches!(e, TaskEvent::Progress { .. }))
        .count();
    assert_eq!(progress_events, waves);
}

#[tokio::test(start_paused = true)]
async fn batch_install_aggregates_failures() {
    let h = harness();
    h.adb.fail_installs_for("dev-03");
    let serials: Vec<String> = (0..6).map(|i| format!("dev-{i:02}")).collect();

    let completion = batch_install(
        &h.ctx,
        Uuid::new_v4(),
        &BatchInstallParams { apk_name: "youtube.apk".into(), serials: Some(serials) },
        &CancellationToken::new(),
    )
    .await;

    let result = completion.result.unwrap();
    assert_eq!(result["total"], 6);
    assert_eq!(result["success"], 5);
    assert_eq!(result["failed"], 1);
}

#[tokio::test(start_paused = true)]
async fn install_retries_with_fixed_delay_then_fails() {
    let h = harness();
    h.adb.fail_installs_for("dev-00");

    let completion = install_apk(
        &h.ctx,
        Uuid::new_v4(),
        &InstallApkParams {
            serial: "dev-00".into(),
            apk_name: "youtube.apk".into(),
            device_id: None,
        },
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(completion.status, TaskStatus::Failed);
    assert!(completion.error.unwrap().contains("install failed"));

    let retries = h
        .reporter
        .tasks()
        .iter()
        .filter(|e| matches!(e, TaskEvent::Retrying { .. }))
        .count();
    assert_eq!(retries, 2);
}

#[tokio::test]
async fn missing_apk_fails_without_touching_the_device() {
    let h = harness();

    let completion = install_apk(
        &h.ctx,
        Uuid::new_v4(),
        &InstallApkParams {
            serial: "dev-00".into(),
            apk_name: "nope.apk".into(),
            device_id: None,
        },
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(completion.status, TaskStatus::Failed);
    assert!(completion.error.unwrap().contains("APK not found"));
    assert!(h.adb.installs().is_empty());
}

#[tokio::test]
async fn successful_install_reads_back_the_version() {
    let h = harness();
    h.adb.set_shell_response("dumpsys package", "    versionName=19.05.36\n");

    let completion = install_apk(
        &h.ctx,
        Uuid::new_v4(),
        &InstallApkParams {
            serial: "dev-00".into(),
            apk_name: "youtube.apk".into(),
            device_id: None,
        },
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(completion.status, TaskStatus::Success);
    let result = completion.result.unwrap();
    assert_eq!(result["version"], "19.05.36");
    assert_eq!(h.adb.installs().len(), 1);
}
