// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use farm_core::task::{TaskStatus, YoutubeJobParams};

use crate::adb::fake::FakeAdb;
use crate::driver::fake::{Availability, FakeDriver, FakeDriverFactory};
use crate::driver::Using;
use crate::report::fake::RecordingReporter;
use crate::session::SessionPool;
use crate::youtube::chains::{YOUTUBE_ACTIVITY, YOUTUBE_PACKAGE};

use super::super::TaskContext;
use super::run_youtube;

const PLAYER_ID: &str = "com.google.android.youtube:id/watch_player";

struct Harness {
    ctx: TaskContext,
    factory: Arc<FakeDriverFactory>,
    reporter: Arc<RecordingReporter>,
    _tmp: tempfile::TempDir,
}

fn harness() -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let factory = FakeDriverFactory::new();
    let reporter = RecordingReporter::new();
    let pool = Arc::new(SessionPool::new(
        factory.clone(),
        8200,
        8300,
        10,
        300,
        YOUTUBE_PACKAGE,
        YOUTUBE_ACTIVITY,
    ));
    let ctx = TaskContext {
        host_number: "HOST01".into(),
        queue: "host01".into(),
        adb: FakeAdb::new(),
        pool,
        reporter: reporter.clone(),
        http: reqwest::Client::new(),
        automation_url: "http://127.0.0.1:1".into(),
        evidence_dir: tmp.path().join("evidence"),
        apk_dir: tmp.path().join("apk"),
        max_retries: 2,
        retry_backoff: Duration::from_secs(30),
    };
    Harness { ctx, factory, reporter, _tmp: tmp }
}

fn player_driver() -> Arc<FakeDriver> {
    let driver = FakeDriver::new();
    driver.set_element(Using::Id, PLAYER_ID, Availability::Always);
    driver
}

fn url_params(duration_sec: u32) -> YoutubeJobParams {
    YoutubeJobParams {
        device_udid: "192.168.1.40:5555".into(),
        assignment_id: "A-run".into(),
        target_url: Some("https://youtu.be/X".into()),
        keyword: None,
        video_title: None,
        duration_sec,
        duration_min_pct: 50,
        duration_max_pct: 50,
        prob_like: 0,
        prob_comment: 0,
        prob_subscribe: 0,
        prob_playlist: 0,
        comment_text: None,
    }
}

#[tokio::test(start_paused = true)]
async fn successful_job_reports_and_closes_the_session() {
    let h = harness();
    h.factory.prepare(player_driver());
    let task_id = Uuid::new_v4();

    let completion =
        run_youtube(&h.ctx, task_id, &url_params(30), &CancellationToken::new()).await;

    assert_eq!(completion.status, TaskStatus::Success);
    let result = completion.result.unwrap();
    assert_eq!(result["success"], true);
    assert_eq!(result["duration_sec"], 15.0);
    assert_eq!(result["assignment_id"], "A-run");

    // The session was torn down.
    assert_eq!(h.ctx.pool.active_count(), 0);
    assert!(!h.factory.created()[0].is_alive());

    // Meta progress flowed: session_create, bot_execute, then watching.
    let events = h.reporter.tasks();
    let steps: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            farm_core::event::TaskEvent::Progress { step, .. } => Some(step.clone()),
            _ => None,
        })
        .collect();
    assert!(steps.contains(&"session_create".to_owned()));
    assert!(steps.contains(&"bot_execute".to_owned()));
    assert!(steps.contains(&"watching".to_owned()));
}

#[tokio::test(start_paused = true)]
async fn cancellation_mid_watch_ends_cancelled_with_session_closed() {
    let h = harness();
    h.factory.prepare(player_driver());
    let cancel = CancellationToken::new();
    let task_id = Uuid::new_v4();

    let handle = {
        let ctx = h.ctx.clone();
        let cancel = cancel.clone();
        let params = url_params(240); // 120s target
        tokio::spawn(async move { run_youtube(&ctx, task_id, &params, &cancel).await })
    };

    // Cancel once the job is ~20s into the watch.
    tokio::time::sleep(Duration::from_secs(30)).await;
    cancel.cancel();
    let completion = handle.await.unwrap();

    assert_eq!(completion.status, TaskStatus::Cancelled);
    assert!(completion.status.is_terminal());
    assert_eq!(h.ctx.pool.active_count(), 0);
    assert!(!h.factory.created()[0].is_alive());
}

#[tokio::test(start_paused = true)]
async fn session_lease_failures_retry_then_fail() {
    let h = harness();
    h.factory.fail_next(10);
    let task_id = Uuid::new_v4();

    let completion =
        run_youtube(&h.ctx, task_id, &url_params(30), &CancellationToken::new()).await;

    assert_eq!(completion.status, TaskStatus::Failed);
    assert!(completion.error.unwrap().contains("session lease failed"));
    // Initial attempt plus max_retries = 3 creates.
    assert_eq!(h.factory.caps_seen().len(), 3);

    let retries = h
        .reporter
        .tasks()
        .iter()
        .filter(|e| matches!(e, farm_core::event::TaskEvent::Retrying { .. }))
        .count();
    assert_eq!(retries, 2);
}

#[tokio::test(start_paused = true)]
async fn expired_session_gets_a_fresh_one_on_retry() {
    let h = harness();
    let dead = FakeDriver::new();
    dead.expire_session();
    h.factory.prepare(dead);
    h.factory.prepare(player_driver());
    let task_id = Uuid::new_v4();

    let completion =
        run_youtube(&h.ctx, task_id, &url_params(30), &CancellationToken::new()).await;

    assert_eq!(completion.status, TaskStatus::Success);
    assert_eq!(h.factory.created().len(), 2);
    assert!(h
        .reporter
        .tasks()
        .iter()
        .any(|e| matches!(e, farm_core::event::TaskEvent::Retrying { .. })));
}

#[tokio::test(start_paused = true)]
async fn non_retryable_failure_preserves_the_error_code() {
    let h = harness();
    // Player present but no search UI at all.
    h.factory.prepare(player_driver());
    let mut params = url_params(30);
    params.target_url = None;
    params.keyword = Some("missing ui".into());
    let task_id = Uuid::new_v4();

    let completion = run_youtube(&h.ctx, task_id, &params, &CancellationToken::new()).await;

    assert_eq!(completion.status, TaskStatus::Failed);
    let result = completion.result.unwrap();
    assert_eq!(result["error_code"], "E2001");
    assert!(completion.error.is_some());
}

#[tokio::test(start_paused = true)]
async fn stall_exhausts_in_process_retries_then_fails() {
    let h = harness();
    let driver = player_driver();
    driver.freeze_playback_at(5_000);
    h.factory.prepare(driver.clone());
    let mut params = url_params(600); // 300s target, stall fires first
    params.assignment_id = "A-stall".into();
    let task_id = Uuid::new_v4();

    let completion = run_youtube(&h.ctx, task_id, &params, &CancellationToken::new()).await;

    assert_eq!(completion.status, TaskStatus::Failed);
    let result = completion.result.unwrap();
    assert_eq!(result["error_code"], "E2004");

    // One initial run plus MAX_RETRY in-process retries on the same session.
    assert_eq!(driver.urls().len(), 4);
    assert_eq!(h.factory.created().len(), 1);

    let retries = h
        .reporter
        .tasks()
        .iter()
        .filter(|e| matches!(e, farm_core::event::TaskEvent::Retrying { .. }))
        .count();
    assert_eq!(retries, 3);
}
