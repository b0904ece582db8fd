// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use farm_core::error::ErrorCode;
use farm_core::task::YoutubeJobParams;

use crate::driver::fake::{Availability, FakeDriver};
use crate::driver::Using;
use crate::youtube::chains::YOUTUBE_PACKAGE;

use super::*;

const LIKE_ID: &str = "com.google.android.youtube:id/like_button";
const PLAYER_ID: &str = "com.google.android.youtube:id/watch_player";
const AD_INDICATOR_ID: &str = "com.google.android.youtube:id/ad_progress_text";
const AD_SKIP_ID: &str = "com.google.android.youtube:id/skip_ad_button";

fn params(assignment: &str) -> YoutubeJobParams {
    YoutubeJobParams {
        device_udid: "dev-test".into(),
        assignment_id: assignment.into(),
        target_url: None,
        keyword: None,
        video_title: None,
        duration_sec: 30,
        duration_min_pct: 50,
        duration_max_pct: 50,
        prob_like: 0,
        prob_comment: 0,
        prob_subscribe: 0,
        prob_playlist: 0,
        comment_text: None,
    }
}

fn player_driver() -> Arc<FakeDriver> {
    let driver = FakeDriver::new();
    driver.set_element(Using::Id, PLAYER_ID, Availability::Always);
    driver
}

struct Run {
    result: JobResult,
    progress: Vec<(u8, String)>,
}

async fn run_job(driver: &Arc<FakeDriver>, params: &YoutubeJobParams) -> Run {
    let tmp = tempfile::tempdir().unwrap();
    let mut orchestrator = Orchestrator::new(driver.clone(), tmp.path());
    let progress: Arc<Mutex<Vec<(u8, String)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = progress.clone();
    let on_progress = move |pct: u8, message: &str| {
        sink.lock().push((pct, message.to_owned()));
    };
    let cancel = tokio_util::sync::CancellationToken::new();
    let result = orchestrator.execute(params, &cancel, &on_progress).await;
    let progress = progress.lock().clone();
    Run { result, progress }
}

#[tokio::test(start_paused = true)]
async fn url_job_watches_likes_and_records_evidence() {
    let driver = player_driver();
    driver.set_element(Using::Id, LIKE_ID, Availability::Always);

    let mut p = params("A1");
    p.target_url = Some("https://youtu.be/X".into());
    p.prob_like = 100;

    let run = run_job(&driver, &p).await;

    assert!(run.result.success, "error: {:?}", run.result.error_message);
    assert!(run.result.search_success);
    assert!(run.result.did_like);
    assert_eq!(run.result.duration_sec, 15.0);
    assert_eq!(driver.urls(), vec!["https://youtu.be/X".to_owned()]);

    // Exactly one like tap.
    assert_eq!(driver.click_count(Using::Id, LIKE_ID), 1);

    // Progress at the 10s boundary during the watch, then the 85% step at
    // watch end.
    assert!(run.progress.iter().any(|(_, m)| m.contains("Watching: 10/15s")));
    assert!(run.progress.iter().any(|(pct, _)| *pct == 85));
    assert!(run.progress.iter().any(|(pct, _)| *pct == 100));

    // Evidence milestones, bounded by the cap.
    let evidence = run.result.evidence.as_ref().unwrap();
    let actions: Vec<&str> =
        evidence.evidence_files.iter().map(|f| f.action.as_str()).collect();
    for expected in ["search", "video_found", "watch_start", "watch_end"] {
        assert!(actions.contains(&expected), "missing {expected} in {actions:?}");
    }
    assert!(evidence.evidence_count <= crate::evidence::MAX_SCREENSHOTS_PER_JOB);
}

#[tokio::test(start_paused = true)]
async fn forward_skip_double_taps_the_player_right_region() {
    let driver = player_driver();
    let mut p = params("A1b");
    p.target_url = Some("https://youtu.be/X".into());

    let run = run_job(&driver, &p).await;
    assert!(run.result.success);

    // 0.75·1080 = 810, 0.40·2220 = 888; a double tap lands at least twice.
    let hits = driver.taps().iter().filter(|t| **t == (810, 888)).count();
    assert!(hits >= 2, "taps: {:?}", driver.taps());
}

#[tokio::test(start_paused = true)]
async fn ad_interruption_is_detected_and_skipped() {
    let driver = player_driver();
    // Ad on screen for the first 12s; the skip button becomes tappable at 8s
    // and disappears with the ad.
    driver.set_element(
        Using::Id,
        AD_INDICATOR_ID,
        Availability::Until(Duration::from_secs(12)),
    );
    driver.set_element(
        Using::Id,
        AD_SKIP_ID,
        Availability::Between(Duration::from_secs(8), Duration::from_secs(12)),
    );

    let mut p = params("A2");
    p.target_url = Some("https://youtu.be/X".into());
    p.duration_sec = 40; // 50% → 20s watch

    let run = run_job(&driver, &p).await;

    assert!(run.result.success);
    assert!(run.result.ad_stats.ads_detected >= 1, "{:?}", run.result.ad_stats);
    assert_eq!(run.result.ad_stats.ads_skipped, 1);
    assert_eq!(driver.click_count(Using::Id, AD_SKIP_ID), 1);
}

#[tokio::test(start_paused = true)]
async fn frozen_playback_position_raises_stall() {
    let driver = player_driver();
    driver.freeze_playback_at(5_000);

    let mut p = params("A3");
    p.target_url = Some("https://youtu.be/X".into());
    p.duration_sec = 600; // 50% → 300s target, stall fires first

    let run = run_job(&driver, &p).await;

    assert!(!run.result.success);
    assert_eq!(run.result.error_code, Some(ErrorCode::PlaybackStalled));
    let evidence = run.result.evidence.as_ref().unwrap();
    assert!(evidence.evidence_files.iter().any(|f| f.action == "error"));
}

#[tokio::test(start_paused = true)]
async fn app_leaving_foreground_raises_crash() {
    let driver = player_driver();
    let mut p = params("A4");
    p.target_url = Some("https://youtu.be/X".into());
    p.duration_sec = 600;

    let handle = {
        let driver = driver.clone();
        let p = p.clone();
        tokio::spawn(async move { run_job(&driver, &p).await })
    };
    // Let the job get into the watch loop, then kill the app.
    tokio::time::sleep(Duration::from_secs(30)).await;
    driver.set_app_state(YOUTUBE_PACKAGE, 1);
    let run = handle.await.unwrap();

    assert!(!run.result.success);
    assert_eq!(run.result.error_code, Some(ErrorCode::AppCrash));
}

#[tokio::test(start_paused = true)]
async fn keyword_search_drives_input_and_selects_result() {
    let driver = player_driver();
    driver.set_element(Using::AccessibilityId, "Search", Availability::Always);
    driver.set_element(
        Using::Id,
        "com.google.android.youtube:id/search_edit_text",
        Availability::Always,
    );
    driver.set_element(
        Using::Id,
        "com.google.android.youtube:id/video_with_context",
        Availability::Always,
    );

    let mut p = params("A5");
    p.keyword = Some("rust async runtime".into());
    p.duration_sec = 10; // 50% → 5s watch

    let run = run_job(&driver, &p).await;

    assert!(run.result.success, "error: {:?}", run.result.error_message);
    assert!(run.result.search_success);
    assert!(driver.typed().iter().any(|(_, text)| text == "rust async runtime"));
    assert!(driver.keycodes().contains(&crate::actions::KEYCODE_ENTER));
}

#[tokio::test(start_paused = true)]
async fn missing_search_ui_fails_with_video_unavailable() {
    let driver = player_driver();
    let mut p = params("A6");
    p.keyword = Some("anything".into());

    let run = run_job(&driver, &p).await;

    assert!(!run.result.success);
    // "no matching video found" classifies as video-unavailable.
    assert_eq!(run.result.error_code, Some(ErrorCode::VideoUnavailable));
    assert!(!run.result.search_success);
}

#[tokio::test(start_paused = true)]
async fn url_landing_outside_the_player_is_reported() {
    let driver = player_driver();
    driver.set_url_opens_in("com.android.chrome");

    let mut p = params("A7");
    p.target_url = Some("https://youtu.be/X".into());

    let run = run_job(&driver, &p).await;

    assert!(!run.result.success);
    assert!(run
        .result
        .error_message
        .as_deref()
        .unwrap_or("")
        .contains("com.android.chrome"));
}

#[tokio::test(start_paused = true)]
async fn already_liked_video_is_not_retapped() {
    let driver = player_driver();
    driver.set_element(Using::Id, LIKE_ID, Availability::Always);
    driver.set_attribute(Using::Id, LIKE_ID, "content-desc", "You liked this video");

    let mut p = params("A8");
    p.target_url = Some("https://youtu.be/X".into());
    p.prob_like = 100;
    p.duration_sec = 10;

    let run = run_job(&driver, &p).await;

    assert!(run.result.success);
    assert!(run.result.did_like);
    assert_eq!(driver.click_count(Using::Id, LIKE_ID), 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_mid_watch_finalizes_evidence() {
    let driver = player_driver();
    let tmp = tempfile::tempdir().unwrap();
    let mut orchestrator = Orchestrator::new(driver.clone(), tmp.path());

    let mut p = params("A9");
    p.target_url = Some("https://youtu.be/X".into());
    p.duration_sec = 240; // 50% → 120s target

    let cancel = tokio_util::sync::CancellationToken::new();
    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            cancel.cancel();
        })
    };

    let on_progress = |_: u8, _: &str| {};
    let result = orchestrator.execute(&p, &cancel, &on_progress).await;
    canceller.await.unwrap();

    assert!(result.cancelled);
    assert!(!result.success);
    // Evidence was still finalized on the way out.
    let evidence = result.evidence.as_ref().unwrap();
    assert!(std::path::Path::new(&evidence.evidence_dir).join("result.json").exists());
}

#[test]
fn media_position_parses_from_dumpsys() {
    let output = "  state=PlaybackState {state=3, position=152340, buffered position=0}";
    assert_eq!(parse_media_position(output), Some(152_340));
    assert_eq!(parse_media_position("no session"), None);
    assert_eq!(parse_media_position("position=-1"), Some(-1));
}

#[test]
fn watch_duration_sampling_respects_bounds() {
    let mut p = params("A10");
    p.duration_sec = 100;
    p.duration_min_pct = 30;
    p.duration_max_pct = 90;
    for _ in 0..50 {
        let d = sample_watch_duration(&p);
        assert!((30.0..=90.0).contains(&d), "sampled {d}");
    }

    p.duration_min_pct = 50;
    p.duration_max_pct = 50;
    assert_eq!(sample_watch_duration(&p), 50.0);
}
