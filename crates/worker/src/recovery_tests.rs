// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use farm_core::error::ErrorCode;

use crate::actions::Actions;
use crate::driver::fake::FakeDriver;
use crate::driver::DriverError;

use super::*;

#[yare::parameterized(
    session_not_found = { "session is not found in cache", ErrorCode::SessionExpired },
    session_expired = { "the session expired", ErrorCode::SessionExpired },
    timeout = { "request timeout reached", ErrorCode::RequestTimeout },
    network = { "network is unreachable", ErrorCode::NetworkDisconnected },
    connection = { "connection reset by peer", ErrorCode::NetworkDisconnected },
    rate_limit = { "rate limit exceeded", ErrorCode::RateLimited },
    unavailable = { "this video is unavailable", ErrorCode::VideoUnavailable },
    not_found = { "video not found", ErrorCode::VideoUnavailable },
    region = { "blocked in your region", ErrorCode::RegionBlocked },
    age = { "age-restricted content", ErrorCode::AgeRestricted },
    stall = { "playback stalled", ErrorCode::PlaybackStalled },
    frozen = { "player frozen", ErrorCode::PlaybackStalled },
    crash = { "app crash detected", ErrorCode::AppCrash },
    memory = { "out of memory", ErrorCode::MemoryLow },
    locked = { "screen is locked", ErrorCode::ScreenLocked },
    battery = { "battery too low", ErrorCode::BatteryLow },
    unknown = { "some novel failure", ErrorCode::Unknown },
)]
fn message_classification(message: &str, expected: ErrorCode) {
    assert_eq!(classify_message(message), expected);
}

#[test]
fn classification_is_case_insensitive() {
    assert_eq!(classify_message("VIDEO UNAVAILABLE"), ErrorCode::VideoUnavailable);
    assert_eq!(classify_message("Network Error"), ErrorCode::NetworkDisconnected);
}

#[test]
fn job_errors_classify_by_kind_first() {
    assert_eq!(
        classify(&JobError::Stalled { elapsed_sec: 125 }),
        ErrorCode::PlaybackStalled
    );
    assert_eq!(classify(&JobError::Crashed { elapsed_sec: 10 }), ErrorCode::AppCrash);
    assert_eq!(
        classify(&JobError::DeviceTimeout { idle_sec: 1200 }),
        ErrorCode::RequestTimeout
    );
    assert_eq!(
        classify(&JobError::Driver(DriverError::SessionExpired("gone".into()))),
        ErrorCode::SessionExpired
    );
    assert_eq!(
        classify(&JobError::Driver(DriverError::NoSuchElement("player".into()))),
        ErrorCode::VideoUnavailable
    );
    assert_eq!(
        classify(&JobError::Driver(DriverError::Server("500".into()))),
        ErrorCode::AutomationError
    );
}

#[yare::parameterized(
    unavailable = { ErrorCode::VideoUnavailable },
    region = { ErrorCode::RegionBlocked },
    memory = { ErrorCode::MemoryLow },
    battery = { ErrorCode::BatteryLow },
)]
fn non_retryable_codes_fail_immediately(code: ErrorCode) {
    assert_eq!(handle(code, 0), RecoveryStep::Fail);
}

#[test]
fn retry_budget_is_bounded() {
    assert_eq!(handle(ErrorCode::PlaybackStalled, MAX_RETRY), RecoveryStep::Fail);
    assert_eq!(handle(ErrorCode::PlaybackStalled, MAX_RETRY + 5), RecoveryStep::Fail);
}

#[test]
fn code_specific_recovery_actions() {
    assert_eq!(handle(ErrorCode::NetworkDisconnected, 0), RecoveryStep::WaitNetwork);
    assert_eq!(handle(ErrorCode::AppCrash, 1), RecoveryStep::RestartApp);
    assert_eq!(handle(ErrorCode::ScreenLocked, 2), RecoveryStep::UnlockScreen);
    assert_eq!(handle(ErrorCode::SessionExpired, 0), RecoveryStep::Fail);
    assert_eq!(handle(ErrorCode::AutomationError, 0), RecoveryStep::Fail);
}

#[test]
fn default_retry_uses_exponential_backoff() {
    assert_eq!(
        handle(ErrorCode::PlaybackStalled, 0),
        RecoveryStep::Retry { delay: Duration::from_secs(5) }
    );
    assert_eq!(
        handle(ErrorCode::PlaybackStalled, 1),
        RecoveryStep::Retry { delay: Duration::from_secs(10) }
    );
    assert_eq!(
        handle(ErrorCode::PlaybackStalled, 2),
        RecoveryStep::Retry { delay: Duration::from_secs(20) }
    );
}

#[test]
fn backoff_caps_at_sixty_seconds() {
    assert_eq!(retry_delay(0), Duration::from_secs(5));
    assert_eq!(retry_delay(3), Duration::from_secs(40));
    assert_eq!(retry_delay(4), Duration::from_secs(60));
    assert_eq!(retry_delay(30), Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn stall_monitor_trips_after_quiet_period() {
    let mut monitor = StallMonitor::new(STALL_TIMEOUT);
    monitor.update(0.25);
    assert!(!monitor.is_stalled());

    tokio::time::advance(Duration::from_secs(119)).await;
    monitor.update(0.25); // unchanged, no reset
    assert!(!monitor.is_stalled());

    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(monitor.is_stalled());
}

#[tokio::test(start_paused = true)]
async fn stall_monitor_resets_on_progress_change() {
    let mut monitor = StallMonitor::new(STALL_TIMEOUT);
    monitor.update(0.25);
    tokio::time::advance(Duration::from_secs(119)).await;
    monitor.update(0.30);
    tokio::time::advance(Duration::from_secs(119)).await;
    assert!(!monitor.is_stalled());
}

#[tokio::test(start_paused = true)]
async fn wait_network_succeeds_on_ping_reply() {
    let driver = FakeDriver::new();
    driver.set_shell_response("ping", "1 packets transmitted, 1 received, 0% packet loss");
    let actions = Actions::new(driver.clone());

    assert!(execute_step(&RecoveryStep::WaitNetwork, &actions, "com.example").await);
    assert!(driver.shell_calls().iter().any(|c| c.starts_with("ping -c 1 -W 3 8.8.8.8")));
}

#[tokio::test(start_paused = true)]
async fn wait_network_gives_up_after_the_window() {
    let driver = FakeDriver::new();
    driver.set_shell_response("ping", "0 received, 100% packet loss");
    let actions = Actions::new(driver.clone());

    let start = tokio::time::Instant::now();
    assert!(!execute_step(&RecoveryStep::WaitNetwork, &actions, "com.example").await);
    assert!(start.elapsed() >= Duration::from_secs(290));
    assert!(start.elapsed() <= NETWORK_WAIT_TIMEOUT + Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn restart_app_verifies_foreground() {
    let driver = FakeDriver::new();
    driver.set_foreground("com.example");
    let actions = Actions::new(driver.clone());

    assert!(execute_step(&RecoveryStep::RestartApp, &actions, "com.example").await);
}

#[tokio::test(start_paused = true)]
async fn unlock_screen_wakes_and_swipes() {
    let driver = FakeDriver::new();
    let actions = Actions::new(driver.clone());

    assert!(execute_step(&RecoveryStep::UnlockScreen, &actions, "com.example").await);
    assert_eq!(driver.keycodes(), vec![crate::actions::KEYCODE_WAKEUP]);

    // One upward swipe: start low, end high.
    let swipes = driver.swipes();
    assert_eq!(swipes.len(), 1);
    let (_, y1, _, y2) = swipes[0];
    assert!(y1 > y2);
}
