// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error classification, recovery policy, and the stall monitor.
//!
//! `classify` maps a job failure onto the E-code taxonomy using the error
//! kind plus case-insensitive substring matching on the message. `handle`
//! turns a code and retry count into the next recovery step; `execute_step`
//! performs it against the device.

use std::time::Duration;

use tracing::{info, warn};

use farm_core::error::{ErrorCode, NON_RETRYABLE};

use crate::actions::{Actions, KEYCODE_WAKEUP};
use crate::driver::DriverError;

pub const MAX_RETRY: u32 = 3;
pub const RETRY_BASE_DELAY_SEC: u64 = 5;
pub const RETRY_MAX_DELAY_SEC: u64 = 60;
pub const STALL_TIMEOUT: Duration = Duration::from_secs(120);
pub const NETWORK_WAIT_TIMEOUT: Duration = Duration::from_secs(300);
pub const NETWORK_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Job-level failure, as raised by the orchestrator and flows.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error("app failed to launch: {0}")]
    LaunchFailed(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("playback stalled after {elapsed_sec}s")]
    Stalled { elapsed_sec: u64 },
    #[error("app crashed after {elapsed_sec}s")]
    Crashed { elapsed_sec: u64 },
    #[error("no progress emitted for {idle_sec}s")]
    DeviceTimeout { idle_sec: u64 },
    #[error("job cancelled")]
    Cancelled,
}

/// Next action for a classified failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryStep {
    Fail,
    Retry { delay: Duration },
    WaitNetwork,
    RestartApp,
    UnlockScreen,
}

/// Map a job failure onto an error code.
pub fn classify(error: &JobError) -> ErrorCode {
    match error {
        JobError::Driver(driver) => classify_driver(driver),
        JobError::Stalled { .. } => ErrorCode::PlaybackStalled,
        JobError::Crashed { .. } => ErrorCode::AppCrash,
        JobError::DeviceTimeout { .. } => ErrorCode::RequestTimeout,
        JobError::LaunchFailed(msg) | JobError::Navigation(msg) => classify_message(msg),
        JobError::Cancelled => ErrorCode::Unknown,
    }
}

fn classify_driver(error: &DriverError) -> ErrorCode {
    match error {
        DriverError::SessionExpired(_) => ErrorCode::SessionExpired,
        DriverError::NoSuchElement(_) => ErrorCode::VideoUnavailable,
        DriverError::Timeout(_) => ErrorCode::RequestTimeout,
        DriverError::Transport(msg) => {
            let lower = msg.to_lowercase();
            if lower.contains("timeout") || lower.contains("timed out") {
                ErrorCode::RequestTimeout
            } else if lower.contains("network") || lower.contains("connection") {
                ErrorCode::NetworkDisconnected
            } else {
                ErrorCode::AutomationError
            }
        }
        DriverError::StaleElement(_) | DriverError::Server(_) => ErrorCode::AutomationError,
    }
}

/// Substring classification for free-form failure messages.
pub fn classify_message(message: &str) -> ErrorCode {
    let lower = message.to_lowercase();

    if lower.contains("session") && (lower.contains("not found") || lower.contains("expired")) {
        return ErrorCode::SessionExpired;
    }
    if lower.contains("network") || lower.contains("connection") || lower.contains("timeout") {
        if lower.contains("timeout") {
            return ErrorCode::RequestTimeout;
        }
        return ErrorCode::NetworkDisconnected;
    }
    if lower.contains("rate limit") || lower.contains("too many requests") {
        return ErrorCode::RateLimited;
    }
    if lower.contains("unavailable") || lower.contains("not found") {
        return ErrorCode::VideoUnavailable;
    }
    if lower.contains("region") || lower.contains("blocked") {
        return ErrorCode::RegionBlocked;
    }
    if lower.contains("age") || lower.contains("restricted") {
        return ErrorCode::AgeRestricted;
    }
    if lower.contains("stall") || lower.contains("frozen") {
        return ErrorCode::PlaybackStalled;
    }
    if lower.contains("crash") {
        return ErrorCode::AppCrash;
    }
    if lower.contains("memory") {
        return ErrorCode::MemoryLow;
    }
    if lower.contains("lock") || lower.contains("screen") {
        return ErrorCode::ScreenLocked;
    }
    if lower.contains("battery") {
        return ErrorCode::BatteryLow;
    }
    ErrorCode::Unknown
}

/// Exponential back-off: `min(5 · 2^retry_count, 60)` seconds.
pub fn retry_delay(retry_count: u32) -> Duration {
    let secs = RETRY_BASE_DELAY_SEC
        .saturating_mul(1u64 << retry_count.min(16))
        .min(RETRY_MAX_DELAY_SEC);
    Duration::from_secs(secs)
}

/// Decide the recovery step for a code at a given retry count.
pub fn handle(code: ErrorCode, retry_count: u32) -> RecoveryStep {
    if NON_RETRYABLE.contains(&code) {
        return RecoveryStep::Fail;
    }
    if retry_count >= MAX_RETRY {
        return RecoveryStep::Fail;
    }
    match code {
        ErrorCode::NetworkDisconnected => RecoveryStep::WaitNetwork,
        ErrorCode::AppCrash => RecoveryStep::RestartApp,
        ErrorCode::ScreenLocked => RecoveryStep::UnlockScreen,
        // Session recreation is the caller's job; in-process retry is useless.
        ErrorCode::SessionExpired | ErrorCode::AutomationError => RecoveryStep::Fail,
        _ => RecoveryStep::Retry { delay: retry_delay(retry_count) },
    }
}

/// Execute a recovery step. Returns `true` when the job may be retried.
pub async fn execute_step(step: &RecoveryStep, actions: &Actions, app_package: &str) -> bool {
    match step {
        RecoveryStep::Fail => false,
        RecoveryStep::Retry { delay } => {
            info!(delay_sec = delay.as_secs(), "waiting before retry");
            tokio::time::sleep(*delay).await;
            true
        }
        RecoveryStep::WaitNetwork => wait_for_network(actions).await,
        RecoveryStep::RestartApp => restart_app(actions, app_package).await,
        RecoveryStep::UnlockScreen => unlock_screen(actions).await,
    }
}

/// Poll connectivity from the device until it returns or the window closes.
async fn wait_for_network(actions: &Actions) -> bool {
    let deadline = tokio::time::Instant::now() + NETWORK_WAIT_TIMEOUT;
    loop {
        match actions.shell("ping", &["-c", "1", "-W", "3", "8.8.8.8"]).await {
            Ok(output) if output.contains("1 received") => {
                info!("network recovered");
                return true;
            }
            Ok(_) => {}
            Err(e) => warn!(err = %e, "network probe failed"),
        }
        if tokio::time::Instant::now() + NETWORK_CHECK_INTERVAL > deadline {
            warn!(timeout_sec = NETWORK_WAIT_TIMEOUT.as_secs(), "network recovery timed out");
            return false;
        }
        tokio::time::sleep(NETWORK_CHECK_INTERVAL).await;
    }
}

/// Force-stop and relaunch the app; success iff it is running afterwards.
async fn restart_app(actions: &Actions, app_package: &str) -> bool {
    if let Err(e) = actions.terminate_app(app_package).await {
        warn!(err = %e, "terminate before restart failed");
    }
    tokio::time::sleep(Duration::from_secs(2)).await;
    if let Err(e) = actions.activate_app(app_package).await {
        warn!(err = %e, "activate after restart failed");
        return false;
    }
    tokio::time::sleep(Duration::from_secs(5)).await;
    match actions.is_app_running(app_package).await {
        Ok(running) => {
            if running {
                info!(package = app_package, "app restarted");
            } else {
                warn!(package = app_package, "app did not come back after restart");
            }
            running
        }
        Err(e) => {
            warn!(err = %e, "restart verification failed");
            false
        }
    }
}

/// Wake the screen and swipe up.
async fn unlock_screen(actions: &Actions) -> bool {
    if let Err(e) = actions.press_keycode(KEYCODE_WAKEUP).await {
        warn!(err = %e, "wake keycode failed");
        return false;
    }
    tokio::time::sleep(Duration::from_secs(1)).await;
    let (w, h) = match actions.screen_size().await {
        Ok(size) => size,
        Err(e) => {
            warn!(err = %e, "screen size unavailable for unlock swipe");
            return false;
        }
    };
    let (w, h) = (w as i32, h as i32);
    if let Err(e) =
        actions.swipe(w / 2, (h as f64 * 0.8) as i32, w / 2, (h as f64 * 0.3) as i32, 300).await
    {
        warn!(err = %e, "unlock swipe failed");
        return false;
    }
    tokio::time::sleep(Duration::from_secs(1)).await;
    info!("screen unlocked");
    true
}

/// Time-since-last-progress watchdog for the watch loop.
pub struct StallMonitor {
    timeout: Duration,
    last_progress: f64,
    last_change: tokio::time::Instant,
}

impl StallMonitor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout, last_progress: 0.0, last_change: tokio::time::Instant::now() }
    }

    /// Record a progress reading; the clock resets only when it changed.
    pub fn update(&mut self, progress: f64) {
        if progress != self.last_progress {
            self.last_progress = progress;
            self.last_change = tokio::time::Instant::now();
        }
    }

    pub fn is_stalled(&self) -> bool {
        self.elapsed_since_change() > self.timeout
    }

    pub fn elapsed_since_change(&self) -> Duration {
        self.last_change.elapsed()
    }

    pub fn reset(&mut self) {
        self.last_progress = 0.0;
        self.last_change = tokio::time::Instant::now();
    }
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
