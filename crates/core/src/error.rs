// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job error-code taxonomy.
//!
//! Codes travel in task results and evidence manifests, so they live in the
//! shared contract; classification and recovery policy live in the worker.

use serde::{Deserialize, Serialize};

/// Categorized failure codes for device jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// E1001 — network unreachable from the device.
    #[serde(rename = "E1001")]
    NetworkDisconnected,
    /// E1002 — a request against the target service timed out.
    #[serde(rename = "E1002")]
    RequestTimeout,
    /// E1003 — the target service is rate-limiting the device.
    #[serde(rename = "E1003")]
    RateLimited,
    /// E2001 — video deleted or private.
    #[serde(rename = "E2001")]
    VideoUnavailable,
    /// E2002 — video blocked in the device's region.
    #[serde(rename = "E2002")]
    RegionBlocked,
    /// E2003 — age-restricted video on an unverified account.
    #[serde(rename = "E2003")]
    AgeRestricted,
    /// E2004 — playback position frozen past the stall timeout.
    #[serde(rename = "E2004")]
    PlaybackStalled,
    /// E3001 — the target app left the foreground unexpectedly.
    #[serde(rename = "E3001")]
    AppCrash,
    /// E3002 — device out of memory.
    #[serde(rename = "E3002")]
    MemoryLow,
    /// E3003 — screen locked mid-job.
    #[serde(rename = "E3003")]
    ScreenLocked,
    /// E3004 — battery below the safe threshold.
    #[serde(rename = "E3004")]
    BatteryLow,
    /// E4001 — anything unclassified.
    #[serde(rename = "E4001")]
    Unknown,
    /// E4002 — automation session gone; the caller must recreate it.
    #[serde(rename = "E4002")]
    SessionExpired,
    /// E4003 — automation-server failure other than session loss.
    #[serde(rename = "E4003")]
    AutomationError,
}

/// Codes that must never be retried in-process.
pub const NON_RETRYABLE: &[ErrorCode] = &[
    ErrorCode::VideoUnavailable,
    ErrorCode::RegionBlocked,
    ErrorCode::MemoryLow,
    ErrorCode::BatteryLow,
];

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkDisconnected => "E1001",
            Self::RequestTimeout => "E1002",
            Self::RateLimited => "E1003",
            Self::VideoUnavailable => "E2001",
            Self::RegionBlocked => "E2002",
            Self::AgeRestricted => "E2003",
            Self::PlaybackStalled => "E2004",
            Self::AppCrash => "E3001",
            Self::MemoryLow => "E3002",
            Self::ScreenLocked => "E3003",
            Self::BatteryLow => "E3004",
            Self::Unknown => "E4001",
            Self::SessionExpired => "E4002",
            Self::AutomationError => "E4003",
        }
    }

    pub fn is_retryable(&self) -> bool {
        !NON_RETRYABLE.contains(self)
    }

    /// Codes that require the session to be torn down and recreated before
    /// any further work on the device.
    pub fn needs_new_session(&self) -> bool {
        matches!(self, Self::SessionExpired | Self::AutomationError)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
