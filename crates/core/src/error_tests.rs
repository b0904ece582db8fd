// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    network = { ErrorCode::NetworkDisconnected, "E1001", true },
    timeout = { ErrorCode::RequestTimeout, "E1002", true },
    rate_limit = { ErrorCode::RateLimited, "E1003", true },
    unavailable = { ErrorCode::VideoUnavailable, "E2001", false },
    region = { ErrorCode::RegionBlocked, "E2002", false },
    age = { ErrorCode::AgeRestricted, "E2003", true },
    stalled = { ErrorCode::PlaybackStalled, "E2004", true },
    crash = { ErrorCode::AppCrash, "E3001", true },
    memory = { ErrorCode::MemoryLow, "E3002", false },
    locked = { ErrorCode::ScreenLocked, "E3003", true },
    battery = { ErrorCode::BatteryLow, "E3004", false },
    unknown = { ErrorCode::Unknown, "E4001", true },
    session = { ErrorCode::SessionExpired, "E4002", true },
    automation = { ErrorCode::AutomationError, "E4003", true },
)]
fn code_strings_and_retryability(code: ErrorCode, wire: &str, retryable: bool) {
    assert_eq!(code.as_str(), wire);
    assert_eq!(code.is_retryable(), retryable);
}

#[test]
fn serializes_as_bare_code() {
    let wire = serde_json::to_string(&ErrorCode::PlaybackStalled).unwrap();
    assert_eq!(wire, "\"E2004\"");
    let back: ErrorCode = serde_json::from_str(&wire).unwrap();
    assert_eq!(back, ErrorCode::PlaybackStalled);
}

#[test]
fn session_class_codes_need_new_session() {
    assert!(ErrorCode::SessionExpired.needs_new_session());
    assert!(ErrorCode::AutomationError.needs_new_session());
    assert!(!ErrorCode::AppCrash.needs_new_session());
}
