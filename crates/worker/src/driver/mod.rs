// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! UI-automation driver seam.
//!
//! Everything that touches a handset goes through [`UiDriver`]. The HTTP
//! implementation speaks the automation server's WebDriver dialect; tests use
//! the scripted fake. Element absence is a value (`Ok(None)`), never an error
//! — only session-level failures surface as [`DriverError`].

pub mod http;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Locator strategies the automation server accepts natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Using {
    Id,
    AccessibilityId,
    ClassName,
    Xpath,
}

impl Using {
    /// Wire string for the element-find request body.
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::AccessibilityId => "accessibility id",
            Self::ClassName => "class name",
            Self::Xpath => "xpath",
        }
    }
}

/// Opaque element reference returned by a find.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element(pub String);

/// Application lifecycle state, as reported by the automation server.
///
/// 0 = not installed, 1 = not running, 2 = suspended in background,
/// 3 = running in background, 4 = foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppState(pub u8);

impl AppState {
    pub fn is_running(&self) -> bool {
        self.0 >= 3
    }

    pub fn is_foreground(&self) -> bool {
        self.0 == 4
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("session not found or expired: {0}")]
    SessionExpired(String),
    #[error("no such element: {0}")]
    NoSuchElement(String),
    #[error("stale element reference: {0}")]
    StaleElement(String),
    #[error("automation server error: {0}")]
    Server(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out: {0}")]
    Timeout(String),
}

/// One live automation session bound to one device.
#[async_trait]
pub trait UiDriver: Send + Sync {
    /// The server-side session id; fails when the session has expired.
    async fn session_id(&self) -> Result<String, DriverError>;

    /// Screen dimensions in pixels. Doubles as the cheap liveness RPC.
    async fn window_size(&self) -> Result<(u32, u32), DriverError>;

    /// Poll for an element until `timeout`. Absence is `Ok(None)`.
    async fn find(
        &self,
        using: Using,
        value: &str,
        timeout: Duration,
    ) -> Result<Option<Element>, DriverError>;

    async fn attribute(
        &self,
        element: &Element,
        name: &str,
    ) -> Result<Option<String>, DriverError>;

    async fn click(&self, element: &Element) -> Result<(), DriverError>;

    async fn tap(&self, x: i32, y: i32) -> Result<(), DriverError>;

    async fn clear(&self, element: &Element) -> Result<(), DriverError>;

    async fn send_keys(&self, element: &Element, text: &str) -> Result<(), DriverError>;

    async fn press_keycode(&self, keycode: u32) -> Result<(), DriverError>;

    async fn swipe(
        &self,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        duration_ms: u32,
    ) -> Result<(), DriverError>;

    /// PNG screenshot bytes.
    async fn screenshot(&self) -> Result<Vec<u8>, DriverError>;

    async fn activate_app(&self, package: &str) -> Result<(), DriverError>;

    async fn terminate_app(&self, package: &str) -> Result<bool, DriverError>;

    async fn app_state(&self, package: &str) -> Result<AppState, DriverError>;

    async fn current_package(&self) -> Result<String, DriverError>;

    /// Open a deep link in whatever app claims it.
    async fn open_url(&self, url: &str) -> Result<(), DriverError>;

    /// Run a device shell command through the automation server.
    async fn shell(&self, command: &str, args: &[&str]) -> Result<String, DriverError>;

    /// Tear the session down. Idempotent best-effort.
    async fn quit(&self) -> Result<(), DriverError>;
}
