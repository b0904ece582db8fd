// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Basic UI actions over the driver: taps, swipes, text entry, key events,
//! app lifecycle. Directional scrolls are computed from a cached screen size.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::driver::{DriverError, Element, UiDriver};

pub const KEYCODE_HOME: u32 = 3;
pub const KEYCODE_BACK: u32 = 4;
pub const KEYCODE_ENTER: u32 = 66;
pub const KEYCODE_WAKEUP: u32 = 224;

pub struct Actions {
    driver: Arc<dyn UiDriver>,
    screen: Mutex<Option<(u32, u32)>>,
}

impl Actions {
    pub fn new(driver: Arc<dyn UiDriver>) -> Self {
        Self { driver, screen: Mutex::new(None) }
    }

    /// Screen dimensions, fetched once per session.
    pub async fn screen_size(&self) -> Result<(u32, u32), DriverError> {
        if let Some(size) = *self.screen.lock() {
            return Ok(size);
        }
        let size = self.driver.window_size().await?;
        *self.screen.lock() = Some(size);
        Ok(size)
    }

    pub async fn tap(&self, element: &Element) -> Result<(), DriverError> {
        self.driver.click(element).await
    }

    pub async fn tap_at(&self, x: i32, y: i32) -> Result<(), DriverError> {
        self.driver.tap(x, y).await
    }

    pub async fn type_text(
        &self,
        element: &Element,
        text: &str,
        clear_first: bool,
    ) -> Result<(), DriverError> {
        if clear_first {
            self.driver.clear(element).await?;
        }
        self.driver.send_keys(element, text).await
    }

    pub async fn press_keycode(&self, keycode: u32) -> Result<(), DriverError> {
        self.driver.press_keycode(keycode).await
    }

    pub async fn press_enter(&self) -> Result<(), DriverError> {
        self.press_keycode(KEYCODE_ENTER).await
    }

    pub async fn press_back(&self) -> Result<(), DriverError> {
        self.press_keycode(KEYCODE_BACK).await
    }

    pub async fn swipe(
        &self,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        duration_ms: u32,
    ) -> Result<(), DriverError> {
        self.driver.swipe(x1, y1, x2, y2, duration_ms).await
    }

    pub async fn scroll_down(&self) -> Result<(), DriverError> {
        let (w, h) = self.screen_size().await?;
        let (w, h) = (w as i32, h as i32);
        self.swipe(w / 2, (h as f64 * 0.7) as i32, w / 2, (h as f64 * 0.3) as i32, 500).await
    }

    pub async fn scroll_up(&self) -> Result<(), DriverError> {
        let (w, h) = self.screen_size().await?;
        let (w, h) = (w as i32, h as i32);
        self.swipe(w / 2, (h as f64 * 0.3) as i32, w / 2, (h as f64 * 0.7) as i32, 500).await
    }

    /// Short scroll for stepping through result lists.
    pub async fn scroll_down_small(&self) -> Result<(), DriverError> {
        let (w, h) = self.screen_size().await?;
        let (w, h) = (w as i32, h as i32);
        self.swipe(w / 2, (h as f64 * 0.6) as i32, w / 2, (h as f64 * 0.4) as i32, 300).await
    }

    pub async fn swipe_left(&self) -> Result<(), DriverError> {
        let (w, h) = self.screen_size().await?;
        let (w, h) = (w as i32, h as i32);
        self.swipe((w as f64 * 0.8) as i32, h / 2, (w as f64 * 0.2) as i32, h / 2, 500).await
    }

    pub async fn swipe_right(&self) -> Result<(), DriverError> {
        let (w, h) = self.screen_size().await?;
        let (w, h) = (w as i32, h as i32);
        self.swipe((w as f64 * 0.2) as i32, h / 2, (w as f64 * 0.8) as i32, h / 2, 500).await
    }

    pub async fn activate_app(&self, package: &str) -> Result<(), DriverError> {
        self.driver.activate_app(package).await?;
        info!(package, "activated app");
        Ok(())
    }

    pub async fn terminate_app(&self, package: &str) -> Result<bool, DriverError> {
        let stopped = self.driver.terminate_app(package).await?;
        info!(package, stopped, "terminated app");
        Ok(stopped)
    }

    pub async fn is_app_running(&self, package: &str) -> Result<bool, DriverError> {
        Ok(self.driver.app_state(package).await?.is_running())
    }

    pub async fn current_package(&self) -> Result<String, DriverError> {
        self.driver.current_package().await
    }

    pub async fn open_url(&self, url: &str) -> Result<(), DriverError> {
        self.driver.open_url(url).await?;
        info!(url, "opened url");
        Ok(())
    }

    pub async fn shell(&self, command: &str, args: &[&str]) -> Result<String, DriverError> {
        self.driver.shell(command, args).await
    }
}
