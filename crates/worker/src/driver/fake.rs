// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted in-memory driver for tests.
//!
//! Element presence is scripted as availability windows relative to the
//! driver's creation instant, evaluated against the tokio clock so paused-time
//! tests can fast-forward through waits. Every interaction is recorded.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{AppState, DriverError, Element, UiDriver, Using};

/// How often the fake re-evaluates availability while a find waits.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// When an element can be found, relative to driver creation.
#[derive(Debug, Clone, Copy)]
pub enum Availability {
    Always,
    Never,
    From(Duration),
    Until(Duration),
    Between(Duration, Duration),
}

impl Availability {
    fn available_at(&self, elapsed: Duration) -> bool {
        match *self {
            Self::Always => true,
            Self::Never => false,
            Self::From(start) => elapsed >= start,
            Self::Until(end) => elapsed < end,
            Self::Between(start, end) => elapsed >= start && elapsed < end,
        }
    }
}

type PlaybackFn = dyn Fn(Duration) -> i64 + Send + Sync;

struct FakeState {
    alive: bool,
    window: (u32, u32),
    foreground: String,
    url_opens_in: Option<String>,
    app_states: HashMap<String, u8>,
    elements: HashMap<String, Availability>,
    attributes: HashMap<String, HashMap<String, String>>,
    shell_responses: Vec<(String, String)>,
    clicks: Vec<String>,
    taps: Vec<(i32, i32)>,
    typed: Vec<(String, String)>,
    keycodes: Vec<u32>,
    swipes: Vec<(i32, i32, i32, i32)>,
    urls: Vec<String>,
    shell_calls: Vec<String>,
    screenshots: u32,
}

/// Scripted driver. Clone the `Arc` into the code under test and keep one
/// handle for assertions.
pub struct FakeDriver {
    session: String,
    epoch: tokio::time::Instant,
    playback: Mutex<Arc<PlaybackFn>>,
    state: Mutex<FakeState>,
}

fn element_key(using: Using, value: &str) -> String {
    format!("{}|{value}", using.as_wire())
}

impl FakeDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            session: uuid::Uuid::new_v4().to_string(),
            epoch: tokio::time::Instant::now(),
            // Playback advances with the clock unless a test freezes it.
            playback: Mutex::new(Arc::new(|elapsed: Duration| elapsed.as_millis() as i64)),
            state: Mutex::new(FakeState {
                alive: true,
                window: (1080, 2220),
                foreground: String::new(),
                url_opens_in: None,
                app_states: HashMap::new(),
                elements: HashMap::new(),
                attributes: HashMap::new(),
                shell_responses: Vec::new(),
                clicks: Vec::new(),
                taps: Vec::new(),
                typed: Vec::new(),
                keycodes: Vec::new(),
                swipes: Vec::new(),
                urls: Vec::new(),
                shell_calls: Vec::new(),
                screenshots: 0,
            }),
        })
    }

    fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn check_alive(&self) -> Result<(), DriverError> {
        if self.state.lock().alive {
            Ok(())
        } else {
            Err(DriverError::SessionExpired("fake session terminated".into()))
        }
    }

    // -- Scripting ------------------------------------------------------------

    pub fn set_element(&self, using: Using, value: &str, availability: Availability) {
        self.state.lock().elements.insert(element_key(using, value), availability);
    }

    pub fn set_attribute(&self, using: Using, value: &str, name: &str, attr: &str) {
        self.state
            .lock()
            .attributes
            .entry(element_key(using, value))
            .or_default()
            .insert(name.to_owned(), attr.to_owned());
    }

    /// Respond to shell commands whose rendered form starts with `prefix`.
    pub fn set_shell_response(&self, prefix: &str, output: &str) {
        self.state.lock().shell_responses.push((prefix.to_owned(), output.to_owned()));
    }

    pub fn set_foreground(&self, package: &str) {
        let mut state = self.state.lock();
        state.foreground = package.to_owned();
        state.app_states.insert(package.to_owned(), 4);
    }

    pub fn set_app_state(&self, package: &str, code: u8) {
        self.state.lock().app_states.insert(package.to_owned(), code);
    }

    /// Freeze the reported playback position.
    pub fn freeze_playback_at(&self, position_ms: i64) {
        *self.playback.lock() = Arc::new(move |_| position_ms);
    }

    /// Make deep links land in the given package instead of the player.
    pub fn set_url_opens_in(&self, package: &str) {
        self.state.lock().url_opens_in = Some(package.to_owned());
    }

    pub fn expire_session(&self) {
        self.state.lock().alive = false;
    }

    // -- Assertion helpers ----------------------------------------------------

    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().clicks.clone()
    }

    pub fn click_count(&self, using: Using, value: &str) -> usize {
        let key = element_key(using, value);
        self.state.lock().clicks.iter().filter(|c| **c == key).count()
    }

    pub fn taps(&self) -> Vec<(i32, i32)> {
        self.state.lock().taps.clone()
    }

    pub fn typed(&self) -> Vec<(String, String)> {
        self.state.lock().typed.clone()
    }

    pub fn keycodes(&self) -> Vec<u32> {
        self.state.lock().keycodes.clone()
    }

    pub fn swipes(&self) -> Vec<(i32, i32, i32, i32)> {
        self.state.lock().swipes.clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.state.lock().urls.clone()
    }

    pub fn shell_calls(&self) -> Vec<String> {
        self.state.lock().shell_calls.clone()
    }

    pub fn screenshot_count(&self) -> u32 {
        self.state.lock().screenshots
    }

    pub fn is_alive(&self) -> bool {
        self.state.lock().alive
    }
}

/// Factory handing out scripted drivers; records the capabilities it saw.
#[derive(Default)]
pub struct FakeDriverFactory {
    prepared: Mutex<Vec<Arc<FakeDriver>>>,
    caps_seen: Mutex<Vec<crate::caps::Capabilities>>,
    fail_next: Mutex<u32>,
    created: Mutex<Vec<Arc<FakeDriver>>>,
}

impl FakeDriverFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a pre-scripted driver for the next create.
    pub fn prepare(&self, driver: Arc<FakeDriver>) {
        self.prepared.lock().push(driver);
    }

    /// Make the next `n` creates fail.
    pub fn fail_next(&self, n: u32) {
        *self.fail_next.lock() = n;
    }

    pub fn caps_seen(&self) -> Vec<crate::caps::Capabilities> {
        self.caps_seen.lock().clone()
    }

    pub fn created(&self) -> Vec<Arc<FakeDriver>> {
        self.created.lock().clone()
    }
}

#[async_trait]
impl crate::session::DriverFactory for FakeDriverFactory {
    async fn create(
        &self,
        caps: &crate::caps::Capabilities,
    ) -> Result<Arc<dyn UiDriver>, DriverError> {
        self.caps_seen.lock().push(caps.clone());
        {
            let mut fail = self.fail_next.lock();
            if *fail > 0 {
                *fail -= 1;
                return Err(DriverError::Server("session create failed".into()));
            }
        }
        let driver = {
            let mut prepared = self.prepared.lock();
            if prepared.is_empty() {
                FakeDriver::new()
            } else {
                prepared.remove(0)
            }
        };
        self.created.lock().push(driver.clone());
        Ok(driver)
    }
}

#[async_trait]
impl UiDriver for FakeDriver {
    async fn session_id(&self) -> Result<String, DriverError> {
        self.check_alive()?;
        Ok(self.session.clone())
    }

    async fn window_size(&self) -> Result<(u32, u32), DriverError> {
        self.check_alive()?;
        Ok(self.state.lock().window)
    }

    async fn find(
        &self,
        using: Using,
        value: &str,
        timeout: Duration,
    ) -> Result<Option<Element>, DriverError> {
        let key = element_key(using, value);
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            self.check_alive()?;
            let available = self
                .state
                .lock()
                .elements
                .get(&key)
                .map(|a| a.available_at(self.elapsed()))
                .unwrap_or(false);
            if available {
                return Ok(Some(Element(key)));
            }
            if tokio::time::Instant::now() + POLL_INTERVAL > deadline {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn attribute(
        &self,
        element: &Element,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        self.check_alive()?;
        Ok(self
            .state
            .lock()
            .attributes
            .get(&element.0)
            .and_then(|attrs| attrs.get(name))
            .cloned())
    }

    async fn click(&self, element: &Element) -> Result<(), DriverError> {
        self.check_alive()?;
        self.state.lock().clicks.push(element.0.clone());
        Ok(())
    }

    async fn tap(&self, x: i32, y: i32) -> Result<(), DriverError> {
        self.check_alive()?;
        self.state.lock().taps.push((x, y));
        Ok(())
    }

    async fn clear(&self, _element: &Element) -> Result<(), DriverError> {
        self.check_alive()
    }

    async fn send_keys(&self, element: &Element, text: &str) -> Result<(), DriverError> {
        self.check_alive()?;
        self.state.lock().typed.push((element.0.clone(), text.to_owned()));
        Ok(())
    }

    async fn press_keycode(&self, keycode: u32) -> Result<(), DriverError> {
        self.check_alive()?;
        self.state.lock().keycodes.push(keycode);
        Ok(())
    }

    async fn swipe(
        &self,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        _duration_ms: u32,
    ) -> Result<(), DriverError> {
        self.check_alive()?;
        self.state.lock().swipes.push((x1, y1, x2, y2));
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        self.check_alive()?;
        let mut state = self.state.lock();
        state.screenshots += 1;
        // Valid PNG signature followed by a counter, enough for file tests.
        let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
        bytes.extend_from_slice(&state.screenshots.to_be_bytes());
        Ok(bytes)
    }

    async fn activate_app(&self, package: &str) -> Result<(), DriverError> {
        self.check_alive()?;
        self.set_foreground(package);
        Ok(())
    }

    async fn terminate_app(&self, package: &str) -> Result<bool, DriverError> {
        self.check_alive()?;
        let mut state = self.state.lock();
        state.app_states.insert(package.to_owned(), 1);
        if state.foreground == package {
            state.foreground.clear();
        }
        Ok(true)
    }

    async fn app_state(&self, package: &str) -> Result<AppState, DriverError> {
        self.check_alive()?;
        Ok(AppState(self.state.lock().app_states.get(package).copied().unwrap_or(1)))
    }

    async fn current_package(&self) -> Result<String, DriverError> {
        self.check_alive()?;
        Ok(self.state.lock().foreground.clone())
    }

    async fn open_url(&self, url: &str) -> Result<(), DriverError> {
        self.check_alive()?;
        let mut state = self.state.lock();
        state.urls.push(url.to_owned());
        if let Some(package) = state.url_opens_in.clone() {
            state.foreground = package.clone();
            state.app_states.insert(package, 4);
        }
        Ok(())
    }

    async fn shell(&self, command: &str, args: &[&str]) -> Result<String, DriverError> {
        self.check_alive()?;
        let rendered = if args.is_empty() {
            command.to_owned()
        } else {
            format!("{command} {}", args.join(" "))
        };

        if rendered.starts_with("dumpsys media_session") {
            let playback = self.playback.lock().clone();
            let position = (playback.as_ref())(self.elapsed());
            self.state.lock().shell_calls.push(rendered);
            return Ok(format!(
                "  state=PlaybackState {{state=3, position={position}, buffered position=0, speed=1.0}}\n"
            ));
        }

        let mut state = self.state.lock();
        state.shell_calls.push(rendered.clone());
        for (prefix, output) in &state.shell_responses {
            if rendered.starts_with(prefix.as_str()) {
                return Ok(output.clone());
            }
        }
        Ok(String::new())
    }

    async fn quit(&self) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        if !state.alive {
            return Err(DriverError::SessionExpired("fake session terminated".into()));
        }
        state.alive = false;
        Ok(())
    }
}
