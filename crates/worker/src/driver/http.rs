// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebDriver HTTP client for the UiAutomator2 automation server.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use tracing::debug;

use super::{AppState, DriverError, Element, UiDriver, Using};
use crate::caps::Capabilities;

/// W3C element reference key.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// How often an element find re-asks the server while waiting.
const FIND_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Ceiling for any single HTTP round-trip to the automation server.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// One WebDriver session against the local automation server.
pub struct WebDriverSession {
    http: reqwest::Client,
    base: String,
    session: String,
}

impl WebDriverSession {
    /// Create a new session with the given capabilities.
    pub async fn create(automation_url: &str, caps: &Capabilities) -> Result<Self, DriverError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DriverError::Transport(e.to_string()))?;
        let base = automation_url.trim_end_matches('/').to_owned();

        let body = json!({ "capabilities": { "alwaysMatch": caps } });
        let value = request(&http, reqwest::Method::POST, &format!("{base}/session"), Some(body))
            .await?;

        let session = value
            .get("sessionId")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| DriverError::Server("no sessionId in create response".into()))?;

        debug!(session = %session, "automation session created");
        Ok(Self { http, base, session })
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/session/{}{suffix}", self.base, self.session)
    }

    async fn post(&self, suffix: &str, body: Value) -> Result<Value, DriverError> {
        request(&self.http, reqwest::Method::POST, &self.url(suffix), Some(body)).await
    }

    async fn get(&self, suffix: &str) -> Result<Value, DriverError> {
        request(&self.http, reqwest::Method::GET, &self.url(suffix), None).await
    }

    /// `mobile:` extension scripts go through execute/sync.
    async fn execute(&self, script: &str, args: Value) -> Result<Value, DriverError> {
        self.post("/execute/sync", json!({ "script": script, "args": [args] })).await
    }

    /// Single element-find round trip; absence comes back as an error value.
    async fn find_once(&self, using: Using, value: &str) -> Result<Element, DriverError> {
        let body = json!({ "using": using.as_wire(), "value": value });
        let found = self.post("/element", body).await?;
        found
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(|id| Element(id.to_owned()))
            .ok_or_else(|| DriverError::Server("malformed element response".into()))
    }
}

/// Issue one request and unwrap the WebDriver `{value}` envelope.
async fn request(
    http: &reqwest::Client,
    method: reqwest::Method,
    url: &str,
    body: Option<Value>,
) -> Result<Value, DriverError> {
    let mut req = http.request(method, url);
    if let Some(body) = body {
        req = req.json(&body);
    }

    let resp = req.send().await.map_err(|e| {
        if e.is_timeout() {
            DriverError::Timeout(e.to_string())
        } else {
            DriverError::Transport(e.to_string())
        }
    })?;

    let status = resp.status();
    let payload: Value = resp
        .json()
        .await
        .map_err(|e| DriverError::Server(format!("invalid response body: {e}")))?;
    let value = payload.get("value").cloned().unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }

    // Error responses carry {value: {error, message}}.
    let code = value.get("error").and_then(Value::as_str).unwrap_or("");
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("automation server request failed")
        .to_owned();

    Err(match code {
        "no such element" => DriverError::NoSuchElement(message),
        "stale element reference" => DriverError::StaleElement(message),
        "invalid session id" | "session not created" => DriverError::SessionExpired(message),
        "timeout" => DriverError::Timeout(message),
        _ => DriverError::Server(format!("{code}: {message}")),
    })
}

#[async_trait]
impl UiDriver for WebDriverSession {
    async fn session_id(&self) -> Result<String, DriverError> {
        // A cheap session-scoped GET; expired sessions 404 here.
        self.get("/window/rect").await?;
        Ok(self.session.clone())
    }

    async fn window_size(&self) -> Result<(u32, u32), DriverError> {
        let rect = self.get("/window/rect").await?;
        let width = rect.get("width").and_then(Value::as_u64).unwrap_or(0) as u32;
        let height = rect.get("height").and_then(Value::as_u64).unwrap_or(0) as u32;
        Ok((width, height))
    }

    async fn find(
        &self,
        using: Using,
        value: &str,
        timeout: Duration,
    ) -> Result<Option<Element>, DriverError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.find_once(using, value).await {
                Ok(element) => return Ok(Some(element)),
                // Not-yet-present conditions keep polling.
                Err(DriverError::NoSuchElement(_)) | Err(DriverError::StaleElement(_)) => {}
                Err(other) => return Err(other),
            }
            if tokio::time::Instant::now() + FIND_POLL_INTERVAL > deadline {
                return Ok(None);
            }
            tokio::time::sleep(FIND_POLL_INTERVAL).await;
        }
    }

    async fn attribute(
        &self,
        element: &Element,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        let value = self.get(&format!("/element/{}/attribute/{name}", element.0)).await?;
        Ok(value.as_str().map(str::to_owned))
    }

    async fn click(&self, element: &Element) -> Result<(), DriverError> {
        self.post(&format!("/element/{}/click", element.0), json!({})).await?;
        Ok(())
    }

    async fn tap(&self, x: i32, y: i32) -> Result<(), DriverError> {
        self.execute("mobile: clickGesture", json!({ "x": x, "y": y })).await?;
        Ok(())
    }

    async fn clear(&self, element: &Element) -> Result<(), DriverError> {
        self.post(&format!("/element/{}/clear", element.0), json!({})).await?;
        Ok(())
    }

    async fn send_keys(&self, element: &Element, text: &str) -> Result<(), DriverError> {
        self.post(&format!("/element/{}/value", element.0), json!({ "text": text })).await?;
        Ok(())
    }

    async fn press_keycode(&self, keycode: u32) -> Result<(), DriverError> {
        self.post("/appium/device/press_keycode", json!({ "keycode": keycode })).await?;
        Ok(())
    }

    async fn swipe(
        &self,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        duration_ms: u32,
    ) -> Result<(), DriverError> {
        let coords =
            [x1.to_string(), y1.to_string(), x2.to_string(), y2.to_string(), duration_ms.to_string()];
        let mut args: Vec<&str> = vec!["swipe"];
        args.extend(coords.iter().map(String::as_str));
        self.shell("input", &args).await?;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        let value = self.get("/screenshot").await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| DriverError::Server("malformed screenshot response".into()))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| DriverError::Server(format!("screenshot decode failed: {e}")))
    }

    async fn activate_app(&self, package: &str) -> Result<(), DriverError> {
        self.post("/appium/device/activate_app", json!({ "appId": package })).await?;
        Ok(())
    }

    async fn terminate_app(&self, package: &str) -> Result<bool, DriverError> {
        let value = self.post("/appium/device/terminate_app", json!({ "appId": package })).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn app_state(&self, package: &str) -> Result<AppState, DriverError> {
        let value = self.post("/appium/device/app_state", json!({ "appId": package })).await?;
        Ok(AppState(value.as_u64().unwrap_or(0) as u8))
    }

    async fn current_package(&self) -> Result<String, DriverError> {
        let value = self.get("/appium/device/current_package").await?;
        Ok(value.as_str().unwrap_or_default().to_owned())
    }

    async fn open_url(&self, url: &str) -> Result<(), DriverError> {
        self.post("/url", json!({ "url": url })).await?;
        Ok(())
    }

    async fn shell(&self, command: &str, args: &[&str]) -> Result<String, DriverError> {
        let value =
            self.execute("mobile: shell", json!({ "command": command, "args": args })).await?;
        Ok(match value {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        })
    }

    async fn quit(&self) -> Result<(), DriverError> {
        request(&self.http, reqwest::Method::DELETE, &self.url(""), None).await?;
        Ok(())
    }
}
