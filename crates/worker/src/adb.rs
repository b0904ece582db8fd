// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ADB access for the non-session task kinds (scan, health, install, reboot,
//! log collection). The [`Adb`] trait is the seam; [`SystemAdb`] shells out
//! to the real binary.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum AdbError {
    #[error("adb spawn failed: {0}")]
    Spawn(String),
    #[error("adb command failed ({status}): {stderr}")]
    CommandFailed { status: i32, stderr: String },
    #[error("adb command timed out after {0:?}")]
    Timeout(Duration),
}

/// Connection state of one attached device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdbDevice {
    pub serial: String,
    pub state: String,
}

/// Device facts gathered by a scan.
#[derive(Debug, Clone, Default)]
pub struct DeviceFacts {
    pub model: Option<String>,
    pub os_version: Option<String>,
    pub battery_level: Option<u8>,
    pub charging: bool,
    pub wifi_ip: Option<String>,
}

#[async_trait]
pub trait Adb: Send + Sync {
    async fn devices(&self) -> Result<Vec<AdbDevice>, AdbError>;
    async fn shell(&self, serial: &str, command: &str) -> Result<String, AdbError>;
    async fn install(
        &self,
        serial: &str,
        apk: &Path,
        reinstall: bool,
        grant_permissions: bool,
    ) -> Result<(), AdbError>;
    async fn uninstall(&self, serial: &str, package: &str) -> Result<(), AdbError>;
    async fn push(&self, serial: &str, local: &Path, remote: &str) -> Result<(), AdbError>;
    async fn reboot(&self, serial: &str) -> Result<(), AdbError>;
}

pub struct SystemAdb {
    path: String,
    timeout: Duration,
}

impl SystemAdb {
    pub fn new(path: impl Into<String>, timeout: Duration) -> Self {
        Self { path: path.into(), timeout }
    }

    async fn run(&self, args: &[&str]) -> Result<String, AdbError> {
        debug!(adb = %self.path, ?args, "running adb");
        let child = tokio::process::Command::new(&self.path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| AdbError::Timeout(self.timeout))?
            .map_err(|e| AdbError::Spawn(e.to_string()))?;

        if !output.status.success() {
            return Err(AdbError::CommandFailed {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Adb for SystemAdb {
    async fn devices(&self) -> Result<Vec<AdbDevice>, AdbError> {
        let output = self.run(&["devices"]).await?;
        Ok(parse_device_list(&output))
    }

    async fn shell(&self, serial: &str, command: &str) -> Result<String, AdbError> {
        self.run(&["-s", serial, "shell", command]).await
    }

    async fn install(
        &self,
        serial: &str,
        apk: &Path,
        reinstall: bool,
        grant_permissions: bool,
    ) -> Result<(), AdbError> {
        let apk = apk.display().to_string();
        let mut args = vec!["-s", serial, "install"];
        if reinstall {
            args.push("-r");
        }
        if grant_permissions {
            args.push("-g");
        }
        args.push(&apk);
        self.run(&args).await?;
        Ok(())
    }

    async fn uninstall(&self, serial: &str, package: &str) -> Result<(), AdbError> {
        self.run(&["-s", serial, "uninstall", package]).await?;
        Ok(())
    }

    async fn push(&self, serial: &str, local: &Path, remote: &str) -> Result<(), AdbError> {
        let local = local.display().to_string();
        self.run(&["-s", serial, "push", &local, remote]).await?;
        Ok(())
    }

    async fn reboot(&self, serial: &str) -> Result<(), AdbError> {
        self.run(&["-s", serial, "reboot"]).await?;
        Ok(())
    }
}

// -- Parsing ------------------------------------------------------------------

/// Parse `adb devices` output into serial/state pairs.
pub fn parse_device_list(output: &str) -> Vec<AdbDevice> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            let state = parts.next()?;
            Some(AdbDevice { serial: serial.to_owned(), state: state.to_owned() })
        })
        .collect()
}

/// Battery level and charging flag from `dumpsys battery`.
pub fn parse_battery(output: &str) -> (u8, bool) {
    let mut level = 0u8;
    let mut charging = false;
    for line in output.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("level:") {
            level = value.trim().parse().unwrap_or(0);
        } else if let Some(value) = line.strip_prefix("status:") {
            // 2 = charging, 5 = full.
            let status: i32 = value.trim().parse().unwrap_or(0);
            charging = status == 2 || status == 5;
        }
    }
    (level, charging)
}

/// First `inet` address from `ip addr show wlan0`.
pub fn parse_wifi_ip(output: &str) -> Option<String> {
    for line in output.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("inet ") {
            let addr = rest.split_whitespace().next()?;
            return Some(addr.split('/').next().unwrap_or(addr).to_owned());
        }
    }
    None
}

/// `versionName=` value from `dumpsys package <pkg>`.
pub fn parse_version_name(output: &str) -> Option<String> {
    let idx = output.find("versionName=")?;
    let rest = &output[idx + "versionName=".len()..];
    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    Some(rest[..end].to_owned())
}

/// Third-party packages from `pm list packages -3`.
pub fn parse_package_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("package:"))
        .map(str::to_owned)
        .collect()
}

/// Gather scan facts for one device; partial results on failure.
pub async fn inspect_device(adb: &dyn Adb, serial: &str) -> DeviceFacts {
    let mut facts = DeviceFacts::default();

    match adb.shell(serial, "getprop ro.product.model").await {
        Ok(model) if !model.trim().is_empty() => facts.model = Some(model.trim().to_owned()),
        Ok(_) => {}
        Err(e) => warn!(serial, err = %e, "model query failed"),
    }
    match adb.shell(serial, "getprop ro.build.version.release").await {
        Ok(version) if !version.trim().is_empty() => {
            facts.os_version = Some(version.trim().to_owned());
        }
        Ok(_) => {}
        Err(e) => warn!(serial, err = %e, "os version query failed"),
    }
    match adb.shell(serial, "dumpsys battery").await {
        Ok(output) => {
            let (level, charging) = parse_battery(&output);
            facts.battery_level = Some(level);
            facts.charging = charging;
        }
        Err(e) => warn!(serial, err = %e, "battery query failed"),
    }
    match adb.shell(serial, "ip addr show wlan0").await {
        Ok(output) => facts.wifi_ip = parse_wifi_ip(&output),
        Err(e) => debug!(serial, err = %e, "wlan0 query failed"),
    }
    facts
}

/// Installed third-party packages.
pub async fn installed_packages(adb: &dyn Adb, serial: &str) -> Result<Vec<String>, AdbError> {
    Ok(parse_package_list(&adb.shell(serial, "pm list packages -3").await?))
}

/// Version of one installed package, if readable.
pub async fn package_version(adb: &dyn Adb, serial: &str, package: &str) -> Option<String> {
    match adb.shell(serial, &format!("dumpsys package {package}")).await {
        Ok(output) => parse_version_name(&output),
        Err(_) => None,
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    //! Scripted ADB for tests.

    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct FakeAdbState {
        devices: Vec<AdbDevice>,
        shell_responses: Vec<(String, String)>,
        shell_calls: Vec<(String, String)>,
        installs: Vec<(String, String)>,
        uninstalls: Vec<(String, String)>,
        pushes: Vec<(String, String)>,
        reboots: Vec<String>,
        fail_installs_for: Vec<String>,
    }

    #[derive(Default)]
    pub struct FakeAdb {
        state: Mutex<FakeAdbState>,
    }

    impl FakeAdb {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn add_device(&self, serial: &str) {
            self.state
                .lock()
                .devices
                .push(AdbDevice { serial: serial.to_owned(), state: "device".to_owned() });
        }

        /// Respond to shell commands starting with `prefix` on any serial.
        pub fn set_shell_response(&self, prefix: &str, output: &str) {
            self.state.lock().shell_responses.push((prefix.to_owned(), output.to_owned()));
        }

        pub fn fail_installs_for(&self, serial: &str) {
            self.state.lock().fail_installs_for.push(serial.to_owned());
        }

        pub fn installs(&self) -> Vec<(String, String)> {
            self.state.lock().installs.clone()
        }

        pub fn shell_calls(&self) -> Vec<(String, String)> {
            self.state.lock().shell_calls.clone()
        }

        pub fn reboots(&self) -> Vec<String> {
            self.state.lock().reboots.clone()
        }

        pub fn pushes(&self) -> Vec<(String, String)> {
            self.state.lock().pushes.clone()
        }
    }

    #[async_trait]
    impl Adb for FakeAdb {
        async fn devices(&self) -> Result<Vec<AdbDevice>, AdbError> {
            Ok(self.state.lock().devices.clone())
        }

        async fn shell(&self, serial: &str, command: &str) -> Result<String, AdbError> {
            let mut state = self.state.lock();
            state.shell_calls.push((serial.to_owned(), command.to_owned()));
            for (prefix, output) in &state.shell_responses {
                if command.starts_with(prefix.as_str()) {
                    return Ok(output.clone());
                }
            }
            Ok(String::new())
        }

        async fn install(
            &self,
            serial: &str,
            apk: &Path,
            _reinstall: bool,
            _grant_permissions: bool,
        ) -> Result<(), AdbError> {
            let mut state = self.state.lock();
            if state.fail_installs_for.iter().any(|s| s == serial) {
                return Err(AdbError::CommandFailed {
                    status: 1,
                    stderr: "INSTALL_FAILED_TEST".to_owned(),
                });
            }
            state.installs.push((serial.to_owned(), apk.display().to_string()));
            Ok(())
        }

        async fn uninstall(&self, serial: &str, package: &str) -> Result<(), AdbError> {
            self.state.lock().uninstalls.push((serial.to_owned(), package.to_owned()));
            Ok(())
        }

        async fn push(&self, serial: &str, _local: &Path, remote: &str) -> Result<(), AdbError> {
            self.state.lock().pushes.push((serial.to_owned(), remote.to_owned()));
            Ok(())
        }

        async fn reboot(&self, serial: &str) -> Result<(), AdbError> {
            self.state.lock().reboots.push(serial.to_owned());
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "adb_tests.rs"]
mod tests;
