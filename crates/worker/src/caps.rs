// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! UiAutomator2 capability builder. One service port per device keeps
//! concurrent sessions from stepping on each other.

use serde::Serialize;

/// Desired capabilities for one automation session.
#[derive(Debug, Clone, Serialize)]
pub struct Capabilities {
    #[serde(rename = "platformName")]
    pub platform_name: &'static str,
    #[serde(rename = "appium:automationName")]
    pub automation_name: &'static str,
    #[serde(rename = "appium:udid")]
    pub udid: String,
    #[serde(rename = "appium:systemPort")]
    pub system_port: u16,
    #[serde(rename = "appium:appPackage", skip_serializing_if = "Option::is_none")]
    pub app_package: Option<String>,
    #[serde(rename = "appium:appActivity", skip_serializing_if = "Option::is_none")]
    pub app_activity: Option<String>,
    #[serde(rename = "appium:noReset")]
    pub no_reset: bool,
    #[serde(rename = "appium:newCommandTimeout")]
    pub new_command_timeout: u32,
    #[serde(rename = "appium:autoGrantPermissions")]
    pub auto_grant_permissions: bool,
    #[serde(rename = "appium:disableWindowAnimation")]
    pub disable_window_animation: bool,
    #[serde(rename = "appium:ignoreUnimportantViews")]
    pub ignore_unimportant_views: bool,
    #[serde(rename = "appium:uiautomator2ServerLaunchTimeout")]
    pub server_launch_timeout: u32,
    #[serde(rename = "appium:uiautomator2ServerInstallTimeout")]
    pub server_install_timeout: u32,
}

impl Capabilities {
    /// Capabilities targeting a specific app package/activity.
    pub fn for_app(
        udid: &str,
        system_port: u16,
        app_package: &str,
        app_activity: &str,
        idle_timeout: u32,
    ) -> Self {
        Self {
            app_package: Some(app_package.to_owned()),
            app_activity: Some(app_activity.to_owned()),
            ..Self::generic(udid, system_port, idle_timeout)
        }
    }

    /// App-agnostic capabilities for driving whatever is on screen.
    pub fn generic(udid: &str, system_port: u16, idle_timeout: u32) -> Self {
        Self {
            platform_name: "Android",
            automation_name: "UiAutomator2",
            udid: udid.to_owned(),
            system_port,
            app_package: None,
            app_activity: None,
            no_reset: true,
            new_command_timeout: idle_timeout,
            auto_grant_permissions: true,
            disable_window_animation: true,
            ignore_unimportant_views: true,
            server_launch_timeout: 60_000,
            server_install_timeout: 60_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_caps_serialize_with_prefixed_keys() {
        let caps = Capabilities::for_app(
            "192.168.1.40:5555",
            8204,
            "com.google.android.youtube",
            "com.google.android.youtube.HomeActivity",
            300,
        );
        let wire = serde_json::to_value(&caps).unwrap();
        assert_eq!(wire["platformName"], "Android");
        assert_eq!(wire["appium:automationName"], "UiAutomator2");
        assert_eq!(wire["appium:systemPort"], 8204);
        assert_eq!(wire["appium:udid"], "192.168.1.40:5555");
        assert_eq!(wire["appium:appPackage"], "com.google.android.youtube");
        assert_eq!(wire["appium:noReset"], true);
        assert_eq!(wire["appium:newCommandTimeout"], 300);
    }

    #[test]
    fn generic_caps_omit_app_fields() {
        let caps = Capabilities::generic("serial-1", 8200, 300);
        let wire = serde_json::to_value(&caps).unwrap();
        assert!(wire.get("appium:appPackage").is_none());
        assert!(wire.get("appium:appActivity").is_none());
    }
}
