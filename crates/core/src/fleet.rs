// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fleet entities: worker hosts and the handsets they own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    Online,
    Offline,
    Error,
}

impl HostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Online,
    Offline,
    Busy,
    Error,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Busy => "busy",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    Usb,
    Wifi,
    Both,
}

/// A physical worker machine owning up to `max_devices` handsets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub id: Uuid,
    /// Globally unique, monotone (`HOST01`, `HOST02`, …).
    pub number: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub max_devices: u32,
    pub status: HostStatus,
    #[serde(default)]
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Host {
    /// The broker queue this host's worker consumes.
    pub fn queue(&self) -> String {
        queue_name(&self.number)
    }
}

/// An Android handset. Exactly one of `serial` / `address` may be empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: Uuid,
    #[serde(default)]
    pub host_id: Option<Uuid>,
    /// Derived from the owning host; kept on the record so list responses
    /// match the `device_overview` view.
    #[serde(default)]
    pub host_number: Option<String>,
    #[serde(default)]
    pub serial: Option<String>,
    /// ADB network address (`ip:port`) for wifi-attached devices.
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub os_version: Option<String>,
    pub connection: ConnectionKind,
    /// Physical USB port on the host (1..=20).
    #[serde(default)]
    pub physical_port: Option<u8>,
    /// Host-local ordinal (1..=max_devices), unique within the host.
    #[serde(default)]
    pub ordinal: Option<u32>,
    /// Composite code, e.g. `HOST01-001`. Present iff assigned.
    #[serde(default)]
    pub code: Option<String>,
    pub status: DeviceStatus,
    #[serde(default)]
    pub battery_level: Option<u8>,
    #[serde(default)]
    pub error_count: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Device {
    /// The identifier automation sessions are keyed by: network address when
    /// present, otherwise the ADB serial.
    pub fn udid(&self) -> Option<&str> {
        self.address.as_deref().or(self.serial.as_deref())
    }
}

/// Queue name derived from a host number (`HOST01` → `host01`).
pub fn queue_name(host_number: &str) -> String {
    host_number.to_lowercase()
}

/// Format the nth host number (`1` → `HOST01`).
pub fn format_host_number(n: u32) -> String {
    format!("HOST{n:02}")
}

/// Composite device code (`HOST01`, `1` → `HOST01-001`).
pub fn device_code(host_number: &str, ordinal: u32) -> String {
    format!("{host_number}-{ordinal:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_name_is_lowercased_number() {
        assert_eq!(queue_name("HOST01"), "host01");
        assert_eq!(queue_name("HOST12"), "host12");
    }

    #[test]
    fn host_number_formatting_pads_to_two_digits() {
        assert_eq!(format_host_number(1), "HOST01");
        assert_eq!(format_host_number(42), "HOST42");
        assert_eq!(format_host_number(101), "HOST101");
    }

    #[test]
    fn device_code_pads_ordinal() {
        assert_eq!(device_code("HOST01", 1), "HOST01-001");
        assert_eq!(device_code("HOST03", 17), "HOST03-017");
    }

    #[test]
    fn udid_prefers_network_address() {
        let now = Utc::now();
        let mut device = Device {
            id: Uuid::new_v4(),
            host_id: None,
            host_number: None,
            serial: Some("R58M41ABC".into()),
            address: Some("192.168.1.40:5555".into()),
            model: None,
            os_version: None,
            connection: ConnectionKind::Both,
            physical_port: None,
            ordinal: None,
            code: None,
            status: DeviceStatus::Online,
            battery_level: None,
            error_count: 0,
            last_error: None,
            last_seen: None,
            created_at: now,
            updated_at: None,
        };
        assert_eq!(device.udid(), Some("192.168.1.40:5555"));
        device.address = None;
        assert_eq!(device.udid(), Some("R58M41ABC"));
    }
}
