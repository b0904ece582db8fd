// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistence boundary. The dispatch plane, reconciler, and HTTP surface
//! talk to a [`Store`]; the in-memory implementation in [`mem`] reproduces
//! the relational schema's trigger semantics (host numbering, per-host
//! device ordinals, status stamping) so the invariants hold identically
//! against any backing implementation.

pub mod mem;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use farm_core::fleet::{ConnectionKind, Device, DeviceStatus, Host, HostStatus};
use farm_core::task::{TaskKind, TaskRecord, TaskStats, TaskStatus};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Invalid(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: u32,
    pub page_size: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self { page: 1, page_size: 50 }
    }
}

impl Page {
    pub fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        let start = ((self.page.max(1) - 1) * self.page_size) as usize;
        items.iter().skip(start).take(self.page_size as usize).cloned().collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeviceFilter {
    pub host_id: Option<Uuid>,
    pub host_number: Option<String>,
    pub status: Option<DeviceStatus>,
    pub connection: Option<ConnectionKind>,
    pub unassigned_only: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub kind: Option<TaskKind>,
    pub device_id: Option<Uuid>,
    pub host_id: Option<Uuid>,
    pub status: Option<TaskStatus>,
    pub queue: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewHost {
    pub address: Option<String>,
    pub label: Option<String>,
    pub location: Option<String>,
    pub max_devices: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostUpdate {
    pub address: Option<String>,
    pub label: Option<String>,
    pub location: Option<String>,
    pub max_devices: Option<u32>,
    pub status: Option<HostStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewDevice {
    pub host_id: Option<Uuid>,
    pub serial: Option<String>,
    pub address: Option<String>,
    pub model: Option<String>,
    pub os_version: Option<String>,
    pub connection: Option<ConnectionKind>,
    pub physical_port: Option<u8>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceUpdate {
    pub serial: Option<String>,
    pub address: Option<String>,
    pub model: Option<String>,
    pub os_version: Option<String>,
    pub connection: Option<ConnectionKind>,
    pub physical_port: Option<u8>,
    pub status: Option<DeviceStatus>,
}

/// A device observation from a worker scan.
#[derive(Debug, Clone)]
pub struct SeenDevice {
    pub host_number: String,
    pub serial: String,
    pub model: Option<String>,
    pub os_version: Option<String>,
    pub battery_level: Option<u8>,
    pub connection: ConnectionKind,
    pub address: Option<String>,
    pub status: DeviceStatus,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub id: Uuid,
    pub broker_id: String,
    pub kind: TaskKind,
    pub queue: String,
    pub device_id: Option<Uuid>,
    pub host_id: Option<Uuid>,
    pub payload: Value,
}

/// Fields applied on a status transition. Terminal states already on the
/// row win: the update is ignored (idempotent reconciliation).
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub status: Option<TaskStatus>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub progress: Option<u8>,
    pub progress_message: Option<String>,
}

/// The `host_summary` view.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostSummary {
    pub total_hosts: u64,
    pub online_hosts: u64,
    pub offline_hosts: u64,
    pub total_devices: u64,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// One cheap round trip; readiness is this succeeding.
    async fn ping(&self) -> StoreResult<()>;

    // -- Hosts ----------------------------------------------------------------

    async fn create_host(&self, new: NewHost) -> StoreResult<Host>;
    async fn list_hosts(
        &self,
        status: Option<HostStatus>,
        page: Page,
    ) -> StoreResult<(Vec<Host>, u64)>;
    async fn get_host(&self, id: Uuid) -> StoreResult<Option<Host>>;
    async fn get_host_by_number(&self, number: &str) -> StoreResult<Option<Host>>;
    async fn update_host(&self, id: Uuid, update: HostUpdate) -> StoreResult<Host>;
    /// Fails while devices are still attached.
    async fn delete_host(&self, id: Uuid) -> StoreResult<()>;
    /// Upsert `last_heartbeat = now, status = online`.
    async fn heartbeat(&self, number: &str) -> StoreResult<Host>;
    async fn host_summary(&self) -> StoreResult<HostSummary>;
    async fn host_devices(&self, host_id: Uuid) -> StoreResult<Vec<Device>>;

    // -- Devices --------------------------------------------------------------

    async fn create_device(&self, new: NewDevice) -> StoreResult<Device>;
    async fn list_devices(
        &self,
        filter: DeviceFilter,
        page: Page,
    ) -> StoreResult<(Vec<Device>, u64)>;
    async fn get_device(&self, id: Uuid) -> StoreResult<Option<Device>>;
    async fn get_device_by_serial(&self, serial: &str) -> StoreResult<Option<Device>>;
    async fn get_device_by_code(&self, code: &str) -> StoreResult<Option<Device>>;
    async fn get_device_by_ip(&self, ip: &str) -> StoreResult<Option<Device>>;
    async fn update_device(&self, id: Uuid, update: DeviceUpdate) -> StoreResult<Device>;
    async fn delete_device(&self, id: Uuid) -> StoreResult<()>;
    /// Allocates the smallest free per-host ordinal and derives the code.
    async fn assign_device(&self, device_id: Uuid, host_id: Uuid) -> StoreResult<Device>;
    /// Clears host id and ordinal.
    async fn unassign_device(&self, device_id: Uuid) -> StoreResult<Device>;
    /// Apply a scan observation: upsert by serial under the named host.
    async fn upsert_seen_device(&self, seen: SeenDevice) -> StoreResult<Device>;
    /// Status write-back; an error message increments the error counter.
    async fn set_device_status(
        &self,
        id: Uuid,
        status: DeviceStatus,
        battery_level: Option<u8>,
        error: Option<String>,
    ) -> StoreResult<Device>;
    async fn online_devices(&self, host_id: Option<Uuid>) -> StoreResult<Vec<Device>>;

    // -- Tasks ----------------------------------------------------------------

    async fn insert_task(&self, new: NewTask) -> StoreResult<TaskRecord>;
    async fn get_task(&self, id: Uuid) -> StoreResult<Option<TaskRecord>>;
    async fn get_task_by_broker_id(&self, broker_id: &str) -> StoreResult<Option<TaskRecord>>;
    async fn list_tasks(
        &self,
        filter: TaskFilter,
        page: Page,
    ) -> StoreResult<(Vec<TaskRecord>, u64)>;
    async fn update_task_status(&self, id: Uuid, update: StatusUpdate)
        -> StoreResult<TaskRecord>;
    /// Atomic retry-counter increment; returns the new value.
    async fn increment_task_retry(&self, id: Uuid) -> StoreResult<u32>;
    async fn task_stats(&self) -> StoreResult<TaskStats>;
    async fn recent_tasks(&self, limit: usize) -> StoreResult<Vec<TaskRecord>>;
}
