// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory reference store with optional JSON snapshots.
//!
//! Reproduces the relational schema's trigger behavior: monotone host
//! numbers, smallest-free per-host device ordinals, derived device codes,
//! `started_at`/`completed_at` stamping, and first-terminal-wins status
//! updates.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use farm_core::fleet::{
    device_code, format_host_number, ConnectionKind, Device, DeviceStatus, Host, HostStatus,
};
use farm_core::task::{TaskRecord, TaskStats, TaskStatus};

use super::{
    DeviceFilter, DeviceUpdate, HostSummary, HostUpdate, NewDevice, NewHost, NewTask, Page,
    SeenDevice, StatusUpdate, Store, StoreError, StoreResult, TaskFilter,
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct State {
    host_seq: u32,
    hosts: HashMap<Uuid, Host>,
    devices: HashMap<Uuid, Device>,
    tasks: HashMap<Uuid, TaskRecord>,
}

pub struct MemStore {
    state: RwLock<State>,
    snapshot_path: Option<PathBuf>,
}

impl MemStore {
    pub fn new() -> Self {
        Self { state: RwLock::new(State::default()), snapshot_path: None }
    }

    /// Load from a snapshot file when it exists; start empty otherwise.
    pub fn with_snapshot(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(state) => {
                    info!(path = %path.display(), "state snapshot loaded");
                    state
                }
                Err(e) => {
                    warn!(path = %path.display(), err = %e, "snapshot unreadable, starting empty");
                    State::default()
                }
            },
            Err(_) => State::default(),
        };
        Self { state: RwLock::new(state), snapshot_path: Some(path) }
    }

    /// Write the snapshot file, if one is configured.
    pub fn save_snapshot(&self) {
        let Some(path) = self.snapshot_path.as_deref() else { return };
        let bytes = {
            let state = self.state.read();
            match serde_json::to_vec_pretty(&*state) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(err = %e, "snapshot serialization failed");
                    return;
                }
            }
        };
        if let Err(e) = write_atomic(path, &bytes) {
            warn!(path = %path.display(), err = %e, "snapshot write failed");
        }
    }

    fn sorted_hosts(state: &State) -> Vec<Host> {
        let mut hosts: Vec<Host> = state.hosts.values().cloned().collect();
        hosts.sort_by(|a, b| a.number.cmp(&b.number));
        hosts
    }

    fn sorted_devices(state: &State) -> Vec<Device> {
        let mut devices: Vec<Device> = state.devices.values().cloned().collect();
        devices.sort_by(|a, b| {
            (a.host_number.as_deref(), a.ordinal, a.created_at).cmp(&(
                b.host_number.as_deref(),
                b.ordinal,
                b.created_at,
            ))
        });
        devices
    }

    fn sorted_tasks_desc(state: &State) -> Vec<TaskRecord> {
        let mut tasks: Vec<TaskRecord> = state.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks
    }

    /// Smallest ordinal in `1..=max` not taken by another device on the host.
    fn next_ordinal(state: &State, host_id: Uuid, max_devices: u32) -> Option<u32> {
        let taken: Vec<u32> = state
            .devices
            .values()
            .filter(|d| d.host_id == Some(host_id))
            .filter_map(|d| d.ordinal)
            .collect();
        (1..=max_devices).find(|n| !taken.contains(n))
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}

#[async_trait]
impl Store for MemStore {
    async fn ping(&self) -> StoreResult<()> {
        let _ = self.state.read().hosts.len();
        Ok(())
    }

    // -- Hosts ----------------------------------------------------------------

    async fn create_host(&self, new: NewHost) -> StoreResult<Host> {
        let mut state = self.state.write();
        state.host_seq += 1;
        let host = Host {
            id: Uuid::new_v4(),
            number: format_host_number(state.host_seq),
            address: new.address,
            label: new.label,
            location: new.location,
            max_devices: new.max_devices.unwrap_or(20),
            status: HostStatus::Offline,
            last_heartbeat: None,
            created_at: Utc::now(),
            updated_at: None,
        };
        state.hosts.insert(host.id, host.clone());
        Ok(host)
    }

    async fn list_hosts(
        &self,
        status: Option<HostStatus>,
        page: Page,
    ) -> StoreResult<(Vec<Host>, u64)> {
        let state = self.state.read();
        let hosts: Vec<Host> = Self::sorted_hosts(&state)
            .into_iter()
            .filter(|h| status.map(|s| h.status == s).unwrap_or(true))
            .collect();
        let total = hosts.len() as u64;
        Ok((page.slice(&hosts), total))
    }

    async fn get_host(&self, id: Uuid) -> StoreResult<Option<Host>> {
        Ok(self.state.read().hosts.get(&id).cloned())
    }

    async fn get_host_by_number(&self, number: &str) -> StoreResult<Option<Host>> {
        Ok(self.state.read().hosts.values().find(|h| h.number == number).cloned())
    }

    async fn update_host(&self, id: Uuid, update: HostUpdate) -> StoreResult<Host> {
        let mut state = self.state.write();
        let host = state
            .hosts
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("Host not found".into()))?;
        if let Some(address) = update.address {
            host.address = Some(address);
        }
        if let Some(label) = update.label {
            host.label = Some(label);
        }
        if let Some(location) = update.location {
            host.location = Some(location);
        }
        if let Some(max_devices) = update.max_devices {
            host.max_devices = max_devices;
        }
        if let Some(status) = update.status {
            host.status = status;
        }
        host.updated_at = Some(Utc::now());
        Ok(host.clone())
    }

    async fn delete_host(&self, id: Uuid) -> StoreResult<()> {
        let mut state = self.state.write();
        if !state.hosts.contains_key(&id) {
            return Err(StoreError::NotFound("Host not found".into()));
        }
        let attached = state.devices.values().filter(|d| d.host_id == Some(id)).count();
        if attached > 0 {
            return Err(StoreError::Invalid(format!(
                "{attached} devices still assigned to this host"
            )));
        }
        state.hosts.remove(&id);
        Ok(())
    }

    async fn heartbeat(&self, number: &str) -> StoreResult<Host> {
        let mut state = self.state.write();
        let host = state
            .hosts
            .values_mut()
            .find(|h| h.number == number)
            .ok_or_else(|| StoreError::NotFound(format!("Host {number} not found")))?;
        host.last_heartbeat = Some(Utc::now());
        host.status = HostStatus::Online;
        host.updated_at = Some(Utc::now());
        Ok(host.clone())
    }

    async fn host_summary(&self) -> StoreResult<HostSummary> {
        let state = self.state.read();
        let total_hosts = state.hosts.len() as u64;
        let online_hosts =
            state.hosts.values().filter(|h| h.status == HostStatus::Online).count() as u64;
        Ok(HostSummary {
            total_hosts,
            online_hosts,
            offline_hosts: total_hosts - online_hosts,
            total_devices: state.devices.len() as u64,
        })
    }

    async fn host_devices(&self, host_id: Uuid) -> StoreResult<Vec<Device>> {
        let state = self.state.read();
        Ok(Self::sorted_devices(&state)
            .into_iter()
            .filter(|d| d.host_id == Some(host_id))
            .collect())
    }

    // -- Devices --------------------------------------------------------------

    async fn create_device(&self, new: NewDevice) -> StoreResult<Device> {
        let mut state = self.state.write();

        if new.serial.is_none() && new.address.is_none() {
            return Err(StoreError::Invalid(
                "either serial or address must be provided".into(),
            ));
        }
        if let Some(ref serial) = new.serial {
            if state.devices.values().any(|d| d.serial.as_deref() == Some(serial)) {
                return Err(StoreError::Conflict(format!("serial {serial} already registered")));
            }
        }
        if let Some(port) = new.physical_port {
            if !(1..=20).contains(&port) {
                return Err(StoreError::Invalid("physical_port must be in 1..=20".into()));
            }
        }

        let mut device = Device {
            id: Uuid::new_v4(),
            host_id: None,
            host_number: None,
            serial: new.serial,
            address: new.address,
            model: new.model,
            os_version: new.os_version,
            connection: new.connection.unwrap_or(ConnectionKind::Usb),
            physical_port: new.physical_port,
            ordinal: None,
            code: None,
            status: DeviceStatus::Offline,
            battery_level: None,
            error_count: 0,
            last_error: None,
            last_seen: None,
            created_at: Utc::now(),
            updated_at: None,
        };

        if let Some(host_id) = new.host_id {
            let host = state
                .hosts
                .get(&host_id)
                .ok_or_else(|| StoreError::NotFound("Host not found".into()))?
                .clone();
            let ordinal = Self::next_ordinal(&state, host_id, host.max_devices)
                .ok_or_else(|| StoreError::Invalid(format!("host {} is full", host.number)))?;
            device.host_id = Some(host_id);
            device.host_number = Some(host.number.clone());
            device.ordinal = Some(ordinal);
            device.code = Some(device_code(&host.number, ordinal));
        }

        state.devices.insert(device.id, device.clone());
        Ok(device)
    }

    async fn list_devices(
        &self,
        filter: DeviceFilter,
        page: Page,
    ) -> StoreResult<(Vec<Device>, u64)> {
        let state = self.state.read();
        let devices: Vec<Device> = Self::sorted_devices(&state)
            .into_iter()
            .filter(|d| filter.host_id.map(|id| d.host_id == Some(id)).unwrap_or(true))
            .filter(|d| {
                filter
                    .host_number
                    .as_deref()
                    .map(|n| d.host_number.as_deref() == Some(n))
                    .unwrap_or(true)
            })
            .filter(|d| filter.status.map(|s| d.status == s).unwrap_or(true))
            .filter(|d| filter.connection.map(|c| d.connection == c).unwrap_or(true))
            .filter(|d| !filter.unassigned_only || d.host_id.is_none())
            .collect();
        let total = devices.len() as u64;
        Ok((page.slice(&devices), total))
    }

    async fn get_device(&self, id: Uuid) -> StoreResult<Option<Device>> {
        Ok(self.state.read().devices.get(&id).cloned())
    }

    async fn get_device_by_serial(&self, serial: &str) -> StoreResult<Option<Device>> {
        Ok(self
            .state
            .read()
            .devices
            .values()
            .find(|d| d.serial.as_deref() == Some(serial))
            .cloned())
    }

    async fn get_device_by_code(&self, code: &str) -> StoreResult<Option<Device>> {
        Ok(self
            .state
            .read()
            .devices
            .values()
            .find(|d| d.code.as_deref() == Some(code))
            .cloned())
    }

    async fn get_device_by_ip(&self, ip: &str) -> StoreResult<Option<Device>> {
        Ok(self
            .state
            .read()
            .devices
            .values()
            .find(|d| {
                d.address.as_deref().map(|a| a == ip || a.starts_with(&format!("{ip}:")))
                    == Some(true)
            })
            .cloned())
    }

    async fn update_device(&self, id: Uuid, update: DeviceUpdate) -> StoreResult<Device> {
        let mut state = self.state.write();
        let device = state
            .devices
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("Device not found".into()))?;
        if let Some(serial) = update.serial {
            device.serial = Some(serial);
        }
        if let Some(address) = update.address {
            device.address = Some(address);
        }
        if let Some(model) = update.model {
            device.model = Some(model);
        }
        if let Some(os_version) = update.os_version {
            device.os_version = Some(os_version);
        }
        if let Some(connection) = update.connection {
            device.connection = connection;
        }
        if let Some(port) = update.physical_port {
            if !(1..=20).contains(&port) {
                return Err(StoreError::Invalid("physical_port must be in 1..=20".into()));
            }
            device.physical_port = Some(port);
        }
        if let Some(status) = update.status {
            device.status = status;
        }
        device.updated_at = Some(Utc::now());
        Ok(device.clone())
    }

    async fn delete_device(&self, id: Uuid) -> StoreResult<()> {
        let mut state = self.state.write();
        state
            .devices
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound("Device not found".into()))
    }

    async fn assign_device(&self, device_id: Uuid, host_id: Uuid) -> StoreResult<Device> {
        let mut state = self.state.write();
        let host = state
            .hosts
            .get(&host_id)
            .ok_or_else(|| StoreError::NotFound("Host not found".into()))?
            .clone();
        let ordinal = Self::next_ordinal(&state, host_id, host.max_devices)
            .ok_or_else(|| StoreError::Invalid(format!("host {} is full", host.number)))?;

        let device = state
            .devices
            .get_mut(&device_id)
            .ok_or_else(|| StoreError::NotFound("Device not found".into()))?;
        device.host_id = Some(host_id);
        device.host_number = Some(host.number.clone());
        device.ordinal = Some(ordinal);
        device.code = Some(device_code(&host.number, ordinal));
        device.updated_at = Some(Utc::now());
        Ok(device.clone())
    }

    async fn unassign_device(&self, device_id: Uuid) -> StoreResult<Device> {
        let mut state = self.state.write();
        let device = state
            .devices
            .get_mut(&device_id)
            .ok_or_else(|| StoreError::NotFound("Device not found".into()))?;
        device.host_id = None;
        device.host_number = None;
        device.ordinal = None;
        device.code = None;
        device.updated_at = Some(Utc::now());
        Ok(device.clone())
    }

    async fn upsert_seen_device(&self, seen: SeenDevice) -> StoreResult<Device> {
        let host = self
            .get_host_by_number(&seen.host_number)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Host {} not found", seen.host_number)))?;

        let existing = self.get_device_by_serial(&seen.serial).await?;
        let device_id = match existing {
            Some(device) => device.id,
            None => {
                self.create_device(NewDevice {
                    host_id: Some(host.id),
                    serial: Some(seen.serial.clone()),
                    address: seen.address.clone(),
                    model: seen.model.clone(),
                    os_version: seen.os_version.clone(),
                    connection: Some(seen.connection),
                    physical_port: None,
                })
                .await?
                .id
            }
        };

        let mut state = self.state.write();
        let device = state
            .devices
            .get_mut(&device_id)
            .ok_or_else(|| StoreError::NotFound("Device not found".into()))?;
        if device.host_id.is_none() {
            // Scanned on a host while unassigned: adopt it there.
            drop(state);
            self.assign_device(device_id, host.id).await?;
            state = self.state.write();
        }
        let device = state
            .devices
            .get_mut(&device_id)
            .ok_or_else(|| StoreError::NotFound("Device not found".into()))?;
        if seen.model.is_some() {
            device.model = seen.model;
        }
        if seen.os_version.is_some() {
            device.os_version = seen.os_version;
        }
        if seen.address.is_some() {
            device.address = seen.address;
        }
        if seen.battery_level.is_some() {
            device.battery_level = seen.battery_level;
        }
        device.connection = seen.connection;
        device.status = seen.status;
        device.last_seen = Some(Utc::now());
        device.updated_at = Some(Utc::now());
        Ok(device.clone())
    }

    async fn set_device_status(
        &self,
        id: Uuid,
        status: DeviceStatus,
        battery_level: Option<u8>,
        error: Option<String>,
    ) -> StoreResult<Device> {
        let mut state = self.state.write();
        let device = state
            .devices
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("Device not found".into()))?;
        device.status = status;
        if battery_level.is_some() {
            device.battery_level = battery_level;
        }
        if let Some(error) = error {
            device.error_count += 1;
            device.last_error = Some(error);
        }
        device.last_seen = Some(Utc::now());
        device.updated_at = Some(Utc::now());
        Ok(device.clone())
    }

    async fn online_devices(&self, host_id: Option<Uuid>) -> StoreResult<Vec<Device>> {
        let state = self.state.read();
        Ok(Self::sorted_devices(&state)
            .into_iter()
            .filter(|d| d.status == DeviceStatus::Online)
            .filter(|d| host_id.map(|id| d.host_id == Some(id)).unwrap_or(true))
            .collect())
    }

    // -- Tasks ----------------------------------------------------------------

    async fn insert_task(&self, new: NewTask) -> StoreResult<TaskRecord> {
        let mut state = self.state.write();
        let record = TaskRecord {
            id: new.id,
            broker_id: new.broker_id,
            kind: new.kind,
            queue: new.queue,
            device_id: new.device_id,
            host_id: new.host_id,
            status: TaskStatus::Pending,
            payload: new.payload,
            result: None,
            error: None,
            retries: 0,
            progress: 0,
            progress_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            duration_seconds: None,
        };
        state.tasks.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_task(&self, id: Uuid) -> StoreResult<Option<TaskRecord>> {
        Ok(self.state.read().tasks.get(&id).cloned())
    }

    async fn get_task_by_broker_id(&self, broker_id: &str) -> StoreResult<Option<TaskRecord>> {
        Ok(self
            .state
            .read()
            .tasks
            .values()
            .find(|t| t.broker_id == broker_id)
            .cloned())
    }

    async fn list_tasks(
        &self,
        filter: TaskFilter,
        page: Page,
    ) -> StoreResult<(Vec<TaskRecord>, u64)> {
        let state = self.state.read();
        let tasks: Vec<TaskRecord> = Self::sorted_tasks_desc(&state)
            .into_iter()
            .filter(|t| filter.kind.map(|k| t.kind == k).unwrap_or(true))
            .filter(|t| filter.device_id.map(|id| t.device_id == Some(id)).unwrap_or(true))
            .filter(|t| filter.host_id.map(|id| t.host_id == Some(id)).unwrap_or(true))
            .filter(|t| filter.status.map(|s| t.status == s).unwrap_or(true))
            .filter(|t| filter.queue.as_deref().map(|q| t.queue == q).unwrap_or(true))
            .filter(|t| filter.created_after.map(|a| t.created_at >= a).unwrap_or(true))
            .filter(|t| filter.created_before.map(|b| t.created_at <= b).unwrap_or(true))
            .collect();
        let total = tasks.len() as u64;
        Ok((page.slice(&tasks), total))
    }

    async fn update_task_status(
        &self,
        id: Uuid,
        update: StatusUpdate,
    ) -> StoreResult<TaskRecord> {
        let mut state = self.state.write();
        let task = state
            .tasks
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("Task not found".into()))?;

        // First terminal state wins; late worker events cannot resurrect a
        // cancelled or finished task.
        if task.status.is_terminal() {
            return Ok(task.clone());
        }

        let now = Utc::now();
        if let Some(status) = update.status {
            task.status = status;
            if status == TaskStatus::Running && task.started_at.is_none() {
                task.started_at = Some(now);
            }
            if status.is_terminal() {
                task.completed_at = Some(now);
                let anchor = task.started_at.unwrap_or(task.created_at);
                task.duration_seconds =
                    Some((now - anchor).num_milliseconds().max(0) as f64 / 1000.0);
            }
        }
        if let Some(result) = update.result {
            task.result = Some(result);
        }
        if let Some(error) = update.error {
            task.error = Some(error);
        }
        if let Some(progress) = update.progress {
            task.progress = progress.min(100);
        }
        if let Some(message) = update.progress_message {
            task.progress_message = Some(message);
        }
        Ok(task.clone())
    }

    async fn increment_task_retry(&self, id: Uuid) -> StoreResult<u32> {
        let mut state = self.state.write();
        let task = state
            .tasks
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("Task not found".into()))?;
        task.retries += 1;
        Ok(task.retries)
    }

    async fn task_stats(&self) -> StoreResult<TaskStats> {
        let state = self.state.read();
        let mut stats = TaskStats { total: state.tasks.len() as u64, ..TaskStats::default() };
        for task in state.tasks.values() {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Success => stats.success += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Retrying => stats.retrying += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
        }
        Ok(stats)
    }

    async fn recent_tasks(&self, limit: usize) -> StoreResult<Vec<TaskRecord>> {
        let state = self.state.read();
        Ok(Self::sorted_tasks_desc(&state).into_iter().take(limit).collect())
    }
}

#[cfg(test)]
#[path = "mem_tests.rs"]
mod tests;
