// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events the worker publishes and the API reconciles, plus the small
//! request/reply bodies used on control and inspection subjects.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::fleet::{ConnectionKind, DeviceStatus};
use crate::task::TaskStatus;

/// Task lifecycle event, published on `tasks.events`.
///
/// The API applies these idempotently: a terminal status already on the row
/// is never overwritten by anything non-terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    Started {
        task_id: Uuid,
    },
    /// Broker-task meta update: `{step, progress, message}`.
    Progress {
        task_id: Uuid,
        step: String,
        progress: u8,
        #[serde(default)]
        message: Option<String>,
    },
    Retrying {
        task_id: Uuid,
        retries: u32,
        #[serde(default)]
        message: Option<String>,
    },
    Finished {
        task_id: Uuid,
        status: TaskStatus,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<String>,
    },
}

/// Fleet fact observed by a worker, published on `fleet.events`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FleetEvent {
    Heartbeat {
        host_number: String,
    },
    /// A device scan saw this handset on the named host.
    DeviceSeen {
        host_number: String,
        serial: String,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        os_version: Option<String>,
        #[serde(default)]
        battery_level: Option<u8>,
        connection: ConnectionKind,
        #[serde(default)]
        address: Option<String>,
        status: DeviceStatus,
    },
    DeviceStatus {
        device_id: Uuid,
        status: DeviceStatus,
        #[serde(default)]
        battery_level: Option<u8>,
        #[serde(default)]
        error: Option<String>,
    },
}

/// Cancellation broadcast on `tasks.ctl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevokeRequest {
    pub broker_id: String,
    pub terminate: bool,
}

/// Request body for `tasks.query`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskQueryRequest {
    pub broker_id: String,
}

/// A worker's broker-side view of one task (`tasks.query` reply).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerTaskView {
    pub broker_id: String,
    pub state: String,
    #[serde(default)]
    pub step: Option<String>,
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(default)]
    pub message: Option<String>,
    pub ready: bool,
}

/// One worker's `workers.ping` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub name: String,
    pub queues: Vec<String>,
    pub active_tasks: u32,
    pub reserved_tasks: u32,
    pub concurrency: u32,
}

/// Session-pool metrics, as returned by the worker health-check task and
/// unioned into `/api/appium/metrics`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolMetrics {
    pub ready: bool,
    pub active_sessions: u32,
    pub max_sessions: u32,
    pub available_ports: u32,
    #[serde(default)]
    pub used_ports: HashMap<String, u16>,
    #[serde(default)]
    pub active_devices: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
