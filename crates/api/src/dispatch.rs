// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatch plane: broker send with per-host routing, the task row, and
//! cancellation/status merging.
//!
//! Dispatch never blocks on device work: the row is inserted `pending` right
//! after a successful publish and the caller gets `{task_id, broker_id}`
//! immediately. The row is written only after the publish succeeds — a dead
//! broker leaves no orphan rows.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use farm_core::task::{TaskEnvelope, TaskRecord, TaskSpec, TaskStatus};

use crate::broker::Broker;
use crate::error::ApiError;
use crate::store::{NewTask, StatusUpdate, Store};

/// `{task_id, broker_id}` acknowledgement for dispatch endpoints.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DispatchAck {
    pub task_id: Uuid,
    pub broker_id: String,
}

pub struct Dispatcher {
    store: Arc<dyn Store>,
    broker: Arc<dyn Broker>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn Store>, broker: Arc<dyn Broker>) -> Self {
        Self { store, broker }
    }

    /// Publish a task to a queue and record it.
    pub async fn dispatch(
        &self,
        queue: &str,
        spec: TaskSpec,
        device_id: Option<Uuid>,
        host_id: Option<Uuid>,
    ) -> Result<DispatchAck, ApiError> {
        let envelope = TaskEnvelope {
            task_id: Uuid::new_v4(),
            broker_id: Uuid::new_v4().to_string(),
            queue: queue.to_owned(),
            spec,
        };

        self.broker
            .send_task(&envelope)
            .await
            .map_err(|e| ApiError::BrokerUnavailable(e.to_string()))?;

        let payload = serde_json::to_value(&envelope.spec).unwrap_or(Value::Null);
        let record = self
            .store
            .insert_task(NewTask {
                id: envelope.task_id,
                broker_id: envelope.broker_id.clone(),
                kind: envelope.spec.kind(),
                queue: envelope.queue.clone(),
                device_id,
                host_id,
                payload,
            })
            .await?;

        info!(
            task = %record.id,
            broker_id = %record.broker_id,
            kind = %record.kind,
            queue = %record.queue,
            "task dispatched"
        );
        Ok(DispatchAck { task_id: record.id, broker_id: record.broker_id })
    }

    /// Revoke on the broker, then mark the row cancelled.
    pub async fn cancel(&self, task_id: Uuid) -> Result<TaskRecord, ApiError> {
        let task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Task not found".into()))?;

        self.broker
            .revoke(&task.broker_id, true)
            .await
            .map_err(|e| ApiError::BrokerUnavailable(e.to_string()))?;

        let record = self
            .store
            .update_task_status(
                task_id,
                StatusUpdate { status: Some(TaskStatus::Cancelled), ..StatusUpdate::default() },
            )
            .await?;
        info!(task = %task_id, "task cancelled");
        Ok(record)
    }

    /// Broker-side status merged against the stored row.
    pub async fn celery_status(&self, task_id: Uuid) -> Result<Value, ApiError> {
        let task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Task not found".into()))?;

        let view = self
            .broker
            .query_task(&task.broker_id)
            .await
            .map_err(|e| ApiError::BrokerUnavailable(e.to_string()))?;

        Ok(json!({
            "task_id": task.id,
            "broker_id": task.broker_id,
            "db_status": task.status,
            "broker_status": view,
        }))
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
