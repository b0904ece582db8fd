// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event reporting seam. Tasks publish lifecycle and fleet events through a
//! [`Reporter`]; the NATS implementation feeds the API-side reconciler.

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use farm_core::event::{FleetEvent, TaskEvent};
use farm_core::subject;
use farm_core::task::TaskStatus;

#[async_trait]
pub trait Reporter: Send + Sync {
    async fn task(&self, event: TaskEvent);
    async fn fleet(&self, event: FleetEvent);

    async fn started(&self, task_id: Uuid) {
        self.task(TaskEvent::Started { task_id }).await;
    }

    async fn progress(&self, task_id: Uuid, step: &str, progress: u8, message: Option<String>) {
        self.task(TaskEvent::Progress { task_id, step: step.to_owned(), progress, message }).await;
    }

    async fn retrying(&self, task_id: Uuid, retries: u32, message: Option<String>) {
        self.task(TaskEvent::Retrying { task_id, retries, message }).await;
    }

    async fn finished(
        &self,
        task_id: Uuid,
        status: TaskStatus,
        result: Option<Value>,
        error: Option<String>,
    ) {
        self.task(TaskEvent::Finished { task_id, status, result, error }).await;
    }
}

/// Publishes events to the broker's event subjects.
pub struct NatsReporter {
    client: async_nats::Client,
}

impl NatsReporter {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }

    async fn publish<T: serde::Serialize>(&self, subject: &'static str, event: &T) {
        let payload = match serde_json::to_vec(event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(subject, err = %e, "failed to serialize event");
                return;
            }
        };
        if let Err(e) = self.client.publish(subject, payload.into()).await {
            warn!(subject, err = %e, "failed to publish event");
        }
    }
}

#[async_trait]
impl Reporter for NatsReporter {
    async fn task(&self, event: TaskEvent) {
        self.publish(subject::TASK_EVENTS, &event).await;
    }

    async fn fleet(&self, event: FleetEvent) {
        self.publish(subject::FLEET_EVENTS, &event).await;
    }
}

/// Forwards fleet facts but drops task lifecycle events. Used for
/// beat-scheduled runs, which have no task row to update.
pub struct FleetOnlyReporter(pub std::sync::Arc<dyn Reporter>);

#[async_trait]
impl Reporter for FleetOnlyReporter {
    async fn task(&self, _event: TaskEvent) {}

    async fn fleet(&self, event: FleetEvent) {
        self.0.fleet(event).await;
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    //! Recording reporter for tests.

    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct RecordingReporter {
        pub task_events: Mutex<Vec<TaskEvent>>,
        pub fleet_events: Mutex<Vec<FleetEvent>>,
    }

    impl RecordingReporter {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn tasks(&self) -> Vec<TaskEvent> {
            self.task_events.lock().clone()
        }

        pub fn fleets(&self) -> Vec<FleetEvent> {
            self.fleet_events.lock().clone()
        }

        /// The terminal event, if one was published.
        pub fn finished(&self) -> Option<(TaskStatus, Option<Value>, Option<String>)> {
            self.task_events.lock().iter().rev().find_map(|e| match e {
                TaskEvent::Finished { status, result, error, .. } => {
                    Some((*status, result.clone(), error.clone()))
                }
                _ => None,
            })
        }
    }

    #[async_trait]
    impl Reporter for RecordingReporter {
        async fn task(&self, event: TaskEvent) {
            self.task_events.lock().push(event);
        }

        async fn fleet(&self, event: FleetEvent) {
            self.fleet_events.lock().push(event);
        }
    }
}
