// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker client: task publication to per-host queues, cancellation
//! broadcasts, and the request/reply inspection paths.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::{debug, info};

use farm_core::event::{BrokerTaskView, PoolMetrics, RevokeRequest, TaskQueryRequest, WorkerInfo};
use farm_core::subject;
use farm_core::task::TaskEnvelope;

/// Timeout for broker inspection round trips (ping, query, metrics).
pub const INSPECT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker publish failed: {0}")]
    Publish(String),
    #[error("broker request failed: {0}")]
    Request(String),
    #[error("broker serialization failed: {0}")]
    Serialize(String),
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Publish a task to its queue subject.
    async fn send_task(&self, envelope: &TaskEnvelope) -> Result<(), BrokerError>;

    /// Broadcast a revoke for a broker-side task id.
    async fn revoke(&self, broker_id: &str, terminate: bool) -> Result<(), BrokerError>;

    /// Collect ping replies from every live worker within the timeout.
    async fn ping_workers(&self) -> Result<Vec<WorkerInfo>, BrokerError>;

    /// Ask whichever worker owns the task for its broker-side view.
    async fn query_task(&self, broker_id: &str) -> Result<Option<BrokerTaskView>, BrokerError>;

    /// Request session-pool metrics from one host's worker.
    async fn automation_metrics(&self, queue: &str) -> Result<Option<PoolMetrics>, BrokerError>;
}

pub struct NatsBroker {
    client: async_nats::Client,
}

impl NatsBroker {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }

    /// Connect with retry-on-startup, matching worker-side behavior.
    pub async fn connect(url: &str, token: Option<&str>) -> Result<Self, BrokerError> {
        let mut opts = async_nats::ConnectOptions::new().retry_on_initial_connect();
        if let Some(token) = token {
            opts = opts.token(token.to_owned());
        }
        let client = opts
            .connect(url)
            .await
            .map_err(|e| BrokerError::Request(e.to_string()))?;
        info!(url, "broker connected");
        Ok(Self { client })
    }

    async fn request_json<T: serde::de::DeserializeOwned>(
        &self,
        subject: String,
        payload: Vec<u8>,
    ) -> Result<Option<T>, BrokerError> {
        let request = self.client.request(subject, payload.into());
        match tokio::time::timeout(INSPECT_TIMEOUT, request).await {
            Ok(Ok(msg)) => serde_json::from_slice(&msg.payload)
                .map(Some)
                .map_err(|e| BrokerError::Serialize(e.to_string())),
            // No worker answered in time; that is an answer too.
            Ok(Err(e)) => {
                debug!(err = %e, "broker request failed");
                Ok(None)
            }
            Err(_) => Ok(None),
        }
    }
}

#[async_trait]
impl Broker for NatsBroker {
    async fn send_task(&self, envelope: &TaskEnvelope) -> Result<(), BrokerError> {
        let payload =
            serde_json::to_vec(envelope).map_err(|e| BrokerError::Serialize(e.to_string()))?;
        self.client
            .publish(subject::task_queue(&envelope.queue), payload.into())
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?;
        // Dispatch ordering: the caller inserts the task row only after this
        // returns.
        self.client.flush().await.map_err(|e| BrokerError::Publish(e.to_string()))?;
        debug!(
            broker_id = %envelope.broker_id,
            queue = %envelope.queue,
            "task published"
        );
        Ok(())
    }

    async fn revoke(&self, broker_id: &str, terminate: bool) -> Result<(), BrokerError> {
        let revoke = RevokeRequest { broker_id: broker_id.to_owned(), terminate };
        let payload =
            serde_json::to_vec(&revoke).map_err(|e| BrokerError::Serialize(e.to_string()))?;
        self.client
            .publish(subject::TASK_CONTROL, payload.into())
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?;
        self.client.flush().await.map_err(|e| BrokerError::Publish(e.to_string()))?;
        info!(broker_id, terminate, "revoke broadcast");
        Ok(())
    }

    async fn ping_workers(&self) -> Result<Vec<WorkerInfo>, BrokerError> {
        let inbox = self.client.new_inbox();
        let mut replies = self
            .client
            .subscribe(inbox.clone())
            .await
            .map_err(|e| BrokerError::Request(e.to_string()))?;
        self.client
            .publish_with_reply(subject::WORKER_PING, inbox, Vec::new().into())
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))?;
        self.client.flush().await.map_err(|e| BrokerError::Publish(e.to_string()))?;

        // Fan-in: every live worker replies; collect until the window closes.
        let mut workers = Vec::new();
        let deadline = tokio::time::Instant::now() + INSPECT_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, replies.next()).await {
                Ok(Some(msg)) => match serde_json::from_slice::<WorkerInfo>(&msg.payload) {
                    Ok(info) => workers.push(info),
                    Err(e) => debug!(err = %e, "ignoring malformed ping reply"),
                },
                Ok(None) | Err(_) => break,
            }
        }
        workers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(workers)
    }

    async fn query_task(&self, broker_id: &str) -> Result<Option<BrokerTaskView>, BrokerError> {
        let query = TaskQueryRequest { broker_id: broker_id.to_owned() };
        let payload =
            serde_json::to_vec(&query).map_err(|e| BrokerError::Serialize(e.to_string()))?;
        self.request_json(subject::TASK_QUERY.to_owned(), payload).await
    }

    async fn automation_metrics(&self, queue: &str) -> Result<Option<PoolMetrics>, BrokerError> {
        self.request_json(subject::automation(queue), Vec::new()).await
    }
}

#[cfg(test)]
pub mod fake {
    //! Recording broker for tests.

    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct FakeBroker {
        pub sent: Mutex<Vec<TaskEnvelope>>,
        pub revoked: Mutex<Vec<(String, bool)>>,
        pub fail_sends: Mutex<bool>,
        pub workers: Mutex<Vec<WorkerInfo>>,
        pub views: Mutex<Vec<BrokerTaskView>>,
        pub metrics: Mutex<Option<PoolMetrics>>,
    }

    impl FakeBroker {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn fail_sends(&self) {
            *self.fail_sends.lock() = true;
        }

        pub fn sent(&self) -> Vec<TaskEnvelope> {
            self.sent.lock().clone()
        }

        pub fn revoked(&self) -> Vec<(String, bool)> {
            self.revoked.lock().clone()
        }
    }

    #[async_trait]
    impl Broker for FakeBroker {
        async fn send_task(&self, envelope: &TaskEnvelope) -> Result<(), BrokerError> {
            if *self.fail_sends.lock() {
                return Err(BrokerError::Publish("broker down".into()));
            }
            self.sent.lock().push(envelope.clone());
            Ok(())
        }

        async fn revoke(&self, broker_id: &str, terminate: bool) -> Result<(), BrokerError> {
            self.revoked.lock().push((broker_id.to_owned(), terminate));
            Ok(())
        }

        async fn ping_workers(&self) -> Result<Vec<WorkerInfo>, BrokerError> {
            Ok(self.workers.lock().clone())
        }

        async fn query_task(
            &self,
            broker_id: &str,
        ) -> Result<Option<BrokerTaskView>, BrokerError> {
            Ok(self.views.lock().iter().find(|v| v.broker_id == broker_id).cloned())
        }

        async fn automation_metrics(
            &self,
            _queue: &str,
        ) -> Result<Option<PoolMetrics>, BrokerError> {
            Ok(self.metrics.lock().clone())
        }
    }
}
