// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker subject naming. Per-host work queues are subjects named after the
//! lower-cased host number; everything else is a fixed shared subject.

/// Queue every worker consumes in addition to its own.
pub const DEFAULT_QUEUE: &str = "default";

/// Task lifecycle events (worker → API reconciler).
pub const TASK_EVENTS: &str = "tasks.events";

/// Fleet facts from scans and health checks (worker → API reconciler).
pub const FLEET_EVENTS: &str = "fleet.events";

/// Cancellation broadcasts (API → all workers).
pub const TASK_CONTROL: &str = "tasks.ctl";

/// Broker-side task status request/reply.
pub const TASK_QUERY: &str = "tasks.query";

/// Worker liveness/inspection request; every worker replies to the inbox.
pub const WORKER_PING: &str = "workers.ping";

/// Work subject for one queue (`host01` → `tasks.host01`).
pub fn task_queue(queue: &str) -> String {
    format!("tasks.{queue}")
}

/// Automation health request/reply subject for one host's worker.
pub fn automation(queue: &str) -> String {
    format!("workers.{queue}.automation")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subjects_derive_from_queue() {
        assert_eq!(task_queue("host01"), "tasks.host01");
        assert_eq!(task_queue(DEFAULT_QUEUE), "tasks.default");
        assert_eq!(automation("host07"), "workers.host07.automation");
    }
}
