// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker main loop: consume the host queue plus `default`, run tasks under
//! the concurrency cap, answer control/inspection subjects, heartbeat the
//! API, and drive the beat schedules.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use farm_core::event::{
    BrokerTaskView, FleetEvent, RevokeRequest, TaskEvent, TaskQueryRequest, WorkerInfo,
};
use farm_core::subject;
use farm_core::task::{TaskEnvelope, TaskSpec, TaskStatus};

use crate::adb::SystemAdb;
use crate::automation::probe_ready;
use crate::config::Config;
use crate::report::{FleetOnlyReporter, NatsReporter, Reporter};
use crate::session::{HttpDriverFactory, SessionPool};
use crate::tasks::{self, TaskContext};
use crate::youtube::chains;

/// Heartbeat cadence against the API.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Timeout for heartbeat HTTP requests.
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(10);

/// Beat schedule periods.
const BEAT_BATCH_HEALTH: Duration = Duration::from_secs(300);
const BEAT_COLLECT_LOGS: Duration = Duration::from_secs(3600);
const BEAT_AUTOMATION_HEALTH: Duration = Duration::from_secs(600);

/// Finished-task views kept for `tasks.query`.
const FINISHED_VIEW_CAP: usize = 256;

// -- Task registry ------------------------------------------------------------

struct RunningEntry {
    task_id: Uuid,
    cancel: CancellationToken,
    view: BrokerTaskView,
}

/// Broker-side view of this worker's tasks, for revoke and status queries.
#[derive(Default)]
pub struct Registry {
    running: Mutex<HashMap<String, RunningEntry>>,
    finished: Mutex<VecDeque<(String, BrokerTaskView)>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, broker_id: &str, task_id: Uuid, cancel: CancellationToken) {
        let view = BrokerTaskView {
            broker_id: broker_id.to_owned(),
            state: "started".to_owned(),
            step: None,
            progress: None,
            message: None,
            ready: false,
        };
        self.running
            .lock()
            .insert(broker_id.to_owned(), RunningEntry { task_id, cancel, view });
    }

    fn update(&self, task_id: Uuid, step: &str, progress: u8, message: Option<&str>) {
        let mut running = self.running.lock();
        if let Some(entry) = running.values_mut().find(|e| e.task_id == task_id) {
            entry.view.step = Some(step.to_owned());
            entry.view.progress = Some(progress);
            entry.view.message = message.map(str::to_owned);
        }
    }

    fn finish(&self, task_id: Uuid, status: TaskStatus) {
        let mut running = self.running.lock();
        let Some(broker_id) = running
            .iter()
            .find(|(_, e)| e.task_id == task_id)
            .map(|(k, _)| k.clone())
        else {
            return;
        };
        if let Some(entry) = running.remove(&broker_id) {
            let mut view = entry.view;
            view.state = status.as_str().to_owned();
            view.ready = true;
            let mut finished = self.finished.lock();
            finished.push_back((broker_id, view));
            while finished.len() > FINISHED_VIEW_CAP {
                finished.pop_front();
            }
        }
    }

    /// Cancel a running task by broker id. Returns whether it was found.
    pub fn cancel(&self, broker_id: &str) -> bool {
        let running = self.running.lock();
        match running.get(broker_id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn view(&self, broker_id: &str) -> Option<BrokerTaskView> {
        if let Some(entry) = self.running.lock().get(broker_id) {
            return Some(entry.view.clone());
        }
        self.finished
            .lock()
            .iter()
            .rev()
            .find(|(id, _)| id == broker_id)
            .map(|(_, view)| view.clone())
    }

    pub fn active_count(&self) -> u32 {
        self.running.lock().len() as u32
    }
}

/// Reporter decorator that mirrors task events into the [`Registry`] before
/// publishing them.
struct RegistryReporter {
    inner: NatsReporter,
    registry: Arc<Registry>,
}

#[async_trait]
impl Reporter for RegistryReporter {
    async fn task(&self, event: TaskEvent) {
        match &event {
            TaskEvent::Progress { task_id, step, progress, message } => {
                self.registry.update(*task_id, step, *progress, message.as_deref());
            }
            TaskEvent::Finished { task_id, status, .. } => {
                self.registry.finish(*task_id, *status);
            }
            _ => {}
        }
        self.inner.task(event).await;
    }

    async fn fleet(&self, event: FleetEvent) {
        self.inner.fleet(event).await;
    }
}

// -- Worker -------------------------------------------------------------------

/// Run the worker until SIGINT.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let queue = config.effective_queue();
    let shutdown = CancellationToken::new();

    info!(
        host = %config.host_number,
        queue = %queue,
        broker = %config.broker_url,
        "starting worker"
    );

    let mut opts = async_nats::ConnectOptions::new().retry_on_initial_connect();
    if let Some(ref token) = config.broker_token {
        opts = opts.token(token.clone());
    }
    let client = opts.connect(&config.broker_url).await?;
    info!("broker connected");

    let registry = Arc::new(Registry::new());
    let reporter: Arc<dyn Reporter> = Arc::new(RegistryReporter {
        inner: NatsReporter::new(client.clone()),
        registry: registry.clone(),
    });

    let pool = Arc::new(SessionPool::new(
        Arc::new(HttpDriverFactory { automation_url: config.automation_url.clone() }),
        config.service_port_start,
        config.service_port_end,
        config.max_sessions,
        config.session_idle_timeout,
        chains::YOUTUBE_PACKAGE,
        chains::YOUTUBE_ACTIVITY,
    ));

    let ctx = Arc::new(TaskContext {
        host_number: config.host_number.clone(),
        queue: queue.clone(),
        adb: Arc::new(SystemAdb::new(config.adb_path.clone(), config.adb_timeout_duration())),
        pool: pool.clone(),
        reporter,
        http: reqwest::Client::new(),
        automation_url: config.automation_url.clone(),
        evidence_dir: config.evidence_dir.clone(),
        apk_dir: config.apk_dir.clone(),
        max_retries: config.max_retries,
        retry_backoff: Duration::from_secs(30),
    });

    let semaphore = Arc::new(tokio::sync::Semaphore::new(config.max_concurrent));
    let tracker = TaskTracker::new();

    for subject_queue in [queue.clone(), subject::DEFAULT_QUEUE.to_owned()] {
        let sub = client
            .queue_subscribe(subject::task_queue(&subject_queue), subject_queue.clone())
            .await?;
        tracker.spawn(work_loop(
            ctx.clone(),
            registry.clone(),
            sub,
            semaphore.clone(),
            shutdown.clone(),
            config.task_time_limit,
            config.youtube_time_limit,
        ));
    }

    tracker.spawn(control_loop(
        client.subscribe(subject::TASK_CONTROL).await?,
        registry.clone(),
        shutdown.clone(),
    ));
    tracker.spawn(query_loop(
        client.clone(),
        client.subscribe(subject::TASK_QUERY).await?,
        registry.clone(),
        shutdown.clone(),
    ));
    tracker.spawn(ping_loop(
        client.clone(),
        client.subscribe(subject::WORKER_PING).await?,
        registry.clone(),
        config.host_number.clone(),
        queue.clone(),
        config.max_concurrent as u32,
        shutdown.clone(),
    ));
    tracker.spawn(automation_loop(
        client.clone(),
        client.subscribe(subject::automation(&queue)).await?,
        ctx.clone(),
        shutdown.clone(),
    ));
    tracker.spawn(heartbeat_loop(
        config.api_url.clone(),
        config.host_number.clone(),
        shutdown.clone(),
    ));
    tracker.spawn(beat_loop(ctx.clone(), shutdown.clone()));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    shutdown.cancel();

    tracker.close();
    if tokio::time::timeout(Duration::from_secs(30), tracker.wait()).await.is_err() {
        warn!("shutdown timed out waiting for tasks");
    }
    pool.close_all().await;
    info!("worker stopped");
    Ok(())
}

/// Pull envelopes off one queue subject and run them under the semaphore.
/// One permit per job gives prefetch-1 behavior under long tasks.
async fn work_loop(
    ctx: Arc<TaskContext>,
    registry: Arc<Registry>,
    mut sub: async_nats::Subscriber,
    semaphore: Arc<tokio::sync::Semaphore>,
    shutdown: CancellationToken,
    task_time_limit: u64,
    youtube_time_limit: u64,
) {
    loop {
        let msg = tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = sub.next() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };

        let envelope: TaskEnvelope = match serde_json::from_slice(&msg.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(err = %e, subject = %msg.subject, "dropping malformed task envelope");
                continue;
            }
        };

        let permit = tokio::select! {
            _ = shutdown.cancelled() => break,
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let cancel = shutdown.child_token();
        registry.register(&envelope.broker_id, envelope.task_id, cancel.clone());

        let limit = match &envelope.spec {
            TaskSpec::RunYoutube(_) => Duration::from_secs(youtube_time_limit),
            _ => Duration::from_secs(task_time_limit),
        };

        let ctx = ctx.clone();
        tokio::spawn(async move {
            let _permit = permit;
            // Hard time limit: cancel the job and let it wind down through
            // its normal cleanup path.
            let watchdog = {
                let cancel = cancel.clone();
                let broker_id = envelope.broker_id.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(limit).await;
                    error!(broker_id = %broker_id, limit_sec = limit.as_secs(), "task hit hard time limit");
                    cancel.cancel();
                })
            };
            tasks::execute(&ctx, &envelope, cancel).await;
            watchdog.abort();
        });
    }
    debug!("work loop stopped");
}

/// Apply broker revokes to running tasks.
async fn control_loop(
    mut sub: async_nats::Subscriber,
    registry: Arc<Registry>,
    shutdown: CancellationToken,
) {
    loop {
        let msg = tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = sub.next() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };
        let revoke: RevokeRequest = match serde_json::from_slice(&msg.payload) {
            Ok(revoke) => revoke,
            Err(e) => {
                debug!(err = %e, "ignoring malformed revoke");
                continue;
            }
        };
        if registry.cancel(&revoke.broker_id) {
            info!(broker_id = %revoke.broker_id, terminate = revoke.terminate, "task revoked");
        }
    }
}

/// Answer `tasks.query` for tasks this worker knows about.
async fn query_loop(
    client: async_nats::Client,
    mut sub: async_nats::Subscriber,
    registry: Arc<Registry>,
    shutdown: CancellationToken,
) {
    loop {
        let msg = tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = sub.next() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };
        let Some(reply) = msg.reply else { continue };
        let Ok(query) = serde_json::from_slice::<TaskQueryRequest>(&msg.payload) else {
            continue;
        };
        // Stay silent for unknown ids; another worker may own the task.
        let Some(view) = registry.view(&query.broker_id) else { continue };
        if let Ok(payload) = serde_json::to_vec(&view) {
            let _ = client.publish(reply, payload.into()).await;
        }
    }
}

/// Answer worker inspection pings.
async fn ping_loop(
    client: async_nats::Client,
    mut sub: async_nats::Subscriber,
    registry: Arc<Registry>,
    host_number: String,
    queue: String,
    concurrency: u32,
    shutdown: CancellationToken,
) {
    let name = format!("worker@{}", host_number.to_lowercase());
    loop {
        let msg = tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = sub.next() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };
        let Some(reply) = msg.reply else { continue };
        let info = WorkerInfo {
            name: name.clone(),
            queues: vec![queue.clone(), subject::DEFAULT_QUEUE.to_owned()],
            active_tasks: registry.active_count(),
            reserved_tasks: 0,
            concurrency,
        };
        if let Ok(payload) = serde_json::to_vec(&info) {
            let _ = client.publish(reply, payload.into()).await;
        }
    }
}

/// Answer automation-metrics requests for this host.
async fn automation_loop(
    client: async_nats::Client,
    mut sub: async_nats::Subscriber,
    ctx: Arc<TaskContext>,
    shutdown: CancellationToken,
) {
    loop {
        let msg = tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = sub.next() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };
        let Some(reply) = msg.reply else { continue };
        let ready = probe_ready(&ctx.http, &ctx.automation_url).await.unwrap_or(false);
        let metrics = ctx.pool.metrics(ready);
        if let Ok(payload) = serde_json::to_vec(&metrics) {
            let _ = client.publish(reply, payload.into()).await;
        }
    }
}

/// Heartbeat the API so the host shows online. Initial attempt retries with
/// exponential back-off, then a steady interval.
async fn heartbeat_loop(api_url: String, host_number: String, shutdown: CancellationToken) {
    let client = reqwest::Client::new();
    let url = format!("{}/api/hosts/{host_number}/heartbeat", api_url.trim_end_matches('/'));

    let mut registered = false;
    for attempt in 1..=5u32 {
        match send_heartbeat(&client, &url).await {
            Ok(()) => {
                registered = true;
                break;
            }
            Err(e) => {
                warn!(attempt, api = %api_url, "heartbeat failed: {e}");
                let delay = Duration::from_secs(2u64.pow(attempt.min(4)));
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.cancelled() => return,
                }
            }
        }
    }
    if !registered {
        warn!(api = %api_url, "initial heartbeat never landed, continuing anyway");
    }

    loop {
        tokio::select! {
            _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {}
            _ = shutdown.cancelled() => break,
        }
        if let Err(e) = send_heartbeat(&client, &url).await {
            debug!(api = %api_url, "heartbeat failed: {e}");
        }
    }
}

async fn send_heartbeat(client: &reqwest::Client, url: &str) -> Result<(), String> {
    let resp = client
        .post(url)
        .timeout(HEARTBEAT_TIMEOUT)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if resp.status().is_success() {
        Ok(())
    } else {
        Err(format!("HTTP {}", resp.status()))
    }
}

/// Scheduled maintenance tasks. These have no task row, so lifecycle events
/// are suppressed and only fleet facts flow.
async fn beat_loop(ctx: Arc<TaskContext>, shutdown: CancellationToken) {
    let beat_ctx = Arc::new(TaskContext {
        reporter: Arc::new(FleetOnlyReporter(ctx.reporter.clone())),
        ..TaskContext::clone(&ctx)
    });

    let mut batch_health = tokio::time::interval(BEAT_BATCH_HEALTH);
    let mut collect_logs = tokio::time::interval(BEAT_COLLECT_LOGS);
    let mut automation_health = tokio::time::interval(BEAT_AUTOMATION_HEALTH);
    for timer in [&mut batch_health, &mut collect_logs, &mut automation_health] {
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so startup stays quiet.
        timer.reset();
    }

    loop {
        let spec = tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = batch_health.tick() => TaskSpec::BatchHealthCheck(
                farm_core::task::BatchHealthCheckParams { host_number: ctx.host_number.clone() },
            ),
            _ = collect_logs.tick() => TaskSpec::CollectLogs(
                farm_core::task::CollectLogsParams { host_number: ctx.host_number.clone() },
            ),
            _ = automation_health.tick() => TaskSpec::AutomationHealthCheck(
                farm_core::task::AutomationHealthCheckParams::default(),
            ),
        };

        let kind = spec.kind();
        let envelope = TaskEnvelope {
            task_id: Uuid::new_v4(),
            broker_id: Uuid::new_v4().to_string(),
            queue: ctx.queue.clone(),
            spec,
        };
        debug!(kind = %kind, "running beat task");
        tasks::execute(&beat_ctx, &envelope, shutdown.child_token()).await;
    }
}
