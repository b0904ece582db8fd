// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The YouTube job adapter: lease a session, run the orchestrator, forward
//! progress as broker-task meta updates, and write the terminal state.
//!
//! Two retry layers per the recovery design: transient in-job failures are
//! retried in-process on the same session via the recovery policy; session-
//! class failures retry the whole task (fresh session) up to `max_retries`
//! with a fixed back-off.

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use farm_core::task::{StopSessionParams, YoutubeJobParams};

use crate::automation::probe_ready;
use crate::orchestrator::{JobResult, Orchestrator};
use crate::recovery::{execute_step, handle, RecoveryStep};
use crate::report::Reporter;
use crate::youtube::chains::YOUTUBE_PACKAGE;

use super::{Completion, TaskContext};

pub async fn run_youtube(
    ctx: &TaskContext,
    task_id: Uuid,
    params: &YoutubeJobParams,
    cancel: &CancellationToken,
) -> Completion {
    let udid = &params.device_udid;
    let mut task_attempt: u32 = 0;

    loop {
        ctx.reporter.progress(task_id, "session_create", 0, None).await;
        let driver = match ctx.pool.create_session(udid).await {
            Ok(driver) => driver,
            Err(e) => {
                warn!(device = %udid, err = %e, "session lease failed");
                if task_attempt < ctx.max_retries && !cancel.is_cancelled() {
                    task_attempt += 1;
                    ctx.reporter
                        .retrying(
                            task_id,
                            task_attempt,
                            Some(format!("session lease failed: {e}")),
                        )
                        .await;
                    if !backoff(ctx, cancel).await {
                        return Completion::cancelled();
                    }
                    continue;
                }
                return Completion::failed(format!("session lease failed: {e}"), None);
            }
        };

        ctx.reporter.progress(task_id, "bot_execute", 5, None).await;
        let mut orchestrator = Orchestrator::new(driver, ctx.evidence_dir.clone());

        // Bridge sync progress callbacks onto the async reporter.
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<(u8, String)>();
        let forwarder = {
            let reporter = Arc::clone(&ctx.reporter);
            tokio::spawn(async move {
                while let Some((pct, message)) = rx.recv().await {
                    reporter.progress(task_id, "watching", pct, Some(message)).await;
                }
            })
        };
        let on_progress = move |pct: u8, message: &str| {
            let _ = tx.send((pct, message.to_owned()));
        };

        let result =
            run_with_recovery(ctx, task_id, &mut orchestrator, params, cancel, &on_progress).await;

        drop(on_progress);
        let _ = forwarder.await;

        // Session teardown is unconditional.
        ctx.pool.close_session(udid).await;

        if result.cancelled {
            return Completion::cancelled();
        }
        if result.success {
            return Completion::success(result_json(udid, params, &result));
        }

        // Session-class failures get a fresh session and a whole-task retry.
        let needs_new_session =
            result.error_code.map(|c| c.needs_new_session()).unwrap_or(false);
        if needs_new_session && task_attempt < ctx.max_retries && !cancel.is_cancelled() {
            task_attempt += 1;
            info!(
                device = %udid,
                attempt = task_attempt,
                max = ctx.max_retries,
                "retrying job on a fresh session"
            );
            ctx.reporter
                .retrying(task_id, task_attempt, result.error_message.clone())
                .await;
            if !backoff(ctx, cancel).await {
                return Completion::cancelled();
            }
            continue;
        }

        let error = result
            .error_message
            .clone()
            .unwrap_or_else(|| "job failed".into());
        return Completion::failed(error, Some(result_json(udid, params, &result)));
    }
}

/// Run the orchestrator, applying the in-process recovery policy to
/// classified failures until the policy says fail. Each recovery round is
/// surfaced as a `retrying` status.
async fn run_with_recovery(
    ctx: &TaskContext,
    task_id: Uuid,
    orchestrator: &mut Orchestrator,
    params: &YoutubeJobParams,
    cancel: &CancellationToken,
    on_progress: &(dyn Fn(u8, &str) + Send + Sync),
) -> JobResult {
    let mut retry_count: u32 = 0;
    loop {
        let result = orchestrator.execute(params, cancel, on_progress).await;
        if result.success || result.cancelled {
            return result;
        }
        let Some(code) = result.error_code else { return result };

        let step = handle(code, retry_count);
        if step == RecoveryStep::Fail {
            return result;
        }
        info!(code = %code, retry = retry_count, ?step, "recovering in-process");
        ctx.reporter
            .retrying(
                task_id,
                retry_count + 1,
                Some(format!("{code}: recovering ({:?})", step)),
            )
            .await;

        let actions = crate::actions::Actions::new(orchestrator.driver().clone());
        let recovered = tokio::select! {
            recovered = execute_step(&step, &actions, YOUTUBE_PACKAGE) => recovered,
            _ = cancel.cancelled() => {
                let mut cancelled = result;
                cancelled.cancelled = true;
                return cancelled;
            }
        };
        if !recovered {
            return result;
        }
        retry_count += 1;
    }
}

fn result_json(udid: &str, params: &YoutubeJobParams, result: &JobResult) -> serde_json::Value {
    json!({
        "assignment_id": params.assignment_id,
        "device_udid": udid,
        "success": result.success,
        "search_success": result.search_success,
        "duration_sec": result.duration_sec,
        "did_like": result.did_like,
        "did_subscribe": result.did_subscribe,
        "did_playlist": result.did_playlist,
        "did_comment": result.did_comment,
        "error_code": result.error_code,
        "ad_stats": result.ad_stats,
        "evidence_count": result.evidence.as_ref().map(|e| e.evidence_count).unwrap_or(0),
    })
}

/// Fixed inter-attempt back-off; `false` when cancelled while waiting.
async fn backoff(ctx: &TaskContext, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(ctx.retry_backoff) => true,
        _ = cancel.cancelled() => false,
    }
}

/// Force-close a device's automation session.
pub async fn stop_session(ctx: &TaskContext, params: &StopSessionParams) -> Completion {
    ctx.pool.close_session(&params.device_udid).await;
    Completion::success(json!({ "success": true, "device_udid": params.device_udid }))
}

/// Automation server readiness plus session-pool metrics.
pub async fn automation_health_check(ctx: &TaskContext) -> Completion {
    let ready = probe_ready(&ctx.http, &ctx.automation_url).await.unwrap_or(false);
    let metrics = ctx.pool.metrics(ready);
    match serde_json::to_value(&metrics) {
        Ok(value) => Completion::success(value),
        Err(e) => Completion::failed(format!("metrics serialization failed: {e}"), None),
    }
}

#[cfg(test)]
#[path = "youtube_tests.rs"]
mod tests;
