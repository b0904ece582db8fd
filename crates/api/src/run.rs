// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level server runner: store, broker, reconciler, HTTP listener.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::broker::NatsBroker;
use crate::config::Config;
use crate::http::{build_router, AppState};
use crate::reconcile;
use crate::store::mem::MemStore;
use crate::store::Store;

/// How often the state snapshot is written.
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(60);

pub async fn run(config: Config) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();

    let mem = Arc::new(match config.state_path.as_ref() {
        Some(path) => MemStore::with_snapshot(path),
        None => MemStore::new(),
    });
    let store: Arc<dyn Store> = mem.clone();

    let mut opts = async_nats::ConnectOptions::new().retry_on_initial_connect();
    if let Some(ref token) = config.broker_token {
        opts = opts.token(token.clone());
    }
    let client = opts.connect(&config.broker_url).await?;
    info!(broker = %config.broker_url, "broker connected");
    let broker = Arc::new(NatsBroker::new(client.clone()));

    // Worker events flow back through the reconciler.
    {
        let store = store.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = reconcile::run(client, store, shutdown).await {
                error!(err = %e, "reconciler failed");
            }
        });
    }

    // Periodic snapshots, plus one on shutdown.
    {
        let mem = mem.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(SNAPSHOT_INTERVAL);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = timer.tick() => mem.save_snapshot(),
                }
            }
        });
    }

    let state = AppState::new(
        store,
        broker,
        config.automation_url.clone(),
        config.metrics_queue.to_lowercase(),
    );
    let router = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "api listening");

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                shutdown.cancel();
            }
        });
    }

    let server = axum::serve(listener, router).with_graceful_shutdown({
        let shutdown = shutdown.clone();
        async move { shutdown.cancelled().await }
    });
    if let Err(e) = server.await {
        warn!(err = %e, "server exited with error");
    }

    shutdown.cancel();
    mem.save_snapshot();
    info!("api stopped");
    Ok(())
}
