// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-device job orchestrator: launch → navigate → watch → interact →
//! report.
//!
//! The watch loop runs on one executor and polls the ad skipper, the
//! forward-skip schedule, playback-stall detection, and progress reporting
//! inline — there is no sidecar thread, so nothing here is shared state.
//! `execute` never returns an error: every failure is classified and folded
//! into the [`JobResult`], and evidence is always finalized.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use farm_core::error::ErrorCode;
use farm_core::task::YoutubeJobParams;

use crate::actions::Actions;
use crate::driver::UiDriver;
use crate::evidence::{EvidenceRecorder, EvidenceSummary, JobOutcome};
use crate::recovery::{classify, JobError, StallMonitor, STALL_TIMEOUT};
use crate::selector::Selectors;
use crate::youtube::{
    chains, AdSkipper, AdStats, InteractionOutcome, InteractionProbs, Interactions, NavOutcome,
    RandomSurf, SearchFlow,
};

/// Watch-loop granularity; the ad skipper runs once per tick.
pub const AD_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Cadence of progress emissions during the watch loop.
pub const PROGRESS_REPORT_INTERVAL: Duration = Duration::from_secs(10);

/// Raise device-timeout when no progress has been emitted for this long.
pub const DEVICE_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Forward-skip fires at every multiple of this watched percentage.
const WATCH_SKIP_STEP_PCT: u32 = 10;

/// Callback receiving `(overall_progress_pct, message)`.
pub type ProgressFn<'a> = &'a (dyn Fn(u8, &str) + Send + Sync);

#[derive(Debug, Clone, Default, Serialize)]
pub struct JobResult {
    pub success: bool,
    pub search_success: bool,
    pub duration_sec: f64,
    pub did_like: bool,
    pub did_subscribe: bool,
    pub did_playlist: bool,
    pub did_comment: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip)]
    pub cancelled: bool,
    pub ad_stats: AdStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<EvidenceSummary>,
}

pub struct Orchestrator {
    driver: Arc<dyn UiDriver>,
    selectors: Selectors,
    actions: Actions,
    evidence: EvidenceRecorder,
    ad_skipper: AdSkipper,
}

impl Orchestrator {
    pub fn new(driver: Arc<dyn UiDriver>, evidence_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            selectors: Selectors::new(driver.clone(), chains::YOUTUBE_PACKAGE),
            actions: Actions::new(driver.clone()),
            evidence: EvidenceRecorder::new(driver.clone(), evidence_dir),
            ad_skipper: AdSkipper::new(),
            driver,
        }
    }

    /// Run one assignment to completion. Cancellation flows through the same
    /// cleanup path as failure: evidence is finalized either way.
    pub async fn execute(
        &mut self,
        params: &YoutubeJobParams,
        cancel: &CancellationToken,
        on_progress: ProgressFn<'_>,
    ) -> JobResult {
        let started = tokio::time::Instant::now();
        let mut result = JobResult::default();

        info!(
            assignment = %params.assignment_id,
            url = params.target_url.as_deref().unwrap_or(""),
            keyword = params.keyword.as_deref().unwrap_or(""),
            "starting youtube job"
        );
        self.evidence.start_job(&params.assignment_id);

        match self.run(params, cancel, on_progress, &mut result).await {
            Ok(()) => {
                result.success = true;
            }
            Err(JobError::Cancelled) => {
                result.cancelled = true;
                result.error_message = Some("job cancelled".into());
                info!(assignment = %params.assignment_id, "job cancelled");
            }
            Err(err) => {
                let code = classify(&err);
                warn!(
                    assignment = %params.assignment_id,
                    code = %code,
                    err = %err,
                    "job failed"
                );
                result.error_code = Some(code);
                result.error_message = Some(err.to_string());
                self.evidence.capture_error(&err.to_string()).await;
            }
        }

        if result.duration_sec == 0.0 {
            result.duration_sec = started.elapsed().as_secs_f64();
        }
        result.ad_stats = self.ad_skipper.stats();
        result.evidence = self.evidence.finish_job(&JobOutcome {
            success: result.success,
            search_success: result.search_success,
            watch_duration_sec: result.duration_sec,
            error: result.error_message.clone(),
        });

        info!(
            assignment = %params.assignment_id,
            success = result.success,
            duration_sec = result.duration_sec,
            "job finished"
        );
        result
    }

    async fn run(
        &mut self,
        params: &YoutubeJobParams,
        cancel: &CancellationToken,
        on_progress: ProgressFn<'_>,
        result: &mut JobResult,
    ) -> Result<(), JobError> {
        on_progress(5, "Launching YouTube");
        self.launch().await?;

        on_progress(10, "Navigating to video");
        self.evidence.capture("search").await;
        match self.navigate(params).await? {
            NavOutcome::Found => {
                result.search_success = true;
                self.evidence.capture("video_found").await;
            }
            NavOutcome::NotFound => {
                return Err(JobError::Navigation("no matching video found".into()));
            }
            NavOutcome::WrongApp { package } => {
                return Err(JobError::Navigation(format!("url opened outside player: {package}")));
            }
        }

        let target = sample_watch_duration(params);
        on_progress(20, "Watching video");
        result.duration_sec = self.watch(target, cancel, on_progress).await?;

        on_progress(85, "Performing interactions");
        let outcome = self.interact(params).await;
        result.did_like = outcome.did_like;
        result.did_subscribe = outcome.did_subscribe;
        result.did_playlist = outcome.did_playlist;
        result.did_comment = outcome.did_comment;

        self.evidence.capture("watch_end").await;
        on_progress(100, "Completed");
        Ok(())
    }

    async fn launch(&mut self) -> Result<(), JobError> {
        self.actions.activate_app(chains::YOUTUBE_PACKAGE).await?;
        tokio::time::sleep(Duration::from_secs(3)).await;
        let running = self
            .actions
            .is_app_running(chains::YOUTUBE_PACKAGE)
            .await
            .unwrap_or(false);
        if !running {
            return Err(JobError::LaunchFailed("player app not running after launch".into()));
        }
        Ok(())
    }

    async fn navigate(&mut self, params: &YoutubeJobParams) -> Result<NavOutcome, JobError> {
        let flow = SearchFlow { selectors: &self.selectors, actions: &self.actions };
        if let Some(url) = params.target_url.as_deref() {
            return Ok(flow.navigate_by_url(url).await?);
        }
        if let Some(keyword) = params.keyword.as_deref() {
            return Ok(flow
                .search_and_select(
                    keyword,
                    params.video_title.as_deref(),
                    crate::youtube::search::MAX_SCROLL_ATTEMPTS,
                )
                .await?);
        }

        info!("no url or keyword, using random surf");
        let surf = RandomSurf { selectors: &self.selectors, actions: &self.actions };
        if !surf.navigate_to_home().await? {
            return Ok(NavOutcome::NotFound);
        }
        Ok(surf.select_random_video(5).await?)
    }

    /// Watch for `target` seconds in 5 s ticks, interleaving ad skipping,
    /// forward-skips at 10 % steps, stall detection, and crash checks.
    async fn watch(
        &mut self,
        target: f64,
        cancel: &CancellationToken,
        on_progress: ProgressFn<'_>,
    ) -> Result<f64, JobError> {
        let player =
            self.selectors.find_with_fallback(chains::PLAYER_VIEW, chains::TIMEOUT_VIDEO_LOAD).await?;
        if player.is_none() {
            warn!("player view not found, continuing anyway");
        }
        self.evidence.capture("watch_start").await;

        let mut stall = StallMonitor::new(STALL_TIMEOUT);
        let tick = AD_CHECK_INTERVAL.as_secs_f64();
        let mut elapsed = 0.0f64;
        let mut last_report = 0.0f64;
        let mut next_skip_pct = WATCH_SKIP_STEP_PCT;
        let mut last_emit = tokio::time::Instant::now();

        info!(target_sec = target, "watching video");
        while elapsed < target {
            self.ad_skipper.try_skip(&self.selectors, &self.actions).await;

            tokio::select! {
                _ = tokio::time::sleep(AD_CHECK_INTERVAL) => {}
                _ = cancel.cancelled() => return Err(JobError::Cancelled),
            }
            elapsed += tick;

            let watched_pct = ((elapsed / target) * 100.0).floor() as u32;
            if watched_pct >= next_skip_pct && watched_pct < 100 {
                self.forward_skip().await;
                next_skip_pct += WATCH_SKIP_STEP_PCT;
            }

            match self.player_position().await {
                // A frozen reading is the stall signal.
                Some(position) => stall.update(position as f64),
                // No readable position: feed the advancing elapsed counter so
                // stall detection stays quiet rather than firing blind.
                None => stall.update(elapsed),
            }

            if elapsed - last_report >= PROGRESS_REPORT_INTERVAL.as_secs_f64() {
                last_report = elapsed;
                let ratio = (elapsed / target).min(1.0);
                let overall = 20 + (ratio * 65.0) as u8;
                on_progress(
                    overall,
                    &format!("Watching: {elapsed:.0}/{target:.0}s ({:.0}%)", ratio * 100.0),
                );
                last_emit = tokio::time::Instant::now();
            }

            let running = self
                .actions
                .is_app_running(chains::YOUTUBE_PACKAGE)
                .await
                .unwrap_or(false);
            if !running {
                return Err(JobError::Crashed { elapsed_sec: elapsed as u64 });
            }
            if stall.is_stalled() {
                return Err(JobError::Stalled { elapsed_sec: elapsed as u64 });
            }
            if last_emit.elapsed() > DEVICE_TIMEOUT {
                return Err(JobError::DeviceTimeout { idle_sec: last_emit.elapsed().as_secs() });
            }
        }

        info!(watched_sec = elapsed, "watch completed");
        Ok(elapsed)
    }

    /// Double-tap the player's right region: the forward-10s gesture.
    async fn forward_skip(&self) {
        let Ok((w, h)) = self.actions.screen_size().await else { return };
        let (x, y) = ((w as f64 * 0.75) as i32, (h as f64 * 0.40) as i32);
        for _ in 0..2 {
            if let Err(e) = self.actions.tap_at(x, y).await {
                warn!(err = %e, "forward-skip tap failed");
                return;
            }
            tokio::time::sleep(Duration::from_millis(80)).await;
        }
        info!(x, y, "forward-skip gesture sent");
    }

    /// Current playback position in milliseconds, read from the device's
    /// media session.
    async fn player_position(&self) -> Option<i64> {
        match self.actions.shell("dumpsys", &["media_session"]).await {
            Ok(output) => parse_media_position(&output),
            Err(_) => None,
        }
    }

    async fn interact(&mut self, params: &YoutubeJobParams) -> InteractionOutcome {
        let interactions = Interactions { selectors: &self.selectors, actions: &self.actions };
        interactions
            .perform(&InteractionProbs {
                like: params.prob_like,
                comment: params.prob_comment,
                subscribe: params.prob_subscribe,
                playlist: params.prob_playlist,
                comment_text: params.comment_text.clone(),
            })
            .await
    }

    pub fn driver(&self) -> &Arc<dyn UiDriver> {
        &self.driver
    }
}

/// Uniform sample in `[duration·min_pct/100, duration·max_pct/100]` seconds.
pub fn sample_watch_duration(params: &YoutubeJobParams) -> f64 {
    let base = params.duration_sec as f64;
    let min_sec = base * params.duration_min_pct as f64 / 100.0;
    let max_sec = base * params.duration_max_pct as f64 / 100.0;
    let duration = if max_sec > min_sec {
        rand::rng().random_range(min_sec..=max_sec)
    } else {
        min_sec
    };
    info!(
        duration_sec = duration,
        min_pct = params.duration_min_pct,
        max_pct = params.duration_max_pct,
        base_sec = params.duration_sec,
        "watch duration sampled"
    );
    duration
}

/// Pull `position=<n>` out of `dumpsys media_session` output.
pub fn parse_media_position(output: &str) -> Option<i64> {
    let idx = output.find("position=")?;
    let rest = &output[idx + "position=".len()..];
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '-'))
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
