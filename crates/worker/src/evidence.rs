// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded per-job screenshot capture and the result manifest.
//!
//! Captures are server-side PNGs written under a sanitized per-assignment
//! directory. Nothing here ever fails the job: capture and manifest errors
//! are logged and swallowed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::driver::UiDriver;

pub const MAX_SCREENSHOTS_PER_JOB: usize = 20;

/// One captured screenshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureInfo {
    pub path: String,
    pub filename: String,
    pub action: String,
    pub captured_at: DateTime<Utc>,
}

/// Aggregate fields the caller supplies at job end.
#[derive(Debug, Clone, Default)]
pub struct JobOutcome {
    pub success: bool,
    pub search_success: bool,
    pub watch_duration_sec: f64,
    pub error: Option<String>,
}

/// `result.json` contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceSummary {
    pub assignment_id: String,
    pub success: bool,
    pub search_success: bool,
    pub watch_duration_sec: f64,
    #[serde(default)]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub evidence_files: Vec<CaptureInfo>,
    pub evidence_count: usize,
    pub evidence_dir: String,
}

struct ActiveJob {
    assignment_id: String,
    dir: PathBuf,
    files: Vec<CaptureInfo>,
    started_at: DateTime<Utc>,
}

pub struct EvidenceRecorder {
    driver: Arc<dyn UiDriver>,
    base_dir: PathBuf,
    job: Option<ActiveJob>,
    sequence: u32,
    last_stamp: String,
}

impl EvidenceRecorder {
    pub fn new(driver: Arc<dyn UiDriver>, base_dir: impl Into<PathBuf>) -> Self {
        Self { driver, base_dir: base_dir.into(), job: None, sequence: 0, last_stamp: String::new() }
    }

    /// Begin a job: create the sanitized per-assignment directory.
    pub fn start_job(&mut self, assignment_id: &str) -> PathBuf {
        let dir = self.base_dir.join(sanitize(assignment_id));
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!(dir = %dir.display(), err = %e, "failed to create evidence directory");
        }
        self.job = Some(ActiveJob {
            assignment_id: assignment_id.to_owned(),
            dir: dir.clone(),
            files: Vec::new(),
            started_at: Utc::now(),
        });
        self.sequence = 0;
        self.last_stamp.clear();
        info!(assignment = assignment_id, dir = %dir.display(), "evidence job started");
        dir
    }

    /// Capture one screenshot. Silently drops past the per-job cap.
    pub async fn capture(&mut self, action: &str) -> Option<CaptureInfo> {
        let Some(job) = self.job.as_ref() else {
            warn!("no active evidence job, skipping capture");
            return None;
        };
        if job.files.len() >= MAX_SCREENSHOTS_PER_JOB {
            warn!(max = MAX_SCREENSHOTS_PER_JOB, "screenshot cap reached, dropping capture");
            return None;
        }

        let filename = self.next_filename(action);
        // Re-borrow mutably after the filename sequence update.
        let Some(job) = self.job.as_mut() else { return None };
        let path = job.dir.join(&filename);

        let png = match self.driver.screenshot().await {
            Ok(png) => png,
            Err(e) => {
                error!(action, err = %e, "screenshot capture failed");
                return None;
            }
        };
        if let Err(e) = std::fs::write(&path, &png) {
            error!(path = %path.display(), err = %e, "failed to write screenshot");
            return None;
        }

        let info = CaptureInfo {
            path: path.display().to_string(),
            filename,
            action: action.to_owned(),
            captured_at: Utc::now(),
        };
        job.files.push(info.clone());
        info!(action, filename = %info.filename, "screenshot captured");
        Some(info)
    }

    /// Error capture: a screenshot plus a timestamped note file.
    pub async fn capture_error(&mut self, message: &str) -> Option<CaptureInfo> {
        let captured = self.capture("error").await;
        if let Some(job) = self.job.as_ref() {
            let note = job.dir.join(format!("error_{}.txt", Utc::now().timestamp()));
            let body = format!("[{}] {message}\n", Utc::now().to_rfc3339());
            if let Err(e) = std::fs::write(&note, body) {
                warn!(err = %e, "failed to write error note");
            }
        }
        captured
    }

    /// Finish the job: write `result.json` and return the summary.
    pub fn finish_job(&mut self, outcome: &JobOutcome) -> Option<EvidenceSummary> {
        let job = self.job.take()?;
        let completed_at = Utc::now();
        let duration_ms =
            (completed_at - job.started_at).num_milliseconds().max(0) as u64;

        let summary = EvidenceSummary {
            assignment_id: job.assignment_id,
            success: outcome.success,
            search_success: outcome.search_success,
            watch_duration_sec: outcome.watch_duration_sec,
            error: outcome.error.clone(),
            started_at: job.started_at,
            completed_at,
            duration_ms,
            evidence_count: job.files.len(),
            evidence_files: job.files,
            evidence_dir: job.dir.display().to_string(),
        };

        match serde_json::to_vec_pretty(&summary) {
            Ok(body) => {
                if let Err(e) = std::fs::write(job.dir.join("result.json"), body) {
                    error!(err = %e, "failed to write result.json");
                }
            }
            Err(e) => error!(err = %e, "failed to serialize result.json"),
        }

        info!(
            assignment = %summary.assignment_id,
            files = summary.evidence_count,
            "evidence job finished"
        );
        Some(summary)
    }

    /// Unique, lexically time-sortable filename:
    /// `YYYYMMDD_HHMMSSmmm_SS_<jobid>_<action>.png`. `SS` disambiguates
    /// captures within the same millisecond.
    fn next_filename(&mut self, action: &str) -> String {
        let now = Local::now();
        let stamp = format!("{}{:03}", now.format("%Y%m%d_%H%M%S"), now.timestamp_subsec_millis());
        if stamp == self.last_stamp {
            self.sequence += 1;
        } else {
            self.sequence = 0;
            self.last_stamp = stamp.clone();
        }

        let job = self
            .job
            .as_ref()
            .map(|j| sanitize(&j.assignment_id))
            .unwrap_or_default();
        format!("{stamp}_{:02}_{job}_{}.png", self.sequence, sanitize(action))
    }

    pub fn evidence_paths(&self) -> Vec<String> {
        self.job
            .as_ref()
            .map(|j| j.files.iter().map(|f| f.path.clone()).collect())
            .unwrap_or_default()
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

/// Strip filesystem-hostile characters and bound the length.
fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .take(50)
        .collect()
}

#[cfg(test)]
#[path = "evidence_tests.rs"]
mod tests;
