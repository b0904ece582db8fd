// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inline ad skipper, polled by the watch loop. No background thread: the
//! watch loop calls `try_skip` on its own cadence, so skipper state needs no
//! synchronization.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::actions::Actions;
use crate::selector::Selectors;

use super::chains;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdStats {
    pub ads_detected: u32,
    pub ads_skipped: u32,
}

#[derive(Default)]
pub struct AdSkipper {
    detected: u32,
    skipped: u32,
}

impl AdSkipper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check for an ad and try the skip button. Returns `true` when an ad
    /// was skipped. Failures here are never critical.
    pub async fn try_skip(&mut self, selectors: &Selectors, actions: &Actions) -> bool {
        let playing =
            match selectors.exists(chains::AD_INDICATOR, chains::TIMEOUT_AD_CHECK).await {
                Ok(playing) => playing,
                Err(e) => {
                    debug!(err = %e, "ad check failed (non-critical)");
                    return false;
                }
            };
        if !playing {
            return false;
        }

        self.detected += 1;
        info!(detected = self.detected, "ad detected, attempting skip");

        let button =
            match selectors.find_with_fallback(chains::AD_SKIP_BUTTON, chains::TIMEOUT_AD_CHECK).await
            {
                Ok(Some(button)) => button,
                Ok(None) => {
                    debug!("skip button not available yet");
                    return false;
                }
                Err(e) => {
                    debug!(err = %e, "skip button lookup failed");
                    return false;
                }
            };

        match actions.tap(&button).await {
            Ok(()) => {
                self.skipped += 1;
                info!(skipped = self.skipped, "ad skipped");
                true
            }
            Err(e) => {
                warn!(err = %e, "failed to tap skip button");
                false
            }
        }
    }

    pub fn stats(&self) -> AdStats {
        AdStats { ads_detected: self.detected, ads_skipped: self.skipped }
    }
}
