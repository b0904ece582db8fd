// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Random surf: scroll the home feed a random distance and open a video.

use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use crate::actions::Actions;
use crate::driver::{DriverError, Element};
use crate::selector::Selectors;

use super::chains;
use super::search::NavOutcome;

pub struct RandomSurf<'a> {
    pub selectors: &'a Selectors,
    pub actions: &'a Actions,
}

impl RandomSurf<'_> {
    /// Move to the home tab. Already being anywhere inside the player app
    /// counts when the tab itself cannot be located.
    pub async fn navigate_to_home(&self) -> Result<bool, DriverError> {
        if let Some(tab) =
            self.selectors.find_with_fallback(chains::HOME_TAB, chains::TIMEOUT_DEFAULT).await?
        {
            self.actions.tap(&tab).await?;
            tokio::time::sleep(Duration::from_secs(2)).await;
            info!("navigated to home tab");
            return Ok(true);
        }

        if self.actions.current_package().await? == chains::YOUTUBE_PACKAGE {
            info!("already on youtube home");
            return Ok(true);
        }
        Ok(false)
    }

    /// Scroll a random 0..=max_scroll times with jitter, then tap the first
    /// feed video. One extra scroll-and-retry before giving up.
    pub async fn select_random_video(&self, max_scroll: u32) -> Result<NavOutcome, DriverError> {
        let scrolls = rand::rng().random_range(0..=max_scroll);
        info!(scrolls, "random surf scrolling");

        for _ in 0..scrolls {
            self.actions.scroll_down().await?;
            let jitter_ms = rand::rng().random_range(800..=1500);
            tokio::time::sleep(Duration::from_millis(jitter_ms)).await;
        }

        if let Some(video) = self.find_feed_video().await? {
            self.actions.tap(&video).await?;
            info!(scrolls, "random video selected");
            return Ok(NavOutcome::Found);
        }

        self.actions.scroll_down().await?;
        tokio::time::sleep(Duration::from_secs(1)).await;
        if let Some(video) = self.find_feed_video().await? {
            self.actions.tap(&video).await?;
            return Ok(NavOutcome::Found);
        }

        warn!("no video found in feed");
        Ok(NavOutcome::NotFound)
    }

    async fn find_feed_video(&self) -> Result<Option<Element>, DriverError> {
        self.selectors.find_with_fallback(chains::FEED_VIDEO, chains::TIMEOUT_SHORT).await
    }
}
