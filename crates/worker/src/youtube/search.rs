// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Keyword search and direct-URL navigation.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::actions::Actions;
use crate::driver::{DriverError, Element};
use crate::selector::{Selectors, Strategy};

use super::chains;

pub const MAX_SCROLL_ATTEMPTS: u32 = 10;

/// Where navigation ended up. Absence of a video is an outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavOutcome {
    Found,
    NotFound,
    /// The deep link opened outside the player app.
    WrongApp { package: String },
}

pub struct SearchFlow<'a> {
    pub selectors: &'a Selectors,
    pub actions: &'a Actions,
}

impl SearchFlow<'_> {
    /// Tap search, enter the keyword, then scroll through results until a
    /// match (the target title when given, else the first result).
    pub async fn search_and_select(
        &self,
        keyword: &str,
        target_title: Option<&str>,
        max_scroll: u32,
    ) -> Result<NavOutcome, DriverError> {
        info!(keyword, target = target_title.unwrap_or(""), "starting search");

        let Some(button) =
            self.selectors.find_with_fallback(chains::SEARCH_BUTTON, chains::TIMEOUT_SEARCH).await?
        else {
            warn!("search button not found");
            return Ok(NavOutcome::NotFound);
        };
        self.actions.tap(&button).await?;
        tokio::time::sleep(Duration::from_secs(1)).await;

        if !self.enter_keyword(keyword).await? {
            warn!("search input not found");
            return Ok(NavOutcome::NotFound);
        }

        tokio::time::sleep(Duration::from_secs(2)).await;
        for scroll in 0..max_scroll {
            if let Some(video) = self.find_video_in_results(target_title).await? {
                self.actions.tap(&video).await?;
                info!(scroll, "video selected");
                return Ok(NavOutcome::Found);
            }
            debug!(attempt = scroll + 1, max_scroll, "scrolling for video");
            self.actions.scroll_down().await?;
            tokio::time::sleep(Duration::from_millis(1500)).await;
        }

        warn!(max_scroll, "video not found in search results");
        Ok(NavOutcome::NotFound)
    }

    async fn enter_keyword(&self, keyword: &str) -> Result<bool, DriverError> {
        let Some(input) =
            self.selectors.find_with_fallback(chains::SEARCH_INPUT, chains::TIMEOUT_DEFAULT).await?
        else {
            return Ok(false);
        };
        self.actions.type_text(&input, keyword, true).await?;
        tokio::time::sleep(Duration::from_millis(500)).await;
        self.actions.press_enter().await?;
        debug!(keyword, "keyword entered");
        Ok(true)
    }

    async fn find_video_in_results(
        &self,
        target_title: Option<&str>,
    ) -> Result<Option<Element>, DriverError> {
        if let Some(title) = target_title {
            if let Some(element) =
                self.selectors.find(Strategy::TextContains, title, chains::TIMEOUT_SHORT).await?
            {
                return Ok(Some(element));
            }
        }
        self.selectors.find_with_fallback(chains::SEARCH_RESULT_VIDEO, chains::TIMEOUT_SHORT).await
    }

    /// Open the video URL as a deep link and verify the player app took it.
    pub async fn navigate_by_url(&self, url: &str) -> Result<NavOutcome, DriverError> {
        info!(url, "navigating by url");
        self.actions.open_url(url).await?;
        tokio::time::sleep(Duration::from_secs(3)).await;

        let package = self.actions.current_package().await?;
        if package == chains::YOUTUBE_PACKAGE {
            info!("url navigation successful");
            Ok(NavOutcome::Found)
        } else {
            warn!(package, "url opened in wrong app");
            Ok(NavOutcome::WrongApp { package })
        }
    }
}
