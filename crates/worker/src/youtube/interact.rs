// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Probabilistic interactions: like, subscribe, playlist save, comment.
//!
//! Each interaction is an independent Bernoulli draw. "Already done" states
//! (a liked like-button, a Subscribed subscribe-button) are detected and
//! counted without re-tapping — tapping again would undo them. A failed
//! interaction never fails the job.

use std::time::Duration;

use rand::prelude::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::actions::Actions;
use crate::selector::Selectors;

use super::chains;

#[derive(Debug, Clone, Default)]
pub struct InteractionProbs {
    pub like: u8,
    pub comment: u8,
    pub subscribe: u8,
    pub playlist: u8,
    pub comment_text: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionOutcome {
    pub did_like: bool,
    pub did_subscribe: bool,
    pub did_playlist: bool,
    pub did_comment: bool,
}

pub struct Interactions<'a> {
    pub selectors: &'a Selectors,
    pub actions: &'a Actions,
}

fn drawn(probability: u8) -> bool {
    probability > 0 && rand::rng().random_range(1..=100) <= probability as u32
}

impl Interactions<'_> {
    /// Run the drawn interactions in fixed order:
    /// like, subscribe, playlist, comment.
    pub async fn perform(&self, probs: &InteractionProbs) -> InteractionOutcome {
        info!(
            like = probs.like,
            subscribe = probs.subscribe,
            playlist = probs.playlist,
            comment = probs.comment,
            "performing interactions"
        );
        let mut outcome = InteractionOutcome::default();

        if drawn(probs.like) {
            outcome.did_like = self.try_like().await;
        }
        if drawn(probs.subscribe) {
            outcome.did_subscribe = self.try_subscribe().await;
        }
        if drawn(probs.playlist) {
            outcome.did_playlist = self.try_playlist().await;
        }
        if drawn(probs.comment) {
            let text = probs.comment_text.clone().unwrap_or_else(|| {
                chains::COMMENT_TEMPLATES
                    .choose(&mut rand::rng())
                    .copied()
                    .unwrap_or("Great video!")
                    .to_owned()
            });
            outcome.did_comment = self.try_comment(&text).await;
        }

        info!(?outcome, "interactions finished");
        outcome
    }

    async fn try_like(&self) -> bool {
        let found =
            self.selectors.find_with_fallback(chains::LIKE_BUTTON, chains::TIMEOUT_DEFAULT).await;
        let button = match found {
            Ok(Some(button)) => button,
            Ok(None) => {
                warn!("like button not found");
                return false;
            }
            Err(e) => {
                warn!(err = %e, "like lookup failed");
                return false;
            }
        };

        let desc = self.attribute(&button, "content-desc").await.unwrap_or_default();
        if desc.to_lowercase().contains("liked") || desc.contains("좋아요를 취소") {
            info!("already liked, not re-tapping");
            return true;
        }

        match self.actions.tap(&button).await {
            Ok(()) => {
                info!("like button tapped");
                tokio::time::sleep(Duration::from_secs(1)).await;
                true
            }
            Err(e) => {
                warn!(err = %e, "like tap failed");
                false
            }
        }
    }

    async fn try_subscribe(&self) -> bool {
        let found = self
            .selectors
            .find_with_fallback(chains::SUBSCRIBE_BUTTON, chains::TIMEOUT_DEFAULT)
            .await;
        let button = match found {
            Ok(Some(button)) => button,
            Ok(None) => {
                warn!("subscribe button not found");
                return false;
            }
            Err(e) => {
                warn!(err = %e, "subscribe lookup failed");
                return false;
            }
        };

        let text = self.attribute(&button, "text").await.unwrap_or_default();
        if text.to_lowercase().contains("subscribed") || text.contains("구독중") {
            info!("already subscribed, not re-tapping");
            return true;
        }

        match self.actions.tap(&button).await {
            Ok(()) => {
                info!("subscribe button tapped");
                tokio::time::sleep(Duration::from_secs(1)).await;
                true
            }
            Err(e) => {
                warn!(err = %e, "subscribe tap failed");
                false
            }
        }
    }

    async fn try_playlist(&self) -> bool {
        let found = self
            .selectors
            .find_with_fallback(chains::PLAYLIST_SAVE, chains::TIMEOUT_DEFAULT)
            .await;
        let button = match found {
            Ok(Some(button)) => button,
            Ok(None) => {
                warn!("playlist save button not found");
                return false;
            }
            Err(e) => {
                warn!(err = %e, "playlist lookup failed");
                return false;
            }
        };

        match self.actions.tap(&button).await {
            Ok(()) => {
                info!("saved to playlist");
                tokio::time::sleep(Duration::from_secs(1)).await;
                // Dismiss the playlist sheet if one opened.
                let _ = self.actions.press_back().await;
                true
            }
            Err(e) => {
                warn!(err = %e, "playlist tap failed");
                false
            }
        }
    }

    /// Comment flow: scroll down, open comments, type, send. On any failure
    /// press back so the player is restored.
    async fn try_comment(&self, text: &str) -> bool {
        let result = self.comment_inner(text).await;
        match result {
            Ok(done) => done,
            Err(e) => {
                warn!(err = %e, "comment failed");
                let _ = self.actions.press_back().await;
                false
            }
        }
    }

    async fn comment_inner(&self, text: &str) -> Result<bool, crate::driver::DriverError> {
        self.actions.scroll_down().await?;
        tokio::time::sleep(Duration::from_secs(1)).await;

        let Some(button) = self
            .selectors
            .find_with_fallback(chains::COMMENT_BUTTON, chains::TIMEOUT_DEFAULT)
            .await?
        else {
            warn!("comment button not found");
            return Ok(false);
        };
        self.actions.tap(&button).await?;
        tokio::time::sleep(Duration::from_secs(2)).await;

        let Some(input) = self
            .selectors
            .find_with_fallback(chains::COMMENT_INPUT, chains::TIMEOUT_DEFAULT)
            .await?
        else {
            warn!("comment input not found");
            self.actions.press_back().await?;
            return Ok(false);
        };
        self.actions.type_text(&input, text, true).await?;
        tokio::time::sleep(Duration::from_millis(500)).await;

        let Some(send) = self
            .selectors
            .find_with_fallback(chains::COMMENT_POST, chains::TIMEOUT_SHORT)
            .await?
        else {
            warn!("comment send button not found");
            self.actions.press_back().await?;
            return Ok(false);
        };
        self.actions.tap(&send).await?;
        let preview: String = text.chars().take(30).collect();
        info!(preview, "comment posted");
        tokio::time::sleep(Duration::from_secs(2)).await;
        Ok(true)
    }

    async fn attribute(&self, element: &crate::driver::Element, name: &str) -> Option<String> {
        self.selectors.driver().attribute(element, name).await.ok().flatten()
    }
}
