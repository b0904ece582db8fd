// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Multi-strategy element lookup with a fallback chain.
//!
//! Strategies are tried in list order. The first strategy gets the whole
//! timeout budget; later strategies are capped at 3 s so a long chain cannot
//! multiply the wait. Absence is a value — only session-level failures
//! escape as errors.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::driver::{DriverError, Element, UiDriver, Using};

/// Budget cap for every strategy after the first.
const FALLBACK_TIMEOUT: Duration = Duration::from_secs(3);

/// Default per-element locate budget.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// How a single lookup addresses an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Bare ids are prefixed with the default app package.
    Id,
    AccessibilityId,
    Text,
    TextContains,
    DescContains,
    ClassName,
    Xpath,
}

/// An ordered fallback chain.
pub type Chain<'a> = &'a [(Strategy, &'a str)];

pub struct Selectors {
    driver: Arc<dyn UiDriver>,
    default_package: String,
}

impl Selectors {
    pub fn new(driver: Arc<dyn UiDriver>, default_package: impl Into<String>) -> Self {
        Self { driver, default_package: default_package.into() }
    }

    /// The underlying driver, for attribute reads beside a lookup.
    pub fn driver(&self) -> &dyn UiDriver {
        self.driver.as_ref()
    }

    /// Translate a strategy into the driver's native locator.
    pub fn resolve(&self, strategy: Strategy, value: &str) -> (Using, String) {
        match strategy {
            Strategy::Id => {
                let full = if value.contains(':') {
                    value.to_owned()
                } else {
                    format!("{}:id/{value}", self.default_package)
                };
                (Using::Id, full)
            }
            Strategy::AccessibilityId => (Using::AccessibilityId, value.to_owned()),
            Strategy::Text => (Using::Xpath, format!("//*[@text=\"{value}\"]")),
            Strategy::TextContains => {
                (Using::Xpath, format!("//*[contains(@text, \"{value}\")]"))
            }
            Strategy::DescContains => {
                (Using::Xpath, format!("//*[contains(@content-desc, \"{value}\")]"))
            }
            Strategy::ClassName => (Using::ClassName, value.to_owned()),
            Strategy::Xpath => (Using::Xpath, value.to_owned()),
        }
    }

    /// Locate by a single strategy. `Ok(None)` when the element never showed.
    pub async fn find(
        &self,
        strategy: Strategy,
        value: &str,
        timeout: Duration,
    ) -> Result<Option<Element>, DriverError> {
        let (using, resolved) = self.resolve(strategy, value);
        self.driver.find(using, &resolved, timeout).await
    }

    /// Try each strategy in order; first hit wins.
    pub async fn find_with_fallback(
        &self,
        strategies: Chain<'_>,
        timeout: Duration,
    ) -> Result<Option<Element>, DriverError> {
        for (i, (strategy, value)) in strategies.iter().enumerate() {
            let budget = if i == 0 { timeout } else { timeout.min(FALLBACK_TIMEOUT) };
            if let Some(element) = self.find(*strategy, value, budget).await? {
                debug!(strategy = i, value, "element found via fallback chain");
                return Ok(Some(element));
            }
        }
        warn!(strategies = strategies.len(), "all strategies failed for element search");
        Ok(None)
    }

    /// Quick existence probe over a chain.
    pub async fn exists(
        &self,
        strategies: Chain<'_>,
        timeout: Duration,
    ) -> Result<bool, DriverError> {
        Ok(self.find_with_fallback(strategies, timeout).await?.is_some())
    }

    /// Wait until an element can no longer be located.
    pub async fn wait_until_gone(
        &self,
        strategy: Strategy,
        value: &str,
        timeout: Duration,
    ) -> Result<bool, DriverError> {
        let probe = Duration::from_millis(500);
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.find(strategy, value, probe).await?.is_none() {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(probe).await;
        }
    }
}

#[cfg(test)]
#[path = "selector_tests.rs"]
mod tests;
