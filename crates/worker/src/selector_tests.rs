// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use crate::driver::fake::{Availability, FakeDriver};
use crate::driver::Using;

use super::{Selectors, Strategy};

const PKG: &str = "com.google.android.youtube";

fn selectors(driver: &std::sync::Arc<FakeDriver>) -> Selectors {
    Selectors::new(driver.clone(), PKG)
}

#[test]
fn bare_id_gets_package_prefix() {
    let driver = FakeDriver::new();
    let s = selectors(&driver);
    let (using, value) = s.resolve(Strategy::Id, "like_button");
    assert_eq!(using, Using::Id);
    assert_eq!(value, "com.google.android.youtube:id/like_button");
}

#[test]
fn qualified_id_untouched() {
    let driver = FakeDriver::new();
    let s = selectors(&driver);
    let (_, value) = s.resolve(Strategy::Id, "android:id/content");
    assert_eq!(value, "android:id/content");
}

#[test]
fn text_strategies_become_xpath() {
    let driver = FakeDriver::new();
    let s = selectors(&driver);
    let (using, value) = s.resolve(Strategy::Text, "Subscribe");
    assert_eq!(using, Using::Xpath);
    assert_eq!(value, "//*[@text=\"Subscribe\"]");

    let (_, contains) = s.resolve(Strategy::TextContains, "Skip");
    assert_eq!(contains, "//*[contains(@text, \"Skip\")]");

    let (_, desc) = s.resolve(Strategy::DescContains, "like");
    assert_eq!(desc, "//*[contains(@content-desc, \"like\")]");
}

#[tokio::test(start_paused = true)]
async fn fallback_tries_strategies_in_order() {
    let driver = FakeDriver::new();
    // Only the second strategy resolves.
    driver.set_element(Using::AccessibilityId, "Search", Availability::Always);
    let s = selectors(&driver);

    let found = s
        .find_with_fallback(
            &[(Strategy::Id, "missing_id"), (Strategy::AccessibilityId, "Search")],
            Duration::from_secs(10),
        )
        .await
        .unwrap();
    assert!(found.is_some());
}

#[tokio::test(start_paused = true)]
async fn first_strategy_gets_full_budget_later_ones_are_capped() {
    let driver = FakeDriver::new();
    let s = selectors(&driver);

    let start = tokio::time::Instant::now();
    let found = s
        .find_with_fallback(
            &[
                (Strategy::Id, "a"),
                (Strategy::AccessibilityId, "b"),
                (Strategy::ClassName, "c"),
            ],
            Duration::from_secs(10),
        )
        .await
        .unwrap();
    assert!(found.is_none());

    // ~10s for the first strategy, ~3s each for the rest.
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(14), "elapsed {elapsed:?}");
    assert!(elapsed <= Duration::from_secs(17), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn short_fallback_budget_is_not_raised() {
    let driver = FakeDriver::new();
    let s = selectors(&driver);

    let start = tokio::time::Instant::now();
    let found = s
        .find_with_fallback(
            &[(Strategy::Id, "a"), (Strategy::AccessibilityId, "b")],
            Duration::from_secs(2),
        )
        .await
        .unwrap();
    assert!(found.is_none());

    // min(timeout, 3s) keeps the second strategy at 2s.
    let elapsed = start.elapsed();
    assert!(elapsed <= Duration::from_secs(5), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn element_that_appears_later_is_found() {
    let driver = FakeDriver::new();
    driver.set_element(
        Using::Id,
        "com.google.android.youtube:id/like_button",
        Availability::From(Duration::from_secs(4)),
    );
    let s = selectors(&driver);

    let found =
        s.find(Strategy::Id, "like_button", Duration::from_secs(10)).await.unwrap();
    assert!(found.is_some());
}

#[tokio::test(start_paused = true)]
async fn exists_is_a_value_not_an_error() {
    let driver = FakeDriver::new();
    let s = selectors(&driver);
    let exists = s
        .exists(&[(Strategy::Id, "nothing")], Duration::from_secs(1))
        .await
        .unwrap();
    assert!(!exists);
}

#[tokio::test(start_paused = true)]
async fn wait_until_gone_waits_out_the_element() {
    let driver = FakeDriver::new();
    driver.set_element(
        Using::Xpath,
        "//*[contains(@text, \"Sponsored\")]",
        Availability::Until(Duration::from_secs(2)),
    );
    let s = selectors(&driver);

    let gone = s
        .wait_until_gone(Strategy::TextContains, "Sponsored", Duration::from_secs(10))
        .await
        .unwrap();
    assert!(gone);
}

#[tokio::test(start_paused = true)]
async fn wait_until_gone_times_out_on_persistent_element() {
    let driver = FakeDriver::new();
    driver.set_element(
        Using::Xpath,
        "//*[contains(@text, \"Sponsored\")]",
        Availability::Always,
    );
    let s = selectors(&driver);

    let gone = s
        .wait_until_gone(Strategy::TextContains, "Sponsored", Duration::from_secs(3))
        .await
        .unwrap();
    assert!(!gone);
}
