// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Selector chains and timeouts for the YouTube UI.
//!
//! The app ships Korean and English UIs across the fleet and moves ids
//! between releases; every lookup carries fallbacks for both. UI breakage
//! lands here, not in the flows.

use std::time::Duration;

use crate::selector::Strategy;

pub const YOUTUBE_PACKAGE: &str = "com.google.android.youtube";
pub const YOUTUBE_ACTIVITY: &str = "com.google.android.youtube.HomeActivity";

pub const TIMEOUT_DEFAULT: Duration = Duration::from_secs(10);
pub const TIMEOUT_SHORT: Duration = Duration::from_secs(3);
pub const TIMEOUT_SEARCH: Duration = Duration::from_secs(10);
pub const TIMEOUT_VIDEO_LOAD: Duration = Duration::from_secs(15);
pub const TIMEOUT_AD_CHECK: Duration = Duration::from_secs(2);

pub const SEARCH_BUTTON: &[(Strategy, &str)] = &[
    (Strategy::AccessibilityId, "Search"),
    (Strategy::AccessibilityId, "검색"),
    (Strategy::Id, "menu_item_1"),
    (Strategy::Xpath, "//android.widget.ImageView[@content-desc=\"Search\"]"),
];

pub const SEARCH_INPUT: &[(Strategy, &str)] = &[
    (Strategy::Id, "search_edit_text"),
    (Strategy::ClassName, "android.widget.EditText"),
];

pub const SEARCH_RESULT_VIDEO: &[(Strategy, &str)] = &[
    (Strategy::Id, "video_with_context"),
    (Strategy::Id, "thumbnail"),
    (Strategy::Xpath, "(//android.view.ViewGroup[@clickable=\"true\"]//android.widget.ImageView)[1]"),
];

pub const HOME_TAB: &[(Strategy, &str)] = &[
    (Strategy::AccessibilityId, "Home"),
    (Strategy::AccessibilityId, "홈"),
    (Strategy::Id, "pivot_bar_item_tab_home"),
];

pub const FEED_VIDEO: &[(Strategy, &str)] = &[
    (Strategy::Id, "media_item_thumbnail"),
    (Strategy::Id, "thumbnail"),
    (Strategy::Xpath, "//android.view.ViewGroup[@clickable=\"true\"]//android.widget.ImageView"),
];

pub const PLAYER_VIEW: &[(Strategy, &str)] = &[
    (Strategy::Id, "watch_player"),
    (Strategy::Id, "player_view"),
    (Strategy::ClassName, "android.view.SurfaceView"),
];

pub const LIKE_BUTTON: &[(Strategy, &str)] = &[
    (Strategy::Id, "like_button"),
    (Strategy::DescContains, "like this video"),
    (Strategy::DescContains, "좋아요"),
];

pub const SUBSCRIBE_BUTTON: &[(Strategy, &str)] = &[
    (Strategy::Id, "subscribe_button"),
    (Strategy::Text, "Subscribe"),
    (Strategy::Text, "구독"),
];

pub const COMMENT_BUTTON: &[(Strategy, &str)] = &[
    (Strategy::Id, "comments_entry_point_header"),
    (Strategy::DescContains, "Comments"),
    (Strategy::DescContains, "댓글"),
];

pub const COMMENT_INPUT: &[(Strategy, &str)] = &[
    (Strategy::Id, "comment_edit_text"),
    (Strategy::ClassName, "android.widget.EditText"),
];

pub const COMMENT_POST: &[(Strategy, &str)] = &[
    (Strategy::Id, "comment_send_button"),
    (Strategy::AccessibilityId, "Comment"),
    (Strategy::DescContains, "전송"),
];

pub const PLAYLIST_SAVE: &[(Strategy, &str)] = &[
    (Strategy::Id, "save_to_playlist_button"),
    (Strategy::DescContains, "Save to playlist"),
    (Strategy::DescContains, "재생목록에 저장"),
];

pub const AD_INDICATOR: &[(Strategy, &str)] = &[
    (Strategy::Id, "ad_progress_text"),
    (Strategy::Id, "player_learn_more_button"),
    (Strategy::TextContains, "Sponsored"),
    (Strategy::TextContains, "광고"),
];

pub const AD_SKIP_BUTTON: &[(Strategy, &str)] = &[
    (Strategy::Id, "skip_ad_button"),
    (Strategy::AccessibilityId, "Skip ad"),
    (Strategy::TextContains, "Skip"),
    (Strategy::TextContains, "건너뛰기"),
];

pub const COMMENT_TEMPLATES: &[&str] = &[
    "Great video!",
    "Nice content 👍",
    "Thanks for sharing",
    "Loved this one",
    "좋은 영상이네요",
    "잘 봤습니다",
];
