//! Tracked social accounts and the posts collected for them.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreError;

/// Upper bound of the derived activity score.
pub const MAX_ACTIVITY_SCORE: u8 = 100;

static HANDLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9_]{1,15}$").unwrap_or_else(|e| panic!("handle regex: {e}"))
});

const PROFILE_URL_PREFIXES: &[&str] = &[
    "https://x.com/",
    "https://twitter.com/",
    "https://www.x.com/",
    "https://www.twitter.com/",
    "http://x.com/",
    "http://twitter.com/",
    "x.com/",
    "twitter.com/",
];

/// Profile attributes as last reported by the remote source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub followers_count: i64,
    pub following_count: i64,
    pub post_count: i64,
    pub verified: bool,
    pub profile_image_url: Option<String>,
    pub banner_url: Option<String>,
    pub account_created_at: Option<DateTime<Utc>>,
}

/// One externally-followed social handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedAccount {
    pub id: i64,
    pub public_id: Uuid,
    /// Normalized (lowercase, no `@`) handle. Unique across all accounts.
    pub handle: String,
    pub project_id: Option<Uuid>,
    pub profile: ProfileSnapshot,
    pub activity_score: u8,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A post as returned by the remote source, before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedPost {
    pub remote_post_id: String,
    pub body: String,
    pub posted_at: Option<DateTime<Utc>>,
    pub repost_count: i64,
    pub favorite_count: i64,
    pub is_repost: bool,
    pub is_reply: bool,
}

impl FetchedPost {
    /// Reposts plus favorites, never negative.
    #[must_use]
    pub fn engagement(&self) -> i64 {
        self.repost_count.max(0).saturating_add(self.favorite_count.max(0))
    }
}

/// A persisted post belonging to a tracked account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: i64,
    pub account_id: i64,
    pub remote_post_id: String,
    pub body: String,
    pub posted_at: Option<DateTime<Utc>>,
    pub repost_count: i64,
    pub favorite_count: i64,
    pub is_repost: bool,
    pub is_reply: bool,
    pub collected_at: DateTime<Utc>,
}

/// Normalize operator input into the canonical handle form.
///
/// Accepts `@Handle`, `Handle`, or a profile URL on x.com / twitter.com and
/// returns the lowercase handle without the `@`.
///
/// # Errors
///
/// Returns [`CoreError::InvalidHandle`] when the remainder is not 1-15
/// characters of `[A-Za-z0-9_]`.
pub fn normalize_handle(raw: &str) -> Result<String, CoreError> {
    let mut handle = raw.trim();

    for prefix in PROFILE_URL_PREFIXES {
        if let Some(rest) = handle.strip_prefix(prefix) {
            handle = rest;
            break;
        }
    }

    let handle = handle
        .trim_start_matches('@')
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .to_lowercase();

    if HANDLE_RE.is_match(&handle) {
        Ok(handle)
    } else {
        Err(CoreError::InvalidHandle(raw.trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_at_and_lowercases() {
        assert_eq!(normalize_handle("@VitalikButerin").unwrap(), "vitalikbuterin");
    }

    #[test]
    fn normalize_accepts_bare_handle_with_whitespace() {
        assert_eq!(normalize_handle("  solana \n").unwrap(), "solana");
    }

    #[test]
    fn normalize_accepts_profile_urls() {
        assert_eq!(
            normalize_handle("https://x.com/Uniswap").unwrap(),
            "uniswap"
        );
        assert_eq!(
            normalize_handle("https://twitter.com/aave/status/123?s=20").unwrap(),
            "aave"
        );
    }

    #[test]
    fn normalize_rejects_empty() {
        assert_eq!(
            normalize_handle("@"),
            Err(CoreError::InvalidHandle("@".to_string()))
        );
    }

    #[test]
    fn normalize_rejects_too_long() {
        assert!(normalize_handle("this_handle_is_way_too_long").is_err());
    }

    #[test]
    fn normalize_rejects_invalid_characters() {
        assert!(normalize_handle("bad-handle").is_err());
        assert!(normalize_handle("bad.handle").is_err());
    }

    #[test]
    fn engagement_sums_reposts_and_favorites() {
        let post = FetchedPost {
            remote_post_id: "1".to_string(),
            body: "gm".to_string(),
            posted_at: None,
            repost_count: 7,
            favorite_count: 42,
            is_repost: false,
            is_reply: false,
        };
        assert_eq!(post.engagement(), 49);
    }

    #[test]
    fn engagement_ignores_negative_counts() {
        let post = FetchedPost {
            remote_post_id: "1".to_string(),
            body: String::new(),
            posted_at: None,
            repost_count: -3,
            favorite_count: 5,
            is_repost: false,
            is_reply: false,
        };
        assert_eq!(post.engagement(), 5);
    }

    #[test]
    fn profile_snapshot_serializes() {
        let profile = ProfileSnapshot {
            display_name: Some("Solana".to_string()),
            followers_count: 3_000_000,
            verified: true,
            ..ProfileSnapshot::default()
        };
        let json = serde_json::to_string(&profile).expect("serialize");
        assert!(json.contains("\"followers_count\":3000000"));
    }
}
