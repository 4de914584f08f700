//! Wire types for the social-data API and their conversion into domain types.
//!
//! The API is loose about types: counts arrive as numbers, numeric strings,
//! or `null` depending on the endpoint, so every count goes through
//! [`lenient_count`].

use chrono::{DateTime, Utc};
use cpdb_core::{FetchedPost, ProfileSnapshot};
use serde::{Deserialize, Deserializer};

/// Timestamp format used by the API, e.g. `Sat Mar 13 18:31:55 +0000 2021`.
const REMOTE_TIME_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Response of the profile endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteProfile {
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub rest_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub sub_count: i64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub friends: i64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub statuses_count: i64,
    #[serde(default)]
    pub blue_verified: Option<bool>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub header_image: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl RemoteProfile {
    /// `true` when the payload describes a real account rather than an
    /// error/suspended/unknown-user envelope.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.error.is_none() && (self.rest_id.is_some() || self.profile.is_some())
    }
}

impl From<RemoteProfile> for ProfileSnapshot {
    fn from(remote: RemoteProfile) -> Self {
        Self {
            display_name: non_empty(remote.name),
            bio: non_empty(remote.desc),
            location: non_empty(remote.location),
            website: non_empty(remote.website),
            followers_count: remote.sub_count.max(0),
            following_count: remote.friends.max(0),
            post_count: remote.statuses_count.max(0),
            verified: remote.blue_verified.unwrap_or(false),
            profile_image_url: non_empty(remote.avatar),
            banner_url: non_empty(remote.header_image),
            account_created_at: remote.created_at.as_deref().and_then(parse_remote_time),
        }
    }
}

/// Response of the timeline endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimelineResponse {
    #[serde(default)]
    pub timeline: Vec<RemotePost>,
}

/// One post in a timeline response.
#[derive(Debug, Clone, Deserialize)]
pub struct RemotePost {
    pub tweet_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "lenient_count")]
    pub retweets: i64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub favorites: i64,
    #[serde(default)]
    pub retweeted_tweet: Option<serde_json::Value>,
    #[serde(default)]
    pub in_reply_to_status_id_str: Option<String>,
}

impl From<RemotePost> for FetchedPost {
    fn from(remote: RemotePost) -> Self {
        let is_repost = remote
            .retweeted_tweet
            .as_ref()
            .is_some_and(|v| !v.is_null())
            || remote.text.starts_with("RT @");
        let is_reply = remote
            .in_reply_to_status_id_str
            .as_deref()
            .is_some_and(|s| !s.is_empty());

        Self {
            remote_post_id: remote.tweet_id,
            body: remote.text,
            posted_at: remote.created_at.as_deref().and_then(parse_remote_time),
            repost_count: remote.retweets.max(0),
            favorite_count: remote.favorites.max(0),
            is_repost,
            is_reply,
        }
    }
}

/// Parse an API timestamp, falling back to RFC 3339.
#[must_use]
pub fn parse_remote_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, REMOTE_TIME_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

#[allow(clippy::cast_possible_truncation)]
fn lenient_count<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(serde_json::Value::String(s)) => s.trim().replace(',', "").parse().unwrap_or(0),
        _ => 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn parses_remote_timestamp() {
        let ts = parse_remote_time("Sat Mar 13 18:31:55 +0000 2021").expect("parse");
        assert_eq!(ts.year(), 2021);
        assert_eq!(ts.month(), 3);
        assert_eq!(ts.day(), 13);
        assert_eq!(ts.hour(), 18);
    }

    #[test]
    fn parses_rfc3339_fallback() {
        assert!(parse_remote_time("2024-01-01T00:00:00Z").is_some());
        assert!(parse_remote_time("yesterday").is_none());
    }

    #[test]
    fn counts_accept_strings_numbers_and_null() {
        let json = r#"{"tweet_id":"1","text":"hi","retweets":"1,204","favorites":null}"#;
        let post: RemotePost = serde_json::from_str(json).expect("deserialize");
        assert_eq!(post.retweets, 1204);
        assert_eq!(post.favorites, 0);
    }

    #[test]
    fn profile_converts_and_drops_blank_fields() {
        let json = r#"{
            "profile": "solana",
            "rest_id": "951329744804392960",
            "name": "Solana",
            "desc": "",
            "location": "  ",
            "website": "https://solana.com",
            "sub_count": 3200000,
            "friends": 150,
            "statuses_count": "21000",
            "blue_verified": true,
            "avatar": "https://pbs.twimg.com/a.jpg",
            "header_image": "https://pbs.twimg.com/b.jpg",
            "created_at": "Wed Jan 10 05:00:00 +0000 2018"
        }"#;
        let remote: RemoteProfile = serde_json::from_str(json).expect("deserialize");
        assert!(remote.is_resolved());
        let snapshot = ProfileSnapshot::from(remote);
        assert_eq!(snapshot.display_name.as_deref(), Some("Solana"));
        assert!(snapshot.bio.is_none());
        assert!(snapshot.location.is_none());
        assert_eq!(snapshot.followers_count, 3_200_000);
        assert_eq!(snapshot.post_count, 21_000);
        assert!(snapshot.verified);
        assert!(snapshot.account_created_at.is_some());
    }

    #[test]
    fn error_envelope_is_not_resolved() {
        let remote: RemoteProfile =
            serde_json::from_str(r#"{"error":"User not found"}"#).expect("deserialize");
        assert!(!remote.is_resolved());
    }

    #[test]
    fn post_flags_detect_reposts_and_replies() {
        let json = r#"{
            "tweet_id": "9",
            "text": "RT @someone: big news",
            "in_reply_to_status_id_str": "8"
        }"#;
        let post = FetchedPost::from(serde_json::from_str::<RemotePost>(json).expect("json"));
        assert!(post.is_repost);
        assert!(post.is_reply);
    }
}
