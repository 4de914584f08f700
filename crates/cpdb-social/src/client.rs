//! HTTP client for the social-data REST API.
//!
//! Wraps `reqwest` with RapidAPI-style authentication headers and typed
//! response decoding. Every request is one chargeable call against the
//! provider's monthly quota, including failed ones. The client never retries.

use std::time::Duration;

use cpdb_core::{FetchedPost, ProfileSnapshot};
use reqwest::{Client, StatusCode, Url};

use crate::error::SocialError;
use crate::types::{RemoteProfile, TimelineResponse};

const DEFAULT_BASE_URL: &str = "https://twitter-api45.p.rapidapi.com/";
const PROFILE_ENDPOINT: &str = "screenname.php";
const TIMELINE_ENDPOINT: &str = "timeline.php";

/// Client for the social-data API.
///
/// Use [`SocialClient::new`] for production or [`SocialClient::with_base_url`]
/// to point at a mock server in tests.
#[derive(Debug, Clone)]
pub struct SocialClient {
    client: Client,
    api_key: String,
    api_host: String,
    base_url: Url,
}

impl SocialClient {
    /// Creates a client pointed at the production API.
    ///
    /// # Errors
    ///
    /// Returns [`SocialError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(api_key: &str, api_host: &str, timeout_secs: u64) -> Result<Self, SocialError> {
        Self::with_base_url(api_key, api_host, timeout_secs, DEFAULT_BASE_URL)
    }

    /// Creates a client with a custom base URL.
    ///
    /// # Errors
    ///
    /// Returns [`SocialError::Http`] if the `reqwest::Client` cannot be built,
    /// or [`SocialError::InvalidBaseUrl`] if `base_url` does not parse.
    pub fn with_base_url(
        api_key: &str,
        api_host: &str,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, SocialError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("cpdb/0.1 (social-collector)")
            .build()?;

        // Exactly one trailing slash so `join` appends the endpoint instead of
        // replacing the last path segment.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| SocialError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            api_key: api_key.to_owned(),
            api_host: api_host.to_owned(),
            base_url,
        })
    }

    /// Fetches the current profile for `handle`.
    ///
    /// Returns `Ok(None)` when the handle does not resolve: HTTP 404 or an
    /// error envelope in a 2xx body.
    ///
    /// # Errors
    ///
    /// - [`SocialError::RateLimited`] on HTTP 429.
    /// - [`SocialError::UnexpectedStatus`] on any other non-2xx status.
    /// - [`SocialError::Http`] on network failure.
    /// - [`SocialError::Deserialize`] if the body is not the expected shape.
    pub async fn fetch_profile(&self, handle: &str) -> Result<Option<ProfileSnapshot>, SocialError> {
        let url = self.build_url(PROFILE_ENDPOINT, &[("screenname", handle)]);
        let Some(body) = self.request_text(&url, PROFILE_ENDPOINT).await? else {
            return Ok(None);
        };

        let remote: RemoteProfile =
            serde_json::from_str(&body).map_err(|e| SocialError::Deserialize {
                context: format!("{PROFILE_ENDPOINT}(screenname={handle})"),
                source: e,
            })?;

        if !remote.is_resolved() {
            tracing::debug!(handle, error = ?remote.error, "profile did not resolve");
            return Ok(None);
        }

        Ok(Some(ProfileSnapshot::from(remote)))
    }

    /// Fetches up to `limit` recent posts for `handle`, in API order.
    ///
    /// An unknown handle yields an empty list.
    ///
    /// # Errors
    ///
    /// Same as [`SocialClient::fetch_profile`].
    pub async fn fetch_recent_posts(
        &self,
        handle: &str,
        limit: usize,
    ) -> Result<Vec<FetchedPost>, SocialError> {
        let url = self.build_url(TIMELINE_ENDPOINT, &[("screenname", handle)]);
        let Some(body) = self.request_text(&url, TIMELINE_ENDPOINT).await? else {
            return Ok(Vec::new());
        };

        let response: TimelineResponse =
            serde_json::from_str(&body).map_err(|e| SocialError::Deserialize {
                context: format!("{TIMELINE_ENDPOINT}(screenname={handle})"),
                source: e,
            })?;

        Ok(response
            .timeline
            .into_iter()
            .take(limit)
            .map(FetchedPost::from)
            .collect())
    }

    fn build_url(&self, endpoint: &str, params: &[(&str, &str)]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(endpoint);
        }
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }
        url
    }

    /// Sends a GET and returns the body, `None` for 404.
    async fn request_text(
        &self,
        url: &Url,
        endpoint: &'static str,
    ) -> Result<Option<String>, SocialError> {
        let response = self
            .client
            .get(url.clone())
            .header("x-rapidapi-key", &self.api_key)
            .header("x-rapidapi-host", &self.api_host)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Err(SocialError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            return Err(SocialError::UnexpectedStatus {
                status: status.as_u16(),
                endpoint,
            });
        }

        Ok(Some(response.text().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client(base_url: &str) -> SocialClient {
        SocialClient::with_base_url("test-key", "test-host", 30, base_url)
            .expect("client construction should not fail")
    }

    #[test]
    fn build_url_appends_endpoint_and_query() {
        let client = test_client("https://api.example.com");
        let url = client.build_url(PROFILE_ENDPOINT, &[("screenname", "solana")]);
        assert_eq!(
            url.as_str(),
            "https://api.example.com/screenname.php?screenname=solana"
        );
    }

    #[test]
    fn build_url_keeps_base_path() {
        let client = test_client("https://proxy.example.com/social/");
        let url = client.build_url(TIMELINE_ENDPOINT, &[("screenname", "aave")]);
        assert_eq!(
            url.as_str(),
            "https://proxy.example.com/social/timeline.php?screenname=aave"
        );
    }

    #[test]
    fn new_targets_production_host() {
        let client = SocialClient::new("k", "twitter-api45.p.rapidapi.com", 30).expect("client");
        let url = client.build_url(PROFILE_ENDPOINT, &[("screenname", "aave")]);
        assert_eq!(url.host_str(), Some("twitter-api45.p.rapidapi.com"));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = SocialClient::with_base_url("k", "h", 30, "not a url").expect_err("invalid");
        assert!(matches!(err, SocialError::InvalidBaseUrl { .. }));
    }
}
