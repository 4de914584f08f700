use async_trait::async_trait;
use cpdb_core::{AppConfig, FetchedPost, ProfileSnapshot};
use cpdb_social::{SocialClient, SocialError};

use crate::error::CollectorError;
use crate::source::AccountSource;

/// [`AccountSource`] backed by the social-data REST API.
#[derive(Debug, Clone)]
pub struct SocialAccountSource {
    client: SocialClient,
}

impl SocialAccountSource {
    #[must_use]
    pub fn new(client: SocialClient) -> Self {
        Self { client }
    }

    /// Builds the client from `SOCIAL_API_*` settings.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Config`] if no API key is configured or the
    /// client cannot be constructed.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, CollectorError> {
        let api_key = config.social_api_key.as_deref().ok_or_else(|| {
            CollectorError::Config("SOCIAL_API_KEY is not set".to_string())
        })?;
        let client = SocialClient::with_base_url(
            api_key,
            &config.social_api_host,
            config.social_request_timeout_secs,
            &config.social_api_base_url,
        )
        .map_err(|e| CollectorError::Config(e.to_string()))?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl AccountSource for SocialAccountSource {
    async fn fetch_profile(&self, handle: &str) -> Result<Option<ProfileSnapshot>, SocialError> {
        self.client.fetch_profile(handle).await
    }

    async fn fetch_recent_posts(
        &self,
        handle: &str,
        limit: usize,
    ) -> Result<Vec<FetchedPost>, SocialError> {
        self.client.fetch_recent_posts(handle, limit).await
    }
}
