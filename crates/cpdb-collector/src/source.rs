//! Remote data seam for the scheduler.

use async_trait::async_trait;
use cpdb_core::{FetchedPost, ProfileSnapshot};
use cpdb_social::SocialError;

/// Remote social-data source. Every method call is one chargeable API call.
#[async_trait]
pub trait AccountSource: Send + Sync {
    /// `Ok(None)` when the handle does not resolve to an account.
    async fn fetch_profile(&self, handle: &str) -> Result<Option<ProfileSnapshot>, SocialError>;

    async fn fetch_recent_posts(
        &self,
        handle: &str,
        limit: usize,
    ) -> Result<Vec<FetchedPost>, SocialError>;
}
