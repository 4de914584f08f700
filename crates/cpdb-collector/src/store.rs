//! Persistence seam for the scheduler.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cpdb_core::{FetchedPost, TrackedAccount};
use cpdb_db::DbError;
use uuid::Uuid;

use crate::guard::CycleLease;

/// Which remote endpoint a ledger entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiEndpoint {
    Profile,
    RecentPosts,
}

impl ApiEndpoint {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Profile => "profile",
            Self::RecentPosts => "recent_posts",
        }
    }
}

/// One real remote call, as written to the usage ledger.
#[derive(Debug, Clone, Copy)]
pub struct ApiCall {
    pub endpoint: ApiEndpoint,
    pub account_id: Option<i64>,
    pub succeeded: bool,
    pub called_at: DateTime<Utc>,
}

/// Storage for tracked accounts, their posts, and the call ledger.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn list_tracked_accounts(&self) -> Result<Vec<TrackedAccount>, DbError>;

    async fn count_tracked_accounts(&self) -> Result<u64, DbError>;

    /// Looks up an account by its normalized handle, ignoring case.
    async fn find_account_by_handle(&self, handle: &str)
        -> Result<Option<TrackedAccount>, DbError>;

    /// Inserts a new, never-refreshed account.
    ///
    /// Returns [`DbError::Conflict`] if the handle is already tracked.
    async fn insert_tracked_account(
        &self,
        handle: &str,
        project_id: Option<Uuid>,
    ) -> Result<TrackedAccount, DbError>;

    /// Writes the refreshed profile, activity score and refresh time of an
    /// existing account. `last_refreshed_at` never moves backwards.
    async fn upsert_tracked_account(&self, account: &TrackedAccount) -> Result<(), DbError>;

    /// Returns the subset of `candidate_ids` already stored for the account.
    async fn find_existing_post_ids(
        &self,
        account_id: i64,
        candidate_ids: &[String],
    ) -> Result<HashSet<String>, DbError>;

    /// Inserts posts for the account and returns how many were new.
    async fn insert_posts(&self, account_id: i64, posts: &[FetchedPost]) -> Result<u64, DbError>;

    /// Deletes the account and its posts. Returns `false` if it did not exist.
    async fn delete_tracked_account(&self, account_id: i64) -> Result<bool, DbError>;

    async fn record_api_call(&self, call: ApiCall) -> Result<(), DbError>;

    /// Ledger rows with `called_at >= since`.
    async fn count_api_calls_since(&self, since: DateTime<Utc>) -> Result<u64, DbError>;

    /// Claims the store-wide cycle slot without waiting. `Ok(None)` means
    /// another holder, possibly in another process, has it.
    async fn try_claim_cycle(&self) -> Result<Option<Box<dyn CycleLease>>, DbError>;
}
