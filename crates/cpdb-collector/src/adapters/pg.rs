use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cpdb_core::{FetchedPost, TrackedAccount};
use cpdb_db::{AccountSnapshotUpdate, DbError, NewAccountPost};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::guard::CycleLease;
use crate::store::{AccountStore, ApiCall};

/// [`AccountStore`] backed by the Postgres tables in `cpdb-db`.
#[derive(Debug, Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Holds the transaction that owns the collection cycle advisory lock.
struct PgCycleLease(Transaction<'static, Postgres>);

#[async_trait]
impl CycleLease for PgCycleLease {
    async fn release(self: Box<Self>) {
        if let Err(e) = self.0.rollback().await {
            tracing::warn!(error = %e, "failed to release collection cycle lock");
        }
    }
}

fn non_negative(field: &'static str, value: i64) -> Result<u64, DbError> {
    u64::try_from(value).map_err(|_| DbError::OutOfRange { field, value })
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn list_tracked_accounts(&self) -> Result<Vec<TrackedAccount>, DbError> {
        let rows = cpdb_db::list_tracked_accounts(&self.pool).await?;
        Ok(rows.into_iter().map(TrackedAccount::from).collect())
    }

    async fn count_tracked_accounts(&self) -> Result<u64, DbError> {
        let count = cpdb_db::count_tracked_accounts(&self.pool).await?;
        non_negative("tracked_accounts.count", count)
    }

    async fn find_account_by_handle(
        &self,
        handle: &str,
    ) -> Result<Option<TrackedAccount>, DbError> {
        let row = cpdb_db::get_tracked_account_by_handle(&self.pool, handle).await?;
        Ok(row.map(TrackedAccount::from))
    }

    async fn insert_tracked_account(
        &self,
        handle: &str,
        project_id: Option<Uuid>,
    ) -> Result<TrackedAccount, DbError> {
        let row = cpdb_db::insert_tracked_account(&self.pool, handle, project_id).await?;
        Ok(TrackedAccount::from(row))
    }

    async fn upsert_tracked_account(&self, account: &TrackedAccount) -> Result<(), DbError> {
        let Some(refreshed_at) = account.last_refreshed_at else {
            return Err(DbError::OutOfRange {
                field: "last_refreshed_at",
                value: 0,
            });
        };
        let update = AccountSnapshotUpdate {
            profile: &account.profile,
            activity_score: account.activity_score,
            refreshed_at,
        };
        cpdb_db::update_account_snapshot(&self.pool, account.id, &update).await
    }

    async fn find_existing_post_ids(
        &self,
        account_id: i64,
        candidate_ids: &[String],
    ) -> Result<HashSet<String>, DbError> {
        cpdb_db::find_existing_post_ids(&self.pool, account_id, candidate_ids).await
    }

    async fn insert_posts(&self, account_id: i64, posts: &[FetchedPost]) -> Result<u64, DbError> {
        let rows: Vec<NewAccountPost<'_>> = posts.iter().map(NewAccountPost::from).collect();
        cpdb_db::insert_account_posts(&self.pool, account_id, &rows).await
    }

    async fn delete_tracked_account(&self, account_id: i64) -> Result<bool, DbError> {
        cpdb_db::delete_tracked_account(&self.pool, account_id).await
    }

    async fn record_api_call(&self, call: ApiCall) -> Result<(), DbError> {
        cpdb_db::record_api_call(
            &self.pool,
            call.endpoint.as_str(),
            call.account_id,
            call.succeeded,
            call.called_at,
        )
        .await
    }

    async fn count_api_calls_since(&self, since: DateTime<Utc>) -> Result<u64, DbError> {
        let count = cpdb_db::count_api_calls_since(&self.pool, since).await?;
        non_negative("api_usage.count", count)
    }

    async fn try_claim_cycle(&self) -> Result<Option<Box<dyn CycleLease>>, DbError> {
        let tx = cpdb_db::try_lock_collection_cycle(&self.pool).await?;
        Ok(tx.map(|tx| Box::new(PgCycleLease(tx)) as Box<dyn CycleLease>))
    }
}
