//! Database operations for `tracked_accounts`.

use chrono::{DateTime, Utc};
use cpdb_core::{ProfileSnapshot, TrackedAccount, MAX_ACTIVITY_SCORE};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

const SELECT_COLUMNS: &str = "id, public_id, handle, project_id, display_name, bio, location, \
     website, followers_count, following_count, post_count, verified, profile_image_url, \
     banner_url, account_created_at, activity_score, last_refreshed_at, created_at, updated_at";

/// A row from the `tracked_accounts` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TrackedAccountRow {
    pub id: i64,
    pub public_id: Uuid,
    pub handle: String,
    pub project_id: Option<Uuid>,
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
    /// The schema constrains this to `0..=100`.
    pub activity_score: i16,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TrackedAccountRow> for TrackedAccount {
    fn from(row: TrackedAccountRow) -> Self {
        let score = row.activity_score.clamp(0, i16::from(MAX_ACTIVITY_SCORE));
        Self {
            id: row.id,
            public_id: row.public_id,
            handle: row.handle,
            project_id: row.project_id,
            profile: ProfileSnapshot {
                display_name: row.display_name,
                bio: row.bio,
                location: row.location,
                website: row.website,
                followers_count: row.followers_count,
                following_count: row.following_count,
                post_count: row.post_count,
                verified: row.verified,
                profile_image_url: row.profile_image_url,
                banner_url: row.banner_url,
                account_created_at: row.account_created_at,
            },
            activity_score: u8::try_from(score).unwrap_or(0),
            last_refreshed_at: row.last_refreshed_at,
            created_at: row.created_at,
        }
    }
}

/// Fields written by a refresh.
#[derive(Debug, Clone, Copy)]
pub struct AccountSnapshotUpdate<'a> {
    pub profile: &'a ProfileSnapshot,
    pub activity_score: u8,
    pub refreshed_at: DateTime<Utc>,
}

/// Inserts a new tracked account with an empty profile snapshot.
///
/// `handle` must already be normalized.
///
/// # Errors
///
/// Returns [`DbError::Conflict`] if the handle (case-insensitive) is already
/// tracked, or [`DbError::Sqlx`] if the insert fails.
pub async fn insert_tracked_account(
    pool: &PgPool,
    handle: &str,
    project_id: Option<Uuid>,
) -> Result<TrackedAccountRow, DbError> {
    let sql = format!(
        "INSERT INTO tracked_accounts (public_id, handle, project_id) \
         VALUES ($1, $2, $3) \
         RETURNING {SELECT_COLUMNS}"
    );
    let row = sqlx::query_as::<_, TrackedAccountRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(handle)
        .bind(project_id)
        .fetch_one(pool)
        .await?;

    Ok(row)
}

/// Returns every tracked account, oldest refresh first (never-refreshed first of all).
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_tracked_accounts(pool: &PgPool) -> Result<Vec<TrackedAccountRow>, DbError> {
    let sql = format!(
        "SELECT {SELECT_COLUMNS} FROM tracked_accounts \
         ORDER BY last_refreshed_at ASC NULLS FIRST, id ASC"
    );
    let rows = sqlx::query_as::<_, TrackedAccountRow>(&sql)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Returns the number of tracked accounts.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_tracked_accounts(pool: &PgPool) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tracked_accounts")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Fetches a tracked account by internal `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row matches, or [`DbError::Sqlx`] if
/// the query fails.
pub async fn get_tracked_account(pool: &PgPool, id: i64) -> Result<TrackedAccountRow, DbError> {
    let sql = format!("SELECT {SELECT_COLUMNS} FROM tracked_accounts WHERE id = $1");
    sqlx::query_as::<_, TrackedAccountRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Fetches a tracked account by its public UUID.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_tracked_account_by_public_id(
    pool: &PgPool,
    public_id: Uuid,
) -> Result<Option<TrackedAccountRow>, DbError> {
    let sql = format!("SELECT {SELECT_COLUMNS} FROM tracked_accounts WHERE public_id = $1");
    let row = sqlx::query_as::<_, TrackedAccountRow>(&sql)
        .bind(public_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Fetches a tracked account by handle, case-insensitively.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_tracked_account_by_handle(
    pool: &PgPool,
    handle: &str,
) -> Result<Option<TrackedAccountRow>, DbError> {
    let sql = format!("SELECT {SELECT_COLUMNS} FROM tracked_accounts WHERE LOWER(handle) = LOWER($1)");
    let row = sqlx::query_as::<_, TrackedAccountRow>(&sql)
        .bind(handle)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Writes a refreshed profile snapshot and activity score.
///
/// `last_refreshed_at` only ever moves forward: an older `refreshed_at` keeps
/// the stored timestamp.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the account no longer exists, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn update_account_snapshot(
    pool: &PgPool,
    id: i64,
    update: &AccountSnapshotUpdate<'_>,
) -> Result<(), DbError> {
    let profile = update.profile;
    let score = i16::from(update.activity_score.min(MAX_ACTIVITY_SCORE));

    let result = sqlx::query(
        "UPDATE tracked_accounts SET \
             display_name       = $2, \
             bio                = $3, \
             location           = $4, \
             website            = $5, \
             followers_count    = $6, \
             following_count    = $7, \
             post_count         = $8, \
             verified           = $9, \
             profile_image_url  = $10, \
             banner_url         = $11, \
             account_created_at = COALESCE($12, account_created_at), \
             activity_score     = $13, \
             last_refreshed_at  = GREATEST(COALESCE(last_refreshed_at, $14), $14), \
             updated_at         = NOW() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(profile.display_name.as_deref())
    .bind(profile.bio.as_deref())
    .bind(profile.location.as_deref())
    .bind(profile.website.as_deref())
    .bind(profile.followers_count)
    .bind(profile.following_count)
    .bind(profile.post_count)
    .bind(profile.verified)
    .bind(profile.profile_image_url.as_deref())
    .bind(profile.banner_url.as_deref())
    .bind(profile.account_created_at)
    .bind(score)
    .bind(update.refreshed_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

/// Deletes a tracked account. Its posts are removed by `ON DELETE CASCADE`.
///
/// Returns `true` if a row was deleted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_tracked_account(pool: &PgPool, id: i64) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM tracked_accounts WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
