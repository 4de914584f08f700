//! Database operations for `account_posts`.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use cpdb_core::{FetchedPost, PostRecord};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `account_posts` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AccountPostRow {
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

impl From<AccountPostRow> for PostRecord {
    fn from(row: AccountPostRow) -> Self {
        Self {
            id: row.id,
            account_id: row.account_id,
            remote_post_id: row.remote_post_id,
            body: row.body,
            posted_at: row.posted_at,
            repost_count: row.repost_count,
            favorite_count: row.favorite_count,
            is_repost: row.is_repost,
            is_reply: row.is_reply,
            collected_at: row.collected_at,
        }
    }
}

/// Borrowed view of a post to insert.
#[derive(Debug, Clone, Copy)]
pub struct NewAccountPost<'a> {
    pub remote_post_id: &'a str,
    pub body: &'a str,
    pub posted_at: Option<DateTime<Utc>>,
    pub repost_count: i64,
    pub favorite_count: i64,
    pub is_repost: bool,
    pub is_reply: bool,
}

impl<'a> From<&'a FetchedPost> for NewAccountPost<'a> {
    fn from(post: &'a FetchedPost) -> Self {
        Self {
            remote_post_id: &post.remote_post_id,
            body: &post.body,
            posted_at: post.posted_at,
            repost_count: post.repost_count,
            favorite_count: post.favorite_count,
            is_repost: post.is_repost,
            is_reply: post.is_reply,
        }
    }
}

/// Returns the subset of `candidate_ids` already stored for `account_id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_existing_post_ids(
    pool: &PgPool,
    account_id: i64,
    candidate_ids: &[String],
) -> Result<HashSet<String>, DbError> {
    if candidate_ids.is_empty() {
        return Ok(HashSet::new());
    }

    let ids = sqlx::query_scalar::<_, String>(
        "SELECT remote_post_id FROM account_posts \
         WHERE account_id = $1 AND remote_post_id = ANY($2)",
    )
    .bind(account_id)
    .bind(candidate_ids)
    .fetch_all(pool)
    .await?;

    Ok(ids.into_iter().collect())
}

/// Inserts posts for an account inside one transaction.
///
/// Rows whose `(account_id, remote_post_id)` already exist are left untouched.
/// Returns the number of rows actually inserted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any insert fails; the transaction is rolled back.
pub async fn insert_account_posts(
    pool: &PgPool,
    account_id: i64,
    posts: &[NewAccountPost<'_>],
) -> Result<u64, DbError> {
    if posts.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    let mut inserted: u64 = 0;

    for post in posts {
        let result = sqlx::query(
            "INSERT INTO account_posts \
                 (account_id, remote_post_id, body, posted_at, repost_count, \
                  favorite_count, is_repost, is_reply) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (account_id, remote_post_id) DO NOTHING",
        )
        .bind(account_id)
        .bind(post.remote_post_id)
        .bind(post.body)
        .bind(post.posted_at)
        .bind(post.repost_count)
        .bind(post.favorite_count)
        .bind(post.is_repost)
        .bind(post.is_reply)
        .execute(&mut *tx)
        .await?;
        inserted += result.rows_affected();
    }

    tx.commit().await?;
    Ok(inserted)
}

/// Returns the most recent `limit` posts for an account, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_account_posts(
    pool: &PgPool,
    account_id: i64,
    limit: i64,
) -> Result<Vec<AccountPostRow>, DbError> {
    let rows = sqlx::query_as::<_, AccountPostRow>(
        "SELECT id, account_id, remote_post_id, body, posted_at, repost_count, \
                favorite_count, is_repost, is_reply, collected_at \
         FROM account_posts \
         WHERE account_id = $1 \
         ORDER BY posted_at DESC NULLS LAST, id DESC \
         LIMIT $2",
    )
    .bind(account_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Returns the number of stored posts for an account.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_account_posts(pool: &PgPool, account_id: i64) -> Result<i64, DbError> {
    let count =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM account_posts WHERE account_id = $1")
            .bind(account_id)
            .fetch_one(pool)
            .await?;
    Ok(count)
}
