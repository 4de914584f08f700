//! Append-only ledger of remote API calls.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// Appends one ledger row for a real remote call.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn record_api_call(
    pool: &PgPool,
    endpoint: &str,
    account_id: Option<i64>,
    succeeded: bool,
    called_at: DateTime<Utc>,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO api_usage (called_at, endpoint, account_id, succeeded) \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(called_at)
    .bind(endpoint)
    .bind(account_id)
    .bind(succeeded)
    .execute(pool)
    .await?;
    Ok(())
}

/// Counts ledger rows with `called_at >= since`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_api_calls_since(pool: &PgPool, since: DateTime<Utc>) -> Result<i64, DbError> {
    let count =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM api_usage WHERE called_at >= $1")
            .bind(since)
            .fetch_one(pool)
            .await?;
    Ok(count)
}
