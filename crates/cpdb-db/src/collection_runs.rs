//! Database operations for `collection_runs` and `collection_run_accounts`.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `collection_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CollectionRunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub run_type: String,
    pub trigger_source: String,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub records_processed: i32,
    pub api_calls_used: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A row from the `collection_run_accounts` table.
///
/// `account_id` becomes `NULL` once the account itself is deleted; `handle`
/// keeps the history readable.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CollectionRunAccountRow {
    pub id: i64,
    pub collection_run_id: i64,
    pub account_id: Option<i64>,
    pub handle: String,
    pub status: String,
    pub records_processed: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Advisory-lock key for the collection cycle slot (ASCII "cpdbcycl").
const COLLECTION_CYCLE_LOCK_KEY: i64 = 0x6370_6462_6379_636c;

const RUN_COLUMNS: &str = "id, public_id, run_type, trigger_source, status, started_at, \
     completed_at, records_processed, api_calls_used, error_message, created_at";

// ---------------------------------------------------------------------------
// collection_runs operations
// ---------------------------------------------------------------------------

/// Creates a new collection run in `queued` status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_collection_run(
    pool: &PgPool,
    run_type: &str,
    trigger_source: &str,
) -> Result<CollectionRunRow, DbError> {
    let sql = format!(
        "INSERT INTO collection_runs (public_id, run_type, trigger_source, status) \
         VALUES ($1, $2, $3, 'queued') \
         RETURNING {RUN_COLUMNS}"
    );
    let row = sqlx::query_as::<_, CollectionRunRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(run_type)
        .bind(trigger_source)
        .fetch_one(pool)
        .await?;

    Ok(row)
}

/// Marks a run as `running` and sets `started_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::InvalidCollectionRunTransition`] if the run is not
/// `queued`, or [`DbError::Sqlx`] if the update fails.
pub async fn start_collection_run(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE collection_runs \
         SET status = 'running', started_at = NOW() \
         WHERE id = $1 AND status = 'queued'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidCollectionRunTransition {
            id,
            expected_status: "queued",
        });
    }

    Ok(())
}

/// Marks a run as `succeeded` and stores its totals.
///
/// # Errors
///
/// Returns [`DbError::InvalidCollectionRunTransition`] if the run is not
/// `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn complete_collection_run(
    pool: &PgPool,
    id: i64,
    records_processed: i32,
    api_calls_used: i32,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE collection_runs \
         SET status = 'succeeded', completed_at = NOW(), \
             records_processed = $1, api_calls_used = $2 \
         WHERE id = $3 AND status = 'running'",
    )
    .bind(records_processed)
    .bind(api_calls_used)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidCollectionRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Marks a run as `failed` with an error message.
///
/// # Errors
///
/// Returns [`DbError::InvalidCollectionRunTransition`] if the run is not
/// `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn fail_collection_run(
    pool: &PgPool,
    id: i64,
    error_message: &str,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE collection_runs \
         SET status = 'failed', completed_at = NOW(), error_message = $1 \
         WHERE id = $2 AND status = 'running'",
    )
    .bind(error_message)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidCollectionRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Fetches a single run by its internal `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_collection_run(pool: &PgPool, id: i64) -> Result<CollectionRunRow, DbError> {
    let sql = format!("SELECT {RUN_COLUMNS} FROM collection_runs WHERE id = $1");
    sqlx::query_as::<_, CollectionRunRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Returns the most recent `limit` runs, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_collection_runs(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<CollectionRunRow>, DbError> {
    let sql = format!(
        "SELECT {RUN_COLUMNS} FROM collection_runs \
         ORDER BY created_at DESC, id DESC \
         LIMIT $1"
    );
    let rows = sqlx::query_as::<_, CollectionRunRow>(&sql)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Takes the database-wide collection cycle lock without waiting.
///
/// The lock is transaction-scoped: it is held until the returned transaction
/// is committed, rolled back or dropped. Returns `Ok(None)` when another
/// session holds it.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a connection cannot be acquired or the lock
/// query fails.
pub async fn try_lock_collection_cycle(
    pool: &PgPool,
) -> Result<Option<Transaction<'static, Postgres>>, DbError> {
    let mut tx = pool.begin().await?;
    let locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_xact_lock($1)")
        .bind(COLLECTION_CYCLE_LOCK_KEY)
        .fetch_one(&mut *tx)
        .await?;

    Ok(locked.then_some(tx))
}

// ---------------------------------------------------------------------------
// collection_run_accounts operations
// ---------------------------------------------------------------------------

/// Inserts or updates the per-account result row for a collection run.
///
/// Conflicts on `(collection_run_id, handle)` update the outcome in place.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_collection_run_account(
    pool: &PgPool,
    run_id: i64,
    account_id: Option<i64>,
    handle: &str,
    status: &str,
    records_processed: Option<i32>,
    error_message: Option<&str>,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO collection_run_accounts \
             (collection_run_id, account_id, handle, status, records_processed, error_message) \
         VALUES ($1, $2, $3, $4, COALESCE($5, 0), $6) \
         ON CONFLICT (collection_run_id, handle) DO UPDATE SET \
             status            = EXCLUDED.status, \
             records_processed = EXCLUDED.records_processed, \
             error_message     = EXCLUDED.error_message",
    )
    .bind(run_id)
    .bind(account_id)
    .bind(handle)
    .bind(status)
    .bind(records_processed)
    .bind(error_message)
    .execute(pool)
    .await?;

    Ok(())
}

/// Returns all account-level result rows for a given collection run.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_collection_run_accounts(
    pool: &PgPool,
    run_id: i64,
) -> Result<Vec<CollectionRunAccountRow>, DbError> {
    let rows = sqlx::query_as::<_, CollectionRunAccountRow>(
        "SELECT id, collection_run_id, account_id, handle, status, records_processed, \
                error_message, created_at \
         FROM collection_run_accounts \
         WHERE collection_run_id = $1 \
         ORDER BY id",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
