//! Cycles that leave an audit trail in `collection_runs`.

use sqlx::PgPool;

use crate::error::CollectorError;
use crate::guard::CycleTicket;
use crate::scheduler::{AccountOutcome, CollectionScheduler, CollectionSummary};

/// `collection_runs.run_type` for social refresh cycles.
pub const RUN_TYPE: &str = "social_refresh";

/// A finished cycle and the run row that records it.
#[derive(Debug, Clone)]
pub struct RecordedCycle {
    pub run_id: i64,
    pub summary: CollectionSummary,
}

/// Runs one cycle wrapped in a `collection_runs` row.
///
/// The cycle slot is claimed before the row is created, so a rejected
/// trigger leaves no trace. The slot is shared by every process on the same
/// database. Per-account outcomes go to
/// `collection_run_accounts`.
///
/// # Errors
///
/// - [`CollectorError::CycleInProgress`] if a cycle is already running.
/// - [`CollectorError::Store`] if the run row cannot be written or the
///   cycle itself fails; the run is then marked `failed` when possible.
pub async fn run_recorded_cycle(
    pool: &PgPool,
    scheduler: &CollectionScheduler,
    trigger_source: &str,
) -> Result<RecordedCycle, CollectorError> {
    let ticket = scheduler
        .guard()
        .try_acquire_shared(scheduler.store().as_ref())
        .await?;
    let recorded = record_cycle(pool, scheduler, &ticket, trigger_source).await;
    ticket.release().await;
    recorded
}

async fn record_cycle(
    pool: &PgPool,
    scheduler: &CollectionScheduler,
    ticket: &CycleTicket<'_>,
    trigger_source: &str,
) -> Result<RecordedCycle, CollectorError> {
    let run = cpdb_db::create_collection_run(pool, RUN_TYPE, trigger_source).await?;
    if let Err(e) = cpdb_db::start_collection_run(pool, run.id).await {
        fail_run_best_effort(pool, run.id, &e.to_string()).await;
        return Err(e.into());
    }

    let summary = match scheduler.run_cycle(ticket).await {
        Ok(summary) => summary,
        Err(e) => {
            fail_run_best_effort(pool, run.id, &e.to_string()).await;
            return Err(e);
        }
    };

    for result in &summary.results {
        let (records, error) = match &result.outcome {
            AccountOutcome::Succeeded { posts_inserted, .. } => {
                (Some(clamp_i32(*posts_inserted)), None)
            }
            AccountOutcome::Failed { error } => (None, Some(error.as_str())),
            AccountOutcome::Skipped => (None, None),
        };
        if let Err(e) = cpdb_db::upsert_collection_run_account(
            pool,
            run.id,
            Some(result.account_id),
            &result.handle,
            result.outcome.status(),
            records,
            error,
        )
        .await
        {
            tracing::warn!(
                run_id = run.id,
                handle = %result.handle,
                error = %e,
                "failed to record per-account run outcome"
            );
        }
    }

    if let Err(e) = cpdb_db::complete_collection_run(
        pool,
        run.id,
        clamp_i32(summary.posts_inserted()),
        clamp_i32(summary.api_calls_used),
    )
    .await
    {
        fail_run_best_effort(pool, run.id, &e.to_string()).await;
        return Err(e.into());
    }

    Ok(RecordedCycle {
        run_id: run.id,
        summary,
    })
}

/// Marks a run failed, logging instead of propagating if that also fails.
pub async fn fail_run_best_effort(pool: &PgPool, run_id: i64, message: &str) {
    if let Err(e) = cpdb_db::fail_collection_run(pool, run_id, message).await {
        tracing::error!(run_id, error = %e, "failed to mark collection run as failed");
    }
}

fn clamp_i32(value: u64) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
