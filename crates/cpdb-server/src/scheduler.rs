//! Background job scheduler.
//!
//! Registers the recurring collection cycle on a [`JobScheduler`] at server
//! startup.

use std::sync::Arc;

use cpdb_collector::{run_recorded_cycle, CollectionScheduler, CollectorError};
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

const TRIGGER_SOURCE: &str = "cron";

/// Builds and starts the background job scheduler.
///
/// With no collector (no social API key) the scheduler starts empty. The
/// returned handle must be kept alive for the lifetime of the process.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised, the
/// cron expression is invalid, or the scheduler fails to start.
pub async fn build_scheduler(
    pool: PgPool,
    collector: Option<Arc<CollectionScheduler>>,
    cron: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    match collector {
        Some(collector) => register_collection_job(&scheduler, pool, collector, cron).await?,
        None => tracing::warn!("scheduler: collection disabled; no cron job registered"),
    }

    scheduler.start().await?;
    Ok(scheduler)
}

/// Register the recurring social refresh cycle on `cron`.
async fn register_collection_job(
    scheduler: &JobScheduler,
    pool: PgPool,
    collector: Arc<CollectionScheduler>,
    cron: &str,
) -> Result<(), JobSchedulerError> {
    let pool = Arc::new(pool);

    let job = Job::new_async(cron, move |_uuid, _lock| {
        let pool = Arc::clone(&pool);
        let collector = Arc::clone(&collector);

        Box::pin(async move {
            tracing::info!("scheduler: starting collection cycle");
            run_collection_job(&pool, &collector).await;
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron, "scheduler: collection cycle registered");
    Ok(())
}

async fn run_collection_job(pool: &PgPool, collector: &CollectionScheduler) {
    match run_recorded_cycle(pool, collector, TRIGGER_SOURCE).await {
        Ok(recorded) => tracing::info!(
            run_id = recorded.run_id,
            successful = recorded.summary.successful,
            failed = recorded.summary.failed,
            skipped = recorded.summary.skipped,
            api_calls_used = recorded.summary.api_calls_used,
            remaining_calls = recorded.summary.remaining_calls,
            "scheduler: collection cycle complete"
        ),
        Err(CollectorError::CycleInProgress) => {
            tracing::info!("scheduler: previous cycle still running; skipping this tick");
        }
        Err(e) => tracing::error!(error = %e, "scheduler: collection cycle failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test(migrations = "../../migrations")]
    async fn scheduler_starts_without_a_collector(pool: PgPool) {
        let mut scheduler = build_scheduler(pool, None, "0 0 */6 * * *")
            .await
            .expect("scheduler starts");
        scheduler.shutdown().await.expect("shutdown");
    }
}
