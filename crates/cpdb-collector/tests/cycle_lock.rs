//! The cycle slot is shared through Postgres, not only within one scheduler.

mod support;

use std::sync::Arc;

use cpdb_collector::{run_recorded_cycle, CollectionScheduler, CollectorError, PgAccountStore};
use cpdb_core::CollectorSettings;
use support::{fixed_now, FakeSource};

fn pg_scheduler(pool: &sqlx::PgPool, source: &Arc<FakeSource>) -> CollectionScheduler {
    let settings = CollectorSettings {
        inter_account_delay_ms: 0,
        ..CollectorSettings::default()
    };
    CollectionScheduler::new(
        source.clone(),
        Arc::new(PgAccountStore::new(pool.clone())),
        &settings,
    )
    .with_clock(fixed_now)
}

async fn run_count(pool: &sqlx::PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM collection_runs")
        .fetch_one(pool)
        .await
        .expect("count runs")
}

#[sqlx::test(migrations = "../../migrations")]
async fn second_scheduler_on_the_same_database_is_rejected(pool: sqlx::PgPool) {
    let source = Arc::new(FakeSource::new());
    let cron = pg_scheduler(&pool, &source);
    let cli = pg_scheduler(&pool, &source);
    cpdb_db::insert_tracked_account(&pool, "uniswap", None)
        .await
        .expect("seed account");

    let held = cron
        .guard()
        .try_acquire_shared(cron.store().as_ref())
        .await
        .expect("cron claims the slot");

    let err = cli
        .run_collection_cycle()
        .await
        .expect_err("plain cycle must be rejected");
    assert!(matches!(err, CollectorError::CycleInProgress));

    let err = run_recorded_cycle(&pool, &cli, "cli")
        .await
        .expect_err("recorded cycle must be rejected");
    assert!(matches!(err, CollectorError::CycleInProgress));
    assert_eq!(run_count(&pool).await, 0);
    assert_eq!(source.call_count(), 0);
    assert!(!cli.guard().is_busy());

    held.release().await;

    let recorded = run_recorded_cycle(&pool, &cli, "cli")
        .await
        .expect("slot is free after release");
    assert_eq!(recorded.summary.successful, 1);
    assert_eq!(run_count(&pool).await, 1);
}
