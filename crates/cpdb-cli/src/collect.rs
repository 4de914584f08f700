//! `collect` command handlers.
//!
//! A real run goes through [`cpdb_collector::run_recorded_cycle`], so CLI
//! runs show up in `collection_runs` next to cron and API runs.

use clap::Subcommand;
use cpdb_collector::{AccountOutcome, CollectionSummary, RankedAccount};
use cpdb_core::AppConfig;

use crate::accounts::fmt_refreshed;

/// Sub-commands available under `collect`.
#[derive(Debug, Subcommand)]
pub enum CollectCommands {
    /// Refresh as many accounts as this month's quota allows
    Run {
        /// Show which accounts would be refreshed without calling the API
        #[arg(long)]
        dry_run: bool,
    },
    /// Show recent collection runs
    Runs {
        #[arg(long, default_value = "10")]
        limit: i64,
    },
}

pub(crate) async fn run(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    command: CollectCommands,
) -> anyhow::Result<()> {
    match command {
        CollectCommands::Run { dry_run } => run_collect(pool, config, dry_run).await,
        CollectCommands::Runs { limit } => run_collect_runs(pool, limit).await,
    }
}

async fn run_collect(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    dry_run: bool,
) -> anyhow::Result<()> {
    let scheduler = cpdb_collector::build_scheduler(pool.clone(), config)?;

    if dry_run {
        let plan = scheduler.plan_cycle().await?;
        println!(
            "dry-run: {} of {} calls remaining this month; budget {} calls ({} accounts)",
            plan.usage.remaining, plan.usage.monthly_limit, plan.call_budget, plan.max_accounts
        );
        print_ranked("would refresh", &plan.to_process);
        print_ranked("would skip", &plan.to_skip);
        return Ok(());
    }

    let recorded = cpdb_collector::run_recorded_cycle(pool, &scheduler, "cli").await?;
    print_summary(&recorded.summary);
    Ok(())
}

fn print_ranked(label: &str, accounts: &[RankedAccount]) {
    println!("{label} ({}):", accounts.len());
    for ranked in accounts {
        println!(
            "  {:<18} rank {}  last refreshed {}",
            ranked.account.handle,
            ranked.rank,
            fmt_refreshed(ranked.account.last_refreshed_at)
        );
    }
}

fn print_summary(summary: &CollectionSummary) {
    println!(
        "collection complete: {} succeeded, {} failed, {} skipped of {} accounts",
        summary.successful, summary.failed, summary.skipped, summary.total_accounts
    );
    println!(
        "api calls used: {}; remaining this month: {}",
        summary.api_calls_used, summary.remaining_calls
    );
    for result in &summary.results {
        if let AccountOutcome::Failed { error } = &result.outcome {
            println!("  failed @{}: {error}", result.handle);
        }
    }
}

async fn run_collect_runs(pool: &sqlx::PgPool, limit: i64) -> anyhow::Result<()> {
    let runs = cpdb_db::list_collection_runs(pool, limit.clamp(1, 200)).await?;

    if runs.is_empty() {
        println!("no collection runs recorded yet");
        return Ok(());
    }

    println!(
        "{:<18}{:<10}{:<11}{:>8}{:>7}",
        "CREATED", "TRIGGER", "STATUS", "POSTS", "CALLS"
    );
    for run in &runs {
        println!(
            "{:<18}{:<10}{:<11}{:>8}{:>7}",
            run.created_at.format("%Y-%m-%d %H:%M"),
            run.trigger_source,
            run.status,
            run.records_processed,
            run.api_calls_used
        );
    }

    Ok(())
}
