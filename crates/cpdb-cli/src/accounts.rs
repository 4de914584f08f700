//! `accounts` command handlers.

use chrono::{DateTime, Utc};
use clap::Subcommand;
use cpdb_collector::{
    priority_rank, AccountOutcome, AccountStore, CollectorError, PgAccountStore, Registration,
};
use cpdb_core::AppConfig;
use uuid::Uuid;

/// Sub-commands available under `accounts`.
#[derive(Debug, Subcommand)]
pub enum AccountsCommands {
    /// Start tracking a handle (`@name`, `name`, or a profile URL)
    Add {
        handle: String,
        /// Project the account belongs to
        #[arg(long)]
        project: Option<Uuid>,
    },
    /// List tracked accounts with their current priority rank
    List,
    /// Stop tracking a handle and delete its stored posts
    Remove { handle: String },
}

pub(crate) async fn run(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    command: AccountsCommands,
) -> anyhow::Result<()> {
    match command {
        AccountsCommands::Add { handle, project } => {
            run_accounts_add(pool, config, &handle, project).await
        }
        AccountsCommands::List => run_accounts_list(pool).await,
        AccountsCommands::Remove { handle } => run_accounts_remove(pool, &handle).await,
    }
}

/// Register a handle, refreshing it immediately when the API is configured
/// and today's budget allows.
async fn run_accounts_add(
    pool: &sqlx::PgPool,
    config: &AppConfig,
    handle: &str,
    project: Option<Uuid>,
) -> anyhow::Result<()> {
    let registration = match cpdb_collector::build_scheduler(pool.clone(), config) {
        Ok(scheduler) => scheduler.register_account(handle, project).await?,
        Err(CollectorError::Config(reason)) => {
            tracing::warn!(%reason, "social API not configured; skipping first refresh");
            let store = PgAccountStore::new(pool.clone());
            let account = cpdb_collector::add_account(&store, handle, project).await?;
            Registration {
                account,
                first_refresh: None,
                api_calls_used: 0,
            }
        }
        Err(e) => return Err(e.into()),
    };

    println!(
        "tracking @{} ({})",
        registration.account.handle, registration.account.public_id
    );
    match registration.first_refresh {
        Some(AccountOutcome::Succeeded {
            followers_count,
            posts_inserted,
            activity_score,
            ..
        }) => println!(
            "first refresh: {followers_count} followers, {posts_inserted} posts stored, \
             activity score {activity_score} ({} API calls)",
            registration.api_calls_used
        ),
        Some(AccountOutcome::Failed { error }) => {
            println!("first refresh failed: {error}");
        }
        Some(AccountOutcome::Skipped) | None => {
            println!("first refresh deferred to the next collection cycle");
        }
    }

    Ok(())
}

async fn run_accounts_list(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let store = PgAccountStore::new(pool.clone());
    let accounts = store.list_tracked_accounts().await?;

    if accounts.is_empty() {
        println!("no tracked accounts; add one with `accounts add <handle>`");
        return Ok(());
    }

    let now = Utc::now();
    println!(
        "{:<18}{:>12}{:>8}{:>7}  REFRESHED",
        "HANDLE", "FOLLOWERS", "SCORE", "RANK"
    );
    for account in &accounts {
        println!(
            "{:<18}{:>12}{:>8}{:>7}  {}",
            account.handle,
            account.profile.followers_count,
            account.activity_score,
            priority_rank(account, now),
            fmt_refreshed(account.last_refreshed_at),
        );
    }

    Ok(())
}

async fn run_accounts_remove(pool: &sqlx::PgPool, handle: &str) -> anyhow::Result<()> {
    let store = PgAccountStore::new(pool.clone());
    let removed = cpdb_collector::remove_account(&store, handle).await?;
    println!("removed @{} and its stored posts", removed.handle);
    Ok(())
}

pub(crate) fn fmt_refreshed(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(
        || "never".to_string(),
        |t| t.format("%Y-%m-%d %H:%M").to_string(),
    )
}
