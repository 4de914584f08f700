use chrono::Utc;
use cpdb_collector::{PgAccountStore, QuotaPolicy, QuotaTracker};
use cpdb_core::AppConfig;

/// Print this month's quota usage and the next cycle's budget.
///
/// Works without a social API key; only the store is read.
pub(crate) async fn run_quota(pool: &sqlx::PgPool, config: &AppConfig) -> anyhow::Result<()> {
    let tracker = QuotaTracker::new(QuotaPolicy::from(&config.collector));
    let store = PgAccountStore::new(pool.clone());
    let usage = tracker.current_usage(&store, Utc::now()).await?;
    let budget = tracker.affordable_call_budget(&usage);

    println!("mode:              {}", usage.mode);
    println!(
        "consumed:          {} / {} (day {} of {})",
        usage.consumed, usage.monthly_limit, usage.day_of_month, usage.days_in_month
    );
    println!("remaining:         {}", usage.remaining);
    println!("daily average:     {:.1}", usage.daily_average);
    println!("projected monthly: {}", usage.projected_monthly);
    println!(
        "next cycle budget: {budget} calls ({} accounts)",
        tracker.max_accounts_for(budget)
    );
    if usage.is_over_pace() {
        println!("warning: on pace to exceed the monthly limit");
    }

    Ok(())
}
