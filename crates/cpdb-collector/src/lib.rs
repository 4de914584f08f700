//! Quota-aware refresh scheduling for tracked social accounts.
//!
//! The [`CollectionScheduler`] decides how many accounts a cycle may refresh
//! without exceeding the monthly API budget, picks them by
//! [`priority_rank`], refreshes them one by one, and re-scores each with
//! [`activity_score`].

pub mod adapters;
pub mod error;
pub mod guard;
pub mod priority;
pub mod quota;
pub mod recorded;
pub mod registry;
pub mod scheduler;
pub mod scorer;
pub mod source;
pub mod store;

use std::sync::Arc;

use cpdb_core::AppConfig;
use sqlx::PgPool;

pub use adapters::{PgAccountStore, SocialAccountSource};
pub use error::CollectorError;
pub use guard::{CycleGuard, CycleLease, CycleTicket};
pub use priority::{order_candidates, priority_rank, RankedAccount};
pub use quota::{month_start, QuotaPolicy, QuotaTracker, QuotaUsage};
pub use recorded::{run_recorded_cycle, RecordedCycle};
pub use registry::{add_account, remove_account, remove_resolved_account};
pub use scheduler::{
    AccountOutcome, AccountResult, CollectionScheduler, CollectionSummary, CyclePlan,
    Registration, SchedulerSettings,
};
pub use scorer::activity_score;
pub use source::AccountSource;
pub use store::{AccountStore, ApiCall, ApiEndpoint};

/// Builds a scheduler wired to Postgres and the social-data API.
///
/// # Errors
///
/// Returns [`CollectorError::Config`] if the social API is not configured.
pub fn build_scheduler(
    pool: PgPool,
    config: &AppConfig,
) -> Result<CollectionScheduler, CollectorError> {
    let source = SocialAccountSource::from_app_config(config)?;
    Ok(CollectionScheduler::new(
        Arc::new(source),
        Arc::new(PgAccountStore::new(pool)),
        &config.collector,
    ))
}
