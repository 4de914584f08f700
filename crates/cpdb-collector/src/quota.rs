//! Monthly API-call budget accounting.
//!
//! Two ways to measure consumption this month:
//!
//! - [`QuotaMode::Estimate`]: `tracked accounts × calls per refresh × day of
//!   month`, assuming one refresh per account per day.
//! - [`QuotaMode::Ledger`]: the number of calls actually recorded in the
//!   usage ledger since the start of the current UTC month.
//!
//! Either way the result is clamped so `consumed + remaining == limit`.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use cpdb_core::{CollectorSettings, QuotaMode};
use serde::Serialize;

use crate::error::CollectorError;
use crate::store::AccountStore;

/// Lowest per-refresh cost a plan may assume: one profile call plus one
/// posts call.
pub const MIN_CALLS_PER_REFRESH: u32 = 2;

/// Budget parameters for quota accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    pub monthly_call_limit: u32,
    pub daily_safety_cap: u32,
    pub calls_per_account_refresh: u32,
    pub mode: QuotaMode,
}

impl From<&CollectorSettings> for QuotaPolicy {
    fn from(settings: &CollectorSettings) -> Self {
        Self {
            monthly_call_limit: settings.monthly_call_limit,
            daily_safety_cap: settings.daily_safety_cap,
            calls_per_account_refresh: settings
                .calls_per_account_refresh
                .max(MIN_CALLS_PER_REFRESH),
            mode: settings.quota_mode,
        }
    }
}

/// Point-in-time view of this month's API consumption.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaUsage {
    pub mode: QuotaMode,
    pub consumed: u64,
    pub remaining: u64,
    pub monthly_limit: u64,
    /// Calls per day so far this month.
    pub daily_average: f64,
    /// `daily_average` extrapolated over every day of the month.
    pub projected_monthly: u64,
    pub day_of_month: u32,
    pub days_in_month: u32,
}

impl QuotaUsage {
    /// Calls that may be spent right now: `min(remaining, daily_cap)`.
    #[must_use]
    pub fn affordable_call_budget(&self, daily_cap: u32) -> u64 {
        self.remaining.min(u64::from(daily_cap))
    }

    /// `true` when the projection exceeds the monthly limit.
    #[must_use]
    pub fn is_over_pace(&self) -> bool {
        self.projected_monthly > self.monthly_limit
    }
}

/// Computes quota usage and the per-cycle account budget.
#[derive(Debug, Clone, Copy)]
pub struct QuotaTracker {
    policy: QuotaPolicy,
}

impl QuotaTracker {
    #[must_use]
    pub fn new(policy: QuotaPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn policy(&self) -> &QuotaPolicy {
        &self.policy
    }

    /// Usage under the estimate formula for `tracked_accounts` accounts.
    #[must_use]
    pub fn estimate_usage(&self, tracked_accounts: u64, now: DateTime<Utc>) -> QuotaUsage {
        let consumed = tracked_accounts
            .saturating_mul(u64::from(self.policy.calls_per_account_refresh))
            .saturating_mul(u64::from(now.day()));
        self.build_usage(QuotaMode::Estimate, consumed, now)
    }

    /// Usage from `calls_this_month` ledger rows.
    #[must_use]
    pub fn ledger_usage(&self, calls_this_month: u64, now: DateTime<Utc>) -> QuotaUsage {
        self.build_usage(QuotaMode::Ledger, calls_this_month, now)
    }

    /// Reads whatever the configured mode needs from `store` and returns the
    /// current usage.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Store`] if the store cannot be read.
    pub async fn current_usage(
        &self,
        store: &dyn AccountStore,
        now: DateTime<Utc>,
    ) -> Result<QuotaUsage, CollectorError> {
        match self.policy.mode {
            QuotaMode::Estimate => {
                let accounts = store.count_tracked_accounts().await?;
                Ok(self.estimate_usage(accounts, now))
            }
            QuotaMode::Ledger => {
                let calls = store.count_api_calls_since(month_start(now)).await?;
                Ok(self.ledger_usage(calls, now))
            }
        }
    }

    /// Calls that may be spent right now under the configured daily cap.
    #[must_use]
    pub fn affordable_call_budget(&self, usage: &QuotaUsage) -> u64 {
        usage.affordable_call_budget(self.policy.daily_safety_cap)
    }

    /// How many whole account refreshes fit into `call_budget`.
    #[must_use]
    pub fn max_accounts_for(&self, call_budget: u64) -> u64 {
        call_budget / u64::from(self.policy.calls_per_account_refresh.max(1))
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn build_usage(&self, mode: QuotaMode, consumed: u64, now: DateTime<Utc>) -> QuotaUsage {
        let monthly_limit = u64::from(self.policy.monthly_call_limit);
        let consumed = consumed.min(monthly_limit);
        let remaining = monthly_limit - consumed;

        let day_of_month = now.day();
        let days_in_month = days_in_month(now);
        let daily_average = consumed as f64 / f64::from(day_of_month);
        let projected_monthly = (daily_average * f64::from(days_in_month)).round() as u64;

        QuotaUsage {
            mode,
            consumed,
            remaining,
            monthly_limit,
            daily_average,
            projected_monthly,
            day_of_month,
            days_in_month,
        }
    }
}

/// Midnight UTC on the first day of `now`'s month.
#[must_use]
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

fn days_in_month(now: DateTime<Utc>) -> u32 {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .map_or(30, |next| {
            u32::try_from((next - month_start(now)).num_days()).unwrap_or(30)
        })
}
