//! Budget-aware collection cycles.
//!
//! A cycle:
//!
//! 1. Loads every tracked account and the current quota usage.
//! 2. Sizes the cycle: `min(remaining, daily cap) / calls per refresh`.
//! 3. Orders accounts by priority and selects that many from the top.
//! 4. Refreshes the selected accounts one at a time, with a fixed delay
//!    between accounts. Each refresh fetches the profile, then recent posts,
//!    merges new posts, recomputes the activity score and stamps
//!    `last_refreshed_at`.
//! 5. Reports every account as succeeded, failed or skipped.
//!
//! Remote failures are per-account and never abort the cycle. Only a store
//! failure while loading accounts or usage aborts it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cpdb_core::{CollectorSettings, FetchedPost, ProfileSnapshot, TrackedAccount};
use cpdb_db::DbError;
use serde::Serialize;
use uuid::Uuid;

use crate::error::CollectorError;
use crate::guard::{CycleGuard, CycleTicket};
use crate::priority::{order_candidates, priority_rank, RankedAccount};
use crate::quota::{QuotaPolicy, QuotaTracker, QuotaUsage};
use crate::registry;
use crate::scorer::activity_score;
use crate::source::AccountSource;
use crate::store::{AccountStore, ApiCall, ApiEndpoint};

/// Remote calls one refresh can make: profile, then recent posts. Matches
/// [`crate::quota::MIN_CALLS_PER_REFRESH`], so a plan never lists more
/// accounts than the cycle can afford.
pub const MAX_CALLS_PER_REFRESH: u64 = 2;

/// Source of "now". Swappable so tests can pin the calendar.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Pacing knobs for a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub posts_per_fetch: usize,
    pub inter_account_delay: Duration,
}

impl From<&CollectorSettings> for SchedulerSettings {
    fn from(settings: &CollectorSettings) -> Self {
        Self {
            posts_per_fetch: usize::try_from(settings.posts_per_fetch).unwrap_or(usize::MAX),
            inter_account_delay: Duration::from_millis(settings.inter_account_delay_ms),
        }
    }
}

/// What happened to one account in a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AccountOutcome {
    Succeeded {
        posts_fetched: usize,
        posts_inserted: u64,
        followers_count: i64,
        activity_score: u8,
    },
    Failed {
        error: String,
    },
    /// Not attempted: the cycle's call budget did not cover it.
    Skipped,
}

impl AccountOutcome {
    #[must_use]
    pub fn status(&self) -> &'static str {
        match self {
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
            Self::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountResult {
    pub account_id: i64,
    pub handle: String,
    pub rank: u8,
    #[serde(flatten)]
    pub outcome: AccountOutcome,
}

/// Result of one collection cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionSummary {
    pub total_accounts: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Remote calls actually made, failed calls included.
    pub api_calls_used: u64,
    /// Remaining monthly calls after this cycle.
    pub remaining_calls: u64,
    pub results: Vec<AccountResult>,
}

impl CollectionSummary {
    /// New posts stored across all accounts.
    #[must_use]
    pub fn posts_inserted(&self) -> u64 {
        self.results
            .iter()
            .map(|r| match r.outcome {
                AccountOutcome::Succeeded { posts_inserted, .. } => posts_inserted,
                _ => 0,
            })
            .sum()
    }
}

/// Which accounts a cycle would refresh right now, without calling out.
#[derive(Debug, Clone, Serialize)]
pub struct CyclePlan {
    pub usage: QuotaUsage,
    pub call_budget: u64,
    pub max_accounts: u64,
    pub to_process: Vec<RankedAccount>,
    pub to_skip: Vec<RankedAccount>,
}

/// Result of registering an account.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub account: TrackedAccount,
    /// `None` when no first refresh ran: the budget was exhausted or unknown,
    /// or a cycle was busy.
    pub first_refresh: Option<AccountOutcome>,
    pub api_calls_used: u64,
}

impl Registration {
    fn deferred(account: TrackedAccount) -> Self {
        Self {
            account,
            first_refresh: None,
            api_calls_used: 0,
        }
    }
}

struct RefreshResult {
    outcome: AccountOutcome,
    calls_used: u64,
    updated: Option<TrackedAccount>,
}

/// Runs quota-bounded refresh cycles over the tracked accounts.
pub struct CollectionScheduler {
    source: Arc<dyn AccountSource>,
    store: Arc<dyn AccountStore>,
    tracker: QuotaTracker,
    settings: SchedulerSettings,
    guard: CycleGuard,
    clock: Clock,
}

impl std::fmt::Debug for CollectionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionScheduler")
            .field("tracker", &self.tracker)
            .field("settings", &self.settings)
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}

impl CollectionScheduler {
    #[must_use]
    pub fn new(
        source: Arc<dyn AccountSource>,
        store: Arc<dyn AccountStore>,
        settings: &CollectorSettings,
    ) -> Self {
        Self {
            source,
            store,
            tracker: QuotaTracker::new(QuotaPolicy::from(settings)),
            settings: SchedulerSettings::from(settings),
            guard: CycleGuard::new(),
            clock: Arc::new(Utc::now),
        }
    }

    #[must_use]
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    #[must_use]
    pub fn tracker(&self) -> &QuotaTracker {
        &self.tracker
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn AccountStore> {
        &self.store
    }

    #[must_use]
    pub fn guard(&self) -> &CycleGuard {
        &self.guard
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Current quota usage in the configured mode.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Store`] if the store cannot be read.
    pub async fn quota_usage(&self) -> Result<QuotaUsage, CollectorError> {
        self.tracker.current_usage(self.store.as_ref(), self.now()).await
    }

    /// Number of tracked accounts.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Store`] if the store cannot be read.
    pub async fn tracked_account_count(&self) -> Result<u64, CollectorError> {
        Ok(self.store.count_tracked_accounts().await?)
    }

    /// Computes what a cycle would do now. Makes no remote calls.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Store`] if accounts or usage cannot be read.
    pub async fn plan_cycle(&self) -> Result<CyclePlan, CollectorError> {
        let now = self.now();
        let accounts = self.store.list_tracked_accounts().await?;
        let usage = self.tracker.current_usage(self.store.as_ref(), now).await?;
        Ok(self.build_plan(accounts, usage, now))
    }

    fn build_plan(
        &self,
        accounts: Vec<TrackedAccount>,
        usage: QuotaUsage,
        now: DateTime<Utc>,
    ) -> CyclePlan {
        let call_budget = self.tracker.affordable_call_budget(&usage);
        let max_accounts = self.tracker.max_accounts_for(call_budget);
        let take = usize::try_from(max_accounts).unwrap_or(usize::MAX);

        let mut to_process = order_candidates(accounts, now);
        let to_skip = to_process.split_off(take.min(to_process.len()));

        CyclePlan {
            usage,
            call_budget,
            max_accounts,
            to_process,
            to_skip,
        }
    }

    /// Claims the single-flight slot and runs one cycle.
    ///
    /// # Errors
    ///
    /// - [`CollectorError::CycleInProgress`] if a cycle is already running in
    ///   this or any other process sharing the store.
    /// - [`CollectorError::Store`] if accounts or usage cannot be loaded.
    pub async fn run_collection_cycle(&self) -> Result<CollectionSummary, CollectorError> {
        let ticket = self.guard.try_acquire_shared(self.store.as_ref()).await?;
        let summary = self.run_cycle(&ticket).await;
        ticket.release().await;
        summary
    }

    /// Runs one cycle under a ticket the caller already holds.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Store`] if accounts or usage cannot be loaded.
    pub async fn run_cycle(
        &self,
        _ticket: &CycleTicket<'_>,
    ) -> Result<CollectionSummary, CollectorError> {
        let started = self.now();
        let accounts = self.store.list_tracked_accounts().await?;
        let usage = self
            .tracker
            .current_usage(self.store.as_ref(), started)
            .await?;
        let total_accounts = accounts.len();
        let remaining_before = usage.remaining;
        let plan = self.build_plan(accounts, usage, started);

        tracing::info!(
            total_accounts,
            to_process = plan.to_process.len(),
            to_skip = plan.to_skip.len(),
            call_budget = plan.call_budget,
            remaining = remaining_before,
            mode = %plan.usage.mode,
            "collection cycle starting"
        );

        let mut results = Vec::with_capacity(total_accounts);
        let mut skipped = Vec::new();
        let mut calls_used: u64 = 0;

        for ranked in plan.to_process {
            if calls_used + MAX_CALLS_PER_REFRESH > plan.call_budget {
                skipped.push(ranked);
                continue;
            }
            if !results.is_empty() && !self.settings.inter_account_delay.is_zero() {
                tokio::time::sleep(self.settings.inter_account_delay).await;
            }

            let refresh = self.refresh_account(&ranked.account).await;
            calls_used += refresh.calls_used;
            results.push(AccountResult {
                account_id: ranked.account.id,
                handle: ranked.account.handle,
                rank: ranked.rank,
                outcome: refresh.outcome,
            });
        }

        for ranked in skipped.into_iter().chain(plan.to_skip) {
            results.push(AccountResult {
                account_id: ranked.account.id,
                handle: ranked.account.handle,
                rank: ranked.rank,
                outcome: AccountOutcome::Skipped,
            });
        }

        let summary = summarize(total_accounts, calls_used, remaining_before, results);

        tracing::info!(
            successful = summary.successful,
            failed = summary.failed,
            skipped = summary.skipped,
            api_calls_used = summary.api_calls_used,
            remaining_calls = summary.remaining_calls,
            posts_inserted = summary.posts_inserted(),
            "collection cycle finished"
        );

        Ok(summary)
    }

    /// Adds `raw_handle` and, when the budget and the cycle slot allow, runs
    /// its first refresh immediately.
    ///
    /// Once the account is stored the call succeeds: a busy slot, an
    /// unreadable quota or an exhausted budget only defer the first refresh
    /// to the next cycle.
    ///
    /// # Errors
    ///
    /// Same as [`registry::add_account`].
    pub async fn register_account(
        &self,
        raw_handle: &str,
        project_id: Option<Uuid>,
    ) -> Result<Registration, CollectorError> {
        let account = registry::add_account(self.store.as_ref(), raw_handle, project_id).await?;

        let ticket = match self.guard.try_acquire_shared(self.store.as_ref()).await {
            Ok(ticket) => ticket,
            Err(CollectorError::CycleInProgress) => {
                tracing::info!(handle = %account.handle, "cycle in progress; first refresh deferred");
                return Ok(Registration::deferred(account));
            }
            Err(e) => {
                tracing::warn!(
                    handle = %account.handle,
                    error = %e,
                    "cycle slot unavailable; first refresh deferred"
                );
                return Ok(Registration::deferred(account));
            }
        };

        let usage = match self.quota_usage().await {
            Ok(usage) => usage,
            Err(e) => {
                tracing::warn!(
                    handle = %account.handle,
                    error = %e,
                    "quota usage unreadable; first refresh deferred"
                );
                ticket.release().await;
                return Ok(Registration::deferred(account));
            }
        };
        let budget = self.tracker.affordable_call_budget(&usage);
        if self.tracker.max_accounts_for(budget) == 0 || budget < MAX_CALLS_PER_REFRESH {
            tracing::info!(
                handle = %account.handle,
                remaining = usage.remaining,
                "no call budget left; first refresh deferred"
            );
            ticket.release().await;
            return Ok(Registration::deferred(account));
        }

        let refresh = self.refresh_account(&account).await;
        ticket.release().await;
        Ok(Registration {
            account: refresh.updated.unwrap_or(account),
            first_refresh: Some(refresh.outcome),
            api_calls_used: refresh.calls_used,
        })
    }

    /// Stops tracking `raw_handle`.
    ///
    /// # Errors
    ///
    /// Same as [`registry::remove_account`].
    pub async fn remove_account(&self, raw_handle: &str) -> Result<TrackedAccount, CollectorError> {
        registry::remove_account(self.store.as_ref(), raw_handle).await
    }

    /// Refreshes one account: profile, posts, merge, score, timestamp.
    ///
    /// Never fails as a whole; every problem becomes a failed outcome.
    async fn refresh_account(&self, account: &TrackedAccount) -> RefreshResult {
        let handle = account.handle.as_str();
        let mut calls_used = 0;

        let profile = self.source.fetch_profile(handle).await;
        calls_used += 1;
        self.record_call(ApiEndpoint::Profile, account.id, profile.is_ok())
            .await;

        let profile = match profile {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                return failed(account, calls_used, format!("@{handle} could not be resolved"));
            }
            Err(e) => return failed(account, calls_used, format!("profile fetch failed: {e}")),
        };

        let posts = self
            .source
            .fetch_recent_posts(handle, self.settings.posts_per_fetch)
            .await;
        calls_used += 1;
        self.record_call(ApiEndpoint::RecentPosts, account.id, posts.is_ok())
            .await;

        let posts = match posts {
            Ok(posts) => dedupe_posts(posts),
            Err(e) => return failed(account, calls_used, format!("posts fetch failed: {e}")),
        };

        match self.merge_refresh(account, profile, &posts).await {
            Ok((updated, posts_inserted)) => {
                tracing::debug!(
                    handle,
                    posts_fetched = posts.len(),
                    posts_inserted,
                    activity_score = updated.activity_score,
                    "account refreshed"
                );
                RefreshResult {
                    outcome: AccountOutcome::Succeeded {
                        posts_fetched: posts.len(),
                        posts_inserted,
                        followers_count: updated.profile.followers_count,
                        activity_score: updated.activity_score,
                    },
                    calls_used,
                    updated: Some(updated),
                }
            }
            Err(e) => failed(account, calls_used, format!("store write failed: {e}")),
        }
    }

    async fn merge_refresh(
        &self,
        account: &TrackedAccount,
        profile: ProfileSnapshot,
        posts: &[FetchedPost],
    ) -> Result<(TrackedAccount, u64), DbError> {
        let candidate_ids: Vec<String> = posts.iter().map(|p| p.remote_post_id.clone()).collect();
        let existing = if candidate_ids.is_empty() {
            HashSet::new()
        } else {
            self.store
                .find_existing_post_ids(account.id, &candidate_ids)
                .await?
        };

        let new_posts: Vec<FetchedPost> = posts
            .iter()
            .filter(|p| !existing.contains(&p.remote_post_id))
            .cloned()
            .collect();
        let posts_inserted = if new_posts.is_empty() {
            0
        } else {
            self.store.insert_posts(account.id, &new_posts).await?
        };

        let now = self.now();
        let refreshed_at = account
            .last_refreshed_at
            .map_or(now, |previous| previous.max(now));
        let score = activity_score(&profile, posts);

        let updated = TrackedAccount {
            profile,
            activity_score: score,
            last_refreshed_at: Some(refreshed_at),
            ..account.clone()
        };
        self.store.upsert_tracked_account(&updated).await?;

        Ok((updated, posts_inserted))
    }

    async fn record_call(&self, endpoint: ApiEndpoint, account_id: i64, succeeded: bool) {
        let call = ApiCall {
            endpoint,
            account_id: Some(account_id),
            succeeded,
            called_at: self.now(),
        };
        if let Err(e) = self.store.record_api_call(call).await {
            tracing::warn!(
                endpoint = endpoint.as_str(),
                account_id,
                error = %e,
                "failed to record API call in usage ledger"
            );
        }
    }

    /// Rank of `account` right now.
    #[must_use]
    pub fn rank_of(&self, account: &TrackedAccount) -> u8 {
        priority_rank(account, self.now())
    }
}

fn failed(account: &TrackedAccount, calls_used: u64, error: String) -> RefreshResult {
    tracing::warn!(handle = %account.handle, calls_used, error = %error, "account refresh failed");
    RefreshResult {
        outcome: AccountOutcome::Failed { error },
        calls_used,
        updated: None,
    }
}

/// Drops repeated remote ids, keeping the first occurrence.
fn dedupe_posts(posts: Vec<FetchedPost>) -> Vec<FetchedPost> {
    let mut seen = HashSet::with_capacity(posts.len());
    posts
        .into_iter()
        .filter(|p| seen.insert(p.remote_post_id.clone()))
        .collect()
}

fn summarize(
    total_accounts: usize,
    api_calls_used: u64,
    remaining_before: u64,
    results: Vec<AccountResult>,
) -> CollectionSummary {
    let mut successful = 0;
    let mut failed = 0;
    let mut skipped = 0;
    for result in &results {
        match result.outcome {
            AccountOutcome::Succeeded { .. } => successful += 1,
            AccountOutcome::Failed { .. } => failed += 1,
            AccountOutcome::Skipped => skipped += 1,
        }
    }

    CollectionSummary {
        total_accounts,
        successful,
        failed,
        skipped,
        api_calls_used,
        remaining_calls: remaining_before.saturating_sub(api_calls_used),
        results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: &str) -> FetchedPost {
        FetchedPost {
            remote_post_id: id.to_string(),
            body: String::new(),
            posted_at: None,
            repost_count: 0,
            favorite_count: 0,
            is_repost: false,
            is_reply: false,
        }
    }

    #[test]
    fn dedupe_keeps_first_occurrence_in_order() {
        let posts = vec![post("3"), post("1"), post("3"), post("2"), post("1")];
        let ids: Vec<String> = dedupe_posts(posts)
            .into_iter()
            .map(|p| p.remote_post_id)
            .collect();
        assert_eq!(ids, vec!["3", "1", "2"]);
    }

    #[test]
    fn summary_counts_match_outcomes() {
        let result = |handle: &str, outcome| AccountResult {
            account_id: 1,
            handle: handle.to_string(),
            rank: 3,
            outcome,
        };
        let summary = summarize(
            3,
            3,
            10,
            vec![
                result(
                    "a",
                    AccountOutcome::Succeeded {
                        posts_fetched: 4,
                        posts_inserted: 2,
                        followers_count: 10,
                        activity_score: 12,
                    },
                ),
                result(
                    "b",
                    AccountOutcome::Failed {
                        error: "boom".to_string(),
                    },
                ),
                result("c", AccountOutcome::Skipped),
            ],
        );
        assert_eq!(
            (summary.successful, summary.failed, summary.skipped),
            (1, 1, 1)
        );
        assert_eq!(summary.remaining_calls, 7);
        assert_eq!(summary.posts_inserted(), 2);
    }

    #[test]
    fn remaining_calls_saturate_at_zero() {
        assert_eq!(summarize(0, 5, 3, Vec::new()).remaining_calls, 0);
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(AccountResult {
            account_id: 7,
            handle: "aave".to_string(),
            rank: 1,
            outcome: AccountOutcome::Failed {
                error: "timeout".to_string(),
            },
        })
        .expect("serialize");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "timeout");
        assert_eq!(json["handle"], "aave");
    }

    #[test]
    fn settings_convert_delay_to_duration() {
        let settings = SchedulerSettings::from(&CollectorSettings::default());
        assert_eq!(settings.inter_account_delay, Duration::from_millis(1_000));
        assert_eq!(settings.posts_per_fetch, 20);
    }
}
