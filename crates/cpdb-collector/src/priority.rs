//! Refresh priority: rank 1 (refresh first) to 5 (refresh last).
//!
//! Ranking starts at a neutral 3.0 and is adjusted by reach, activity and
//! staleness. Large, active, stale accounts sink toward 1; small, quiet,
//! recently refreshed accounts rise toward 5.

use chrono::{DateTime, Duration, Utc};
use cpdb_core::TrackedAccount;
use serde::Serialize;

pub const HIGHEST_PRIORITY: u8 = 1;
pub const LOWEST_PRIORITY: u8 = 5;

const NEUTRAL_RANK: f64 = 3.0;
const LARGE_AUDIENCE: i64 = 100_000;
const MEDIUM_AUDIENCE: i64 = 10_000;
const SMALL_AUDIENCE: i64 = 1_000;
const HIGH_ACTIVITY: u8 = 80;
const MEDIUM_ACTIVITY: u8 = 60;
const LOW_ACTIVITY: u8 = 30;
const STALE_AFTER_DAYS: i64 = 7;
const FRESH_WITHIN_DAYS: i64 = 1;

/// Computes the refresh rank of `account` as of `now`.
///
/// An account that has never been refreshed counts as stale.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn priority_rank(account: &TrackedAccount, now: DateTime<Utc>) -> u8 {
    let mut rank = NEUTRAL_RANK;

    let followers = account.profile.followers_count;
    if followers > LARGE_AUDIENCE {
        rank -= 1.0;
    } else if followers > MEDIUM_AUDIENCE {
        rank -= 0.5;
    } else if followers < SMALL_AUDIENCE {
        rank += 0.5;
    }

    let score = account.activity_score;
    if score > HIGH_ACTIVITY {
        rank -= 1.0;
    } else if score > MEDIUM_ACTIVITY {
        rank -= 0.5;
    } else if score < LOW_ACTIVITY {
        rank += 1.0;
    }

    match account.last_refreshed_at {
        None => rank -= 1.0,
        Some(refreshed) => {
            let age = now - refreshed;
            if age > Duration::days(STALE_AFTER_DAYS) {
                rank -= 1.0;
            } else if age < Duration::days(FRESH_WITHIN_DAYS) {
                rank += 1.0;
            }
        }
    }

    rank.clamp(f64::from(HIGHEST_PRIORITY), f64::from(LOWEST_PRIORITY))
        .round() as u8
}

/// An account paired with the rank it had when the cycle was planned.
#[derive(Debug, Clone, Serialize)]
pub struct RankedAccount {
    pub account: TrackedAccount,
    pub rank: u8,
}

/// Orders accounts for refresh: by rank ascending, ties broken by the
/// oldest `last_refreshed_at` first (never-refreshed before everything).
#[must_use]
pub fn order_candidates(accounts: Vec<TrackedAccount>, now: DateTime<Utc>) -> Vec<RankedAccount> {
    let mut ranked: Vec<RankedAccount> = accounts
        .into_iter()
        .map(|account| RankedAccount {
            rank: priority_rank(&account, now),
            account,
        })
        .collect();

    // `None < Some(_)`, so never-refreshed accounts lead each rank.
    ranked.sort_by_key(|r| (r.rank, r.account.last_refreshed_at, r.account.id));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use cpdb_core::ProfileSnapshot;
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap()
    }

    fn account(
        id: i64,
        followers: i64,
        score: u8,
        refreshed_days_ago: Option<i64>,
    ) -> TrackedAccount {
        TrackedAccount {
            id,
            public_id: Uuid::new_v4(),
            handle: format!("account_{id}"),
            project_id: None,
            profile: ProfileSnapshot {
                followers_count: followers,
                ..ProfileSnapshot::default()
            },
            activity_score: score,
            last_refreshed_at: refreshed_days_ago.map(|d| now() - Duration::days(d)),
            created_at: now() - Duration::days(90),
        }
    }

    #[test]
    fn large_active_stale_account_is_top_priority() {
        // 3 - 1 - 1 - 1 = 0, clamped to 1.
        assert_eq!(priority_rank(&account(1, 200_000, 85, Some(10)), now()), 1);
    }

    #[test]
    fn small_quiet_fresh_account_is_lowest_priority() {
        // 3 + 0.5 + 1 + 1 = 5.5, clamped to 5.
        assert_eq!(priority_rank(&account(1, 500, 10, Some(0)), now()), 5);
    }

    #[test]
    fn neutral_account_stays_at_three() {
        assert_eq!(priority_rank(&account(1, 5_000, 50, Some(3)), now()), 3);
    }

    #[test]
    fn half_steps_round_away_from_zero() {
        // 3 - 0.5 = 2.5 -> 3
        assert_eq!(priority_rank(&account(1, 50_000, 50, Some(3)), now()), 3);
        // 3 + 0.5 = 3.5 -> 4
        assert_eq!(priority_rank(&account(1, 10, 50, Some(3)), now()), 4);
        // 3 - 0.5 - 0.5 = 2
        assert_eq!(priority_rank(&account(1, 50_000, 70, Some(3)), now()), 2);
    }

    #[test]
    fn never_refreshed_counts_as_stale() {
        let never = priority_rank(&account(1, 5_000, 50, None), now());
        let stale = priority_rank(&account(2, 5_000, 50, Some(30)), now());
        assert_eq!(never, 2);
        assert_eq!(never, stale);
    }

    #[test]
    fn boundaries_are_exclusive() {
        // Exactly 100 000 followers is "more than 10 000", not "more than 100 000".
        assert_eq!(priority_rank(&account(1, 100_000, 50, Some(3)), now()), 3);
        // Exactly 7 days is not stale; exactly 1 day is not fresh.
        assert_eq!(priority_rank(&account(1, 5_000, 50, Some(7)), now()), 3);
        assert_eq!(priority_rank(&account(1, 5_000, 50, Some(1)), now()), 3);
    }

    #[test]
    fn order_is_by_rank_then_oldest_refresh() {
        let accounts = vec![
            account(1, 5_000, 50, Some(3)),    // rank 3, 3 days
            account(2, 200_000, 85, Some(10)), // rank 1
            account(3, 5_000, 50, Some(5)),    // rank 3, 5 days
            account(4, 500, 10, Some(0)),      // rank 5
            account(5, 5_000, 50, None),       // rank 2
        ];
        let order: Vec<i64> = order_candidates(accounts, now())
            .iter()
            .map(|r| r.account.id)
            .collect();
        assert_eq!(order, vec![2, 5, 3, 1, 4]);
    }

    #[test]
    fn never_refreshed_leads_its_rank() {
        // Both rank 1: one never refreshed, one refreshed 20 days ago.
        let accounts = vec![
            account(1, 200_000, 85, Some(20)),
            account(2, 200_000, 85, None),
        ];
        let order: Vec<i64> = order_candidates(accounts, now())
            .iter()
            .map(|r| r.account.id)
            .collect();
        assert_eq!(order, vec![2, 1]);
    }
}
