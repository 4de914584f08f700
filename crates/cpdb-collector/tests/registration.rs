//! Registering and removing tracked accounts.

mod support;

use std::sync::Arc;

use chrono::Duration;
use cpdb_collector::{AccountOutcome, CollectionScheduler, CollectorError};
use cpdb_core::CollectorSettings;
use support::{fixed_now, post, FakeSource, MemoryStore, PostsReply};

fn scheduler(source: &Arc<FakeSource>, store: &Arc<MemoryStore>) -> CollectionScheduler {
    let settings = CollectorSettings {
        inter_account_delay_ms: 0,
        ..CollectorSettings::default()
    };
    CollectionScheduler::new(source.clone(), store.clone(), &settings).with_clock(fixed_now)
}

#[tokio::test]
async fn registration_normalizes_and_refreshes_immediately() {
    let source = Arc::new(FakeSource::new());
    let store = Arc::new(MemoryStore::new());
    source.set_posts("solana", PostsReply::Posts(vec![post("10", 5, 5)]));
    let scheduler = scheduler(&source, &store);

    let registration = scheduler
        .register_account("https://x.com/Solana", None)
        .await
        .expect("register");

    assert_eq!(registration.account.handle, "solana");
    assert_eq!(registration.api_calls_used, 2);
    assert!(matches!(
        registration.first_refresh,
        Some(AccountOutcome::Succeeded {
            posts_inserted: 1,
            ..
        })
    ));
    assert_eq!(registration.account.last_refreshed_at, Some(fixed_now()));
    assert_eq!(store.post_ids(registration.account.id), vec!["10"]);
}

#[tokio::test]
async fn duplicate_handle_is_rejected_case_insensitively() {
    let source = Arc::new(FakeSource::new());
    let store = Arc::new(MemoryStore::new());
    store.seed("aave", 5_000, 50, None);
    let scheduler = scheduler(&source, &store);

    let err = scheduler
        .register_account("@AAVE", None)
        .await
        .expect_err("duplicate");

    assert!(matches!(err, CollectorError::DuplicateHandle(h) if h == "aave"));
    assert_eq!(source.call_count(), 0);
}

#[tokio::test]
async fn invalid_handle_is_rejected_before_the_store() {
    let source = Arc::new(FakeSource::new());
    let store = Arc::new(MemoryStore::new());
    let scheduler = scheduler(&source, &store);

    let err = scheduler
        .register_account("not a handle!", None)
        .await
        .expect_err("invalid");

    assert!(matches!(err, CollectorError::InvalidHandle(_)));
    assert_eq!(scheduler.tracked_account_count().await.expect("count"), 0);
}

#[tokio::test]
async fn exhausted_budget_defers_first_refresh() {
    let source = Arc::new(FakeSource::new());
    let store = Arc::new(MemoryStore::new());
    store.seed_many(49);
    // Day 20: (49 + 1) × 2 × 20 ≥ 1000.
    let scheduler = CollectionScheduler::new(
        source.clone(),
        store.clone(),
        &CollectorSettings {
            inter_account_delay_ms: 0,
            ..CollectorSettings::default()
        },
    )
    .with_clock(|| fixed_now() + Duration::days(5));

    let registration = scheduler
        .register_account("newcomer", None)
        .await
        .expect("register");

    assert!(registration.first_refresh.is_none());
    assert!(registration.account.last_refreshed_at.is_none());
    assert_eq!(source.call_count(), 0);
}

#[tokio::test]
async fn busy_cycle_defers_first_refresh() {
    let source = Arc::new(FakeSource::new());
    let store = Arc::new(MemoryStore::new());
    let scheduler = scheduler(&source, &store);

    let _held = scheduler.guard().try_acquire().expect("claim");
    let registration = scheduler
        .register_account("latecomer", None)
        .await
        .expect("register still succeeds");

    assert!(registration.first_refresh.is_none());
    assert!(store.account("latecomer").is_some());
}

#[tokio::test]
async fn cycle_in_another_scheduler_defers_first_refresh() {
    let source = Arc::new(FakeSource::new());
    let store = Arc::new(MemoryStore::new());
    let other = scheduler(&source, &store);
    let scheduler = scheduler(&source, &store);

    let held = other
        .guard()
        .try_acquire_shared(store.as_ref())
        .await
        .expect("claim");
    let registration = scheduler
        .register_account("bystander", None)
        .await
        .expect("register still succeeds");
    held.release().await;

    assert!(registration.first_refresh.is_none());
    assert_eq!(source.call_count(), 0);
    assert!(store.account("bystander").is_some());
    assert!(!scheduler.guard().is_busy());
}

#[tokio::test]
async fn unreadable_quota_defers_first_refresh_after_persisting() {
    let source = Arc::new(FakeSource::new());
    let store = Arc::new(MemoryStore::new());
    store.fail_reads();
    let scheduler = scheduler(&source, &store);

    let registration = scheduler
        .register_account("solana", None)
        .await
        .expect("stored account is reported as registered");

    assert!(registration.first_refresh.is_none());
    assert_eq!(registration.api_calls_used, 0);
    assert_eq!(source.call_count(), 0);
    assert!(store.account("solana").is_some());
    assert!(!store.cycle_claimed());
    assert!(!scheduler.guard().is_busy());

    let err = scheduler
        .register_account("solana", None)
        .await
        .expect_err("second attempt is a duplicate");
    assert!(matches!(err, CollectorError::DuplicateHandle(_)));
}

#[tokio::test]
async fn removal_deletes_account_and_posts() {
    let source = Arc::new(FakeSource::new());
    let store = Arc::new(MemoryStore::new());
    source.set_posts("curve", PostsReply::Posts(vec![post("1", 0, 0)]));
    let scheduler = scheduler(&source, &store);
    let registration = scheduler
        .register_account("curve", None)
        .await
        .expect("register");

    let removed = scheduler.remove_account("@Curve").await.expect("remove");

    assert_eq!(removed.id, registration.account.id);
    assert!(store.account("curve").is_none());
    assert!(store.post_ids(removed.id).is_empty());
}

#[tokio::test]
async fn removing_unknown_handle_is_not_found() {
    let source = Arc::new(FakeSource::new());
    let store = Arc::new(MemoryStore::new());
    let scheduler = scheduler(&source, &store);

    let err = scheduler.remove_account("nobody").await.expect_err("missing");

    assert!(matches!(err, CollectorError::AccountNotFound(_)));
}
