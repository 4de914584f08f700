//! In-memory fakes for the collector seams.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use cpdb_collector::{AccountSource, AccountStore, ApiCall, CycleLease};
use cpdb_core::{FetchedPost, ProfileSnapshot, TrackedAccount};
use cpdb_db::DbError;
use cpdb_social::SocialError;
use uuid::Uuid;

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 15, 9, 0, 0).unwrap()
}

pub fn post(id: &str, reposts: i64, favorites: i64) -> FetchedPost {
    FetchedPost {
        remote_post_id: id.to_string(),
        body: format!("post {id}"),
        posted_at: Some(fixed_now() - Duration::hours(2)),
        repost_count: reposts,
        favorite_count: favorites,
        is_repost: false,
        is_reply: false,
    }
}

pub fn profile(followers: i64) -> ProfileSnapshot {
    ProfileSnapshot {
        display_name: Some("Fixture".to_string()),
        followers_count: followers,
        ..ProfileSnapshot::default()
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreState {
    accounts: Vec<TrackedAccount>,
    posts: HashMap<i64, Vec<FetchedPost>>,
    ledger: Vec<ApiCall>,
    next_id: i64,
    fail_reads: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    cycle_claimed: Arc<AtomicBool>,
}

/// Stands in for the database lock: one claim at a time across every
/// scheduler sharing the store.
struct MemoryLease(Arc<AtomicBool>);

impl Drop for MemoryLease {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl CycleLease for MemoryLease {
    async fn release(self: Box<Self>) {}
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an account directly, bypassing registration.
    pub fn seed(
        &self,
        handle: &str,
        followers: i64,
        activity_score: u8,
        last_refreshed_at: Option<DateTime<Utc>>,
    ) -> TrackedAccount {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let account = TrackedAccount {
            id: state.next_id,
            public_id: Uuid::new_v4(),
            handle: handle.to_string(),
            project_id: None,
            profile: profile(followers),
            activity_score,
            last_refreshed_at,
            created_at: fixed_now() - Duration::days(60),
        };
        state.accounts.push(account.clone());
        account
    }

    pub fn seed_many(&self, count: usize) -> Vec<TrackedAccount> {
        (0..count)
            .map(|i| self.seed(&format!("account_{i}"), 5_000, 50, None))
            .collect()
    }

    pub fn seed_ledger(&self, calls: usize, called_at: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap();
        for _ in 0..calls {
            state.ledger.push(ApiCall {
                endpoint: cpdb_collector::ApiEndpoint::Profile,
                account_id: None,
                succeeded: true,
                called_at,
            });
        }
    }

    pub fn fail_reads(&self) {
        self.state.lock().unwrap().fail_reads = true;
    }

    pub fn account(&self, handle: &str) -> Option<TrackedAccount> {
        self.state
            .lock()
            .unwrap()
            .accounts
            .iter()
            .find(|a| a.handle == handle)
            .cloned()
    }

    pub fn post_ids(&self, account_id: i64) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .posts
            .get(&account_id)
            .map(|posts| posts.iter().map(|p| p.remote_post_id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn ledger(&self) -> Vec<ApiCall> {
        self.state.lock().unwrap().ledger.clone()
    }

    pub fn cycle_claimed(&self) -> bool {
        self.cycle_claimed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn list_tracked_accounts(&self) -> Result<Vec<TrackedAccount>, DbError> {
        let state = self.state.lock().unwrap();
        if state.fail_reads {
            return Err(DbError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        Ok(state.accounts.clone())
    }

    async fn count_tracked_accounts(&self) -> Result<u64, DbError> {
        let state = self.state.lock().unwrap();
        if state.fail_reads {
            return Err(DbError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        Ok(state.accounts.len() as u64)
    }

    async fn find_account_by_handle(
        &self,
        handle: &str,
    ) -> Result<Option<TrackedAccount>, DbError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .accounts
            .iter()
            .find(|a| a.handle.eq_ignore_ascii_case(handle))
            .cloned())
    }

    async fn insert_tracked_account(
        &self,
        handle: &str,
        project_id: Option<Uuid>,
    ) -> Result<TrackedAccount, DbError> {
        let mut state = self.state.lock().unwrap();
        if state
            .accounts
            .iter()
            .any(|a| a.handle.eq_ignore_ascii_case(handle))
        {
            return Err(DbError::Conflict(format!("duplicate handle {handle}")));
        }
        state.next_id += 1;
        let account = TrackedAccount {
            id: state.next_id,
            public_id: Uuid::new_v4(),
            handle: handle.to_string(),
            project_id,
            profile: ProfileSnapshot::default(),
            activity_score: 0,
            last_refreshed_at: None,
            created_at: fixed_now(),
        };
        state.accounts.push(account.clone());
        Ok(account)
    }

    async fn upsert_tracked_account(&self, account: &TrackedAccount) -> Result<(), DbError> {
        let mut state = self.state.lock().unwrap();
        let existing = state
            .accounts
            .iter_mut()
            .find(|a| a.id == account.id)
            .ok_or(DbError::NotFound)?;
        let refreshed_at = match (existing.last_refreshed_at, account.last_refreshed_at) {
            (Some(old), Some(new)) => Some(old.max(new)),
            (old, new) => new.or(old),
        };
        *existing = TrackedAccount {
            last_refreshed_at: refreshed_at,
            ..account.clone()
        };
        Ok(())
    }

    async fn find_existing_post_ids(
        &self,
        account_id: i64,
        candidate_ids: &[String],
    ) -> Result<HashSet<String>, DbError> {
        let state = self.state.lock().unwrap();
        let stored: HashSet<&str> = state
            .posts
            .get(&account_id)
            .map(|posts| posts.iter().map(|p| p.remote_post_id.as_str()).collect())
            .unwrap_or_default();
        Ok(candidate_ids
            .iter()
            .filter(|id| stored.contains(id.as_str()))
            .cloned()
            .collect())
    }

    async fn insert_posts(&self, account_id: i64, posts: &[FetchedPost]) -> Result<u64, DbError> {
        let mut state = self.state.lock().unwrap();
        let stored = state.posts.entry(account_id).or_default();
        let mut inserted = 0;
        for post in posts {
            if stored.iter().all(|p| p.remote_post_id != post.remote_post_id) {
                stored.push(post.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn delete_tracked_account(&self, account_id: i64) -> Result<bool, DbError> {
        let mut state = self.state.lock().unwrap();
        let before = state.accounts.len();
        state.accounts.retain(|a| a.id != account_id);
        state.posts.remove(&account_id);
        Ok(state.accounts.len() < before)
    }

    async fn record_api_call(&self, call: ApiCall) -> Result<(), DbError> {
        self.state.lock().unwrap().ledger.push(call);
        Ok(())
    }

    async fn count_api_calls_since(&self, since: DateTime<Utc>) -> Result<u64, DbError> {
        let state = self.state.lock().unwrap();
        if state.fail_reads {
            return Err(DbError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        Ok(state
            .ledger
            .iter()
            .filter(|c| c.called_at >= since)
            .count() as u64)
    }

    async fn try_claim_cycle(&self) -> Result<Option<Box<dyn CycleLease>>, DbError> {
        let claimed = self
            .cycle_claimed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if !claimed {
            return Ok(None);
        }
        let lease: Box<dyn CycleLease> = Box::new(MemoryLease(Arc::clone(&self.cycle_claimed)));
        Ok(Some(lease))
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub enum ProfileReply {
    Found(ProfileSnapshot),
    NotFound,
    Status(u16),
}

#[derive(Clone)]
pub enum PostsReply {
    Posts(Vec<FetchedPost>),
    Status(u16),
}

#[derive(Default)]
pub struct FakeSource {
    profiles: Mutex<HashMap<String, ProfileReply>>,
    posts: Mutex<HashMap<String, PostsReply>>,
    calls: Mutex<Vec<(&'static str, String)>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_profile(&self, handle: &str, reply: ProfileReply) {
        self.profiles
            .lock()
            .unwrap()
            .insert(handle.to_string(), reply);
    }

    pub fn set_posts(&self, handle: &str, reply: PostsReply) {
        self.posts.lock().unwrap().insert(handle.to_string(), reply);
    }

    pub fn calls(&self) -> Vec<(&'static str, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl AccountSource for FakeSource {
    async fn fetch_profile(&self, handle: &str) -> Result<Option<ProfileSnapshot>, SocialError> {
        self.calls
            .lock()
            .unwrap()
            .push(("profile", handle.to_string()));
        let reply = self
            .profiles
            .lock()
            .unwrap()
            .get(handle)
            .cloned()
            .unwrap_or_else(|| ProfileReply::Found(profile(2_000)));
        match reply {
            ProfileReply::Found(p) => Ok(Some(p)),
            ProfileReply::NotFound => Ok(None),
            ProfileReply::Status(status) => Err(SocialError::UnexpectedStatus {
                status,
                endpoint: "screenname.php",
            }),
        }
    }

    async fn fetch_recent_posts(
        &self,
        handle: &str,
        limit: usize,
    ) -> Result<Vec<FetchedPost>, SocialError> {
        self.calls
            .lock()
            .unwrap()
            .push(("posts", handle.to_string()));
        let reply = self
            .posts
            .lock()
            .unwrap()
            .get(handle)
            .cloned()
            .unwrap_or_else(|| PostsReply::Posts(Vec::new()));
        match reply {
            PostsReply::Posts(posts) => Ok(posts.into_iter().take(limit).collect()),
            PostsReply::Status(status) => Err(SocialError::UnexpectedStatus {
                status,
                endpoint: "timeline.php",
            }),
        }
    }
}
