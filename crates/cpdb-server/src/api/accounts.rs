//! Tracked-account handlers.
//!
//! - `GET    /api/v1/accounts`             all tracked accounts with their current rank
//! - `POST   /api/v1/accounts`             register a handle (first refresh if affordable)
//! - `GET    /api/v1/accounts/count`       number of tracked accounts
//! - `GET    /api/v1/accounts/:id`         one account by public id
//! - `DELETE /api/v1/accounts/:id`         stop tracking, deleting its posts
//! - `GET    /api/v1/accounts/:id/posts`   most recent stored posts

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use cpdb_collector::{priority_rank, registry, AccountOutcome, AccountStore, Registration};
use cpdb_core::{PostRecord, ProfileSnapshot, TrackedAccount};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{
    map_collector_error, map_db_error, normalize_limit, ApiError, ApiResponse, AppState,
    ResponseMeta,
};

#[derive(Debug, Deserialize)]
pub(super) struct CreateAccountRequest {
    pub handle: String,
    pub project_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub(super) struct LimitQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct AccountItem {
    id: Uuid,
    handle: String,
    project_id: Option<Uuid>,
    #[serde(flatten)]
    profile: ProfileSnapshot,
    activity_score: u8,
    priority_rank: u8,
    last_refreshed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl AccountItem {
    fn from_account(account: TrackedAccount, now: DateTime<Utc>) -> Self {
        Self {
            priority_rank: priority_rank(&account, now),
            id: account.public_id,
            handle: account.handle,
            project_id: account.project_id,
            profile: account.profile,
            activity_score: account.activity_score,
            last_refreshed_at: account.last_refreshed_at,
            created_at: account.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct AccountDetail {
    #[serde(flatten)]
    account: AccountItem,
    stored_posts: i64,
}

#[derive(Debug, Serialize)]
pub(super) struct CreateAccountResponse {
    account: AccountItem,
    first_refresh: Option<AccountOutcome>,
    api_calls_used: u64,
}

#[derive(Debug, Serialize)]
pub(super) struct PostItem {
    remote_post_id: String,
    body: String,
    posted_at: Option<DateTime<Utc>>,
    repost_count: i64,
    favorite_count: i64,
    is_repost: bool,
    is_reply: bool,
    collected_at: DateTime<Utc>,
}

impl From<PostRecord> for PostItem {
    fn from(post: PostRecord) -> Self {
        Self {
            remote_post_id: post.remote_post_id,
            body: post.body,
            posted_at: post.posted_at,
            repost_count: post.repost_count,
            favorite_count: post.favorite_count,
            is_repost: post.is_repost,
            is_reply: post.is_reply,
            collected_at: post.collected_at,
        }
    }
}

/// Resolve a public id to a tracked account, returning 404 if unknown.
async fn resolve_account(
    state: &AppState,
    id: Uuid,
    request_id: &str,
) -> Result<TrackedAccount, ApiError> {
    cpdb_db::get_tracked_account_by_public_id(&state.pool, id)
        .await
        .map_err(|e| map_db_error(request_id.to_owned(), &e))?
        .map(TrackedAccount::from)
        .ok_or_else(|| ApiError::new(request_id, "not_found", format!("account '{id}' not found")))
}

pub(super) async fn list_accounts(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<AccountItem>>>, ApiError> {
    let accounts = state
        .store
        .list_tracked_accounts()
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let now = Utc::now();
    let data = accounts
        .into_iter()
        .map(|a| AccountItem::from_account(a, now))
        .collect();

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn count_accounts(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let count = state
        .store
        .count_tracked_accounts()
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: serde_json::json!({ "count": count }),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// POST /api/v1/accounts
pub(super) async fn create_account(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CreateAccountResponse>>), ApiError> {
    let rid = &req_id.0;

    let registration = match &state.collector {
        Some(collector) => collector
            .register_account(&body.handle, body.project_id)
            .await,
        None => registry::add_account(state.store.as_ref(), &body.handle, body.project_id)
            .await
            .map(|account| Registration {
                account,
                first_refresh: None,
                api_calls_used: 0,
            }),
    }
    .map_err(|e| map_collector_error(rid.clone(), &e))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data: CreateAccountResponse {
                account: AccountItem::from_account(registration.account, Utc::now()),
                first_refresh: registration.first_refresh,
                api_calls_used: registration.api_calls_used,
            },
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

pub(super) async fn get_account(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<AccountDetail>>, ApiError> {
    let rid = &req_id.0;
    let account = resolve_account(&state, id, rid).await?;
    let stored_posts = cpdb_db::count_account_posts(&state.pool, account.id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: AccountDetail {
            account: AccountItem::from_account(account, Utc::now()),
            stored_posts,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// DELETE /api/v1/accounts/:id
pub(super) async fn delete_account(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let rid = &req_id.0;
    let account = resolve_account(&state, id, rid).await?;

    registry::remove_resolved_account(state.store.as_ref(), &account)
        .await
        .map_err(|e| map_collector_error(rid.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: serde_json::json!({ "deleted": true, "handle": account.handle }),
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn list_posts(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<ApiResponse<Vec<PostItem>>>, ApiError> {
    let rid = &req_id.0;
    let account = resolve_account(&state, id, rid).await?;
    let rows = cpdb_db::list_account_posts(&state.pool, account.id, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: rows
            .into_iter()
            .map(|row| PostItem::from(PostRecord::from(row)))
            .collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}
