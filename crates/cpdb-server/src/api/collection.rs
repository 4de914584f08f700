//! Collection-cycle handlers.
//!
//! - `GET  /api/v1/collection/plan`  which accounts the next cycle would refresh
//! - `POST /api/v1/collection/run`   run one cycle now (409 while another runs)
//! - `GET  /api/v1/collection/runs`  recent recorded cycles

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use cpdb_collector::{
    run_recorded_cycle, CollectionScheduler, CollectionSummary, QuotaUsage, RankedAccount,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{
    map_collector_error, map_db_error, normalize_limit, ApiError, ApiResponse, AppState,
    ResponseMeta,
};

const TRIGGER_SOURCE: &str = "api";

#[derive(Debug, Deserialize)]
pub(super) struct CollectionRunsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct PlannedAccount {
    id: Uuid,
    handle: String,
    rank: u8,
    followers_count: i64,
    activity_score: u8,
    last_refreshed_at: Option<DateTime<Utc>>,
}

impl From<RankedAccount> for PlannedAccount {
    fn from(ranked: RankedAccount) -> Self {
        Self {
            id: ranked.account.public_id,
            handle: ranked.account.handle,
            rank: ranked.rank,
            followers_count: ranked.account.profile.followers_count,
            activity_score: ranked.account.activity_score,
            last_refreshed_at: ranked.account.last_refreshed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct PlanResponse {
    usage: QuotaUsage,
    call_budget: u64,
    max_accounts: u64,
    to_process: Vec<PlannedAccount>,
    to_skip: Vec<PlannedAccount>,
}

#[derive(Debug, Serialize)]
pub(super) struct RunResponse {
    collection_run_id: Uuid,
    #[serde(flatten)]
    summary: CollectionSummary,
}

#[derive(Debug, Serialize)]
pub(super) struct CollectionRunItem {
    collection_run_id: Uuid,
    run_type: String,
    trigger_source: String,
    status: String,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    records_processed: i32,
    api_calls_used: i32,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<cpdb_db::CollectionRunRow> for CollectionRunItem {
    fn from(row: cpdb_db::CollectionRunRow) -> Self {
        Self {
            collection_run_id: row.public_id,
            run_type: row.run_type,
            trigger_source: row.trigger_source,
            status: row.status,
            started_at: row.started_at,
            completed_at: row.completed_at,
            records_processed: row.records_processed,
            api_calls_used: row.api_calls_used,
            error_message: row.error_message,
            created_at: row.created_at,
        }
    }
}

fn require_collector(
    state: &AppState,
    request_id: &str,
) -> Result<Arc<CollectionScheduler>, ApiError> {
    state.collector.clone().ok_or_else(|| {
        ApiError::new(
            request_id,
            "collection_disabled",
            "collection is disabled: SOCIAL_API_KEY is not configured",
        )
    })
}

pub(super) async fn get_plan(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<PlanResponse>>, ApiError> {
    let rid = &req_id.0;
    let collector = require_collector(&state, rid)?;
    let plan = collector
        .plan_cycle()
        .await
        .map_err(|e| map_collector_error(rid.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: PlanResponse {
            usage: plan.usage,
            call_budget: plan.call_budget,
            max_accounts: plan.max_accounts,
            to_process: plan.to_process.into_iter().map(PlannedAccount::from).collect(),
            to_skip: plan.to_skip.into_iter().map(PlannedAccount::from).collect(),
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// POST /api/v1/collection/run
///
/// Runs the cycle inline and returns its summary.
pub(super) async fn trigger_run(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<RunResponse>>, ApiError> {
    let rid = &req_id.0;
    let collector = require_collector(&state, rid)?;

    let recorded = run_recorded_cycle(&state.pool, &collector, TRIGGER_SOURCE)
        .await
        .map_err(|e| map_collector_error(rid.clone(), &e))?;
    let run = cpdb_db::get_collection_run(&state.pool, recorded.run_id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    tracing::info!(
        run_id = recorded.run_id,
        successful = recorded.summary.successful,
        failed = recorded.summary.failed,
        skipped = recorded.summary.skipped,
        api_calls_used = recorded.summary.api_calls_used,
        "api: collection cycle complete"
    );

    Ok(Json(ApiResponse {
        data: RunResponse {
            collection_run_id: run.public_id,
            summary: recorded.summary,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

pub(super) async fn list_runs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<CollectionRunsQuery>,
) -> Result<Json<ApiResponse<Vec<CollectionRunItem>>>, ApiError> {
    let rows = cpdb_db::list_collection_runs(&state.pool, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: rows.into_iter().map(CollectionRunItem::from).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}
