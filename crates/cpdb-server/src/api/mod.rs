mod accounts;
mod collection;
mod quota;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use cpdb_collector::{
    CollectionScheduler, CollectorError, PgAccountStore, QuotaPolicy, QuotaTracker,
};
use cpdb_core::CollectorSettings;
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{enforce_rate_limit, request_id, RateLimitState, RequestId};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub store: Arc<PgAccountStore>,
    pub tracker: QuotaTracker,
    /// `None` when no social API key is configured; collection is disabled.
    pub collector: Option<Arc<CollectionScheduler>>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        settings: &CollectorSettings,
        collector: Option<Arc<CollectionScheduler>>,
    ) -> Self {
        Self {
            store: Arc::new(PgAccountStore::new(pool.clone())),
            pool,
            tracker: QuotaTracker::new(QuotaPolicy::from(settings)),
            collector,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
    collection: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" | "cycle_in_progress" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "collection_disabled" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn normalize_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 200)
}

pub(super) fn map_db_error(request_id: String, error: &cpdb_db::DbError) -> ApiError {
    tracing::error!(error = %error, "database query failed");
    ApiError::new(request_id, "internal_error", "database query failed")
}

pub(super) fn map_collector_error(request_id: String, error: &CollectorError) -> ApiError {
    match error {
        CollectorError::CycleInProgress => {
            ApiError::new(request_id, "cycle_in_progress", error.to_string())
        }
        CollectorError::InvalidHandle(_) => {
            ApiError::new(request_id, "validation_error", error.to_string())
        }
        CollectorError::DuplicateHandle(_) => {
            ApiError::new(request_id, "conflict", error.to_string())
        }
        CollectorError::AccountNotFound(_) => {
            ApiError::new(request_id, "not_found", error.to_string())
        }
        CollectorError::Store(e) => map_db_error(request_id, e),
        CollectorError::Config(_) => {
            tracing::error!(error = %error, "collector misconfigured");
            ApiError::new(request_id, "internal_error", "collector misconfigured")
        }
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static("x-request-id")])
}

fn api_router(rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/accounts",
            get(accounts::list_accounts).post(accounts::create_account),
        )
        .route("/api/v1/accounts/count", get(accounts::count_accounts))
        .route(
            "/api/v1/accounts/{id}",
            get(accounts::get_account).delete(accounts::delete_account),
        )
        .route("/api/v1/accounts/{id}/posts", get(accounts::list_posts))
        .route("/api/v1/quota", get(quota::get_quota))
        .route("/api/v1/collection/plan", get(collection::get_plan))
        .route("/api/v1/collection/run", post(collection::trigger_run))
        .route("/api/v1/collection/runs", get(collection::list_runs))
        .layer(axum::middleware::from_fn_with_state(
            rate_limit,
            enforce_rate_limit,
        ))
}

pub fn build_app(state: AppState, rate_limit: RateLimitState) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(api_router(rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);
    let collection = if state.collector.is_some() {
        "enabled"
    } else {
        "disabled"
    };

    match cpdb_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                    collection,
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                        collection,
                    },
                    meta,
                }),
            )
        }
    }
}

pub fn rate_limit_state(per_minute: usize) -> RateLimitState {
    RateLimitState::new(per_minute, Duration::from_secs(60))
}
