use axum::{extract::State, Extension, Json};
use chrono::Utc;
use cpdb_collector::{AccountStore, QuotaUsage};
use serde::Serialize;

use crate::middleware::RequestId;

use super::{map_collector_error, map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Serialize)]
pub(super) struct QuotaReport {
    #[serde(flatten)]
    usage: QuotaUsage,
    tracked_accounts: u64,
    daily_safety_cap: u32,
    calls_per_account_refresh: u32,
    /// Calls the next cycle may spend if it started now.
    call_budget: u64,
    max_accounts_next_cycle: u64,
    over_pace: bool,
}

/// GET /api/v1/quota
pub(super) async fn get_quota(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<QuotaReport>>, ApiError> {
    let rid = &req_id.0;
    let usage = state
        .tracker
        .current_usage(state.store.as_ref(), Utc::now())
        .await
        .map_err(|e| map_collector_error(rid.clone(), &e))?;
    let tracked_accounts = state
        .store
        .count_tracked_accounts()
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    let policy = state.tracker.policy();
    let call_budget = state.tracker.affordable_call_budget(&usage);

    Ok(Json(ApiResponse {
        data: QuotaReport {
            over_pace: usage.is_over_pace(),
            usage,
            tracked_accounts,
            daily_safety_cap: policy.daily_safety_cap,
            calls_per_account_refresh: policy.calls_per_account_refresh,
            call_budget,
            max_accounts_next_cycle: state.tracker.max_accounts_for(call_budget),
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::api::test_support::{app_without_collector, send};

    #[sqlx::test(migrations = "../../migrations")]
    async fn empty_workspace_has_the_full_budget(pool: sqlx::PgPool) {
        let (status, json) = send(
            app_without_collector(pool),
            Method::GET,
            "/api/v1/quota",
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["mode"], "estimate");
        assert_eq!(json["data"]["consumed"], 0);
        assert_eq!(json["data"]["remaining"], 1_000);
        assert_eq!(json["data"]["call_budget"], 30);
        assert_eq!(json["data"]["max_accounts_next_cycle"], 15);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn estimate_grows_with_tracked_accounts(pool: sqlx::PgPool) {
        for handle in ["aave", "curve", "lido"] {
            let (status, _) = send(
                app_without_collector(pool.clone()),
                Method::POST,
                "/api/v1/accounts",
                Some(json!({ "handle": handle })),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (_, json) = send(
            app_without_collector(pool),
            Method::GET,
            "/api/v1/quota",
            None,
        )
        .await;

        assert_eq!(json["data"]["tracked_accounts"], 3);
        let day = json["data"]["day_of_month"].as_u64().expect("day");
        assert_eq!(
            json["data"]["consumed"].as_u64(),
            Some((3 * 2 * day).min(1_000))
        );
    }
}
