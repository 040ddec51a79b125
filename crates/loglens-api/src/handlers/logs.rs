use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use loglens_core::query::{ApplicationListRequest, ApplicationListResponse, LogSearchRequest, LogSearchResponse};
use std::sync::Arc;
use tracing::{error, info};

use crate::handlers::{parse_window, split_csv};
use crate::models::{ApiError, LogSearchParams, TimeWindowParams};
use crate::state::AppState;

/// GET /api/v1/logs
pub async fn search_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LogSearchParams>,
) -> Result<Json<LogSearchResponse>, (StatusCode, Json<ApiError>)> {
    let (start_time, end_time) = parse_window(&params.start_time, &params.end_time)?;

    let req = LogSearchRequest {
        start_time,
        end_time,
        query: params.query.unwrap_or_default(),
        levels: split_csv(&params.levels),
        applications: split_csv(&params.applications),
        sort_by: params.sort_by.unwrap_or_else(|| "@timestamp".to_string()),
        sort_order: params.sort_order.unwrap_or_else(|| "desc".to_string()),
        page: params.page.unwrap_or(1),
        size: params.size.unwrap_or(50),
    };

    info!(
        query = %req.query,
        levels = ?req.levels,
        page = req.page,
        size = req.size,
        "Searching logs"
    );

    state.log_repo.search(req).await.map(Json).map_err(|e| {
        error!(error = %e, "Error searching logs");
        ApiError::from_store(e)
    })
}

/// GET /api/v1/logs/applications
pub async fn get_applications(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TimeWindowParams>,
) -> Result<Json<ApplicationListResponse>, (StatusCode, Json<ApiError>)> {
    let (start_time, end_time) = parse_window(&params.start_time, &params.end_time)?;

    state
        .metric_repo
        .applications(ApplicationListRequest {
            start_time,
            end_time,
        })
        .await
        .map(Json)
        .map_err(|e| {
            error!(error = %e, "Error getting applications");
            ApiError::from_store(e)
        })
}
