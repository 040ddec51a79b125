use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use loglens_core::query::{
    MetricDistributionRequest, MetricDistributionResponse, MetricSummaryRequest,
    MetricSummaryResponse, MetricTimeseriesRequest, MetricTimeseriesResponse,
};
use std::sync::Arc;
use tracing::{error, info};

use crate::handlers::{parse_window, split_csv};
use crate::models::{ApiError, DistributionParams, TimeWindowParams, TimeseriesParams};
use crate::state::AppState;

/// GET /api/v1/metrics/summary
pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TimeWindowParams>,
) -> Result<Json<MetricSummaryResponse>, (StatusCode, Json<ApiError>)> {
    let (start_time, end_time) = parse_window(&params.start_time, &params.end_time)?;

    info!(start = %start_time, end = %end_time, "Getting summary metrics");

    state
        .metric_repo
        .summary(MetricSummaryRequest {
            start_time,
            end_time,
            applications: split_csv(&params.applications),
        })
        .await
        .map(Json)
        .map_err(|e| {
            error!(error = %e, "Error getting summary metrics");
            ApiError::from_store(e)
        })
}

/// GET /api/v1/metrics/timeseries
pub async fn get_timeseries(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TimeseriesParams>,
) -> Result<Json<MetricTimeseriesResponse>, (StatusCode, Json<ApiError>)> {
    let (start_time, end_time) = parse_window(&params.start_time, &params.end_time)?;

    if params.metric_name.is_empty() {
        return Err(ApiError::bad_request("metricName is required"));
    }
    if params.interval.is_empty() {
        return Err(ApiError::bad_request("interval is required"));
    }

    let req = MetricTimeseriesRequest {
        start_time,
        end_time,
        applications: split_csv(&params.applications),
        metric_name: params.metric_name,
        interval: params.interval,
        group_by: params.group_by.unwrap_or_else(|| "total".to_string()),
        sort: None,
        limit: None,
    };

    info!(
        metric = %req.metric_name,
        interval = %req.interval,
        group_by = %req.group_by,
        "Getting timeseries metrics"
    );

    state.metric_repo.timeseries(req).await.map(Json).map_err(|e| {
        error!(error = %e, "Error getting timeseries metrics");
        ApiError::from_store(e)
    })
}

/// GET /api/v1/metrics/distribution
pub async fn get_distribution(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DistributionParams>,
) -> Result<Json<MetricDistributionResponse>, (StatusCode, Json<ApiError>)> {
    let (start_time, end_time) = parse_window(&params.start_time, &params.end_time)?;

    let req = MetricDistributionRequest {
        start_time,
        end_time,
        applications: split_csv(&params.applications),
        metric_name: params.metric_name,
        dimension: params.dimension,
    };

    info!(metric = %req.metric_name, dimension = %req.dimension, "Getting distribution metrics");

    state.metric_repo.distribution(req).await.map(Json).map_err(|e| {
        error!(error = %e, "Error getting distribution metrics");
        ApiError::from_store(e)
    })
}
