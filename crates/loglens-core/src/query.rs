// Shared request/response types for the query layer

use crate::LogEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sort requested by a caller (or by the LLM on their behalf)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    /// "asc" or "desc"
    pub order: String,
}

// LOG SEARCH //

#[derive(Debug, Clone)]
pub struct LogSearchRequest {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Free text, empty means no text clause
    pub query: String,
    pub levels: Vec<String>,
    pub applications: Vec<String>,
    pub sort_by: String,
    pub sort_order: String,
    pub page: usize,
    pub size: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogSearchResponse {
    pub logs: Vec<LogEntry>,
    #[serde(rename = "totalCount")]
    pub total_count: i64,
    pub page: usize,
    pub size: usize,
}

// METRIC QUERIES //

#[derive(Debug, Clone)]
pub struct MetricSummaryRequest {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub applications: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricSummaryResponse {
    #[serde(rename = "totalLogEvents")]
    pub total_log_events: i64,
    #[serde(rename = "totalErrorEvents")]
    pub total_error_events: i64,
}

#[derive(Debug, Clone)]
pub struct MetricTimeseriesRequest {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub applications: Vec<String>,
    /// "log_event" or "error_event"
    pub metric_name: String,
    /// e.g. "5 minute", "1 hour"
    pub interval: String,
    /// "level", "component", "error_key", "application", "total" or ""
    pub group_by: String,
    pub sort: Option<SortSpec>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeseriesPoint {
    /// Epoch milliseconds of the bucket start
    pub timestamp: i64,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeseriesSeries {
    /// Group key, e.g. "INFO" or "YarnAllocator", "total" when ungrouped
    pub name: String,
    pub data: Vec<TimeseriesPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricTimeseriesResponse {
    pub series: Vec<TimeseriesSeries>,
}

#[derive(Debug, Clone)]
pub struct MetricDistributionRequest {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub applications: Vec<String>,
    pub metric_name: String,
    /// "level", "component", "error_key" or "application"
    pub dimension: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionItem {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricDistributionResponse {
    pub items: Vec<DistributionItem>,
}

#[derive(Debug, Clone)]
pub struct ApplicationListRequest {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplicationListResponse {
    pub applications: Vec<String>,
}
