//! Store access for the two sinks of the pipeline
//!
//! - `elastic`: the full-text search index (daily indices, bulk writes, search DSL)
//! - `timescale`: the metric hypertable (copy inserts, time_bucket aggregation)
//!
//! The consumer loop and the query layer talk to these through the traits
//! below so tests can swap in hand-rolled doubles.

pub mod elastic;
pub mod timescale;

use async_trait::async_trait;
use loglens_core::query::{
    ApplicationListRequest, ApplicationListResponse, LogSearchRequest, LogSearchResponse,
    MetricDistributionRequest, MetricDistributionResponse, MetricSummaryRequest,
    MetricSummaryResponse, MetricTimeseriesRequest, MetricTimeseriesResponse,
};
use loglens_core::{LogEntry, MetricEvent};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("search index error: {0}")]
    Search(String),

    #[error("time-series store error: {0}")]
    Timeseries(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Write side of the search index.
#[async_trait]
pub trait LogStore: Send + Sync {
    async fn store_logs(&self, logs: &[LogEntry]) -> Result<(), StoreError>;
}

/// Write side of the metric hypertable.
#[async_trait]
pub trait MetricStore: Send + Sync {
    async fn store_metric_events(&self, events: &[MetricEvent]) -> Result<(), StoreError>;
}

/// Read side of the search index.
#[async_trait]
pub trait LogRepository: Send + Sync {
    async fn search(&self, req: LogSearchRequest) -> Result<LogSearchResponse, StoreError>;
}

/// Read side of the metric hypertable.
#[async_trait]
pub trait MetricRepository: Send + Sync {
    async fn summary(&self, req: MetricSummaryRequest) -> Result<MetricSummaryResponse, StoreError>;

    async fn timeseries(
        &self,
        req: MetricTimeseriesRequest,
    ) -> Result<MetricTimeseriesResponse, StoreError>;

    async fn distribution(
        &self,
        req: MetricDistributionRequest,
    ) -> Result<MetricDistributionResponse, StoreError>;

    async fn applications(
        &self,
        req: ApplicationListRequest,
    ) -> Result<ApplicationListResponse, StoreError>;
}
