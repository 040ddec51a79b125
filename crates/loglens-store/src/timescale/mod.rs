// TimescaleDB access: hypertable bootstrap, copy inserts, aggregation queries

pub mod queries;
pub mod store;

pub use queries::TimescaleMetricRepository;
pub use store::{TimescaleConfig, TimescaleMetricStore};

/// Hypertable holding one row per metric event.
pub const METRIC_EVENTS_TABLE: &str = "log_metric_events";
