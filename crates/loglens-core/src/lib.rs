//! Core types for the log pipeline
//! this crate contains the shared data structures used across all components.

pub mod metrics;
pub mod parser;
pub mod query;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// LOG ENTRY //

/// A fully stitched log record: one header line plus any continuation lines.
/// This is what goes over the broker and into the search index, so the
/// serde names are the wire names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,

    /// Short uppercase token (INFO/WARN/ERROR/DEBUG, or UNKNOWN)
    pub level: String,

    /// Dotted or hyphenated logger name, or UNKNOWN/ORPHAN
    pub component: String,

    /// Stitched message body (may span multiple lines)
    pub content: String,

    /// application_<digits>_<digits>, or unknown_application
    pub application: String,

    pub source_file: String,

    /// The original file lines joined by '\n', untouched
    #[serde(rename = "raw_log")]
    pub raw: String,
}

// METRIC EVENT //

pub const METRIC_LOG_EVENT: &str = "log_event";
pub const METRIC_ERROR_EVENT: &str = "error_event";

/// One row in the time-series store. Extracted from a LogEntry by the
/// metric extractor: every entry yields a log_event, errors also yield
/// an error_event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEvent {
    pub time: DateTime<Utc>,
    pub metric_name: String,
    pub application: String,
    pub tags: HashMap<String, String>,
}
