mod logs;
mod metrics;
mod nlv;

pub use logs::*;
pub use metrics::*;
pub use nlv::*;

use crate::models::ApiError;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use loglens_nlv::parse_time_flexible;

/// startTime/endTime query params: ISO 8601 or epoch milliseconds,
/// end must not precede start.
pub fn parse_window(
    start: &str,
    end: &str,
) -> Result<(DateTime<Utc>, DateTime<Utc>), (StatusCode, Json<ApiError>)> {
    let start_time = parse_time_flexible(start).map_err(|_| {
        ApiError::bad_request("invalid startTime format. Use ISO 8601 or epoch milliseconds")
    })?;
    let end_time = parse_time_flexible(end).map_err(|_| {
        ApiError::bad_request("invalid endTime format. Use ISO 8601 or epoch milliseconds")
    })?;
    if end_time < start_time {
        return Err(ApiError::bad_request("endTime cannot be before startTime"));
    }
    Ok((start_time, end_time))
}

pub fn split_csv(raw: &Option<String>) -> Vec<String> {
    raw.as_deref()
        .unwrap_or("")
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_csv() {
        assert!(split_csv(&None).is_empty());
        assert!(split_csv(&Some("".to_string())).is_empty());
        assert_eq!(
            split_csv(&Some("ERROR, WARN ,".to_string())),
            vec!["ERROR".to_string(), "WARN".to_string()]
        );
    }

    #[test]
    fn test_parse_window_rejects_reversed_bounds() {
        assert!(parse_window("2022-01-24T10:00:00Z", "2022-01-24T09:00:00Z").is_err());
        assert!(parse_window("2022-01-24T09:00:00Z", "2022-01-24T10:00:00Z").is_ok());
        assert!(parse_window("not a time", "2022-01-24T10:00:00Z").is_err());
    }
}
