// Flexible time parsing for query boundaries
//
// Accepts RFC 3339, epoch milliseconds, "now" and relative offsets like
// "now-1h" or "now-1h30m".

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum TimeParseError {
    #[error("invalid time format: {0}")]
    Invalid(String),
}

fn duration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:(\d+)d)?(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?$").unwrap())
}

fn parse_offset(spec: &str) -> Option<Duration> {
    if spec.is_empty() {
        return None;
    }
    let caps = duration_regex().captures(spec)?;

    let get = |i: usize| {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<i64>().ok())
            .unwrap_or(0)
    };

    let total = Duration::days(get(1))
        + Duration::hours(get(2))
        + Duration::minutes(get(3))
        + Duration::seconds(get(4));
    (total > Duration::zero()).then_some(total)
}

/// RFC 3339 or epoch milliseconds. Used for HTTP query params.
pub fn parse_time_flexible(input: &str) -> Result<DateTime<Utc>, TimeParseError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(input) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(ms) = input.parse::<i64>() {
        if let Some(ts) = DateTime::from_timestamp_millis(ms) {
            return Ok(ts);
        }
    }
    Err(TimeParseError::Invalid(input.to_string()))
}

/// Everything parse_time_flexible takes, plus "now" and "now-<offset>".
/// Used for the time ranges the LLM hands back.
pub fn parse_time_input(input: &str) -> Result<DateTime<Utc>, TimeParseError> {
    let trimmed = input.trim();

    if let Some(rest) = trimmed.strip_prefix("now") {
        if rest.is_empty() {
            return Ok(Utc::now());
        }
        if let Some(spec) = rest.strip_prefix('-') {
            if let Some(offset) = parse_offset(spec) {
                return Ok(Utc::now() - offset);
            }
        }
        return Err(TimeParseError::Invalid(input.to_string()));
    }

    parse_time_flexible(trimmed)
}
