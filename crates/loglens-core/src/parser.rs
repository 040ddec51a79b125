// Header line parser for application container logs
//
// A header looks like: "22/01/24 14:30:45 INFO scheduler.DAGScheduler: msg"
// Anything that doesn't match is a continuation of the previous entry.

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::path::Path;
use tracing::warn;

pub const LEVEL_UNKNOWN: &str = "UNKNOWN";
pub const COMPONENT_ORPHAN: &str = "ORPHAN";
pub const UNKNOWN_APPLICATION: &str = "unknown_application";

/// Fields pulled out of a matched header line.
#[derive(Debug, Clone, PartialEq)]
pub struct LogHeader {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub component: String,
    /// Remainder after the colon, trimmed. Continuation lines get appended later.
    pub content: String,
}

pub struct HeaderParser {
    // Groups: 1:date 2:time 3:level 4:component 5:content
    header_regex: Regex,
}

impl HeaderParser {
    pub fn new() -> Self {
        Self {
            header_regex: Regex::new(
                r"^(\d{2}/\d{2}/\d{2})\s+(\d{2}:\d{2}:\d{2})\s+(\w+)\s+([\w\.\-]+)\s*:\s*(.*)$",
            )
            .unwrap(),
        }
    }

    /// Returns the header fields if the line is a header, None for continuations.
    pub fn parse_header(&self, line: &str) -> Option<LogHeader> {
        let caps = self.header_regex.captures(line)?;

        let date_str = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let time_str = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        let level = caps.get(3).map(|m| m.as_str()).unwrap_or("");
        let component = caps.get(4).map(|m| m.as_str()).unwrap_or("");
        let content = caps.get(5).map(|m| m.as_str()).unwrap_or("").trim();

        // YY/MM/DD HH:MM:SS, stored in UTC. A matched line with a bogus
        // timestamp (month 13 etc) still counts as a header, we stamp it
        // with the wall clock instead.
        let datetime = format!("{} {}", date_str, time_str);
        let timestamp = match NaiveDateTime::parse_from_str(&datetime, "%y/%m/%d %H:%M:%S") {
            Ok(naive) => naive.and_utc(),
            Err(e) => {
                warn!(datetime = %datetime, error = %e, "Failed to parse header timestamp, using wall clock");
                Utc::now()
            }
        };

        Some(LogHeader {
            timestamp,
            level: level.to_uppercase(),
            component: component.to_string(),
            content: content.to_string(),
        })
    }
}

impl Default for HeaderParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Application id comes from the directory the log file sits in,
/// e.g. /logs/application_1724680_0001/container_01.log
pub fn extract_application_id(path: &Path) -> String {
    let base = path
        .parent()
        .and_then(|dir| dir.file_name())
        .and_then(|name| name.to_str());

    match base {
        Some(name) if name.starts_with("application_") => name.to_string(),
        _ => UNKNOWN_APPLICATION.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_valid_header() {
        let parser = HeaderParser::new();
        let header = parser
            .parse_header("22/01/24 14:30:45 INFO logger.component: This is a log message")
            .expect("should match");

        assert_eq!(
            header.timestamp,
            Utc.with_ymd_and_hms(2022, 1, 24, 14, 30, 45).unwrap()
        );
        assert_eq!(header.level, "INFO");
        assert_eq!(header.component, "logger.component");
        assert_eq!(header.content, "This is a log message");
    }

    #[test]
    fn test_level_is_uppercased() {
        let parser = HeaderParser::new();
        let header = parser
            .parse_header("22/01/24 14:30:45 warn hadoop.utils: something odd")
            .unwrap();
        assert_eq!(header.level, "WARN");
    }

    #[test]
    fn test_extra_spaces_before_content() {
        let parser = HeaderParser::new();
        let header = parser
            .parse_header("22/01/24 14:30:45 WARN hadoop.utils:   Multiple spaces before content")
            .unwrap();
        assert_eq!(header.content, "Multiple spaces before content");
    }

    #[test]
    fn test_hyphenated_component() {
        let parser = HeaderParser::new();
        let header = parser
            .parse_header("22/01/24 14:30:45 ERROR app-name: Error occurred")
            .unwrap();
        assert_eq!(header.component, "app-name");
    }

    #[test]
    fn test_continuation_is_not_a_header() {
        let parser = HeaderParser::new();
        assert!(parser.parse_header("    at java.lang.Thread.run(Thread.java:748)").is_none());
        assert!(parser.parse_header("").is_none());
        assert!(parser.parse_header("random text").is_none());
    }

    #[test]
    fn test_bogus_timestamp_falls_back_to_wall_clock() {
        let parser = HeaderParser::new();
        let before = Utc::now();
        // month 13 matches the regex but not the calendar
        let header = parser
            .parse_header("22/13/24 14:30:45 INFO a.B: hello")
            .expect("regex still matches");
        assert!(header.timestamp >= before);
        assert_eq!(header.level, "INFO");
    }

    #[test]
    fn test_extract_application_id() {
        assert_eq!(
            extract_application_id(Path::new("/tmp/application_12345_0001/container.log")),
            "application_12345_0001"
        );
        assert_eq!(
            extract_application_id(Path::new("/var/log/other/system.log")),
            UNKNOWN_APPLICATION
        );
        assert_eq!(
            extract_application_id(Path::new("container.log")),
            UNKNOWN_APPLICATION
        );
    }
}
