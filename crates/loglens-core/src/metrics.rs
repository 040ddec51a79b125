// Metric extraction - maps one LogEntry to 0..2 MetricEvents

use crate::parser::{COMPONENT_ORPHAN, LEVEL_UNKNOWN};
use crate::{LogEntry, MetricEvent, METRIC_ERROR_EVENT, METRIC_LOG_EVENT};
use regex::Regex;
use std::collections::HashMap;

pub struct MetricExtractor {
    exception_regex: Regex,
}

impl MetricExtractor {
    pub fn new() -> Self {
        Self {
            exception_regex: Regex::new(r"(?i)(exception|error|fail|caused by)").unwrap(),
        }
    }

    /// Every entry produces a log_event counted by level and component.
    /// Entries classified as errors additionally produce an error_event
    /// whose error_key is the message body.
    pub fn extract(&self, entry: &LogEntry) -> Vec<MetricEvent> {
        let mut events = Vec::with_capacity(2);

        let mut log_tags = HashMap::new();
        log_tags.insert("level".to_string(), entry.level.clone());
        log_tags.insert("component".to_string(), entry.component.clone());
        if entry.level == LEVEL_UNKNOWN
            || entry.component == LEVEL_UNKNOWN
            || entry.component == COMPONENT_ORPHAN
        {
            log_tags.insert("parse_status".to_string(), "failed_or_orphan".to_string());
        }

        events.push(MetricEvent {
            time: entry.timestamp,
            metric_name: METRIC_LOG_EVENT.to_string(),
            application: entry.application.clone(),
            tags: log_tags,
        });

        let is_error = entry.level == "ERROR" || self.exception_regex.is_match(&entry.content);

        if is_error {
            let mut error_tags = HashMap::new();
            error_tags.insert("component".to_string(), entry.component.clone());
            error_tags.insert("level".to_string(), entry.level.clone());
            error_tags.insert("error_key".to_string(), entry.content.clone());

            events.push(MetricEvent {
                time: entry.timestamp,
                metric_name: METRIC_ERROR_EVENT.to_string(),
                application: entry.application.clone(),
                tags: error_tags,
            });
        }

        events
    }
}

impl Default for MetricExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(level: &str, component: &str, content: &str) -> LogEntry {
        LogEntry {
            timestamp: Utc::now(),
            level: level.to_string(),
            component: component.to_string(),
            content: content.to_string(),
            application: "application_123_0001".to_string(),
            source_file: "/logs/application_123_0001/c.log".to_string(),
            raw: content.to_string(),
        }
    }

    #[test]
    fn test_info_entry_yields_single_log_event() {
        let extractor = MetricExtractor::new();
        let events = extractor.extract(&entry("INFO", "a.B", "all good"));

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].metric_name, METRIC_LOG_EVENT);
        assert_eq!(events[0].tags.get("level").unwrap(), "INFO");
        assert_eq!(events[0].tags.get("component").unwrap(), "a.B");
        assert!(!events[0].tags.contains_key("parse_status"));
    }

    #[test]
    fn test_error_level_yields_error_event() {
        let extractor = MetricExtractor::new();
        let events = extractor.extract(&entry("ERROR", "a.B", "boom"));

        assert_eq!(events.len(), 2);
        assert_eq!(events[1].metric_name, METRIC_ERROR_EVENT);
        assert_eq!(events[1].tags.get("error_key").unwrap(), "boom");
        assert_eq!(events[1].tags.get("component").unwrap(), "a.B");
    }

    #[test]
    fn test_exception_content_counts_as_error() {
        let extractor = MetricExtractor::new();
        // INFO level but the body mentions an exception
        let events = extractor.extract(&entry(
            "INFO",
            "a.B",
            "java.lang.NullPointerException at Foo.bar",
        ));
        assert_eq!(events.len(), 2);

        let events = extractor.extract(&entry("INFO", "a.B", "Caused by: timeout"));
        assert_eq!(events.len(), 2);

        // case insensitive
        let events = extractor.extract(&entry("WARN", "a.B", "task FAILED after retries"));
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_plain_content_is_not_an_error() {
        let extractor = MetricExtractor::new();
        let events = extractor.extract(&entry("DEBUG", "a.B", "heartbeat ok"));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_orphan_entry_gets_parse_status_tag() {
        let extractor = MetricExtractor::new();
        let events = extractor.extract(&entry("UNKNOWN", "ORPHAN", "    stray line"));

        assert_eq!(events[0].tags.get("parse_status").unwrap(), "failed_or_orphan");
    }
}
