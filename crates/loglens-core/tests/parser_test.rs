use loglens_core::metrics::MetricExtractor;
use loglens_core::parser::{extract_application_id, HeaderParser};
use loglens_core::{LogEntry, METRIC_ERROR_EVENT, METRIC_LOG_EVENT};
use std::path::Path;

#[test]
fn test_header_parser_spark_style_lines() {
    let parser = HeaderParser::new();

    let lines = [
        "22/01/24 14:30:45 INFO scheduler.DAGScheduler: Job 0 finished",
        "22/01/24 14:30:46 WARN storage.BlockManager: Block replication failed",
        "22/01/24 14:30:47 ERROR executor.Executor: Exception in task 3.0",
    ];

    for line in lines {
        let header = parser.parse_header(line);
        assert!(header.is_some(), "should parse: {}", line);
    }

    let header = parser.parse_header(lines[2]).unwrap();
    assert_eq!(header.level, "ERROR");
    assert_eq!(header.component, "executor.Executor");
    assert_eq!(header.content, "Exception in task 3.0");
}

#[test]
fn test_header_parser_rejects_continuations() {
    let parser = HeaderParser::new();

    let continuations = [
        "\tat org.apache.spark.scheduler.DAGScheduler.abortStage(DAGScheduler.scala:1890)",
        "    at java.lang.Thread.run(Thread.java:748)",
        "Caused by: java.io.IOException: broken pipe",
        "2022-01-24 14:30:45 INFO wrong.date.format: not a header here",
    ];

    for line in continuations {
        assert!(parser.parse_header(line).is_none(), "should not parse: {}", line);
    }
}

#[test]
fn test_application_id_from_parent_dir() {
    assert_eq!(
        extract_application_id(Path::new("/data/logs/application_1724680_0003/container_02.log")),
        "application_1724680_0003"
    );
    // parent dir must carry the application_ prefix
    assert_eq!(
        extract_application_id(Path::new("/data/logs/app_1724680/container_02.log")),
        "unknown_application"
    );
}

#[test]
fn test_log_entry_wire_names() {
    let parser = HeaderParser::new();
    let header = parser
        .parse_header("22/01/24 14:30:45 INFO a.B: hello")
        .unwrap();

    let entry = LogEntry {
        timestamp: header.timestamp,
        level: header.level,
        component: header.component,
        content: header.content,
        application: "application_1_2".to_string(),
        source_file: "/logs/application_1_2/c.log".to_string(),
        raw: "22/01/24 14:30:45 INFO a.B: hello".to_string(),
    };

    let value = serde_json::to_value(&entry).unwrap();
    // the index and the broker both rely on these exact field names
    assert!(value.get("@timestamp").is_some());
    assert!(value.get("raw_log").is_some());
    assert!(value.get("source_file").is_some());
    assert!(value.get("raw").is_none());

    let back: LogEntry = serde_json::from_value(value).unwrap();
    assert_eq!(back, entry);
}

#[test]
fn test_extractor_on_parsed_entries() {
    let parser = HeaderParser::new();
    let extractor = MetricExtractor::new();

    let header = parser
        .parse_header("22/01/24 14:30:46 ERROR a.B: boom")
        .unwrap();
    let entry = LogEntry {
        timestamp: header.timestamp,
        level: header.level,
        component: header.component,
        content: header.content,
        application: "application_1_2".to_string(),
        source_file: "/logs/application_1_2/c.log".to_string(),
        raw: "22/01/24 14:30:46 ERROR a.B: boom".to_string(),
    };

    let events = extractor.extract(&entry);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].metric_name, METRIC_LOG_EVENT);
    assert_eq!(events[1].metric_name, METRIC_ERROR_EVENT);
    assert_eq!(events[1].time, entry.timestamp);
}
