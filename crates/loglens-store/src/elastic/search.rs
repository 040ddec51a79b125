// Log search against the daily indices
//
// Builds the search DSL body as plain JSON. Sorting on text fields goes
// through their .keyword sub-field, @timestamp is used as-is.

use crate::elastic::client::EsClient;
use crate::{LogRepository, StoreError};
use async_trait::async_trait;
use loglens_core::query::{LogSearchRequest, LogSearchResponse};
use loglens_core::LogEntry;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

const QUERY_FIELDS: [&str; 5] = ["content", "component", "application", "level", "raw_log"];
const KEYWORD_SORT_FIELDS: [&str; 4] = ["level", "component", "application", "source_file"];

pub struct ElasticLogRepository {
    client: Arc<EsClient>,
    index_prefix: String,
}

impl ElasticLogRepository {
    pub fn new(client: Arc<EsClient>, index_prefix: impl Into<String>) -> Self {
        Self {
            client,
            index_prefix: index_prefix.into(),
        }
    }

    fn index_pattern(&self) -> String {
        format!("{}-*", self.index_prefix)
    }
}

/// Fill defaults and clamp out-of-range inputs.
pub fn normalize(mut req: LogSearchRequest) -> LogSearchRequest {
    if req.page == 0 {
        req.page = 1;
    }
    if req.size == 0 || req.size > 1000 {
        req.size = 500;
    }
    if req.sort_by.is_empty() {
        req.sort_by = "@timestamp".to_string();
    }
    req.sort_order = req.sort_order.to_lowercase();
    if req.sort_order != "asc" && req.sort_order != "desc" {
        req.sort_order = "desc".to_string();
    }
    for level in &mut req.levels {
        *level = level.to_uppercase();
    }
    req
}

/// Text fields need their keyword sub-field for sorting. Unknown fields
/// pass through, the index may still know them.
pub fn sort_field(sort_by: &str) -> String {
    if sort_by == "@timestamp" {
        return sort_by.to_string();
    }
    if KEYWORD_SORT_FIELDS.contains(&sort_by) {
        return format!("{}.keyword", sort_by);
    }
    warn!(sort_by, "Unrecognized sort field, passing through unchanged");
    sort_by.to_string()
}

/// The search body for an already normalized request.
pub fn build_search_body(req: &LogSearchRequest) -> Value {
    let mut filters = vec![json!({
        "range": {
            "@timestamp": {
                "gte": req.start_time.to_rfc3339(),
                "lte": req.end_time.to_rfc3339(),
            }
        }
    })];

    if !req.query.is_empty() {
        filters.push(json!({
            "query_string": {
                "query": req.query,
                "fields": QUERY_FIELDS,
                "default_operator": "AND",
            }
        }));
    }

    if !req.levels.is_empty() {
        filters.push(json!({
            "terms": { "level.keyword": req.levels }
        }));
    }

    if !req.applications.is_empty() {
        filters.push(json!({
            "terms": { "application.keyword": req.applications }
        }));
    }

    let from = (req.page - 1) * req.size;

    let mut sort_clause = serde_json::Map::new();
    sort_clause.insert(sort_field(&req.sort_by), json!({ "order": req.sort_order }));

    json!({
        "query": { "bool": { "filter": filters } },
        "from": from,
        "size": req.size,
        "sort": [ Value::Object(sort_clause) ],
    })
}

#[async_trait]
impl LogRepository for ElasticLogRepository {
    async fn search(&self, req: LogSearchRequest) -> Result<LogSearchResponse, StoreError> {
        if req.end_time < req.start_time {
            return Err(StoreError::InvalidRequest(
                "endTime cannot be before startTime".to_string(),
            ));
        }

        let req = normalize(req);
        let body = build_search_body(&req);

        let resp = self
            .client
            .search(&self.index_pattern(), &body)
            .await
            .map_err(|e| StoreError::Search(e.to_string()))?;

        let mut logs = Vec::with_capacity(resp.hits.hits.len());
        for hit in resp.hits.hits {
            match serde_json::from_value::<LogEntry>(hit.source) {
                Ok(entry) => logs.push(entry),
                Err(e) => warn!(error = %e, "Skipping hit with unexpected source shape"),
            }
        }

        debug!(total = resp.hits.total.value, returned = logs.len(), "Search done");

        Ok(LogSearchResponse {
            logs,
            total_count: resp.hits.total.value,
            page: req.page,
            size: req.size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn req() -> LogSearchRequest {
        LogSearchRequest {
            start_time: Utc.with_ymd_and_hms(2022, 1, 24, 9, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2022, 1, 24, 10, 0, 0).unwrap(),
            query: String::new(),
            levels: vec![],
            applications: vec![],
            sort_by: "@timestamp".to_string(),
            sort_order: "desc".to_string(),
            page: 1,
            size: 50,
        }
    }

    #[test]
    fn test_sort_keyword_fixup() {
        assert_eq!(sort_field("level"), "level.keyword");
        assert_eq!(sort_field("component"), "component.keyword");
        assert_eq!(sort_field("application"), "application.keyword");
        assert_eq!(sort_field("source_file"), "source_file.keyword");
        // timestamp is a date field, no keyword variant
        assert_eq!(sort_field("@timestamp"), "@timestamp");
        // unknown fields pass through
        assert_eq!(sort_field("whatever"), "whatever");
    }

    #[test]
    fn test_body_sorts_on_component_keyword() {
        let mut r = req();
        r.sort_by = "component".to_string();
        let body = build_search_body(&r);

        let sort = &body["sort"][0];
        assert!(sort.get("component.keyword").is_some());
        assert_eq!(sort["component.keyword"]["order"], "desc");
    }

    #[test]
    fn test_body_time_range_and_pagination() {
        let mut r = req();
        r.page = 3;
        r.size = 20;
        let body = build_search_body(&r);

        assert_eq!(body["from"], 40);
        assert_eq!(body["size"], 20);

        let range = &body["query"]["bool"]["filter"][0]["range"]["@timestamp"];
        assert_eq!(range["gte"], "2022-01-24T09:00:00+00:00");
        assert_eq!(range["lte"], "2022-01-24T10:00:00+00:00");
    }

    #[test]
    fn test_body_text_query_uses_and_operator() {
        let mut r = req();
        r.query = "connection refused".to_string();
        let body = build_search_body(&r);

        let qs = &body["query"]["bool"]["filter"][1]["query_string"];
        assert_eq!(qs["query"], "connection refused");
        assert_eq!(qs["default_operator"], "AND");
        assert_eq!(qs["fields"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn test_body_level_and_application_terms() {
        let mut r = req();
        r.levels = vec!["ERROR".to_string(), "WARN".to_string()];
        r.applications = vec!["application_1_1".to_string()];
        let body = build_search_body(&r);

        let filters = body["query"]["bool"]["filter"].as_array().unwrap();
        assert_eq!(filters.len(), 3);
        assert_eq!(filters[1]["terms"]["level.keyword"][0], "ERROR");
        assert_eq!(filters[2]["terms"]["application.keyword"][0], "application_1_1");
    }

    #[test]
    fn test_normalize_defaults_and_clamps() {
        let mut r = req();
        r.page = 0;
        r.size = 5000;
        r.sort_by = String::new();
        r.sort_order = "ASC".to_string();
        r.levels = vec!["error".to_string()];

        let n = normalize(r);
        assert_eq!(n.page, 1);
        assert_eq!(n.size, 500);
        assert_eq!(n.sort_by, "@timestamp");
        assert_eq!(n.sort_order, "asc");
        assert_eq!(n.levels, vec!["ERROR".to_string()]);
    }

    #[test]
    fn test_normalize_rejects_garbage_sort_order() {
        let mut r = req();
        r.sort_order = "sideways".to_string();
        let n = normalize(r);
        assert_eq!(n.sort_order, "desc");
    }
}
