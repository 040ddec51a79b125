// NL query orchestrator
//
// Resolves a conversation, asks the LLM for a structured query plan,
// persists the exchange, then dispatches on the plan's intent against
// the metric or log repository. Semantic failures (bad time range,
// unusable plan) come back as an error-typed response body, not as an
// HTTP error.

use crate::conversation::ConversationStore;
use crate::llm::{LlmClient, PromptTurn};
use crate::models::{
    ConversationTurn, Intent, LlmAnalysis, NlvQueryRequest, NlvQueryResponse, QueryFilter,
};
use crate::timeparse::parse_time_input;
use chrono::{DateTime, Duration, Utc};
use loglens_core::query::{LogSearchRequest, MetricTimeseriesRequest, TimeseriesSeries};
use loglens_store::{LogRepository, MetricRepository};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

const DEFAULT_LOG_SIZE: usize = 50;
const MAX_LOG_SIZE: usize = 1000;

pub struct NlvService {
    llm: Arc<dyn LlmClient>,
    metric_repo: Arc<dyn MetricRepository>,
    log_repo: Arc<dyn LogRepository>,
    conversations: ConversationStore,
    schema_context: String,
}

impl NlvService {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        metric_repo: Arc<dyn MetricRepository>,
        log_repo: Arc<dyn LogRepository>,
    ) -> Self {
        let schema_context = "\
            TimescaleDB table 'log_metric_events': columns time (timestamp), metric_name (text, values: 'log_event', 'error_event'), application (text), tags (jsonb keys: 'level', 'component', 'error_key', 'parse_status').\n\
            Elasticsearch index 'applogs-*': fields @timestamp, level (keyword), component (keyword), application (keyword), content (text), raw_log (text).\n"
            .to_string();

        Self {
            llm,
            metric_repo,
            log_repo,
            conversations: ConversationStore::new(),
            schema_context,
        }
    }

    pub async fn process(&self, req: NlvQueryRequest) -> NlvQueryResponse {
        info!(query = %req.query, "Processing NL query");

        // resolve conversation: unknown or missing ids mint a fresh one
        let (conversation_id, history) = match req.conversation_id.as_deref() {
            Some(id) if !id.is_empty() => match self.conversations.history(id) {
                Ok(history) => {
                    info!(conversation_id = id, history_len = history.len(), "Continuing conversation");
                    (id.to_string(), history)
                }
                Err(_) => {
                    warn!(conversation_id = id, "Conversation id not found, starting new conversation");
                    (self.conversations.create(), Vec::new())
                }
            },
            _ => {
                let id = self.conversations.create();
                info!(new_conversation_id = %id, "Created new conversation");
                (id, Vec::new())
            }
        };

        let turns = build_turns(&history, &req.query, &self.schema_context);
        let raw = match self.llm.generate(&turns).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(error = %e, "LLM analysis failed");
                return error_response(&conversation_id, &req.query, "Failed to analyze query with LLM");
            }
        };

        let analysis = match parse_analysis(&raw) {
            Ok(analysis) => analysis,
            Err(reason) => {
                error!(reason, raw = %raw, "LLM did not return a usable plan");
                return error_response(
                    &conversation_id,
                    &req.query,
                    "The language model did not return a valid analysis.",
                );
            }
        };

        // persist the exchange: the raw user text, then the plan json
        let plan_json = serde_json::to_string(&analysis).unwrap_or_default();
        if let Err(e) = self.conversations.add_turn(
            &conversation_id,
            ConversationTurn {
                role: "user".to_string(),
                content: req.query.clone(),
            },
        ) {
            error!(error = %e, "Failed to save user turn");
        }
        if let Err(e) = self.conversations.add_turn(
            &conversation_id,
            ConversationTurn {
                role: "model".to_string(),
                content: plan_json,
            },
        ) {
            error!(error = %e, "Failed to save model turn");
        }

        match analysis.intent {
            Intent::QueryMetric => self.handle_metric_query(&conversation_id, &req.query, analysis).await,
            Intent::QueryLog => self.handle_log_query(&conversation_id, &req.query, analysis).await,
            Intent::Unknown => {
                warn!(query = %req.query, "LLM returned unknown or unsupported intent");
                error_response(
                    &conversation_id,
                    &req.query,
                    "Sorry, I could not understand that query or it's not supported yet.",
                )
            }
        }
    }

    async fn handle_metric_query(
        &self,
        conversation_id: &str,
        original_query: &str,
        analysis: LlmAnalysis,
    ) -> NlvQueryResponse {
        let (start_time, end_time) = match parse_time_range(&analysis) {
            Ok(bounds) => bounds,
            Err(()) => {
                warn!(range = ?analysis.time_range, "LLM returned an invalid time range");
                return error_response(conversation_id, original_query, "Could not understand the time range.");
            }
        };

        let Some(metric_name) = analysis.metric_name.clone() else {
            return error_response(conversation_id, original_query, "The analysis did not name a metric.");
        };

        let group_by = primary_group_dimension(&analysis.group_by);
        let request = MetricTimeseriesRequest {
            start_time,
            end_time,
            applications: extract_applications(&analysis.filters),
            metric_name,
            interval: determine_interval(start_time, end_time),
            group_by: group_by.clone(),
            sort: analysis.sort.clone(),
            limit: analysis.limit,
        };

        let result = match self.metric_repo.timeseries(request).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Failed to get timeseries metrics");
                return error_response(conversation_id, original_query, "Failed to retrieve metric data.");
            }
        };

        NlvQueryResponse {
            conversation_id: conversation_id.to_string(),
            original_query: original_query.to_string(),
            interpreted_query: Some(analysis),
            result_type: "timeseries".to_string(),
            columns: vec!["timestamp".to_string(), group_by, "value".to_string()],
            data: flatten_timeseries(&result.series),
            error_message: None,
        }
    }

    async fn handle_log_query(
        &self,
        conversation_id: &str,
        original_query: &str,
        analysis: LlmAnalysis,
    ) -> NlvQueryResponse {
        let (start_time, end_time) = match parse_time_range(&analysis) {
            Ok(bounds) => bounds,
            Err(()) => {
                return error_response(conversation_id, original_query, "Could not understand the time range.");
            }
        };

        let (sort_by, sort_order) = match &analysis.sort {
            Some(sort) => {
                let order = sort.order.to_lowercase();
                let order = if order == "asc" || order == "desc" {
                    order
                } else {
                    warn!(order = %sort.order, "Invalid sort order from LLM, defaulting to desc");
                    "desc".to_string()
                };
                (sort.field.clone(), order)
            }
            None => ("@timestamp".to_string(), "desc".to_string()),
        };

        let size = match analysis.limit {
            Some(limit) if limit > 0 => {
                if limit > MAX_LOG_SIZE {
                    warn!(requested = limit, capped = MAX_LOG_SIZE, "LLM limit exceeds max page size, capping");
                    MAX_LOG_SIZE
                } else {
                    limit
                }
            }
            _ => DEFAULT_LOG_SIZE,
        };

        let request = LogSearchRequest {
            start_time,
            end_time,
            query: extract_query_text(&analysis.filters),
            levels: extract_levels(&analysis.filters),
            applications: extract_applications(&analysis.filters),
            sort_by,
            sort_order,
            page: 1,
            size,
        };

        let result = match self.log_repo.search(request).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Failed to search logs");
                return error_response(conversation_id, original_query, "Failed to retrieve log data.");
            }
        };

        let data = result
            .logs
            .iter()
            .map(|log| {
                vec![
                    json!(log.timestamp.timestamp_millis()),
                    json!(log.level),
                    json!(log.component),
                    json!(log.application),
                    json!(log.content),
                    json!(log.raw),
                ]
            })
            .collect();

        NlvQueryResponse {
            conversation_id: conversation_id.to_string(),
            original_query: original_query.to_string(),
            interpreted_query: Some(analysis),
            result_type: "log_list".to_string(),
            columns: [
                "@timestamp",
                "level",
                "component",
                "application",
                "content",
                "raw_log",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            data,
            error_message: None,
        }
    }
}

// PROMPTS //

fn build_turns(history: &[ConversationTurn], query: &str, schema_context: &str) -> Vec<PromptTurn> {
    if history.is_empty() {
        return vec![PromptTurn::user(initial_prompt(query, schema_context))];
    }

    // replay the stored exchange verbatim, then ask for the whole
    // updated plan so follow-ups never yield partial json
    let mut turns: Vec<PromptTurn> = history
        .iter()
        .map(|turn| PromptTurn {
            role: turn.role.clone(),
            text: turn.content.clone(),
        })
        .collect();
    turns.push(PromptTurn::user(follow_up_prompt(query)));
    turns
}

fn initial_prompt(user_query: &str, schema_context: &str) -> String {
    format!(
        r#"Analyze the user's natural language query to extract structured information for querying logs or metrics. Respond *ONLY* with a valid JSON object matching the specified format, without any introductory text or markdown formatting.
Data Schema Context:
{schema_context}
Desired JSON Output Format:
{{
"intent": ("query_metric" | "query_log" | "unknown"), // Identify if the user wants aggregated metrics or raw logs.
"metric_name": (string | null), // "error_event" or "log_event" if intent is "query_metric", otherwise null.
"time_range": {{ // Always extract or infer a time range. Default to "now-1h" to "now" if not specified.
    "start": (string), // ISO8601 format or relative like "now-1h".
    "end": (string)    // ISO8601 format or relative like "now".
}},
"filters": [ // List of filters extracted from the query. Map field names based on intent.
    // Example for metrics: {{ "field": "tags.level", "operator": "=", "value": "ERROR" }}
    // Example for logs text search: {{ "field": "content", "operator": "CONTAINS", "value": "connection refused" }}
    // Example for multiple apps: {{ "field": "application", "operator": "IN", "value": ["application_123_001", "application_456_001"] }}
    {{ "field": string, "operator": ("=" | "!=" | "IN" | "NOT IN" | "CONTAINS"), "value": (string | array[string] | number) }}
],
"group_by": (array[string] | null), // Fields to group by for metrics (e.g., ["application", "tags.level"]). Null for logs or no aggregation.
"aggregation": ("COUNT" | "AVG" | "SUM" | "NONE"), // Aggregation for metrics. "NONE" for logs. Default to "COUNT" for metrics.
"sort": ({{ "field": string, "order": ("asc" | "desc") }} | null), // Requested ordering, null if not mentioned.
"limit": (number | null), // Max rows the user asked for, null if not mentioned.
"visualization_hint": (string | null) // User's preference like "bar", "line", "table". Null if not mentioned.
}}
User Query: "{user_query}"

JSON Output:"#
    )
}

fn follow_up_prompt(user_query: &str) -> String {
    format!(
        r#"The user has a follow-up to the analysis above. Apply it to the previous JSON analysis and respond *ONLY* with the ENTIRE updated JSON object in the same format, keeping every field that the follow-up does not change.
Follow-up: "{user_query}"

JSON Output:"#
    )
}

// PLAN PARSING //

/// Strip prose and code fences around the model's JSON: everything from
/// the first opening brace to the last closing brace, if that substring
/// parses at all.
pub fn extract_json(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    let candidate = &raw[start..=end];
    serde_json::from_str::<serde_json::Value>(candidate).ok()?;
    Some(candidate)
}

pub fn parse_analysis(raw: &str) -> Result<LlmAnalysis, &'static str> {
    let json = extract_json(raw).ok_or("no valid json object in response")?;
    serde_json::from_str::<LlmAnalysis>(json).map_err(|e| {
        warn!(error = %e, "Extracted json does not match the analysis schema");
        "json does not match the analysis schema"
    })
}

// DISPATCH HELPERS //

fn parse_time_range(analysis: &LlmAnalysis) -> Result<(DateTime<Utc>, DateTime<Utc>), ()> {
    let start = parse_time_input(&analysis.time_range.start).map_err(|_| ())?;
    let end = parse_time_input(&analysis.time_range.end).map_err(|_| ())?;
    if end < start {
        return Err(());
    }
    Ok((start, end))
}

/// Bucket width by window size.
fn determine_interval(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    let duration = end - start;
    let interval = if duration <= Duration::hours(2) {
        "1 minute"
    } else if duration <= Duration::hours(12) {
        "5 minute"
    } else if duration <= Duration::days(2) {
        "10 minute"
    } else if duration <= Duration::days(7) {
        "1 hour"
    } else {
        "1 day"
    };
    interval.to_string()
}

/// The single dimension the store groups on: the first tags.* entry
/// (prefix stripped) wins, then the first plain entry, then total.
fn primary_group_dimension(group_by: &[String]) -> String {
    if group_by.is_empty() {
        return "total".to_string();
    }
    for dim in group_by {
        if let Some(tag) = dim.strip_prefix("tags.") {
            return tag.to_string();
        }
    }
    group_by[0].clone()
}

fn extract_query_text(filters: &[QueryFilter]) -> String {
    filters
        .iter()
        .find(|f| f.field == "content" || f.field == "raw_log")
        .and_then(|f| f.value.as_str())
        .unwrap_or_default()
        .to_string()
}

fn extract_levels(filters: &[QueryFilter]) -> Vec<String> {
    for filter in filters {
        if filter.field != "level" && filter.field != "tags.level" {
            continue;
        }
        match filter.operator.as_str() {
            "=" => {
                if let Some(level) = filter.value.as_str() {
                    return vec![level.to_string()];
                }
            }
            "IN" => return filter.value.as_list(),
            _ => {}
        }
    }
    Vec::new()
}

fn extract_applications(filters: &[QueryFilter]) -> Vec<String> {
    for filter in filters {
        if filter.field != "application" {
            continue;
        }
        match filter.operator.as_str() {
            "=" => {
                if let Some(app) = filter.value.as_str() {
                    return vec![app.to_string()];
                }
            }
            "IN" => return filter.value.as_list(),
            _ => {}
        }
    }
    Vec::new()
}

/// Series to row-major data: one row per (timestamp, series, value).
fn flatten_timeseries(series: &[TimeseriesSeries]) -> Vec<Vec<serde_json::Value>> {
    series
        .iter()
        .flat_map(|s| {
            s.data
                .iter()
                .map(|point| vec![json!(point.timestamp), json!(s.name), json!(point.value)])
        })
        .collect()
}

fn error_response(conversation_id: &str, query: &str, message: &str) -> NlvQueryResponse {
    NlvQueryResponse {
        conversation_id: conversation_id.to_string(),
        original_query: query.to_string(),
        interpreted_query: None,
        result_type: "error".to_string(),
        columns: Vec::new(),
        data: Vec::new(),
        error_message: Some(message.to_string()),
    }
}
