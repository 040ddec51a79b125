// Orchestrator flow against a scripted LLM and recording repositories.

use async_trait::async_trait;
use loglens_core::query::{
    ApplicationListRequest, ApplicationListResponse, LogSearchRequest, LogSearchResponse,
    MetricDistributionRequest, MetricDistributionResponse, MetricSummaryRequest,
    MetricSummaryResponse, MetricTimeseriesRequest, MetricTimeseriesResponse, TimeseriesPoint,
    TimeseriesSeries,
};
use loglens_nlv::{LlmClient, LlmError, NlvQueryRequest, NlvService, PromptTurn};
use loglens_store::{LogRepository, MetricRepository, StoreError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

struct ScriptedLlm {
    responses: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<Vec<PromptTurn>>>,
}

impl ScriptedLlm {
    fn new(responses: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn generate(&self, turns: &[PromptTurn]) -> Result<String, LlmError> {
        self.calls.lock().unwrap().push(turns.to_vec());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(LlmError::EmptyResponse)
    }
}

#[derive(Default)]
struct RecordingMetricRepo {
    timeseries_requests: Mutex<Vec<MetricTimeseriesRequest>>,
}

#[async_trait]
impl MetricRepository for RecordingMetricRepo {
    async fn summary(&self, _req: MetricSummaryRequest) -> Result<MetricSummaryResponse, StoreError> {
        Ok(MetricSummaryResponse::default())
    }

    async fn timeseries(
        &self,
        req: MetricTimeseriesRequest,
    ) -> Result<MetricTimeseriesResponse, StoreError> {
        self.timeseries_requests.lock().unwrap().push(req);
        Ok(MetricTimeseriesResponse {
            series: vec![TimeseriesSeries {
                name: "ERROR".to_string(),
                data: vec![
                    TimeseriesPoint {
                        timestamp: 1_000,
                        value: 3,
                    },
                    TimeseriesPoint {
                        timestamp: 2_000,
                        value: 5,
                    },
                ],
            }],
        })
    }

    async fn distribution(
        &self,
        _req: MetricDistributionRequest,
    ) -> Result<MetricDistributionResponse, StoreError> {
        Ok(MetricDistributionResponse { items: Vec::new() })
    }

    async fn applications(
        &self,
        _req: ApplicationListRequest,
    ) -> Result<ApplicationListResponse, StoreError> {
        Ok(ApplicationListResponse {
            applications: Vec::new(),
        })
    }
}

#[derive(Default)]
struct RecordingLogRepo {
    search_requests: Mutex<Vec<LogSearchRequest>>,
}

#[async_trait]
impl LogRepository for RecordingLogRepo {
    async fn search(&self, req: LogSearchRequest) -> Result<LogSearchResponse, StoreError> {
        let page = req.page;
        let size = req.size;
        self.search_requests.lock().unwrap().push(req);
        Ok(LogSearchResponse {
            logs: Vec::new(),
            total_count: 0,
            page,
            size,
        })
    }
}

fn service(
    llm: Arc<ScriptedLlm>,
) -> (NlvService, Arc<RecordingMetricRepo>, Arc<RecordingLogRepo>) {
    let metric_repo = Arc::new(RecordingMetricRepo::default());
    let log_repo = Arc::new(RecordingLogRepo::default());
    let service = NlvService::new(llm, metric_repo.clone(), log_repo.clone());
    (service, metric_repo, log_repo)
}

const METRIC_PLAN: &str = r#"{
    "intent": "query_metric",
    "metric_name": "error_event",
    "time_range": {"start": "now-1h", "end": "now"},
    "filters": [],
    "group_by": null,
    "aggregation": "COUNT",
    "sort": null,
    "limit": null,
    "visualization_hint": null
}"#;

const METRIC_PLAN_GROUPED: &str = r#"{
    "intent": "query_metric",
    "metric_name": "error_event",
    "time_range": {"start": "now-1h", "end": "now"},
    "filters": [],
    "group_by": ["tags.level"],
    "aggregation": "COUNT",
    "sort": null,
    "limit": null,
    "visualization_hint": null
}"#;

#[tokio::test]
async fn test_metric_intent_runs_timeseries_query() {
    let llm = ScriptedLlm::new(vec![METRIC_PLAN]);
    let (service, metric_repo, _) = service(llm.clone());

    let resp = service
        .process(NlvQueryRequest {
            query: "errors in last hour".to_string(),
            conversation_id: None,
        })
        .await;

    assert_eq!(resp.result_type, "timeseries");
    assert!(!resp.conversation_id.is_empty());
    assert_eq!(resp.columns, vec!["timestamp", "total", "value"]);
    // one row per (bucket, series)
    assert_eq!(resp.data.len(), 2);
    assert_eq!(resp.data[0][1], "ERROR");

    let requests = metric_repo.timeseries_requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].metric_name, "error_event");
    // a 1h window gets 1 minute buckets
    assert_eq!(requests[0].interval, "1 minute");
    assert_eq!(requests[0].group_by, "total");
}

#[tokio::test]
async fn test_follow_up_replays_history_and_uses_updated_plan() {
    let llm = ScriptedLlm::new(vec![METRIC_PLAN, METRIC_PLAN_GROUPED]);
    let (service, metric_repo, _) = service(llm.clone());

    let first = service
        .process(NlvQueryRequest {
            query: "errors in last hour".to_string(),
            conversation_id: None,
        })
        .await;
    assert_eq!(first.result_type, "timeseries");

    let second = service
        .process(NlvQueryRequest {
            query: "group by level".to_string(),
            conversation_id: Some(first.conversation_id.clone()),
        })
        .await;

    assert_eq!(second.conversation_id, first.conversation_id);
    assert_eq!(second.result_type, "timeseries");

    // the second LLM call replays the stored exchange and then asks for
    // the whole updated plan
    let calls = llm.calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].len(), 1);
    let follow_up = &calls[1];
    assert_eq!(follow_up.len(), 3);
    assert_eq!(follow_up[0].role, "user");
    assert_eq!(follow_up[0].text, "errors in last hour");
    assert_eq!(follow_up[1].role, "model");
    assert!(follow_up[1].text.contains("query_metric"));
    assert!(follow_up[2].text.contains("group by level"));
    assert!(follow_up[2].text.contains("ENTIRE updated JSON"));

    // only the grouping changed between the two store queries
    let requests = metric_repo.timeseries_requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].group_by, "total");
    assert_eq!(requests[1].group_by, "level");
    assert_eq!(requests[0].interval, requests[1].interval);
}

#[tokio::test]
async fn test_log_intent_maps_filters_onto_search() {
    let plan = r#"{
        "intent": "query_log",
        "metric_name": null,
        "time_range": {"start": "2022-01-24T09:00:00Z", "end": "2022-01-24T10:00:00Z"},
        "filters": [
            {"field": "content", "operator": "CONTAINS", "value": "connection refused"},
            {"field": "level", "operator": "=", "value": "ERROR"}
        ],
        "group_by": null,
        "aggregation": "NONE",
        "sort": {"field": "level", "order": "ASC"},
        "limit": 5000,
        "visualization_hint": null
    }"#;
    let llm = ScriptedLlm::new(vec![plan]);
    let (service, _, log_repo) = service(llm);

    let resp = service
        .process(NlvQueryRequest {
            query: "show refused connections".to_string(),
            conversation_id: None,
        })
        .await;

    assert_eq!(resp.result_type, "log_list");
    assert_eq!(resp.columns.len(), 6);

    let requests = log_repo.search_requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];
    assert_eq!(req.query, "connection refused");
    assert_eq!(req.levels, vec!["ERROR"]);
    assert_eq!(req.sort_by, "level");
    assert_eq!(req.sort_order, "asc");
    // absurd limit is capped
    assert_eq!(req.size, 1000);
    assert_eq!(req.page, 1);
}

#[tokio::test]
async fn test_prose_wrapped_json_still_parses() {
    let wrapped = format!("Here you go!\n```json\n{}\n```", METRIC_PLAN);
    let llm = ScriptedLlm::new(vec![wrapped.as_str()]);
    let (service, _, _) = service(llm);

    let resp = service
        .process(NlvQueryRequest {
            query: "errors in last hour".to_string(),
            conversation_id: None,
        })
        .await;

    assert_eq!(resp.result_type, "timeseries");
}

#[tokio::test]
async fn test_invalid_json_yields_error_result() {
    let llm = ScriptedLlm::new(vec!["I am not sure what you mean."]);
    let (service, _, _) = service(llm);

    let resp = service
        .process(NlvQueryRequest {
            query: "gibberish".to_string(),
            conversation_id: None,
        })
        .await;

    assert_eq!(resp.result_type, "error");
    assert!(resp.error_message.is_some());
    assert!(!resp.conversation_id.is_empty());
}

#[tokio::test]
async fn test_unparseable_time_range_yields_error_result() {
    let plan = r#"{
        "intent": "query_metric",
        "metric_name": "log_event",
        "time_range": {"start": "the other day", "end": "now"}
    }"#;
    let llm = ScriptedLlm::new(vec![plan]);
    let (service, metric_repo, _) = service(llm);

    let resp = service
        .process(NlvQueryRequest {
            query: "logs from the other day".to_string(),
            conversation_id: None,
        })
        .await;

    assert_eq!(resp.result_type, "error");
    assert_eq!(
        resp.error_message.as_deref(),
        Some("Could not understand the time range.")
    );
    assert!(metric_repo.timeseries_requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_reversed_time_range_yields_error_result() {
    let plan = r#"{
        "intent": "query_metric",
        "metric_name": "log_event",
        "time_range": {"start": "now", "end": "now-2h"}
    }"#;
    let llm = ScriptedLlm::new(vec![plan]);
    let (service, _, _) = service(llm);

    let resp = service
        .process(NlvQueryRequest {
            query: "backwards".to_string(),
            conversation_id: None,
        })
        .await;

    assert_eq!(resp.result_type, "error");
}

#[tokio::test]
async fn test_unknown_intent_yields_error_result() {
    let plan = r#"{
        "intent": "unknown",
        "time_range": {"start": "now-1h", "end": "now"}
    }"#;
    let llm = ScriptedLlm::new(vec![plan]);
    let (service, _, _) = service(llm);

    let resp = service
        .process(NlvQueryRequest {
            query: "what's the meaning of life".to_string(),
            conversation_id: None,
        })
        .await;

    assert_eq!(resp.result_type, "error");
}

#[tokio::test]
async fn test_unknown_conversation_id_starts_fresh() {
    let llm = ScriptedLlm::new(vec![METRIC_PLAN]);
    let (service, _, _) = service(llm.clone());

    let resp = service
        .process(NlvQueryRequest {
            query: "errors in last hour".to_string(),
            conversation_id: Some("no-such-conversation".to_string()),
        })
        .await;

    // a fresh id was minted and the call used the initial prompt
    assert_ne!(resp.conversation_id, "no-such-conversation");
    let calls = llm.calls.lock().unwrap();
    assert_eq!(calls[0].len(), 1);
    assert!(calls[0][0].text.contains("Data Schema Context"));
}
