// Wire types for the natural language query layer

use loglens_core::query::SortSpec;
use serde::{Deserialize, Deserializer, Serialize};

/// What the user wants, as classified by the LLM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    QueryMetric,
    QueryLog,
    #[serde(other)]
    Unknown,
}

/// Filter values come back from the model as a string, a number or a
/// list of strings depending on the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Str(String),
    Num(f64),
    List(Vec<String>),
}

impl FilterValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FilterValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// A single string counts as a one-element list.
    pub fn as_list(&self) -> Vec<String> {
        match self {
            FilterValue::Str(s) => vec![s.clone()],
            FilterValue::List(items) => items.clone(),
            FilterValue::Num(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryFilter {
    pub field: String,
    /// "=", "!=", "IN", "NOT IN" or "CONTAINS"
    pub operator: String,
    pub value: FilterValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeRange {
    /// ISO8601, epoch ms, or relative like "now-1h"
    pub start: String,
    pub end: String,
}

/// The model likes to answer `null` where we want an empty list.
fn nullable_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// The structured query plan the LLM must return. Unknown fields are
/// rejected so a drifting model answer fails loudly instead of being
/// half-applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmAnalysis {
    pub intent: Intent,

    #[serde(default)]
    pub metric_name: Option<String>,

    pub time_range: TimeRange,

    #[serde(default, deserialize_with = "nullable_vec")]
    pub filters: Vec<QueryFilter>,

    #[serde(default, deserialize_with = "nullable_vec")]
    pub group_by: Vec<String>,

    /// "COUNT", "AVG", "SUM" or "NONE"
    #[serde(default)]
    pub aggregation: Option<String>,

    #[serde(default)]
    pub visualization_hint: Option<String>,

    #[serde(default)]
    pub sort: Option<SortSpec>,

    #[serde(default)]
    pub limit: Option<usize>,
}

// HTTP SHAPES //

#[derive(Debug, Clone, Deserialize)]
pub struct NlvQueryRequest {
    pub query: String,
    #[serde(default, rename = "conversationId")]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NlvQueryResponse {
    #[serde(rename = "conversationId")]
    pub conversation_id: String,

    #[serde(rename = "originalQuery")]
    pub original_query: String,

    #[serde(rename = "interpretedQuery", skip_serializing_if = "Option::is_none")]
    pub interpreted_query: Option<LlmAnalysis>,

    /// "timeseries", "log_list" or "error"
    #[serde(rename = "resultType")]
    pub result_type: String,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<Vec<serde_json::Value>>,

    #[serde(rename = "errorMessage", skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// One exchange in a conversation, role "user" or "model".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: String,
    pub content: String,
}
