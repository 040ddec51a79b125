use serde::Deserialize;

#[derive(Deserialize)]
pub struct LogSearchParams {
    #[serde(rename = "startTime")]
    pub start_time: String,
    #[serde(rename = "endTime")]
    pub end_time: String,
    pub query: Option<String>,
    /// Comma-separated, e.g. "ERROR,WARN"
    pub levels: Option<String>,
    /// Comma-separated application ids
    pub applications: Option<String>,
    #[serde(rename = "sortBy")]
    pub sort_by: Option<String>,
    #[serde(rename = "sortOrder")]
    pub sort_order: Option<String>,
    pub page: Option<usize>,
    pub size: Option<usize>,
}

#[derive(Deserialize)]
pub struct TimeWindowParams {
    #[serde(rename = "startTime")]
    pub start_time: String,
    #[serde(rename = "endTime")]
    pub end_time: String,
    pub applications: Option<String>,
}

#[derive(Deserialize)]
pub struct TimeseriesParams {
    #[serde(rename = "startTime")]
    pub start_time: String,
    #[serde(rename = "endTime")]
    pub end_time: String,
    pub applications: Option<String>,
    #[serde(rename = "metricName")]
    pub metric_name: String,
    pub interval: String,
    #[serde(rename = "groupBy")]
    pub group_by: Option<String>,
}

#[derive(Deserialize)]
pub struct DistributionParams {
    #[serde(rename = "startTime")]
    pub start_time: String,
    #[serde(rename = "endTime")]
    pub end_time: String,
    pub applications: Option<String>,
    #[serde(rename = "metricName")]
    pub metric_name: String,
    pub dimension: String,
}
