// HTTP client for the search index
// Same shape as our other JSON API clients: reqwest + serde structs.

use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ElasticError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("elasticsearch returned {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("bulk request had {failed} failed items")]
    BulkFailed { failed: usize },

    #[error("could not reach elasticsearch after retries: {0}")]
    Unreachable(String),
}

#[derive(Debug, Clone)]
pub struct ElasticConfig {
    pub addresses: Vec<String>,
    pub index_prefix: String,
    /// A bulk payload is split into requests of at most this many bytes
    pub flush_bytes: usize,
    /// Max bulk requests in flight at once
    pub bulk_workers: usize,
}

impl Default for ElasticConfig {
    fn default() -> Self {
        Self {
            addresses: vec!["http://localhost:9200".to_string()],
            index_prefix: "applogs".to_string(),
            flush_bytes: 1_048_576, // 1MB
            bulk_workers: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EsClient {
    http: reqwest::Client,
    base_url: String,
}

// startup retry schedule
const BACKOFF_INITIAL: Duration = Duration::from_secs(2);
const BACKOFF_MAX: Duration = Duration::from_secs(15);
const BACKOFF_BUDGET: Duration = Duration::from_secs(90);

impl EsClient {
    pub fn new(addresses: &[String]) -> Result<Self, ElasticError> {
        let base_url = addresses
            .first()
            .cloned()
            .unwrap_or_else(|| "http://localhost:9200".to_string());

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(Self { http, base_url })
    }

    /// Connect and verify with a ping, retrying with exponential backoff
    /// (2s initial, 15s cap, 90s total) before giving up.
    pub async fn connect(addresses: &[String]) -> Result<Self, ElasticError> {
        let client = Self::new(addresses)?;

        let started = tokio::time::Instant::now();
        let mut delay = BACKOFF_INITIAL;
        let mut last_err = String::new();

        loop {
            match client.ping().await {
                Ok(()) => {
                    info!(url = %client.base_url, "Elasticsearch connection verified");
                    return Ok(client);
                }
                Err(e) => {
                    last_err = e.to_string();
                    if started.elapsed() + delay > BACKOFF_BUDGET {
                        return Err(ElasticError::Unreachable(last_err));
                    }
                    warn!(error = %last_err, retry_in = ?delay, "Elasticsearch ping failed, retrying");
                    sleep(delay).await;
                    delay = (delay * 2).min(BACKOFF_MAX);
                }
            }
        }
    }

    pub async fn ping(&self) -> Result<(), ElasticError> {
        let resp = self.http.get(&self.base_url).send().await?;
        if !resp.status().is_success() {
            return Err(ElasticError::ApiError {
                status: resp.status().as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    /// One `_bulk` request. `body` is NDJSON, already terminated with '\n'.
    pub async fn bulk(&self, body: String) -> Result<BulkResponse, ElasticError> {
        let url = format!("{}/_bulk", self.base_url);
        let resp = self
            .http
            .post(&url)
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ElasticError::ApiError {
                status: resp.status().as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }

        let parsed: BulkResponse = resp.json().await?;
        Ok(parsed)
    }

    pub async fn search(
        &self,
        index_pattern: &str,
        body: &Value,
    ) -> Result<EsSearchResponse, ElasticError> {
        let url = format!("{}/{}/_search", self.base_url, index_pattern);
        let resp = self.http.post(&url).json(body).send().await?;

        if !resp.status().is_success() {
            return Err(ElasticError::ApiError {
                status: resp.status().as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }

        let parsed: EsSearchResponse = resp.json().await?;
        Ok(parsed)
    }
}

#[derive(Debug, Deserialize)]
pub struct BulkResponse {
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<Value>,
}

impl BulkResponse {
    /// Number of items that carry an error object
    pub fn failed_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| {
                item.get("index")
                    .and_then(|op| op.get("error"))
                    .is_some()
            })
            .count()
    }
}

#[derive(Debug, Deserialize)]
pub struct EsSearchResponse {
    pub hits: EsHits,
}

#[derive(Debug, Deserialize)]
pub struct EsHits {
    pub total: EsTotal,
    pub hits: Vec<EsHit>,
}

#[derive(Debug, Deserialize)]
pub struct EsTotal {
    pub value: i64,
}

#[derive(Debug, Deserialize)]
pub struct EsHit {
    #[serde(rename = "_source")]
    pub source: Value,
}
