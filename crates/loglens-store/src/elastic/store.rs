// Bulk log writer for the search index
//
// Documents land in a daily index named <prefix>-YYYY-MM-DD (write-time
// wall clock). Searches always go through the <prefix>-* pattern.

use crate::elastic::client::{ElasticConfig, EsClient};
use crate::{LogStore, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use loglens_core::LogEntry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct ElasticLogStore {
    client: Arc<EsClient>,
    index_prefix: String,
    flush_bytes: usize,
    bulk_workers: usize,
    count_successful: AtomicU64,
    count_failed: AtomicU64,
}

impl ElasticLogStore {
    pub fn new(client: Arc<EsClient>, cfg: &ElasticConfig) -> Self {
        Self {
            client,
            index_prefix: cfg.index_prefix.clone(),
            flush_bytes: cfg.flush_bytes.max(1),
            bulk_workers: cfg.bulk_workers.max(1),
            count_successful: AtomicU64::new(0),
            count_failed: AtomicU64::new(0),
        }
    }

    fn index_name(&self) -> String {
        format!("{}-{}", self.index_prefix, Utc::now().format("%Y-%m-%d"))
    }

    /// NDJSON bulk payloads, split so no chunk exceeds flush_bytes
    /// (a single oversized document still goes out alone).
    fn build_chunks(&self, logs: &[LogEntry]) -> (Vec<String>, u64) {
        let index = self.index_name();
        let action = format!("{{\"index\":{{\"_index\":\"{}\"}}}}\n", index);

        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut dropped = 0u64;

        for entry in logs {
            let doc = match serde_json::to_string(entry) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(error = %e, file = %entry.source_file, "Failed to serialize log entry for indexing, dropping");
                    dropped += 1;
                    continue;
                }
            };

            let item_len = action.len() + doc.len() + 1;
            if !current.is_empty() && current.len() + item_len > self.flush_bytes {
                chunks.push(std::mem::take(&mut current));
            }
            current.push_str(&action);
            current.push_str(&doc);
            current.push('\n');
        }
        if !current.is_empty() {
            chunks.push(current);
        }

        (chunks, dropped)
    }

    /// Final accounting, called on shutdown.
    pub fn log_stats(&self) {
        info!(
            indexed = self.count_successful.load(Ordering::Relaxed),
            failed = self.count_failed.load(Ordering::Relaxed),
            "Elasticsearch bulk writer final stats"
        );
    }
}

#[async_trait]
impl LogStore for ElasticLogStore {
    async fn store_logs(&self, logs: &[LogEntry]) -> Result<(), StoreError> {
        if logs.is_empty() {
            return Ok(());
        }

        let (chunks, dropped) = self.build_chunks(logs);
        self.count_failed.fetch_add(dropped, Ordering::Relaxed);

        let results: Vec<_> = stream::iter(chunks)
            .map(|chunk| {
                let client = Arc::clone(&self.client);
                async move { client.bulk(chunk).await }
            })
            .buffer_unordered(self.bulk_workers)
            .collect()
            .await;

        let mut failed_items = 0usize;
        for result in results {
            match result {
                Ok(resp) => {
                    let failed = if resp.errors { resp.failed_count() } else { 0 };
                    failed_items += failed;
                    let ok = resp.items.len().saturating_sub(failed);
                    self.count_successful.fetch_add(ok as u64, Ordering::Relaxed);
                    self.count_failed.fetch_add(failed as u64, Ordering::Relaxed);
                }
                Err(e) => {
                    error!(error = %e, "Bulk index request failed");
                    return Err(StoreError::Search(e.to_string()));
                }
            }
        }

        if failed_items > 0 {
            return Err(StoreError::Search(format!(
                "{} items failed during bulk indexing",
                failed_items
            )));
        }

        debug!(count = logs.len(), "Indexed log entries");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn store() -> ElasticLogStore {
        let cfg = ElasticConfig {
            flush_bytes: 300,
            ..Default::default()
        };
        let client = Arc::new(EsClient::new(&cfg.addresses).unwrap());
        ElasticLogStore::new(client, &cfg)
    }

    fn entry(i: usize) -> LogEntry {
        LogEntry {
            timestamp: Utc.with_ymd_and_hms(2022, 1, 24, 14, 30, 45).unwrap(),
            level: "INFO".to_string(),
            component: "a.B".to_string(),
            content: format!("message {}", i),
            application: "application_1_1".to_string(),
            source_file: "/logs/application_1_1/c.log".to_string(),
            raw: format!("22/01/24 14:30:45 INFO a.B: message {}", i),
        }
    }

    #[test]
    fn test_chunks_respect_flush_bytes() {
        let store = store();
        let logs: Vec<LogEntry> = (0..10).map(entry).collect();

        let (chunks, dropped) = store.build_chunks(&logs);
        assert_eq!(dropped, 0);
        assert!(chunks.len() > 1, "small flush_bytes should split the batch");

        // every chunk is well formed ndjson: action line + doc line pairs
        let mut docs = 0;
        for chunk in &chunks {
            assert!(chunk.ends_with('\n'));
            let lines: Vec<&str> = chunk.lines().collect();
            assert_eq!(lines.len() % 2, 0);
            docs += lines.len() / 2;
            assert!(lines[0].contains("\"_index\""));
        }
        assert_eq!(docs, 10);
    }

    #[test]
    fn test_index_name_is_daily() {
        let store = store();
        let name = store.index_name();
        assert!(name.starts_with("applogs-"));
        // applogs-YYYY-MM-DD
        assert_eq!(name.len(), "applogs-".len() + 10);
    }
}
