// Indexing consumer
//
// Pulls batches off the broker, bulk-indexes the log documents,
// bulk-inserts the extracted metric events, and only then commits the
// broker handles. A store failure leaves the handles uncommitted so the
// same messages come back on the next iteration.

use crate::broker::{BrokerError, LogConsumer};
use loglens_core::metrics::MetricExtractor;
use loglens_core::{LogEntry, MetricEvent};
use loglens_store::{LogStore, MetricStore, StoreError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Messages per processing batch
    pub batch_size: usize,
    /// Deadline for assembling one batch
    pub max_batch_wait: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_batch_wait: Duration::from_secs(5),
        }
    }
}

pub struct IndexingConsumer<C: LogConsumer> {
    consumer: C,
    log_store: Arc<dyn LogStore>,
    metric_store: Arc<dyn MetricStore>,
    extractor: MetricExtractor,
    config: ConsumerConfig,
}

impl<C: LogConsumer> IndexingConsumer<C> {
    pub fn new(
        consumer: C,
        log_store: Arc<dyn LogStore>,
        metric_store: Arc<dyn MetricStore>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            consumer,
            log_store,
            metric_store,
            extractor: MetricExtractor::new(),
            config,
        }
    }

    pub fn consumer_mut(&mut self) -> &mut C {
        &mut self.consumer
    }

    /// Loop until cancelled. Batch errors get a short sleep so a broken
    /// downstream doesn't spin us hot.
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!("Starting indexing consumer loop");
        loop {
            if cancel.is_cancelled() {
                info!("Indexing consumer loop stopping");
                return;
            }

            if let Err(e) = self.process_batch(&cancel).await {
                if cancel.is_cancelled() {
                    info!("Indexing consumer loop stopping");
                    return;
                }
                error!(error = %e, "Error processing consumer batch");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }

    /// Build and process one bounded batch. Returns the number of
    /// messages handled. Public so the composition loop and the tests
    /// can drive single iterations.
    pub async fn process_batch(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<usize, ConsumerError> {
        let mut entries: Vec<Option<LogEntry>> = Vec::with_capacity(self.config.batch_size);
        let mut handles: Vec<C::Handle> = Vec::with_capacity(self.config.batch_size);
        let batch_start = Instant::now();

        while entries.len() < self.config.batch_size {
            if cancel.is_cancelled() {
                break;
            }

            let remaining = self.config.max_batch_wait.saturating_sub(batch_start.elapsed());
            if remaining.is_zero() {
                debug!(batch_size = entries.len(), "Max wait reached, processing partial batch");
                break;
            }

            match self.consumer.fetch(remaining).await? {
                Some(fetched) => {
                    // entry is None for unparseable payloads; the handle
                    // still gets committed so the poison message doesn't
                    // loop forever
                    entries.push(fetched.entry);
                    handles.push(fetched.handle);
                }
                None => {
                    debug!(batch_size = entries.len(), "Fetch deadline reached");
                    break;
                }
            }
        }

        if entries.is_empty() {
            return Ok(0);
        }

        let valid: Vec<LogEntry> = entries.iter().flatten().cloned().collect();
        debug!(
            batch_size = entries.len(),
            valid = valid.len(),
            "Processing collected batch"
        );

        // 1. index into the search store; on failure nothing is
        //    committed and the batch comes back
        self.log_store.store_logs(&valid).await?;

        // 2. extract and insert metric events
        let events: Vec<MetricEvent> = valid
            .iter()
            .flat_map(|entry| self.extractor.extract(entry))
            .collect();
        self.metric_store.store_metric_events(&events).await?;

        // 3. commit. A failure here means the data is stored but will
        //    be reprocessed after restart, which at-least-once allows.
        let count = handles.len();
        self.consumer.commit(handles).await?;

        info!(batch_size = count, "Successfully processed and committed batch");
        Ok(count)
    }
}
