// Broker plumbing over NATS JetStream
//
// One durable stream carries every log entry. Entries are published to
// <topic>.<application_id> so a single application's stream stays in
// order, and consumed through a durable pull consumer with explicit
// acks. An ack is the commit: nothing is acked before the stores took
// the batch.

use async_nats::jetstream::{
    self,
    consumer::{pull, AckPolicy, DeliverPolicy, PullConsumer},
    stream,
};
use async_trait::async_trait;
use futures::StreamExt;
use loglens_core::LogEntry;
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("broker error: {0}")]
    Nats(String),

    #[error("broker configuration missing: {0}")]
    Config(&'static str),
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub url: String,
    /// Stream name; publish subjects are "<topic>.<application_id>"
    pub topic: String,
    /// Durable consumer name
    pub consumer_group: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: "localhost:4222".to_string(),
            topic: "log_entries".to_string(),
            consumer_group: "log_processor_group".to_string(),
        }
    }
}

impl BrokerConfig {
    fn validate(&self) -> Result<(), BrokerError> {
        if self.url.is_empty() {
            return Err(BrokerError::Config("url"));
        }
        if self.topic.is_empty() {
            return Err(BrokerError::Config("topic"));
        }
        Ok(())
    }
}

/// Publish side, a batch at a time. Mocked out in tailer tests.
#[async_trait]
pub trait LogProducer: Send + Sync {
    async fn publish(&self, entries: &[LogEntry]) -> Result<(), BrokerError>;
}

/// One fetched message: the parsed entry (None when the payload did not
/// unmarshal, the handle still has to be committed) plus the opaque
/// broker handle.
pub struct Fetched<H> {
    pub entry: Option<LogEntry>,
    pub handle: H,
}

/// Consume side. `fetch` waits up to `timeout` for a single message and
/// returns None when the deadline passes quietly.
#[async_trait]
pub trait LogConsumer: Send {
    type Handle: Send;

    async fn fetch(&mut self, timeout: Duration)
        -> Result<Option<Fetched<Self::Handle>>, BrokerError>;

    async fn commit(&mut self, handles: Vec<Self::Handle>) -> Result<(), BrokerError>;
}

// JETSTREAM IMPLS //

async fn ensure_stream(
    cfg: &BrokerConfig,
) -> Result<(jetstream::Context, jetstream::stream::Stream), BrokerError> {
    cfg.validate()?;

    let client = async_nats::connect(&cfg.url)
        .await
        .map_err(|e| BrokerError::Nats(e.to_string()))?;
    let context = jetstream::new(client);

    let stream = context
        .get_or_create_stream(stream::Config {
            name: cfg.topic.clone(),
            subjects: vec![format!("{}.>", cfg.topic)],
            ..Default::default()
        })
        .await
        .map_err(|e| BrokerError::Nats(e.to_string()))?;

    Ok((context, stream))
}

pub struct JetStreamLogProducer {
    context: jetstream::Context,
    topic: String,
}

impl JetStreamLogProducer {
    pub async fn connect(cfg: &BrokerConfig) -> Result<Self, BrokerError> {
        let (context, _stream) = ensure_stream(cfg).await?;
        info!(url = %cfg.url, topic = %cfg.topic, "Broker producer initialized");
        Ok(Self {
            context,
            topic: cfg.topic.clone(),
        })
    }
}

#[async_trait]
impl LogProducer for JetStreamLogProducer {
    async fn publish(&self, entries: &[LogEntry]) -> Result<(), BrokerError> {
        if entries.is_empty() {
            return Ok(());
        }

        // fire all publishes, then wait for every ack
        let mut acks = Vec::with_capacity(entries.len());
        for entry in entries {
            let payload = match serde_json::to_vec(entry) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(error = %e, file = %entry.source_file, "Failed to serialize log entry, dropping");
                    continue;
                }
            };

            let subject = format!("{}.{}", self.topic, entry.application);
            let ack = self
                .context
                .publish(subject, payload.into())
                .await
                .map_err(|e| BrokerError::Nats(e.to_string()))?;
            acks.push(ack);
        }

        let count = acks.len();
        for ack in acks {
            ack.await.map_err(|e| BrokerError::Nats(e.to_string()))?;
        }

        debug!(message_count = count, topic = %self.topic, "Published log entries");
        Ok(())
    }
}

pub struct JetStreamLogConsumer {
    consumer: PullConsumer,
    buffer: VecDeque<jetstream::Message>,
    prefetch: usize,
}

impl JetStreamLogConsumer {
    pub async fn connect(cfg: &BrokerConfig, prefetch: usize) -> Result<Self, BrokerError> {
        let (_context, stream) = ensure_stream(cfg).await?;

        let consumer = stream
            .get_or_create_consumer(
                &cfg.consumer_group,
                pull::Config {
                    durable_name: Some(cfg.consumer_group.clone()),
                    ack_policy: AckPolicy::Explicit,
                    // start from the earliest retained message
                    deliver_policy: DeliverPolicy::All,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| BrokerError::Nats(e.to_string()))?;

        info!(url = %cfg.url, topic = %cfg.topic, group = %cfg.consumer_group, "Broker consumer initialized");

        Ok(Self {
            consumer,
            buffer: VecDeque::new(),
            prefetch: prefetch.max(1),
        })
    }

    async fn refill(&mut self, timeout: Duration) -> Result<(), BrokerError> {
        let mut messages = self
            .consumer
            .fetch()
            .max_messages(self.prefetch)
            .expires(timeout)
            .messages()
            .await
            .map_err(|e| BrokerError::Nats(e.to_string()))?;

        while let Some(message) = messages.next().await {
            let message = message.map_err(|e| BrokerError::Nats(e.to_string()))?;
            self.buffer.push_back(message);
        }
        Ok(())
    }
}

#[async_trait]
impl LogConsumer for JetStreamLogConsumer {
    type Handle = jetstream::Message;

    async fn fetch(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Fetched<Self::Handle>>, BrokerError> {
        if self.buffer.is_empty() {
            self.refill(timeout).await?;
        }

        let Some(message) = self.buffer.pop_front() else {
            // deadline passed without data
            return Ok(None);
        };

        match serde_json::from_slice::<LogEntry>(&message.payload) {
            Ok(entry) => Ok(Some(Fetched {
                entry: Some(entry),
                handle: message,
            })),
            Err(e) => {
                error!(error = %e, subject = %message.subject, "Failed to unmarshal broker message, will commit without indexing");
                Ok(Some(Fetched {
                    entry: None,
                    handle: message,
                }))
            }
        }
    }

    async fn commit(&mut self, handles: Vec<Self::Handle>) -> Result<(), BrokerError> {
        if handles.is_empty() {
            return Ok(());
        }
        let count = handles.len();
        for handle in &handles {
            handle
                .ack()
                .await
                .map_err(|e| BrokerError::Nats(e.to_string()))?;
        }
        debug!(count, "Committed broker messages");
        Ok(())
    }
}
