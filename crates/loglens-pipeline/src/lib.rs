//! Ingestion pipeline: tail log files on a schedule, ship entries
//! through the broker, consume them into the two stores.
//!
//! The tailer and the consumer observe a shared cancellation token and
//! only touch durable state (file offsets, broker acks) after the
//! corresponding downstream write succeeded.

pub mod broker;
pub mod consumer;
pub mod filestate;
pub mod scheduler;
pub mod tailer;

pub use broker::{
    BrokerConfig, BrokerError, Fetched, JetStreamLogConsumer, JetStreamLogProducer, LogConsumer,
    LogProducer,
};
pub use consumer::{ConsumerConfig, IndexingConsumer};
pub use filestate::{FileProcessState, FileStateManager};
pub use scheduler::Scheduler;
pub use tailer::{CycleStats, LogTailer, TailerConfig};
