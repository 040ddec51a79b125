mod config;
mod handlers;
mod models;
mod state;

use axum::{
    routing::{get, post},
    Router,
};
use config::Config;
use loglens_nlv::{GeminiClient, LlmClient, LlmError, NlvService, PromptTurn};
use loglens_pipeline::{
    FileStateManager, IndexingConsumer, JetStreamLogConsumer, JetStreamLogProducer, LogTailer,
    Scheduler,
};
use loglens_store::elastic::{ElasticLogRepository, ElasticLogStore, EsClient};
use loglens_store::timescale::{TimescaleMetricRepository, TimescaleMetricStore};
use state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Stand-in client when no LLM API key is configured; NL queries then
/// answer with an error body instead of the whole process refusing to boot.
struct DisabledLlm;

#[async_trait::async_trait]
impl LlmClient for DisabledLlm {
    async fn generate(&self, _turns: &[PromptTurn]) -> Result<String, LlmError> {
        Err(LlmError::MissingApiKey)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenvy::dotenv().ok();

    // logging setup
    tracing_subscriber::fmt::init();

    let cfg = Config::from_env();
    info!(http = %cfg.http_addr, log_dir = %cfg.tailer.log_directory.display(), "Starting loglens");

    // Elasticsearch, with startup backoff
    info!("Connecting to Elasticsearch...");
    let es_client = Arc::new(EsClient::connect(&cfg.elastic.addresses).await?);
    let log_store = Arc::new(ElasticLogStore::new(Arc::clone(&es_client), &cfg.elastic));
    let log_repo = Arc::new(ElasticLogRepository::new(
        Arc::clone(&es_client),
        cfg.elastic.index_prefix.clone(),
    ));
    info!("Connected to Elasticsearch!");

    // TimescaleDB, bootstraps the hypertable
    info!("Connecting to TimescaleDB...");
    let metric_store = Arc::new(TimescaleMetricStore::connect(&cfg.timescale).await?);
    let metric_repo = Arc::new(TimescaleMetricRepository::new(metric_store.pool()));
    info!("Connected to TimescaleDB!");

    // Broker
    info!("Connecting to broker...");
    let producer = Arc::new(JetStreamLogProducer::connect(&cfg.broker).await?);
    let broker_consumer =
        JetStreamLogConsumer::connect(&cfg.broker, cfg.consumer.batch_size).await?;
    info!("Connected to broker!");

    // Tailing producer + cron scheduler
    let file_state = Arc::new(FileStateManager::new(cfg.state_path.clone()));
    let tailer = Arc::new(LogTailer::new(
        cfg.tailer.clone(),
        Arc::clone(&file_state),
        producer,
    ));
    let scheduler = Scheduler::new(&cfg.schedule, Arc::clone(&tailer), Duration::from_secs(30))?;

    // Indexing consumer
    let mut indexing_consumer = IndexingConsumer::new(
        broker_consumer,
        log_store.clone(),
        metric_store.clone(),
        cfg.consumer.clone(),
    );

    // NL layer
    let llm: Arc<dyn LlmClient> = if cfg.gemini_api_key.is_empty() {
        warn!("LLM API key not set, natural language queries will return errors");
        Arc::new(DisabledLlm)
    } else {
        Arc::new(GeminiClient::new(cfg.gemini_api_key.clone())?)
    };
    let nlv = NlvService::new(llm, metric_repo.clone(), log_repo.clone());

    let app_state = Arc::new(AppState {
        log_repo,
        metric_repo,
        nlv,
    });

    // background loops, stopped through one shared token
    let cancel = CancellationToken::new();
    let scheduler_handle = tokio::spawn(scheduler.run(cancel.clone()));
    let consumer_cancel = cancel.clone();
    let consumer_handle = tokio::spawn(async move {
        indexing_consumer.run(consumer_cancel).await;
    });

    // routes
    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/v1/logs", get(handlers::search_logs))
        .route("/api/v1/logs/applications", get(handlers::get_applications))
        .route("/api/v1/metrics/summary", get(handlers::get_summary))
        .route("/api/v1/metrics/timeseries", get(handlers::get_timeseries))
        .route("/api/v1/metrics/distribution", get(handlers::get_distribution))
        .route("/api/v1/nlv/query", post(handlers::nlv_query))
        .with_state(app_state);

    info!("Starting server on {}", cfg.http_addr);
    let listener = tokio::net::TcpListener::bind(&cfg.http_addr).await?;

    let shutdown_cancel = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            shutdown_cancel.cancel();
        })
        .await?;

    // wait for the loops, then close the sinks
    let _ = scheduler_handle.await;
    let _ = consumer_handle.await;
    log_store.log_stats();
    metric_store.close().await;
    info!("Shutdown complete");

    Ok(())
}
