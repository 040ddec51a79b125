use loglens_nlv::NlvService;
use loglens_store::{LogRepository, MetricRepository};
use std::sync::Arc;

// App state - shared across handlers
pub struct AppState {
    pub log_repo: Arc<dyn LogRepository>,
    pub metric_repo: Arc<dyn MetricRepository>,
    pub nlv: NlvService,
}
