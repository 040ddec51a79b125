use axum::{extract::State, Json};
use loglens_nlv::{NlvQueryRequest, NlvQueryResponse};
use std::sync::Arc;
use tracing::info;

use crate::state::AppState;

/// POST /api/v1/nlv/query
///
/// Always 200: semantic failures (unusable plan, bad time range) come
/// back in the body with resultType "error".
pub async fn nlv_query(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NlvQueryRequest>,
) -> Json<NlvQueryResponse> {
    info!(query = %req.query, conversation = ?req.conversation_id, "NLV request");
    Json(state.nlv.process(req).await)
}
