use axum::{http::StatusCode, Json};
use loglens_store::StoreError;
use serde::Serialize;

/// JSON error response
#[derive(Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: u16,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<Self>) {
        (
            status,
            Json(Self {
                error: message.into(),
                code: status.as_u16(),
            }),
        )
    }

    pub fn bad_request(message: impl Into<String>) -> (StatusCode, Json<Self>) {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> (StatusCode, Json<Self>) {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Validation problems are the caller's fault, everything else is ours.
    pub fn from_store(err: StoreError) -> (StatusCode, Json<Self>) {
        match err {
            StoreError::InvalidRequest(message) => Self::bad_request(message),
            other => Self::internal(other.to_string()),
        }
    }
}
