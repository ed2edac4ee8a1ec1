use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde_json::json;

/// Failures of the batch analysis / synthesis pipeline.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("analysis of chunk {index} of {total} failed: {source:#}")]
    ChunkAnalysis {
        index: usize,
        total: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("final synthesis failed: {0:#}")]
    Synthesis(#[source] anyhow::Error),

    #[error("single-shot request failed: {0:#}")]
    SingleShot(#[source] anyhow::Error),

    #[error("batch analysis requires at least one chunk")]
    EmptyBatch,
}

/// Errors returned by HTTP handlers.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    #[error("Report not found")]
    ReportNotFound,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unprocessable upload: {0}")]
    Unprocessable(String),

    #[error("Internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            ApiError::ConversationNotFound(_)
            | ApiError::FileNotFound(_)
            | ApiError::SheetNotFound(_)
            | ApiError::ReportNotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        let body = json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}
