use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Message cannot be empty")]
    EmptyInput,

    #[error("Language model engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Ingestion failed: {0}")]
    IngestionFailed(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, error_type) = match &self {
            ApiError::EmptyInput => {
                tracing::warn!("Rejected empty chat message");
                (StatusCode::BAD_REQUEST, "EmptyInput")
            }
            ApiError::EngineUnavailable(msg) => {
                tracing::error!("Engine unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "EngineUnavailable")
            }
            ApiError::IngestionFailed(msg) => {
                tracing::error!("Ingestion failed: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "IngestionFailed")
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalError")
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}
