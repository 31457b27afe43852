use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::generation::pipeline::GenerationError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl AppError {
    /// Status, machine-readable code, and user-facing message.
    pub fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Generation(e @ GenerationError::TimedOut { .. }) => {
                tracing::warn!("{e}");
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    "GENERATION_TIMEOUT",
                    "Generation took too long. Please try again.".to_string(),
                )
            }
        }
    }

    /// The `{"error": {...}}` envelope shared by JSON and NDJSON responses.
    pub fn envelope(code: &str, message: &str) -> Value {
        json!({
            "error": {
                "code": code,
                "message": message
            }
        })
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        (status, Json(Self::envelope(code, &message))).into_response()
    }
}
