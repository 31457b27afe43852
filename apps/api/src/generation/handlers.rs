//! Axum route handlers for the Generation API.

use std::convert::Infallible;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use serde_json::{json, Map, Value};
use tracing::{info_span, Instrument, Span};
use uuid::Uuid;

use crate::errors::AppError;
use crate::generation::pipeline::StreamFrame;
use crate::models::{ContentType, GenerationRequest};
use crate::state::AppState;

pub const NDJSON: &str = "application/x-ndjson";

fn checked(request: &GenerationRequest) -> Result<(), AppError> {
    request.check().map_err(AppError::Validation)
}

/// Per-request span so every attempt and cache event logs with one id.
fn request_span(request: &GenerationRequest) -> Span {
    info_span!(
        "generate",
        request_id = %Uuid::new_v4(),
        content_type = %request.content_type,
        premium = request.premium
    )
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/generate
///
/// Returns content for the request: cached, freshly generated, or fallback.
/// Only an outer-deadline timeout with nothing in hand is an error (504).
pub async fn handle_generate(
    State(state): State<AppState>,
    Json(request): Json<GenerationRequest>,
) -> Result<Json<Value>, AppError> {
    checked(&request)?;

    let outcome = state
        .pipelines
        .get(request.content_type)
        .generate(&request)
        .instrument(request_span(&request))
        .await?;

    Ok(Json(Value::Object(outcome.to_response())))
}

/// POST /api/v1/generate/stream
///
/// NDJSON: a `partial` line per newer valid payload, then exactly one `final`
/// or `error` line.
pub async fn handle_generate_stream(
    State(state): State<AppState>,
    Json(request): Json<GenerationRequest>,
) -> Result<Response, AppError> {
    checked(&request)?;

    let content_type = request.content_type;
    let span = request_span(&request);
    let pipeline = state.pipelines.get(content_type);
    let lines = span
        .in_scope(|| pipeline.generate_stream(request))
        .map(move |frame| Ok::<_, Infallible>(ndjson_line(frame_to_json(content_type, frame))));

    Ok(([(header::CONTENT_TYPE, NDJSON)], Body::from_stream(lines)).into_response())
}

/// DELETE /api/v1/generate/cache
///
/// Drops the cached entry for the given request under the current key version.
pub async fn handle_invalidate(
    State(state): State<AppState>,
    Json(request): Json<GenerationRequest>,
) -> Result<StatusCode, AppError> {
    checked(&request)?;
    state
        .pipelines
        .get(request.content_type)
        .invalidate(&request)
        .await;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/generate/stats
pub async fn handle_stats(State(state): State<AppState>) -> Json<Value> {
    let providers: Map<String, Value> = ContentType::ALL
        .iter()
        .map(|ct| {
            (
                ct.as_str().to_string(),
                json!(state.pipelines.get(*ct).provider_names()),
            )
        })
        .collect();

    Json(json!({
        "telemetry": state.telemetry.snapshot(),
        "cache": {
            "backend": state.pipelines.plan.cache_backend(),
            "ttl_secs": state.config.cache_ttl.as_secs(),
            "fallback_ttl_secs": state.config.cache_ttl.as_secs() / 2,
            "op_timeout_ms": state.config.cache_timeout.as_millis() as u64,
            "warming": state.config.cache_warming,
        },
        "providers": providers,
    }))
}

// ────────────────────────────────────────────────────────────────────────────
// NDJSON framing
// ────────────────────────────────────────────────────────────────────────────

fn frame_to_json(content_type: ContentType, frame: StreamFrame) -> Value {
    let fields = match frame {
        StreamFrame::Partial(content) => {
            let mut fields = content.to_response_fields(content_type);
            fields.insert("event".to_string(), json!("partial"));
            fields
        }
        StreamFrame::Final(Ok(outcome)) => {
            let mut fields = outcome.to_response();
            fields.insert("event".to_string(), json!("final"));
            fields
        }
        StreamFrame::Final(Err(e)) => {
            let (_, code, message) = AppError::from(e).parts();
            let mut fields = Map::new();
            fields.insert("event".to_string(), json!("error"));
            fields.insert("code".to_string(), json!(code));
            fields.insert("message".to_string(), json!(message));
            fields
        }
    };
    Value::Object(fields)
}

fn ndjson_line(value: Value) -> String {
    let mut line = value.to_string();
    line.push('\n');
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::pipeline::{GenerationError, GenerationOutcome};
    use crate::models::{Section, StructuredContent};
    use chrono::Utc;

    fn content() -> StructuredContent {
        StructuredContent {
            title: "Plan".to_string(),
            sections: vec![Section::narrative("timeline", "Timeline", "Week 1")],
            items: vec!["Q1".to_string()],
        }
    }

    #[test]
    fn test_partial_frame_uses_public_items_name() {
        let value = frame_to_json(ContentType::Plan, StreamFrame::Partial(content()));
        assert_eq!(value["event"], "partial");
        assert_eq!(value["questions"][0], "Q1");
        assert!(value.get("cached").is_none());
    }

    #[test]
    fn test_final_frame_carries_flags() {
        let outcome = GenerationOutcome {
            content_type: ContentType::TrainingPlan,
            content: content(),
            cached: true,
            fallback: false,
            generated_at: Utc::now(),
            provider: None,
        };
        let value = frame_to_json(ContentType::TrainingPlan, StreamFrame::Final(Ok(outcome)));
        assert_eq!(value["event"], "final");
        assert_eq!(value["cached"], true);
        assert_eq!(value["fallback"], false);
        assert!(value["modules"].is_array());
        assert!(value["generated_at"].is_string());
    }

    #[test]
    fn test_timeout_frame_is_error_event() {
        let frame = StreamFrame::Final(Err(GenerationError::TimedOut { limit_secs: 90 }));
        let value = frame_to_json(ContentType::Plan, frame);
        assert_eq!(value["event"], "error");
        assert_eq!(value["code"], "GENERATION_TIMEOUT");
    }

    #[test]
    fn test_ndjson_line_is_newline_terminated() {
        let line = ndjson_line(json!({"event": "final"}));
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }
}
