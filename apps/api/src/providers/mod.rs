//! Provider clients: one per external text-generation backend.
//!
//! Every client satisfies the same `Provider` contract: single-shot
//! `generate`, and optionally `generate_stream`. Clients own transport only.
//! They know nothing about caching, validation, or fallback; the chain
//! orchestrator decides what a failure means.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::config::Config;

pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod sse;

#[cfg(test)]
pub mod stub;

/// Attempts per provider call, including the first. Retries only cover
/// rate limiting, 5xx, and transport failures.
const MAX_TRIES: u32 = 3;

/// Ordered text fragments from a streaming call.
pub type TextStream = BoxStream<'static, Result<String, ProviderError>>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} credentials are missing or were rejected")]
    MissingCredentials { provider: &'static str },

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("Network failure: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Request rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Streaming is not supported by this provider")]
    StreamingUnsupported,
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProviderError::MalformedResponse(e.to_string())
        } else {
            ProviderError::Network(e.to_string())
        }
    }
}

/// Rendered prompt text. Building it is the prompts module's concern.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

#[derive(Debug, Clone, Copy)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    fn supports_streaming(&self) -> bool {
        false
    }

    async fn generate(
        &self,
        prompt: &Prompt,
        params: &GenerationParams,
    ) -> Result<String, ProviderError>;

    async fn generate_stream(
        &self,
        _prompt: &Prompt,
        _params: &GenerationParams,
    ) -> Result<TextStream, ProviderError> {
        Err(ProviderError::StreamingUnsupported)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Shared transport
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Maps a non-success HTTP status to the uniform error set.
pub(crate) fn classify_status(
    provider: &'static str,
    status: StatusCode,
    body: String,
) -> ProviderError {
    // Anthropic, OpenAI, and Gemini all use `{"error": {"message": ...}}`.
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);

    match status.as_u16() {
        401 | 403 => ProviderError::MissingCredentials { provider },
        429 => ProviderError::RateLimited { retries: 0 },
        s if status.is_server_error() => ProviderError::Network(format!("status {s}: {message}")),
        s => ProviderError::Rejected { status: s, message },
    }
}

/// Sends the request built by `build`, retrying on 429, 5xx, and transport
/// errors with exponential backoff (1s, 2s). Returns the first successful
/// response.
pub(crate) async fn send_with_retry<F>(
    provider: &'static str,
    build: F,
) -> Result<Response, ProviderError>
where
    F: Fn() -> RequestBuilder + Send + Sync,
{
    let mut last_error: Option<ProviderError> = None;

    for attempt in 0..MAX_TRIES {
        if attempt > 0 {
            let delay = Duration::from_millis(1000 * (1 << (attempt - 1)));
            warn!(
                "{provider} call attempt {} failed, retrying after {}ms...",
                attempt,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }

        let response = match build().send().await {
            Ok(r) => r,
            Err(e) => {
                last_error = Some(ProviderError::from(e));
                continue;
            }
        };

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            warn!("{provider} returned {status}: {body}");
            last_error = Some(classify_status(provider, status, body));
            continue;
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(provider, status, body));
        }

        return Ok(response);
    }

    Err(match last_error {
        Some(ProviderError::RateLimited { .. }) | None => ProviderError::RateLimited {
            retries: MAX_TRIES - 1,
        },
        Some(other) => other,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Registry
// ────────────────────────────────────────────────────────────────────────────

/// Builds one provider client by its configured name.
pub fn build_provider(
    name: &str,
    config: &Config,
    http: &reqwest::Client,
) -> Result<Arc<dyn Provider>> {
    let provider: Arc<dyn Provider> = match name {
        "anthropic" => Arc::new(anthropic::AnthropicClient::new(
            http.clone(),
            config.anthropic_api_key.clone(),
        )),
        "openai" => Arc::new(openai::OpenAiClient::new(
            http.clone(),
            config.openai_base_url.clone(),
            config.openai_api_key.clone(),
        )),
        "gemini" => Arc::new(gemini::GeminiClient::new(
            http.clone(),
            config.gemini_api_key.clone(),
        )),
        other => bail!("Unknown provider '{other}' (expected anthropic, openai, or gemini)"),
    };
    Ok(provider)
}

/// Builds an ordered chain from configured provider names.
pub fn build_chain(
    names: &[String],
    config: &Config,
    http: &reqwest::Client,
) -> Result<Vec<Arc<dyn Provider>>> {
    names
        .iter()
        .map(|name| build_provider(name, config, http))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status_maps_uniform_errors() {
        assert!(matches!(
            classify_status("openai", StatusCode::UNAUTHORIZED, String::new()),
            ProviderError::MissingCredentials { .. }
        ));
        assert!(matches!(
            classify_status("openai", StatusCode::TOO_MANY_REQUESTS, String::new()),
            ProviderError::RateLimited { .. }
        ));
        assert!(matches!(
            classify_status("openai", StatusCode::BAD_GATEWAY, String::new()),
            ProviderError::Network(_)
        ));
    }

    #[test]
    fn test_auth_failure_names_the_provider() {
        let err = classify_status("gemini", StatusCode::FORBIDDEN, String::new());
        assert!(matches!(err, ProviderError::MissingCredentials { provider: "gemini" }));
        assert_eq!(err.to_string(), "gemini credentials are missing or were rejected");
    }

    #[test]
    fn test_classify_status_extracts_error_message() {
        let body = r#"{"error": {"message": "max_tokens too large"}}"#.to_string();
        match classify_status("openai", StatusCode::BAD_REQUEST, body) {
            ProviderError::Rejected { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "max_tokens too large");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_build_chain_preserves_order_and_rejects_unknown() {
        let config = Config::for_tests();
        let http = reqwest::Client::new();
        let names: Vec<String> = ["gemini", "anthropic"].iter().map(|s| s.to_string()).collect();
        let chain = build_chain(&names, &config, &http).unwrap();
        assert_eq!(chain[0].name(), "gemini");
        assert_eq!(chain[1].name(), "anthropic");

        assert!(build_provider("cohere", &config, &http).is_err());
    }
}
