//! Provider chain: tries providers in configured order until one yields a
//! validated payload.
//!
//! State machine per request:
//!
//! ```text
//! Idle ──► TryingProvider(0) ──ok──► Success
//!               │ fail
//!               ▼
//!          TryingProvider(1) ──ok──► Success
//!               │ fail
//!               ▼
//!              ...  ──fail on last──► Exhausted
//! ```
//!
//! Every attempt is bounded by its own deadline and recorded to telemetry
//! whatever its outcome. An attempt that fails is never retried within the
//! same request; per-call transport retries live in the provider clients.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::generation::extractor::extract_candidate;
use crate::generation::streaming::{Progress, StreamingConsumer};
use crate::generation::validator::Validator;
use crate::models::{AttemptOutcome, ContentType, ProviderAttempt, StructuredContent};
use crate::providers::{GenerationParams, Prompt, Provider, ProviderError};
use crate::telemetry::{TelemetryEvent, TelemetrySink};

#[derive(Debug)]
enum ChainState {
    Idle,
    TryingProvider(usize),
    Success {
        provider: String,
        content: StructuredContent,
    },
    Exhausted,
}

#[derive(Debug)]
pub enum ChainOutcome {
    Success {
        provider: String,
        content: StructuredContent,
    },
    Exhausted,
}

/// Terminal outcome plus the per-provider attempt log for this request.
#[derive(Debug)]
pub struct ChainResult {
    pub outcome: ChainOutcome,
    pub attempts: Vec<ProviderAttempt>,
}

type AttemptFailure = (AttemptOutcome, String);

pub struct ProviderChain {
    content_type: ContentType,
    providers: Vec<Arc<dyn Provider>>,
    validator: Validator,
    consumer: StreamingConsumer,
    attempt_timeout: Duration,
    params: GenerationParams,
    telemetry: Arc<dyn TelemetrySink>,
}

impl ProviderChain {
    pub fn new(
        content_type: ContentType,
        providers: Vec<Arc<dyn Provider>>,
        attempt_timeout: Duration,
        parse_interval: Duration,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        let validator = Validator::for_type(content_type);
        Self {
            content_type,
            providers,
            validator,
            consumer: StreamingConsumer::new(validator, parse_interval),
            attempt_timeout,
            params: GenerationParams::default(),
            telemetry,
        }
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Runs the chain to a terminal state. Streaming providers publish
    /// provisional payloads to `progress` as they become valid.
    pub async fn run(&self, prompt: &Prompt, progress: Option<&Progress>) -> ChainResult {
        let mut attempts = Vec::with_capacity(self.providers.len());
        let mut state = ChainState::Idle;

        loop {
            state = match state {
                ChainState::Idle if self.providers.is_empty() => ChainState::Exhausted,
                ChainState::Idle => ChainState::TryingProvider(0),
                ChainState::TryingProvider(index) => {
                    let provider = &self.providers[index];
                    let (attempt, result) = self.attempt(provider.as_ref(), prompt, progress).await;

                    self.telemetry.record(&TelemetryEvent::Attempt {
                        content_type: self.content_type,
                        attempt: attempt.clone(),
                    });
                    attempts.push(attempt);

                    match result {
                        Some(content) => ChainState::Success {
                            provider: provider.name().to_string(),
                            content,
                        },
                        None if index + 1 < self.providers.len() => {
                            ChainState::TryingProvider(index + 1)
                        }
                        None => ChainState::Exhausted,
                    }
                }
                ChainState::Success { provider, content } => {
                    info!(
                        content_type = %self.content_type,
                        provider = %provider,
                        attempts = attempts.len(),
                        "generation succeeded"
                    );
                    return ChainResult {
                        outcome: ChainOutcome::Success { provider, content },
                        attempts,
                    };
                }
                ChainState::Exhausted => {
                    return ChainResult {
                        outcome: ChainOutcome::Exhausted,
                        attempts,
                    };
                }
            };
        }
    }

    async fn attempt(
        &self,
        provider: &dyn Provider,
        prompt: &Prompt,
        progress: Option<&Progress>,
    ) -> (ProviderAttempt, Option<StructuredContent>) {
        let started_at = Utc::now();
        let start = Instant::now();
        let deadline = start + self.attempt_timeout;

        debug!(
            content_type = %self.content_type,
            provider = provider.name(),
            streaming = provider.supports_streaming(),
            "trying provider"
        );

        let result = if provider.supports_streaming() {
            self.attempt_streaming(provider, prompt, deadline, progress)
                .await
        } else {
            self.attempt_single_shot(provider, prompt, deadline).await
        };

        let (outcome, detail, content) = match result {
            Ok(content) => (AttemptOutcome::Success, None, Some(content)),
            Err((outcome, detail)) => (outcome, Some(detail), None),
        };

        let attempt = ProviderAttempt {
            provider: provider.name().to_string(),
            started_at,
            elapsed: start.elapsed(),
            outcome,
            detail,
        };
        (attempt, content)
    }

    async fn attempt_streaming(
        &self,
        provider: &dyn Provider,
        prompt: &Prompt,
        deadline: Instant,
        progress: Option<&Progress>,
    ) -> Result<StructuredContent, AttemptFailure> {
        let stream =
            match tokio::time::timeout_at(deadline, provider.generate_stream(prompt, &self.params))
                .await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => return Err((outcome_for(&e), e.to_string())),
                Err(_) => {
                    return Err((
                        AttemptOutcome::Timeout,
                        "stream did not open before the attempt deadline".to_string(),
                    ))
                }
            };

        self.consumer
            .consume(stream, deadline, progress)
            .await
            .map(|report| {
                debug!(
                    provider = provider.name(),
                    chunks = report.chunks,
                    parse_attempts = report.parse_attempts,
                    first_valid_at_chunk = report.first_valid_at_chunk,
                    updates = report.updates,
                    "stream consumed"
                );
                report.content
            })
            .map_err(|failure| (failure.outcome(), failure.to_string()))
    }

    async fn attempt_single_shot(
        &self,
        provider: &dyn Provider,
        prompt: &Prompt,
        deadline: Instant,
    ) -> Result<StructuredContent, AttemptFailure> {
        let raw =
            match tokio::time::timeout_at(deadline, provider.generate(prompt, &self.params)).await
            {
                Ok(Ok(raw)) => raw,
                Ok(Err(e)) => return Err((outcome_for(&e), e.to_string())),
                Err(_) => {
                    return Err((
                        AttemptOutcome::Timeout,
                        format!(
                            "no response within {}ms",
                            self.attempt_timeout.as_millis()
                        ),
                    ))
                }
            };

        let candidate = extract_candidate(&raw).ok_or_else(|| {
            (
                AttemptOutcome::ValidationFailed,
                "no JSON object in response".to_string(),
            )
        })?;

        self.validator
            .parse(candidate)
            .map_err(|e| (AttemptOutcome::ValidationFailed, e.to_string()))
    }
}

/// Provider errors are transport failures except when the provider handed
/// back something we couldn't read.
fn outcome_for(error: &ProviderError) -> AttemptOutcome {
    match error {
        ProviderError::MalformedResponse(_) => AttemptOutcome::ValidationFailed,
        _ => AttemptOutcome::NetworkError,
    }
}
