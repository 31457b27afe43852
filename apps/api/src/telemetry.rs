//! Telemetry sink: cache hit/miss events and provider-attempt outcomes.
//!
//! `record` is synchronous and returns nothing: a sink has no way to fail
//! the request that emitted the event.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::{info, warn};

use crate::models::{AttemptOutcome, ContentType, ProviderAttempt};

#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    CacheHit { content_type: ContentType },
    CacheMiss { content_type: ContentType },
    Attempt {
        content_type: ContentType,
        attempt: ProviderAttempt,
    },
    FallbackServed { content_type: ContentType },
}

pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: &TelemetryEvent);
}

/// Default sink: structured `tracing` output plus process-wide counters for
/// the stats endpoint.
#[derive(Default)]
pub struct GenerationTelemetry {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    fallbacks_served: AtomicU64,
    attempts_success: AtomicU64,
    attempts_validation_failed: AtomicU64,
    attempts_network_error: AtomicU64,
    attempts_timeout: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptCounts {
    pub success: u64,
    pub validation_failed: u64,
    pub network_error: u64,
    pub timeout: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelemetrySnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub fallbacks_served: u64,
    pub attempts: AttemptCounts,
}

impl GenerationTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            fallbacks_served: self.fallbacks_served.load(Ordering::Relaxed),
            attempts: AttemptCounts {
                success: self.attempts_success.load(Ordering::Relaxed),
                validation_failed: self.attempts_validation_failed.load(Ordering::Relaxed),
                network_error: self.attempts_network_error.load(Ordering::Relaxed),
                timeout: self.attempts_timeout.load(Ordering::Relaxed),
            },
        }
    }

    fn attempt_counter(&self, outcome: AttemptOutcome) -> &AtomicU64 {
        match outcome {
            AttemptOutcome::Success => &self.attempts_success,
            AttemptOutcome::ValidationFailed => &self.attempts_validation_failed,
            AttemptOutcome::NetworkError => &self.attempts_network_error,
            AttemptOutcome::Timeout => &self.attempts_timeout,
        }
    }
}

impl TelemetrySink for GenerationTelemetry {
    fn record(&self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::CacheHit { content_type } => {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                info!(content_type = %content_type, "cache hit");
            }
            TelemetryEvent::CacheMiss { content_type } => {
                self.cache_misses.fetch_add(1, Ordering::Relaxed);
                info!(content_type = %content_type, "cache miss");
            }
            TelemetryEvent::Attempt {
                content_type,
                attempt,
            } => {
                self.attempt_counter(attempt.outcome)
                    .fetch_add(1, Ordering::Relaxed);
                let elapsed_ms = attempt.elapsed.as_millis() as u64;
                if attempt.outcome == AttemptOutcome::Success {
                    info!(
                        content_type = %content_type,
                        provider = %attempt.provider,
                        outcome = attempt.outcome.as_str(),
                        elapsed_ms,
                        "provider attempt"
                    );
                } else {
                    warn!(
                        content_type = %content_type,
                        provider = %attempt.provider,
                        outcome = attempt.outcome.as_str(),
                        elapsed_ms,
                        detail = attempt.detail.as_deref().unwrap_or(""),
                        "provider attempt failed"
                    );
                }
            }
            TelemetryEvent::FallbackServed { content_type } => {
                self.fallbacks_served.fetch_add(1, Ordering::Relaxed);
                warn!(content_type = %content_type, "all providers exhausted, serving fallback");
            }
        }
    }
}
