//! Generation pipeline: the single entry point request handlers call.
//!
//! Flow for one request:
//!   1. Derive the cache key; on a hit, return the cached payload. Cache calls
//!      are individually time-bounded by `ContentCache`.
//!   2. On a miss, kick off one-time cache warming without awaiting it.
//!   3. Run the provider chain under the outer request deadline.
//!   4. Success → cache for the full TTL. Exhausted → fallback generator,
//!      cached for half the TTL so providers are retried sooner.
//!   5. Outer deadline hit → the provisional streamed result if one exists,
//!      otherwise `GenerationError::TimedOut`.
//!
//! Exhaustion is not an error: callers always get content unless the outer
//! deadline fires with nothing in hand.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::Stream;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn, Instrument, Span};

use crate::cache::{build_key, CachedEntry, ContentCache};
use crate::generation::fallback::fallback_content;
use crate::generation::orchestrator::{ChainOutcome, ProviderChain};
use crate::generation::prompts::render_prompt;
use crate::generation::streaming::Progress;
use crate::generation::warmer::CacheWarmer;
use crate::models::{ContentType, GenerationRequest, StructuredContent};
use crate::telemetry::{TelemetryEvent, TelemetrySink};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation did not finish within {limit_secs}s")]
    TimedOut { limit_secs: u64 },
}

/// What a caller gets back for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    pub content_type: ContentType,
    pub content: StructuredContent,
    pub cached: bool,
    pub fallback: bool,
    pub generated_at: DateTime<Utc>,
    /// The provider that produced fresh content. `None` for cache hits and
    /// fallbacks.
    pub provider: Option<String>,
}

impl GenerationOutcome {
    /// JSON response body: content-type specific fields plus the flags.
    pub fn to_response(&self) -> Map<String, Value> {
        let mut fields = self.content.to_response_fields(self.content_type);
        fields.insert(
            "content_type".to_string(),
            Value::String(self.content_type.as_str().to_string()),
        );
        fields.insert("cached".to_string(), Value::Bool(self.cached));
        fields.insert("fallback".to_string(), Value::Bool(self.fallback));
        fields.insert(
            "generated_at".to_string(),
            Value::String(self.generated_at.to_rfc3339()),
        );
        if let Some(provider) = &self.provider {
            fields.insert("provider".to_string(), Value::String(provider.clone()));
        }
        fields
    }
}

/// One frame of a streaming response.
#[derive(Debug)]
pub enum StreamFrame {
    /// A newer best-known-valid payload. Not cached, not final.
    Partial(StructuredContent),
    Final(Result<GenerationOutcome, GenerationError>),
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub cache_ttl: Duration,
    pub request_timeout: Duration,
}

impl PipelineSettings {
    pub fn fallback_ttl(&self) -> Duration {
        self.cache_ttl / 2
    }
}

pub struct GenerationPipeline {
    content_type: ContentType,
    chain: Arc<ProviderChain>,
    cache: ContentCache,
    warmer: Option<CacheWarmer>,
    telemetry: Arc<dyn TelemetrySink>,
    settings: PipelineSettings,
}

impl GenerationPipeline {
    pub fn new(
        content_type: ContentType,
        chain: Arc<ProviderChain>,
        cache: ContentCache,
        warmer: Option<CacheWarmer>,
        telemetry: Arc<dyn TelemetrySink>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            content_type,
            chain,
            cache,
            warmer,
            telemetry,
            settings,
        }
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.chain.provider_names()
    }

    pub fn cache_backend(&self) -> &'static str {
        self.cache.backend()
    }

    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutcome, GenerationError> {
        self.generate_with_progress(request, None).await
    }

    /// Like `generate`, publishing provisional payloads to `progress`.
    pub async fn generate_with_progress(
        &self,
        request: &GenerationRequest,
        progress: Option<Progress>,
    ) -> Result<GenerationOutcome, GenerationError> {
        let namespace = self.content_type.namespace();
        let key = build_key(request);

        if request.skips_cache() {
            info!(content_type = %self.content_type, "premium cache bypass");
        } else {
            if let Some(entry) = self.cache.get(namespace, &key).await {
                self.telemetry.record(&TelemetryEvent::CacheHit {
                    content_type: self.content_type,
                });
                return Ok(GenerationOutcome {
                    content_type: self.content_type,
                    content: entry.payload,
                    cached: true,
                    fallback: entry.is_fallback,
                    generated_at: entry.cached_at,
                    provider: None,
                });
            }
            self.telemetry.record(&TelemetryEvent::CacheMiss {
                content_type: self.content_type,
            });
            if let Some(warmer) = &self.warmer {
                warmer.trigger_once();
            }
        }

        let progress = progress.unwrap_or_else(|| watch::channel(None).0);
        let prompt = render_prompt(request);

        let result = match tokio::time::timeout(
            self.settings.request_timeout,
            self.chain.run(&prompt, Some(&progress)),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                let provisional = progress.borrow().clone();
                return match provisional {
                    Some(content) => {
                        warn!(
                            content_type = %self.content_type,
                            "request deadline hit, returning provisional result"
                        );
                        self.cache
                            .put(
                                namespace,
                                &key,
                                &CachedEntry::new(content.clone(), self.settings.cache_ttl, false),
                            )
                            .await;
                        Ok(self.fresh(content, false, None))
                    }
                    None => {
                        warn!(content_type = %self.content_type, "request deadline hit with no result");
                        Err(GenerationError::TimedOut {
                            limit_secs: self.settings.request_timeout.as_secs(),
                        })
                    }
                };
            }
        };

        match result.outcome {
            ChainOutcome::Success { provider, content } => {
                self.cache
                    .put(
                        namespace,
                        &key,
                        &CachedEntry::new(content.clone(), self.settings.cache_ttl, false),
                    )
                    .await;
                Ok(self.fresh(content, false, Some(provider)))
            }
            ChainOutcome::Exhausted => {
                let tried: Vec<&str> = result.attempts.iter().map(|a| a.provider.as_str()).collect();
                warn!(content_type = %self.content_type, ?tried, "provider chain exhausted");
                self.telemetry.record(&TelemetryEvent::FallbackServed {
                    content_type: self.content_type,
                });
                let content = fallback_content(request);
                self.cache
                    .put(
                        namespace,
                        &key,
                        &CachedEntry::new(content.clone(), self.settings.fallback_ttl(), true),
                    )
                    .await;
                Ok(self.fresh(content, true, None))
            }
        }
    }

    /// Streams provisional payloads followed by exactly one final frame.
    /// Generation runs on its own task inside the caller's current span.
    pub fn generate_stream(
        self: &Arc<Self>,
        request: GenerationRequest,
    ) -> impl Stream<Item = StreamFrame> + Send + 'static {
        let pipeline = Arc::clone(self);
        let span = Span::current();
        let (tx, mut rx) = watch::channel(None);

        async_stream::stream! {
            let worker = Arc::clone(&pipeline);
            let task_request = request.clone();
            let mut task = tokio::spawn(
                async move { worker.generate_with_progress(&task_request, Some(tx)).await }
                    .instrument(span),
            );

            let result = loop {
                let changed = tokio::select! {
                    joined = &mut task => break joined,
                    changed = rx.changed() => changed,
                };
                if changed.is_err() {
                    break (&mut task).await;
                }
                let latest = rx.borrow_and_update().clone();
                if let Some(content) = latest {
                    yield StreamFrame::Partial(content);
                }
            };

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Generation task failed, serving fallback: {e}");
                    Ok(pipeline.fresh(fallback_content(&request), true, None))
                }
            };
            yield StreamFrame::Final(outcome);
        }
    }

    /// Drops the cached entry for `request`, if any.
    pub async fn invalidate(&self, request: &GenerationRequest) {
        let key = build_key(request);
        self.cache.delete(self.content_type.namespace(), &key).await;
        info!("Invalidated {}:{key}", self.content_type.namespace());
    }

    fn fresh(
        &self,
        content: StructuredContent,
        fallback: bool,
        provider: Option<String>,
    ) -> GenerationOutcome {
        GenerationOutcome {
            content_type: self.content_type,
            content,
            cached: false,
            fallback,
            generated_at: Utc::now(),
            provider,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::content::tests::{BrokenStore, HangingStore};
    use crate::cache::{CacheStore, MemoryStore};
    use crate::generation::validator::Validator;
    use crate::providers::stub::{valid_payload, Script, StubProvider};
    use crate::providers::Provider;
    use crate::telemetry::GenerationTelemetry;
    use futures::StreamExt;

    const TTL: Duration = Duration::from_secs(3600);

    struct Harness {
        pipeline: Arc<GenerationPipeline>,
        providers: Vec<Arc<StubProvider>>,
        telemetry: Arc<GenerationTelemetry>,
    }

    fn harness_with_store(
        content_type: ContentType,
        scripts: Vec<StubProvider>,
        store: Arc<dyn CacheStore>,
        request_timeout: Duration,
    ) -> Harness {
        let providers: Vec<Arc<StubProvider>> = scripts.into_iter().map(Arc::new).collect();
        let dyn_providers: Vec<Arc<dyn Provider>> = providers
            .iter()
            .map(|p| p.clone() as Arc<dyn Provider>)
            .collect();
        let telemetry = Arc::new(GenerationTelemetry::new());
        let chain = Arc::new(ProviderChain::new(
            content_type,
            dyn_providers,
            Duration::from_secs(30),
            Duration::ZERO,
            telemetry.clone(),
        ));
        let pipeline = Arc::new(GenerationPipeline::new(
            content_type,
            chain,
            ContentCache::new(store),
            None,
            telemetry.clone(),
            PipelineSettings {
                cache_ttl: TTL,
                request_timeout,
            },
        ));
        Harness {
            pipeline,
            providers,
            telemetry,
        }
    }

    fn harness(content_type: ContentType, scripts: Vec<StubProvider>) -> Harness {
        harness_with_store(
            content_type,
            scripts,
            Arc::new(MemoryStore::new()),
            Duration::from_secs(90),
        )
    }

    fn all_malformed() -> Vec<StubProvider> {
        vec![
            StubProvider::new("anthropic", Script::Text("not json".to_string())),
            StubProvider::new("openai", Script::Text("{\"half\": ".to_string())),
            StubProvider::new("gemini", Script::Text("Sorry!".to_string())),
        ]
    }

    fn software_engineer_plan() -> GenerationRequest {
        GenerationRequest::new(ContentType::Plan, "Software Engineer")
    }

    #[tokio::test]
    async fn test_all_providers_malformed_serves_valid_fallback() {
        let h = harness(ContentType::Plan, all_malformed());

        let outcome = h.pipeline.generate(&software_engineer_plan()).await.unwrap();

        assert!(outcome.fallback);
        assert!(!outcome.cached);
        assert!(outcome
            .content
            .sections
            .iter()
            .any(|s| s.title == "Preparation Timeline"));
        assert!(outcome.content.items.len() >= 10);
        assert!(Validator::for_type(ContentType::Plan).is_valid(&outcome.content));

        let snapshot = h.telemetry.snapshot();
        assert_eq!(snapshot.fallbacks_served, 1);
        assert_eq!(snapshot.attempts.validation_failed, 3);
        assert_eq!(snapshot.cache_misses, 1);
    }

    #[tokio::test]
    async fn test_repeat_request_is_served_from_cache() {
        let h = harness(ContentType::Plan, all_malformed());
        let request = software_engineer_plan();

        let first = h.pipeline.generate(&request).await.unwrap();
        h.providers[0].set_script(Script::Text(valid_payload(ContentType::Plan, "Healthy")));
        let second = h.pipeline.generate(&request).await.unwrap();

        assert!(second.cached);
        assert!(second.fallback);
        assert_eq!(first.content, second.content);
        assert_eq!(h.providers[0].calls(), 1);
        assert_eq!(h.telemetry.snapshot().cache_hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_expires_at_half_ttl_and_providers_are_retried() {
        let h = harness(ContentType::Plan, all_malformed());
        let request = software_engineer_plan();

        h.pipeline.generate(&request).await.unwrap();
        for p in &h.providers {
            p.set_script(Script::Text(valid_payload(ContentType::Plan, "Recovered")));
        }

        tokio::time::advance(TTL / 2 - Duration::from_secs(1)).await;
        assert!(h.pipeline.generate(&request).await.unwrap().cached);

        tokio::time::advance(Duration::from_secs(2)).await;
        let outcome = h.pipeline.generate(&request).await.unwrap();
        assert!(!outcome.cached);
        assert!(!outcome.fallback);
        assert_eq!(outcome.content.title, "Recovered");
        assert_eq!(outcome.provider.as_deref(), Some("anthropic"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_is_cached_for_full_ttl() {
        let h = harness(
            ContentType::Plan,
            vec![StubProvider::new(
                "anthropic",
                Script::Text(valid_payload(ContentType::Plan, "Fresh")),
            )],
        );
        let request = software_engineer_plan();

        h.pipeline.generate(&request).await.unwrap();
        tokio::time::advance(TTL - Duration::from_secs(1)).await;
        assert!(h.pipeline.generate(&request).await.unwrap().cached);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!h.pipeline.generate(&request).await.unwrap().cached);
        assert_eq!(h.providers[0].calls(), 2);
    }

    #[tokio::test]
    async fn test_premium_bypass_skips_read_but_refreshes_cache() {
        let h = harness(
            ContentType::Plan,
            vec![StubProvider::new(
                "anthropic",
                Script::Text(valid_payload(ContentType::Plan, "Old")),
            )],
        );
        let request = software_engineer_plan().premium(true);
        h.pipeline.generate(&request).await.unwrap();

        h.providers[0].set_script(Script::Text(valid_payload(ContentType::Plan, "New")));
        let mut bypass = request.clone();
        bypass.bypass_cache = true;
        let outcome = h.pipeline.generate(&bypass).await.unwrap();
        assert!(!outcome.cached);
        assert_eq!(outcome.content.title, "New");

        let cached = h.pipeline.generate(&request).await.unwrap();
        assert!(cached.cached);
        assert_eq!(cached.content.title, "New");
    }

    #[tokio::test]
    async fn test_bypass_flag_ignored_for_free_tier() {
        let h = harness(
            ContentType::Plan,
            vec![StubProvider::new(
                "anthropic",
                Script::Text(valid_payload(ContentType::Plan, "Cached")),
            )],
        );
        let mut request = software_engineer_plan();
        h.pipeline.generate(&request).await.unwrap();

        request.bypass_cache = true;
        assert!(h.pipeline.generate(&request).await.unwrap().cached);
        assert_eq!(h.providers[0].calls(), 1);
    }

    #[tokio::test]
    async fn test_premium_and_free_do_not_share_entries() {
        let h = harness(
            ContentType::Plan,
            vec![StubProvider::new(
                "anthropic",
                Script::Text(valid_payload(ContentType::Plan, "Tiered")),
            )],
        );
        h.pipeline.generate(&software_engineer_plan()).await.unwrap();
        let premium = h
            .pipeline
            .generate(&software_engineer_plan().premium(true))
            .await
            .unwrap();
        assert!(!premium.cached);
    }

    #[tokio::test]
    async fn test_unreachable_cache_still_generates() {
        let h = harness_with_store(
            ContentType::Plan,
            vec![StubProvider::new(
                "anthropic",
                Script::Text(valid_payload(ContentType::Plan, "No cache")),
            )],
            Arc::new(BrokenStore),
            Duration::from_secs(90),
        );

        let first = h.pipeline.generate(&software_engineer_plan()).await.unwrap();
        let second = h.pipeline.generate(&software_engineer_plan()).await.unwrap();
        assert_eq!(first.content.title, "No cache");
        assert!(!second.cached);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_cache_does_not_stall_requests() {
        let h = harness_with_store(
            ContentType::Plan,
            vec![StubProvider::new(
                "anthropic",
                Script::Text(valid_payload(ContentType::Plan, "Uncached")),
            )],
            Arc::new(HangingStore),
            Duration::from_secs(10),
        );
        let request = software_engineer_plan();

        let outcome = tokio::time::timeout(Duration::from_secs(60), h.pipeline.generate(&request))
            .await
            .expect("a hanging cache must not hold the request")
            .unwrap();
        assert_eq!(outcome.content.title, "Uncached");
        assert!(!outcome.cached);

        tokio::time::timeout(Duration::from_secs(60), h.pipeline.invalidate(&request))
            .await
            .expect("invalidate must not hang either");
    }

    #[tokio::test]
    async fn test_invalidate_forces_regeneration() {
        let h = harness(
            ContentType::Plan,
            vec![StubProvider::new(
                "anthropic",
                Script::Text(valid_payload(ContentType::Plan, "Plan")),
            )],
        );
        let request = software_engineer_plan();
        h.pipeline.generate(&request).await.unwrap();
        h.pipeline.invalidate(&request).await;
        assert!(!h.pipeline.generate(&request).await.unwrap().cached);
        assert_eq!(h.providers[0].calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_outer_deadline_without_result_times_out() {
        let h = harness_with_store(
            ContentType::Plan,
            vec![StubProvider::new("anthropic", Script::Hang)],
            Arc::new(MemoryStore::new()),
            Duration::from_secs(10),
        );

        let err = h.pipeline.generate(&software_engineer_plan()).await.unwrap_err();
        assert!(matches!(err, GenerationError::TimedOut { limit_secs: 10 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_outer_deadline_returns_provisional_stream_result() {
        let payload = valid_payload(ContentType::Plan, "Provisional");
        let h = harness_with_store(
            ContentType::Plan,
            vec![StubProvider::streaming(
                "anthropic",
                Script::Chunks {
                    chunks: vec![payload, "\n".to_string(), "still going".to_string()],
                    delay: Duration::from_secs(4),
                },
            )],
            Arc::new(MemoryStore::new()),
            Duration::from_secs(10),
        );

        let outcome = h.pipeline.generate(&software_engineer_plan()).await.unwrap();
        assert_eq!(outcome.content.title, "Provisional");
        assert!(!outcome.fallback);
    }

    #[tokio::test]
    async fn test_stream_emits_partials_then_one_final() {
        let payload = valid_payload(ContentType::Plan, "Streamed");
        let h = harness(
            ContentType::Plan,
            vec![StubProvider::streaming(
                "anthropic",
                Script::Chunks {
                    chunks: vec![payload],
                    delay: Duration::from_millis(1),
                },
            )],
        );

        let frames: Vec<StreamFrame> = h
            .pipeline
            .generate_stream(software_engineer_plan())
            .collect()
            .await;

        let finals = frames
            .iter()
            .filter(|f| matches!(f, StreamFrame::Final(_)))
            .count();
        assert_eq!(finals, 1);
        match frames.last() {
            Some(StreamFrame::Final(Ok(outcome))) => {
                assert_eq!(outcome.content.title, "Streamed");
                assert!(!outcome.cached);
            }
            other => panic!("expected final frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stream_of_cache_hit_is_single_final_frame() {
        let h = harness(
            ContentType::Plan,
            vec![StubProvider::new(
                "anthropic",
                Script::Text(valid_payload(ContentType::Plan, "Hit")),
            )],
        );
        h.pipeline.generate(&software_engineer_plan()).await.unwrap();

        let frames: Vec<StreamFrame> = h
            .pipeline
            .generate_stream(software_engineer_plan())
            .collect()
            .await;
        assert_eq!(frames.len(), 1);
        assert!(matches!(&frames[0], StreamFrame::Final(Ok(o)) if o.cached));
    }

    #[tokio::test]
    async fn test_resume_fallback_keeps_summary_narrative() {
        let h = harness(ContentType::ResumeRewrite, all_malformed());
        let request = GenerationRequest::new(ContentType::ResumeRewrite, "Staff Engineer")
            .with_resume_text("Built things.");

        let outcome = h.pipeline.generate(&request).await.unwrap();
        assert!(outcome.fallback);
        assert!(Validator::for_type(ContentType::ResumeRewrite).is_valid(&outcome.content));

        let response = outcome.to_response();
        assert!(response.contains_key("bullets"));
        assert_eq!(response["fallback"], Value::Bool(true));
        assert_eq!(response["content_type"], Value::String("resume-rewrite".to_string()));
    }
}
