//! Cache warmer: pre-populates the cache for common inputs in the background.
//!
//! Triggered once per process per content type, on the first cache miss.
//! Triggering only enqueues; a worker task drains the queue and spawns one
//! detached generation per cold key, so warming never delays the request that
//! triggered it and a failed warm has no effect on anything else.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cache::{build_key, CachedEntry, ContentCache};
use crate::generation::orchestrator::{ChainOutcome, ProviderChain};
use crate::generation::prompts::render_prompt;
use crate::models::{ContentType, GenerationRequest};

const QUEUE_CAPACITY: usize = 64;

/// Roles warmed for every content type that has no user-specific input.
const COMMON_ROLES: &[&str] = &[
    "Software Engineer",
    "Senior Software Engineer",
    "Product Manager",
    "Data Scientist",
    "Data Analyst",
    "Frontend Developer",
    "Backend Developer",
    "DevOps Engineer",
];

/// Requests worth having warm for `content_type`. Resume rewrites depend on
/// the user's own resume, so nothing about them is common.
pub fn common_requests(content_type: ContentType) -> Vec<GenerationRequest> {
    match content_type {
        ContentType::ResumeRewrite => Vec::new(),
        ContentType::Plan | ContentType::TrainingPlan => COMMON_ROLES
            .iter()
            .map(|role| GenerationRequest::new(content_type, *role))
            .collect(),
    }
}

pub struct CacheWarmer {
    content_type: ContentType,
    queue: mpsc::Sender<GenerationRequest>,
    triggered: AtomicBool,
}

impl CacheWarmer {
    /// Starts the worker. Must be called from inside a Tokio runtime.
    pub fn spawn(
        content_type: ContentType,
        chain: Arc<ProviderChain>,
        cache: ContentCache,
        ttl: Duration,
    ) -> Self {
        let (queue, rx) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(run_worker(content_type, rx, chain, cache, ttl));
        Self {
            content_type,
            queue,
            triggered: AtomicBool::new(false),
        }
    }

    /// Enqueues the common inputs on the first call only. Returns whether this
    /// call did the enqueueing. Never blocks.
    pub fn trigger_once(&self) -> bool {
        if self.triggered.swap(true, Ordering::SeqCst) {
            return false;
        }

        let requests = common_requests(self.content_type);
        info!(
            content_type = %self.content_type,
            inputs = requests.len(),
            "starting cache warming"
        );
        for request in requests {
            if let Err(e) = self.queue.try_send(request) {
                warn!(content_type = %self.content_type, "Cache warming queue rejected input: {e}");
            }
        }
        true
    }
}

async fn run_worker(
    content_type: ContentType,
    mut rx: mpsc::Receiver<GenerationRequest>,
    chain: Arc<ProviderChain>,
    cache: ContentCache,
    ttl: Duration,
) {
    while let Some(request) = rx.recv().await {
        tokio::spawn(warm_one(request, chain.clone(), cache.clone(), ttl));
    }
    debug!(content_type = %content_type, "cache warming worker stopped");
}

async fn warm_one(
    request: GenerationRequest,
    chain: Arc<ProviderChain>,
    cache: ContentCache,
    ttl: Duration,
) {
    let namespace = request.content_type.namespace();
    let key = build_key(&request);

    if cache.get(namespace, &key).await.is_some() {
        debug!("Cache already warm for {namespace}:{key}");
        return;
    }

    let result = chain.run(&render_prompt(&request), None).await;
    match result.outcome {
        ChainOutcome::Success { provider, content } => {
            cache
                .put(namespace, &key, &CachedEntry::new(content, ttl, false))
                .await;
            debug!("Warmed {namespace}:{key} via {provider}");
        }
        // Warming never caches fallback content.
        ChainOutcome::Exhausted => {
            debug!("Skipped warming {namespace}:{key}: all providers failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::providers::stub::{valid_payload, Script, StubProvider};
    use crate::providers::Provider;
    use crate::telemetry::GenerationTelemetry;

    fn chain_with(provider: Arc<StubProvider>) -> Arc<ProviderChain> {
        let providers: Vec<Arc<dyn Provider>> = vec![provider];
        Arc::new(ProviderChain::new(
            ContentType::Plan,
            providers,
            Duration::from_secs(30),
            Duration::ZERO,
            Arc::new(GenerationTelemetry::new()),
        ))
    }

    async fn wait_for_calls(provider: &StubProvider, expected: usize) {
        for _ in 0..200 {
            if provider.calls() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[test]
    fn test_resume_rewrite_has_no_common_inputs() {
        assert!(common_requests(ContentType::ResumeRewrite).is_empty());
        assert_eq!(common_requests(ContentType::Plan).len(), COMMON_ROLES.len());
    }

    #[tokio::test]
    async fn test_trigger_fires_once_and_populates_cache() {
        let provider = Arc::new(StubProvider::new(
            "stub",
            Script::Text(valid_payload(ContentType::Plan, "Warm")),
        ));
        let cache = ContentCache::new(Arc::new(MemoryStore::new()));
        let warmer = CacheWarmer::spawn(
            ContentType::Plan,
            chain_with(provider.clone()),
            cache.clone(),
            Duration::from_secs(600),
        );

        assert!(warmer.trigger_once());
        assert!(!warmer.trigger_once());

        wait_for_calls(&provider, COMMON_ROLES.len()).await;
        // Let the last puts land.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let request = GenerationRequest::new(ContentType::Plan, "Software Engineer");
        let entry = cache
            .get(ContentType::Plan.namespace(), &build_key(&request))
            .await
            .expect("common input should be warm");
        assert!(!entry.is_fallback);
        assert_eq!(provider.calls(), COMMON_ROLES.len());
    }

    #[tokio::test]
    async fn test_failed_warm_caches_nothing() {
        let provider = Arc::new(StubProvider::new("stub", Script::Fail));
        let cache = ContentCache::new(Arc::new(MemoryStore::new()));
        let warmer = CacheWarmer::spawn(
            ContentType::Plan,
            chain_with(provider.clone()),
            cache.clone(),
            Duration::from_secs(600),
        );

        warmer.trigger_once();
        wait_for_calls(&provider, COMMON_ROLES.len()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let request = GenerationRequest::new(ContentType::Plan, "Data Scientist");
        assert!(cache
            .get(ContentType::Plan.namespace(), &build_key(&request))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_warm_keys_are_skipped() {
        let provider = Arc::new(StubProvider::new(
            "stub",
            Script::Text(valid_payload(ContentType::Plan, "Warm")),
        ));
        let cache = ContentCache::new(Arc::new(MemoryStore::new()));
        let chain = chain_with(provider.clone());

        let request = GenerationRequest::new(ContentType::Plan, "Product Manager");
        warm_one(request.clone(), chain.clone(), cache.clone(), Duration::from_secs(60)).await;
        warm_one(request, chain, cache, Duration::from_secs(60)).await;

        assert_eq!(provider.calls(), 1);
    }
}
