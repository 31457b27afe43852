use std::sync::Arc;

use anyhow::{Context, Result};

use crate::cache::{CacheStore, ContentCache};
use crate::config::Config;
use crate::generation::orchestrator::ProviderChain;
use crate::generation::pipeline::{GenerationPipeline, PipelineSettings};
use crate::generation::warmer::CacheWarmer;
use crate::models::ContentType;
use crate::providers::build_chain;
use crate::telemetry::GenerationTelemetry;

/// One pipeline per call site. Each has its own provider order.
#[derive(Clone)]
pub struct Pipelines {
    pub plan: Arc<GenerationPipeline>,
    pub training_plan: Arc<GenerationPipeline>,
    pub resume_rewrite: Arc<GenerationPipeline>,
}

impl Pipelines {
    pub fn get(&self, content_type: ContentType) -> &Arc<GenerationPipeline> {
        match content_type {
            ContentType::Plan => &self.plan,
            ContentType::TrainingPlan => &self.training_plan,
            ContentType::ResumeRewrite => &self.resume_rewrite,
        }
    }
}

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub pipelines: Pipelines,
    /// Shared by every pipeline; read by the stats endpoint.
    pub telemetry: Arc<GenerationTelemetry>,
    pub config: Config,
}

impl AppState {
    /// Wires one pipeline per call site over a shared cache and telemetry sink.
    /// Spawns cache warmers when enabled, so it must run inside a Tokio runtime.
    pub fn build(config: Config, store: Arc<dyn CacheStore>, http: &reqwest::Client) -> Result<Self> {
        let telemetry = Arc::new(GenerationTelemetry::new());
        let cache = ContentCache::new(store).with_timeout(config.cache_timeout);
        let settings = PipelineSettings {
            cache_ttl: config.cache_ttl,
            request_timeout: config.request_timeout,
        };

        let pipeline_for = |content_type: ContentType| -> Result<Arc<GenerationPipeline>> {
            let providers = build_chain(config.providers_for(content_type), &config, http)
                .with_context(|| format!("Failed to build the {content_type} provider chain"))?;
            let chain = Arc::new(ProviderChain::new(
                content_type,
                providers,
                config.provider_timeout,
                config.stream_parse_interval,
                telemetry.clone(),
            ));
            let warmer = config.cache_warming.then(|| {
                CacheWarmer::spawn(content_type, chain.clone(), cache.clone(), config.cache_ttl)
            });
            Ok(Arc::new(GenerationPipeline::new(
                content_type,
                chain,
                cache.clone(),
                warmer,
                telemetry.clone(),
                settings,
            )))
        };

        let pipelines = Pipelines {
            plan: pipeline_for(ContentType::Plan)?,
            training_plan: pipeline_for(ContentType::TrainingPlan)?,
            resume_rewrite: pipeline_for(ContentType::ResumeRewrite)?,
        };

        Ok(Self {
            pipelines,
            telemetry,
            config,
        })
    }
}
