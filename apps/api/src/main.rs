mod cache;
mod config;
mod errors;
mod generation;
mod models;
mod providers;
mod routes;
mod state;
mod telemetry;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cache::{CacheStore, MemoryStore, RedisStore};
use crate::config::{CacheBackend, Config};
use crate::models::ContentType;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Prepline API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize the cache store (Redis connections are opened lazily per call)
    let store: Arc<dyn CacheStore> = match &config.cache_backend {
        CacheBackend::Redis { url } => {
            let redis = redis::Client::open(url.as_str()).context("Invalid REDIS_URL")?;
            Arc::new(RedisStore::new(redis))
        }
        CacheBackend::Memory => Arc::new(MemoryStore::new()),
    };
    info!(
        "{} cache store initialized (op timeout {}ms)",
        store.backend(),
        config.cache_timeout.as_millis()
    );

    // One HTTP client shared by every provider
    let http = reqwest::Client::builder()
        .pool_idle_timeout(std::time::Duration::from_secs(90))
        .build()
        .expect("Failed to build HTTP client");

    let state = AppState::build(config.clone(), store, &http)?;
    for content_type in ContentType::ALL {
        info!(
            "{content_type} chain: {:?}",
            state.pipelines.get(content_type).provider_names()
        );
    }
    info!(
        "Cache TTL {}s (fallback {}s), attempt timeout {}s, request timeout {}s, warming {}",
        config.cache_ttl.as_secs(),
        config.cache_ttl.as_secs() / 2,
        config.provider_timeout.as_secs(),
        config.request_timeout.as_secs(),
        if config.cache_warming { "on" } else { "off" }
    );

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
