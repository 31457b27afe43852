use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::models::ContentType;

pub const DEFAULT_PROVIDER_ORDER: &str = "anthropic,openai,gemini";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const KNOWN_PROVIDERS: &[&str] = &["anthropic", "openai", "gemini"];

/// Where cached content lives. `Memory` is process-local and suits
/// single-instance and local runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackend {
    Redis { url: String },
    Memory,
}

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub cache_backend: CacheBackend,
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub gemini_api_key: Option<String>,
    pub plan_providers: Vec<String>,
    pub training_plan_providers: Vec<String>,
    pub resume_providers: Vec<String>,
    pub cache_ttl: Duration,
    /// Bound on a single cache store call.
    pub cache_timeout: Duration,
    pub provider_timeout: Duration,
    pub request_timeout: Duration,
    pub stream_parse_interval: Duration,
    pub cache_warming: bool,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            cache_backend: parse_cache_backend(
                optional_env("CACHE_BACKEND").as_deref(),
                optional_env("REDIS_URL"),
            )?,
            anthropic_api_key: optional_env("ANTHROPIC_API_KEY"),
            openai_api_key: optional_env("OPENAI_API_KEY"),
            openai_base_url: optional_env("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            gemini_api_key: optional_env("GEMINI_API_KEY"),
            plan_providers: provider_order("PLAN_PROVIDERS")?,
            training_plan_providers: provider_order("TRAINING_PLAN_PROVIDERS")?,
            resume_providers: provider_order("RESUME_PROVIDERS")?,
            cache_ttl: Duration::from_secs(parse_env("CACHE_TTL_SECS", 86_400)?),
            cache_timeout: Duration::from_millis(parse_env("CACHE_TIMEOUT_MS", 1000)?),
            provider_timeout: Duration::from_secs(parse_env("PROVIDER_TIMEOUT_SECS", 30)?),
            request_timeout: Duration::from_secs(parse_env("REQUEST_TIMEOUT_SECS", 90)?),
            stream_parse_interval: Duration::from_millis(parse_env(
                "STREAM_PARSE_INTERVAL_MS",
                250,
            )?),
            cache_warming: parse_env("CACHE_WARMING", true)?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Chain order for one call site.
    pub fn providers_for(&self, content_type: ContentType) -> &[String] {
        match content_type {
            ContentType::Plan => &self.plan_providers,
            ContentType::TrainingPlan => &self.training_plan_providers,
            ContentType::ResumeRewrite => &self.resume_providers,
        }
    }

    /// Defaults with no credentials and no environment lookups.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        let order = parse_provider_order(DEFAULT_PROVIDER_ORDER).unwrap_or_default();
        Config {
            cache_backend: CacheBackend::Memory,
            anthropic_api_key: None,
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            gemini_api_key: None,
            plan_providers: order.clone(),
            training_plan_providers: order.clone(),
            resume_providers: order,
            cache_ttl: Duration::from_secs(86_400),
            cache_timeout: Duration::from_millis(1000),
            provider_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(90),
            stream_parse_interval: Duration::from_millis(250),
            cache_warming: false,
            port: 8080,
            rust_log: "info".to_string(),
        }
    }
}

/// Unset and blank both mean "not configured".
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

fn parse_cache_backend(kind: Option<&str>, redis_url: Option<String>) -> Result<CacheBackend> {
    match kind.map(str::to_ascii_lowercase).as_deref() {
        None | Some("redis") => redis_url
            .map(|url| CacheBackend::Redis { url })
            .context("Required environment variable 'REDIS_URL' is not set"),
        Some("memory") => Ok(CacheBackend::Memory),
        Some(other) => bail!("CACHE_BACKEND has an invalid value '{other}' (expected redis or memory)"),
    }
}

fn provider_order(key: &str) -> Result<Vec<String>> {
    let raw = optional_env(key).unwrap_or_else(|| DEFAULT_PROVIDER_ORDER.to_string());
    parse_provider_order(&raw).with_context(|| format!("{key} is not a valid provider order"))
}

fn parse_provider_order(raw: &str) -> Result<Vec<String>> {
    let names: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect();

    if names.is_empty() {
        bail!("at least one provider is required");
    }
    if let Some(unknown) = names
        .iter()
        .find(|n| !KNOWN_PROVIDERS.contains(&n.as_str()))
    {
        bail!("unknown provider '{unknown}' (expected one of {KNOWN_PROVIDERS:?})");
    }
    Ok(names)
}
