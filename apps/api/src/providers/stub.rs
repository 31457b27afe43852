//! Scripted provider for orchestrator and pipeline tests. No network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::models::ContentType;
use crate::providers::{GenerationParams, Prompt, Provider, ProviderError, TextStream};

#[derive(Debug, Clone)]
pub enum Script {
    /// Single-shot text, or one chunk when streaming.
    Text(String),
    /// Transport failure.
    Fail,
    /// No credentials configured.
    MissingKey,
    /// Streamed fragments, `delay` apart.
    Chunks { chunks: Vec<String>, delay: Duration },
    /// Fragments followed by a mid-stream transport error.
    ChunksThenFail(Vec<String>),
    /// Never answers.
    Hang,
}

pub struct StubProvider {
    name: String,
    streaming: bool,
    script: Mutex<Script>,
    calls: AtomicUsize,
}

impl StubProvider {
    pub fn new(name: &str, script: Script) -> Self {
        Self {
            name: name.to_string(),
            streaming: false,
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn streaming(name: &str, script: Script) -> Self {
        Self {
            streaming: true,
            ..Self::new(name, script)
        }
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_script(&self) -> Script {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for StubProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn generate(&self, _: &Prompt, _: &GenerationParams) -> Result<String, ProviderError> {
        match self.next_script() {
            Script::Text(text) => Ok(text),
            Script::Fail => Err(ProviderError::Network("stub failure".to_string())),
            Script::MissingKey => Err(ProviderError::MissingCredentials { provider: "stub" }),
            Script::Chunks { chunks, .. } => Ok(chunks.concat()),
            Script::ChunksThenFail(_) => Err(ProviderError::Network("stub failure".to_string())),
            Script::Hang => futures::future::pending().await,
        }
    }

    async fn generate_stream(
        &self,
        _: &Prompt,
        _: &GenerationParams,
    ) -> Result<TextStream, ProviderError> {
        match self.next_script() {
            Script::Text(text) => Ok(stream::iter(vec![Ok(text)]).boxed()),
            Script::Fail => Err(ProviderError::Network("stub failure".to_string())),
            Script::MissingKey => Err(ProviderError::MissingCredentials { provider: "stub" }),
            Script::Chunks { chunks, delay } => Ok(stream::iter(chunks)
                .then(move |chunk| async move {
                    tokio::time::sleep(delay).await;
                    Ok::<_, ProviderError>(chunk)
                })
                .boxed()),
            Script::ChunksThenFail(chunks) => Ok(stream::iter(chunks.into_iter().map(Ok))
                .chain(stream::once(async {
                    Err(ProviderError::Network("connection reset".to_string()))
                }))
                .boxed()),
            Script::Hang => Ok(stream::pending::<Result<String, ProviderError>>().boxed()),
        }
    }
}

/// A schema-valid provider payload for `content_type`, distinguishable by `title`.
pub fn valid_payload(content_type: ContentType, title: &str) -> String {
    let items: Vec<String> = (1..=content_type.min_items())
        .map(|i| format!("{title} item {i}"))
        .collect();
    let mut payload = serde_json::json!({
        "title": title,
        "sections": [
            {"type": "timeline", "title": "Preparation Timeline", "content": "Week 1: basics"},
            {"type": "topics", "title": "Key Topics", "items": ["Design", "Coding"]}
        ],
    });
    payload[content_type.items_field()] = serde_json::json!(items);
    payload.to_string()
}
