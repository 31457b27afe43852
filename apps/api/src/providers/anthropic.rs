//! Anthropic Messages API client. Supports single-shot and SSE streaming.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::providers::{
    send_with_retry, sse, GenerationParams, Prompt, Provider, ProviderError, TextStream,
};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const MODEL: &str = "claude-sonnet-4-5";
const NAME: &str = "anthropic";

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

impl AnthropicResponse {
    /// Concatenated text of all text blocks.
    fn text(&self) -> String {
        self.content
            .iter()
            .filter(|b| b.block_type == "text")
            .filter_map(|b| b.text.as_deref())
            .collect()
    }
}

#[derive(Clone)]
pub struct AnthropicClient {
    client: Client,
    api_key: Option<String>,
}

impl AnthropicClient {
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self { client, api_key }
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .ok_or(ProviderError::MissingCredentials { provider: NAME })
    }

    async fn send(
        &self,
        prompt: &Prompt,
        params: &GenerationParams,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let api_key = self.api_key()?;
        let body = AnthropicRequest {
            model: MODEL,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            system: &prompt.system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: &prompt.user,
            }],
            stream,
        };

        send_with_retry(NAME, || {
            self.client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&body)
        })
        .await
    }
}

#[async_trait]
impl Provider for AnthropicClient {
    fn name(&self) -> &str {
        NAME
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn generate(
        &self,
        prompt: &Prompt,
        params: &GenerationParams,
    ) -> Result<String, ProviderError> {
        let response: AnthropicResponse = self.send(prompt, params, false).await?.json().await?;

        debug!(
            "Anthropic call succeeded: input_tokens={}, output_tokens={}",
            response.usage.input_tokens, response.usage.output_tokens
        );

        let text = response.text();
        if text.trim().is_empty() {
            return Err(ProviderError::MalformedResponse(
                "response contained no text blocks".to_string(),
            ));
        }
        Ok(text)
    }

    async fn generate_stream(
        &self,
        prompt: &Prompt,
        params: &GenerationParams,
    ) -> Result<TextStream, ProviderError> {
        let response = self.send(prompt, params, true).await?;

        let deltas = sse::data_stream(response.bytes_stream()).filter_map(|frame| async move {
            match frame {
                Ok(data) => parse_stream_event(&data),
                Err(e) => Some(Err(e)),
            }
        });

        Ok(deltas.boxed())
    }
}

/// Maps one SSE payload to a text fragment. Only `content_block_delta` carries
/// text; `error` events end the attempt; everything else is bookkeeping.
fn parse_stream_event(data: &str) -> Option<Result<String, ProviderError>> {
    let event: serde_json::Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return Some(Err(ProviderError::MalformedResponse(e.to_string()))),
    };

    match event["type"].as_str() {
        Some("content_block_delta") => event["delta"]["text"]
            .as_str()
            .map(|text| Ok(text.to_string())),
        Some("error") => Some(Err(ProviderError::Network(
            event["error"]["message"]
                .as_str()
                .unwrap_or("stream error")
                .to_string(),
        ))),
        _ => None,
    }
}
