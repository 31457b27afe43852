//! OpenAI-compatible Chat Completions client. Supports single-shot and SSE
//! streaming. The base URL is configurable so any compatible gateway works.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::providers::{
    send_with_retry, sse, GenerationParams, Prompt, Provider, ProviderError, TextStream,
};

pub const MODEL: &str = "gpt-4o-mini";
const NAME: &str = "openai";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
    response_format: serde_json::Value,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiClient {
    pub fn new(client: Client, base_url: String, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    async fn send(
        &self,
        prompt: &Prompt,
        params: &GenerationParams,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ProviderError::MissingCredentials { provider: NAME })?;
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: MODEL,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            response_format: json!({"type": "json_object"}),
            stream,
        };

        send_with_retry(NAME, || {
            self.client
                .post(&url)
                .bearer_auth(api_key)
                .json(&body)
        })
        .await
    }
}

#[async_trait]
impl Provider for OpenAiClient {
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
        let response: ChatResponse = self.send(prompt, params, false).await?.json().await?;

        if let Some(usage) = &response.usage {
            debug!(
                "OpenAI call succeeded: prompt_tokens={}, completion_tokens={}",
                usage.prompt_tokens, usage.completion_tokens
            );
        }

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ProviderError::MalformedResponse("no message content".to_string()))
    }

    async fn generate_stream(
        &self,
        prompt: &Prompt,
        params: &GenerationParams,
    ) -> Result<TextStream, ProviderError> {
        let response = self.send(prompt, params, true).await?;

        let deltas = sse::data_stream(response.bytes_stream()).filter_map(|frame| async move {
            match frame {
                Ok(data) => parse_stream_chunk(&data),
                Err(e) => Some(Err(e)),
            }
        });

        Ok(deltas.boxed())
    }
}

/// Maps one streamed chunk to its content delta, if it has one.
fn parse_stream_chunk(data: &str) -> Option<Result<String, ProviderError>> {
    let chunk: serde_json::Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return Some(Err(ProviderError::MalformedResponse(e.to_string()))),
    };

    if let Some(message) = chunk["error"]["message"].as_str() {
        return Some(Err(ProviderError::Network(message.to_string())));
    }

    chunk["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(|s| Ok(s.to_string()))
}
