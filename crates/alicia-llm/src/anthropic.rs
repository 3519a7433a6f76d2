//! Anthropic Messages API backend, adapted to this crate's `stream_chat`
//! contract: one non-streaming call, result replayed as a short
//! `StreamChunk` sequence rather than parsing SSE, since nothing
//! downstream needs token-by-token deltas from the network itself
//! (segmentation happens in `alicia-tts`).

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::provider::LlmProvider;
use crate::types::{ChatContext, StreamChunk, ToolCallChunk};

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.anthropic.com".to_string()),
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn stream_chat(
        &self,
        context: ChatContext,
        cancel: CancellationToken,
    ) -> BoxStream<'static, StreamChunk> {
        if cancel.is_cancelled() {
            return stream::once(async { StreamChunk::failed(crate::error::LlmError::Cancelled) })
                .boxed();
        }

        let body = build_request_body(&context);
        let url = format!("{}/v1/messages", self.base_url);
        debug!(model = %context.model, "sending request to Anthropic");

        let result = tokio::select! {
            resp = self
                .client
                .post(&url)
                .header("anthropic-version", API_VERSION)
                .header("x-api-key", &self.api_key)
                .header("content-type", "application/json")
                .json(&body)
                .send() => resp,
            _ = cancel.cancelled() => {
                return stream::once(async { StreamChunk::failed(crate::error::LlmError::Cancelled) }).boxed();
            }
        };

        let chunks = match result {
            Ok(resp) if resp.status().is_success() => match resp.json::<ApiResponse>().await {
                Ok(parsed) => response_to_chunks(parsed),
                Err(e) => vec![StreamChunk::failed(crate::error::LlmError::Provider(
                    "anthropic".to_string(),
                    format!("response parse failed: {e}"),
                ))],
            },
            Ok(resp) => {
                let status = resp.status().as_u16();
                let text = resp.text().await.unwrap_or_default();
                warn!(status, body = %text, "Anthropic API error");
                vec![StreamChunk::failed(crate::error::LlmError::Provider(
                    "anthropic".to_string(),
                    format!("http {status}: {text}"),
                ))]
            }
            Err(e) => vec![StreamChunk::failed(crate::error::LlmError::Provider(
                "anthropic".to_string(),
                e.to_string(),
            ))],
        };

        stream::iter(chunks).boxed()
    }
}

fn build_request_body(context: &ChatContext) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = context
        .messages
        .iter()
        .map(|m| {
            serde_json::json!({
                "role": m.role,
                "content": m.content,
            })
        })
        .collect();

    let mut body = serde_json::json!({
        "model": context.model,
        "max_tokens": context.max_tokens,
        "system": context.system,
        "messages": messages,
        "stream": false,
    });

    if !context.tools.is_empty() {
        let tools: Vec<serde_json::Value> = context
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.schema,
                })
            })
            .collect();
        body["tools"] = serde_json::Value::Array(tools);
    }

    body
}

fn response_to_chunks(resp: ApiResponse) -> Vec<StreamChunk> {
    let mut out = Vec::new();
    for block in resp.content {
        match block {
            ContentBlock::Text { text } => out.push(StreamChunk::text(text)),
            ContentBlock::ToolUse { id, name, input } => {
                out.push(StreamChunk {
                    content: None,
                    tool_call: Some(ToolCallChunk {
                        id,
                        name,
                        arguments_fragment: input.to_string(),
                        done: true,
                    }),
                    reasoning: None,
                    done: false,
                    error: None,
                });
            }
            ContentBlock::Unknown => {}
        }
    }
    out.push(StreamChunk::finished());
    out
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Unknown,
}
