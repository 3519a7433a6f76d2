use serde::{Deserialize, Serialize};

use crate::error::LlmError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: alicia_core::types::Role,
    pub content: String,
}

/// Everything a provider needs to stream a turn's completion. Built by
/// `alicia-engine` from the active branch (`Store::walk_active_branch`)
/// plus the system prompt and any retrieved memories/tool definitions.
#[derive(Debug, Clone)]
pub struct ChatContext {
    pub model: String,
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub schema: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ToolCallChunk {
    pub id: String,
    pub name: String,
    pub arguments_fragment: String,
    pub done: bool,
}

/// One chunk of a finite sequence yielded by `LlmProvider::stream_chat`.
/// Consumers route on `content`/`tool_call`/`reasoning`/`done`/`error`
/// with a simple loop — never a callback graph.
#[derive(Debug, Clone)]
pub struct StreamChunk {
    pub content: Option<String>,
    pub tool_call: Option<ToolCallChunk>,
    pub reasoning: Option<String>,
    pub done: bool,
    pub error: Option<LlmError>,
}

impl StreamChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_call: None,
            reasoning: None,
            done: false,
            error: None,
        }
    }

    pub fn finished() -> Self {
        Self {
            content: None,
            tool_call: None,
            reasoning: None,
            done: true,
            error: None,
        }
    }

    pub fn failed(error: LlmError) -> Self {
        Self {
            content: None,
            tool_call: None,
            reasoning: None,
            done: true,
            error: Some(error),
        }
    }
}
