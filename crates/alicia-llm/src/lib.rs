pub mod anthropic;
pub mod breaker;
pub mod error;
pub mod provider;
pub mod runtime;
pub mod types;

pub use anthropic::AnthropicProvider;
pub use breaker::{BreakerState, CircuitBreaker};
pub use error::{LlmError, Result};
pub use provider::LlmProvider;
pub use runtime::LlmRuntime;
pub use types::{ChatContext, ChatMessage, StreamChunk, ToolCallChunk, ToolDefinition};
