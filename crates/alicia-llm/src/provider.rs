use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::types::{ChatContext, StreamChunk};

/// Common interface for every model backend (Anthropic, OpenAI, local, ...).
/// `stream_chat` must honor `cancel`: once fired, it yields one final
/// `StreamChunk{error: Some(Cancelled), done: true}` and drops its
/// underlying task — no background work survives the call returning.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn stream_chat(
        &self,
        context: ChatContext,
        cancel: CancellationToken,
    ) -> BoxStream<'static, StreamChunk>;
}
