use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::breaker::CircuitBreaker;
use crate::error::LlmError;
use crate::provider::LlmProvider;
use crate::types::{ChatContext, StreamChunk};

const REQUEST_CEILING: Duration = Duration::from_secs(120);

/// Registry of providers plus the shared circuit breaker table, the single
/// entry point `alicia-engine` drives a turn's completion through.
pub struct LlmRuntime {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    breaker: Arc<CircuitBreaker>,
}

impl LlmRuntime {
    pub fn new(providers: Vec<Arc<dyn LlmProvider>>) -> Self {
        let mut map = HashMap::new();
        for provider in providers {
            map.insert(provider.name().to_string(), provider);
        }
        Self {
            providers: map,
            breaker: CircuitBreaker::new(),
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Stream a turn's completion from `provider_name`, gated by the
    /// circuit breaker and bounded by the 120s hard ceiling and the
    /// caller's `cancel` token.
    pub async fn stream_chat(
        &self,
        provider_name: &str,
        context: ChatContext,
        cancel: CancellationToken,
    ) -> BoxStream<'static, StreamChunk> {
        let Some(provider) = self.providers.get(provider_name).cloned() else {
            return stream::once(async move {
                StreamChunk::failed(LlmError::Provider(
                    provider_name.to_string(),
                    "unknown provider".to_string(),
                ))
            })
            .boxed();
        };

        if !self.breaker.call_permitted(provider_name) {
            return stream::once(async move {
                StreamChunk::failed(LlmError::CircuitOpen(provider_name.to_string()))
            })
            .boxed();
        }

        let breaker = self.breaker.clone();
        let name = provider_name.to_string();
        let inner = provider.stream_chat(context, cancel.clone()).await;

        let timed = tokio_stream::StreamExt::timeout(inner, REQUEST_CEILING);
        let guarded = timed.then(move |item| {
            let breaker = breaker.clone();
            let name = name.clone();
            let cancel = cancel.clone();
            async move {
                match item {
                    Ok(chunk) => {
                        if let Some(err) = &chunk.error {
                            if !matches!(err, LlmError::Cancelled) {
                                breaker.record_failure(&name);
                            }
                        } else if chunk.done {
                            breaker.record_success(&name);
                        }
                        chunk
                    }
                    Err(_elapsed) => {
                        warn!(provider = %name, "llm stream exceeded 120s ceiling");
                        breaker.record_failure(&name);
                        cancel.cancel();
                        StreamChunk::failed(LlmError::Timeout(name.clone()))
                    }
                }
            }
        });

        guarded.boxed()
    }
}
