pub mod error;
pub mod retriever;
pub mod traits;

pub use error::{MemoryError, Result};
pub use retriever::{MemoryRetriever, RetrievedMemory};
pub use traits::{Embedder, MockEmbedder, PromptProvider, StaticPromptProvider};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn retrieve_returns_nothing_below_threshold() {
        let store = Arc::new(alicia_store::Store::open_in_memory(4).unwrap());
        store
            .upsert_memory("user-1", "likes rust", &[1.0, 0.0, 0.0, 0.0], 0.5, 0.5, &[], false, None)
            .unwrap();
        let retriever = MemoryRetriever::new(
            store,
            Arc::new(MockEmbedder::new(4)),
            Arc::new(StaticPromptProvider::new("fallback")),
        );
        let results = retriever
            .retrieve("user-1", "msg-1", "conv-1", "totally unrelated query", 5, 0.999, 0.0)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn retrieve_records_memory_usage_for_kept_candidates() {
        let store = Arc::new(alicia_store::Store::open_in_memory(4).unwrap());
        let memory = store
            .upsert_memory("user-1", "likes rust", &[1.0, 0.0, 0.0, 0.0], 0.5, 0.5, &[], false, None)
            .unwrap();
        let retriever = MemoryRetriever::new(
            store.clone(),
            Arc::new(MockEmbedder::new(4)),
            Arc::new(StaticPromptProvider::new("fallback")),
        );
        let results = retriever
            .retrieve("user-1", "msg-1", "conv-1", "likes rust", 5, 0.0, 0.0)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].memory_id, memory.id);
    }
}
