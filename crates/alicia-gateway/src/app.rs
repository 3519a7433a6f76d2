use std::sync::Arc;

use alicia_core::config::AliciaConfig;
use alicia_engine::{EngineState, Observability};
use alicia_llm::{AnthropicProvider, LlmProvider};
use alicia_memory::{MemoryRetriever, MockEmbedder, StaticPromptProvider};
use alicia_store::Store;
use alicia_tools::ToolRegistry;
use alicia_tts::{SynthesizedAudio, TtsClient, TtsError, TtsPipeline};
use async_trait::async_trait;

/// Central shared state handed to every Axum handler, mirroring the
/// teacher's `Arc<AppState>` convention.
pub struct AppState {
    pub config: AliciaConfig,
    pub engine: EngineState,
}

impl AppState {
    pub fn new(config: AliciaConfig) -> anyhow::Result<Self> {
        let store = Arc::new(Store::open(
            &config.store.database_path,
            config.memory.embedding_dim,
        )?);

        let embedder = Arc::new(MockEmbedder::new(config.memory.embedding_dim));
        let prompts = Arc::new(StaticPromptProvider::new(
            "Filter retrieved memories for relevance to the user's message.",
        ));
        let memory = Arc::new(MemoryRetriever::new(store.clone(), embedder, prompts));

        let tools = Arc::new(ToolRegistry::new());

        let llm: Arc<dyn LlmProvider> = match std::env::var("ANTHROPIC_API_KEY") {
            Ok(key) => Arc::new(AnthropicProvider::new(key, None)),
            Err(_) => {
                tracing::warn!("ANTHROPIC_API_KEY unset, using echo provider");
                Arc::new(EchoProvider)
            }
        };

        let tts = Arc::new(TtsPipeline::new(
            Arc::new(SilentTtsClient),
            store.clone(),
            config.tts.inline_audio_max_bytes,
        ));

        let engine = EngineState::new(
            store,
            memory,
            tools,
            llm,
            tts,
            Arc::new(Observability::new()),
        );

        Ok(Self { config, engine })
    }
}

/// Fallback provider used when no real LLM credentials are configured —
/// echoes the user's last message back as a single sentence, so the
/// gateway is runnable end-to-end without external network access.
struct EchoProvider;

#[async_trait]
impl LlmProvider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn stream_chat(
        &self,
        context: alicia_llm::ChatContext,
        _cancel: tokio_util::sync::CancellationToken,
    ) -> futures_util::stream::BoxStream<'static, alicia_llm::StreamChunk> {
        use futures_util::stream::{self, StreamExt};
        let last = context
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        stream::iter(vec![
            alicia_llm::StreamChunk::text(format!("You said: {last}")),
            alicia_llm::StreamChunk::finished(),
        ])
        .boxed()
    }
}

/// Fallback TTS client — speech synthesis is out of scope; this produces
/// no audio so turns still complete and persist text-only sentences.
struct SilentTtsClient;

#[async_trait]
impl TtsClient for SilentTtsClient {
    async fn synthesize(&self, _text: &str, _voice: &str) -> Result<SynthesizedAudio, TtsError> {
        Ok(SynthesizedAudio {
            format: "none".to_string(),
            duration_ms: 0,
            data: Vec::new(),
        })
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> axum::Router {
    axum::Router::new()
        .route("/health", axum::routing::get(crate::http::health::health_handler))
        .route("/stop/{conversation_id}", axum::routing::post(crate::http::stop::stop_handler))
        .route("/ws", axum::routing::get(crate::ws::connection::ws_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
