//! Seed-scenario integration tests against an in-memory `Store` and mock
//! provider/tool/tts collaborators.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;

use alicia_core::types::{CompletionStatus, Role};
use alicia_engine::observability::Observability;
use alicia_engine::state::EngineState;
use alicia_engine::{run_turn, VariationMode};
use alicia_llm::{ChatContext, LlmProvider, StreamChunk, ToolCallChunk};
use alicia_memory::{MemoryRetriever, MockEmbedder, StaticPromptProvider};
use alicia_protocol::envelope::Body;
use alicia_store::Store;
use alicia_tools::{PluginToolExecutor, ToolRegistry, ToolResultValue};
use alicia_tts::{SynthesizedAudio, TtsClient, TtsError, TtsPipeline};

struct ScriptedProvider {
    chunks: Vec<StreamChunk>,
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream_chat(
        &self,
        _context: ChatContext,
        _cancel: CancellationToken,
    ) -> BoxStream<'static, StreamChunk> {
        stream::iter(self.chunks.clone()).boxed()
    }
}

struct HangingProvider;

#[async_trait]
impl LlmProvider for HangingProvider {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn stream_chat(
        &self,
        _context: ChatContext,
        cancel: CancellationToken,
    ) -> BoxStream<'static, StreamChunk> {
        stream::unfold(cancel, |cancel| async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            if cancel.is_cancelled() {
                None
            } else {
                Some((StreamChunk::text("still thinking... "), cancel))
            }
        })
        .boxed()
    }
}

struct EchoTts;

#[async_trait]
impl TtsClient for EchoTts {
    async fn synthesize(
        &self,
        text: &str,
        _voice: &str,
    ) -> Result<SynthesizedAudio, TtsError> {
        Ok(SynthesizedAudio {
            format: "pcm16".to_string(),
            duration_ms: text.len() as i64,
            data: vec![0u8; text.len()],
        })
    }
}

fn test_state(llm: Arc<dyn LlmProvider>) -> (EngineState, Arc<Store>) {
    let store = Arc::new(Store::open_in_memory(4).unwrap());
    let memory = Arc::new(MemoryRetriever::new(
        store.clone(),
        Arc::new(MockEmbedder::new(4)),
        Arc::new(StaticPromptProvider::new("fallback")),
    ));
    let tools = Arc::new(ToolRegistry::new());
    let tts = Arc::new(TtsPipeline::new(Arc::new(EchoTts), store.clone(), 64 * 1024));
    let state = EngineState::new(store.clone(), memory, tools, llm, tts, Arc::new(Observability::new()));
    (state, store)
}

#[tokio::test]
async fn s1_simple_text_turn_produces_ordered_envelopes() {
    let provider = ScriptedProvider {
        chunks: vec![
            StreamChunk::text("Hello there. "),
            StreamChunk::text("How can I help? "),
            StreamChunk::finished(),
        ],
    };
    let (state, store) = test_state(Arc::new(provider));
    let conv = store.create_conversation("user-1").unwrap();

    let envelopes = run_turn(&state, &conv.id, 1, "client-msg-1", "hi", "gpt", "default")
        .await
        .unwrap();

    assert!(matches!(envelopes[0].body, Body::Acknowledgement(_)));
    assert!(envelopes.iter().any(|e| matches!(e.body, Body::StartAnswer(_))));
    let sentence_count = envelopes
        .iter()
        .filter(|e| matches!(e.body, Body::AssistantSentence(_)))
        .count();
    assert_eq!(sentence_count, 2);

    let last_sentence = envelopes
        .iter()
        .rev()
        .find_map(|e| match &e.body {
            Body::AssistantSentence(s) => Some(s),
            _ => None,
        })
        .unwrap();
    assert_eq!(last_sentence.is_final, Some(true));

    let updated = store.get_conversation(&conv.id).unwrap();
    let tip = store.get_message(updated.tip_message_id.as_ref().unwrap()).unwrap();
    assert_eq!(tip.role, Role::Assistant);
    assert_eq!(tip.completion_status, CompletionStatus::Completed);
    assert_eq!(tip.content, "Hello there. How can I help? ");
}

#[tokio::test]
async fn s2_tool_augmented_turn_emits_request_then_result_then_sentence() {
    let provider = ScriptedProvider {
        chunks: vec![
            StreamChunk {
                content: None,
                tool_call: Some(ToolCallChunk {
                    id: "call-1".to_string(),
                    name: "lookup_weather".to_string(),
                    arguments_fragment: "{\"city\":\"Lisbon\"}".to_string(),
                    done: false,
                }),
                reasoning: None,
                done: false,
                error: None,
            },
            StreamChunk::text("It's sunny in Lisbon. "),
            StreamChunk::finished(),
        ],
    };
    let (state, store) = test_state(Arc::new(provider));
    state.tools.ensure_tool(
        "lookup_weather",
        "Looks up current weather for a city",
        serde_json::json!({
            "type": "object",
            "properties": {"city": {"type": "string"}},
            "required": ["city"]
        }),
        Arc::new(PluginToolExecutor::new(|_args, _cancel| {
            Ok(ToolResultValue::from_json(serde_json::json!({"condition": "sunny"})))
        })),
    );
    let conv = store.create_conversation("user-1").unwrap();

    let envelopes = run_turn(&state, &conv.id, 1, "client-msg-1", "weather in lisbon?", "gpt", "default")
        .await
        .unwrap();

    let request_idx = envelopes
        .iter()
        .position(|e| matches!(e.body, Body::ToolUseRequest(_)))
        .expect("expected a ToolUseRequest");
    let result_idx = envelopes
        .iter()
        .position(|e| matches!(e.body, Body::ToolUseResult(_)))
        .expect("expected a ToolUseResult");
    let sentence_idx = envelopes
        .iter()
        .position(|e| matches!(e.body, Body::AssistantSentence(_)))
        .expect("expected an AssistantSentence");
    assert!(request_idx < result_idx);
    assert!(result_idx < sentence_idx);

    match &envelopes[result_idx].body {
        Body::ToolUseResult(r) => assert!(r.success),
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn s3_regenerate_creates_a_sibling_branch() {
    let provider = ScriptedProvider {
        chunks: vec![StreamChunk::text("first answer"), StreamChunk::finished()],
    };
    let (state, store) = test_state(Arc::new(provider));
    let conv = store.create_conversation("user-1").unwrap();
    run_turn(&state, &conv.id, 1, "client-msg-1", "hi", "gpt", "default")
        .await
        .unwrap();

    let updated = store.get_conversation(&conv.id).unwrap();
    let tip_id = updated.tip_message_id.unwrap();

    let (envelopes, new_id) = alicia_engine::apply_variation(
        &state,
        &conv.id,
        &tip_id,
        VariationMode::Regenerate,
        None,
        "gpt",
        "default",
    )
    .await
    .unwrap();

    let branch_update = envelopes
        .iter()
        .find_map(|e| match &e.body {
            Body::BranchUpdate(b) => Some(b),
            _ => None,
        })
        .expect("expected a BranchUpdate envelope");
    assert_eq!(branch_update.siblings.len(), 2);
    assert!(envelopes.iter().any(|e| matches!(e.body, Body::StartAnswer(_))));
    assert_ne!(new_id, tip_id);

    let siblings = store.siblings_of(&new_id).unwrap();
    assert_eq!(siblings.len(), 2);

    let regenerated = store.get_message(&new_id).unwrap();
    assert_eq!(regenerated.completion_status, CompletionStatus::Completed);
    assert!(!regenerated.content.is_empty());
}

#[tokio::test]
async fn s4_resume_replays_only_envelopes_after_last_seen() {
    let provider = ScriptedProvider {
        chunks: vec![
            StreamChunk::text("first. "),
            StreamChunk::text("second. "),
            StreamChunk::finished(),
        ],
    };
    let (state, store) = test_state(Arc::new(provider));
    let conv = store.create_conversation("user-1").unwrap();

    let envelopes = run_turn(&state, &conv.id, 1, "client-msg-1", "hi", "gpt", "default")
        .await
        .unwrap();

    let midpoint = envelopes[envelopes.len() / 2].stanza_id;
    let replayed = store.replay_since(&conv.id, midpoint).unwrap();

    assert!(!replayed.is_empty());
    assert!(replayed.iter().all(|e| e.stanza_id < midpoint));
}

#[tokio::test]
async fn s5_control_stop_cancels_an_in_flight_turn_and_marks_it_failed() {
    let (state, store) = test_state(Arc::new(HangingProvider));
    let conv = store.create_conversation("user-1").unwrap();
    let state = Arc::new(state);

    let turn_state = state.clone();
    let conv_id = conv.id.clone();
    let handle = tokio::spawn(async move {
        run_turn(&turn_state, &conv_id, 1, "client-msg-1", "hi", "gpt", "default").await
    });

    tokio::time::sleep(std::time::Duration::from_millis(60)).await;
    let stopped = alicia_engine::execute_stop(&state, &conv.id).unwrap();
    assert!(stopped);

    let result = handle.await.unwrap();
    assert!(result.is_err());

    let updated = store.get_conversation(&conv.id).unwrap();
    let tip = store.get_message(updated.tip_message_id.as_ref().unwrap()).unwrap();
    assert_eq!(tip.completion_status, CompletionStatus::Failed);
    assert!(state.active_turns.get(&conv.id).is_none());
}

#[tokio::test]
async fn s6_memory_trace_emitted_only_for_the_relevant_memory() {
    let provider = ScriptedProvider {
        chunks: vec![StreamChunk::text("noted."), StreamChunk::finished()],
    };
    let (state, store) = test_state(Arc::new(provider));
    let conv = store.create_conversation("user-1").unwrap();

    let close_embedding = vec![1.0, 0.0, 0.0, 0.0];
    let far_embedding = vec![0.0, 1.0, 0.0, 0.0];
    store
        .upsert_memory(
            "user-1",
            "the user's favorite color is blue",
            &close_embedding,
            0.5,
            0.9,
            &[],
            false,
            None,
        )
        .unwrap();
    store
        .upsert_memory(
            "user-1",
            "completely unrelated fact about tectonic plates",
            &far_embedding,
            0.5,
            0.9,
            &[],
            false,
            None,
        )
        .unwrap();

    struct DirectionalEmbedder;
    #[async_trait]
    impl alicia_memory::Embedder for DirectionalEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, String> {
            Ok(vec![1.0, 0.0, 0.0, 0.0])
        }
        fn dimension(&self) -> usize {
            4
        }
    }

    let memory = Arc::new(MemoryRetriever::new(
        store.clone(),
        Arc::new(DirectionalEmbedder),
        Arc::new(StaticPromptProvider::new("fallback")),
    ));
    let tools = Arc::new(ToolRegistry::new());
    let tts = Arc::new(TtsPipeline::new(Arc::new(EchoTts), store.clone(), 64 * 1024));
    let llm: Arc<dyn LlmProvider> = Arc::new(ScriptedProvider {
        chunks: vec![StreamChunk::text("noted."), StreamChunk::finished()],
    });
    let state = EngineState::new(store.clone(), memory, tools, llm, tts, Arc::new(Observability::new()));

    let envelopes = run_turn(&state, &conv.id, 1, "client-msg-1", "what's my favorite color?", "gpt", "default")
        .await
        .unwrap();

    let traces: Vec<_> = envelopes
        .iter()
        .filter_map(|e| match &e.body {
            Body::MemoryTrace(t) => Some(t),
            _ => None,
        })
        .collect();
    assert_eq!(traces.len(), 1);
    assert!(traces[0].content.contains("favorite color"));
}
