//! `ControlVariation` handling (§4.9 Branching) — `regenerate`, `edit`,
//! `continue`.

use alicia_core::types::{CompletionStatus, Role};
use alicia_protocol::bodies::BranchUpdate;
use alicia_protocol::envelope::{Body, Envelope};

use crate::error::{EngineError, Result};
use crate::observability::TraceContext;
use crate::pipeline::{emit, generate_reply};
use crate::state::EngineState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariationMode {
    Regenerate,
    Edit,
    Continue,
}

/// Apply a branch variation and return every envelope the client should
/// observe, plus the id of the new message. For `regenerate`/`continue`
/// this creates the new assistant message and then runs the same
/// generation pipeline `run_turn` uses (§4.9: "create a new assistant
/// message … run the pipeline; on finalize, point `tip_message_id` to the
/// new message"), so the branch ends up with real generated content, not
/// an empty row. `edit` has no generation step — the caller supplies the
/// final content directly.
pub async fn apply_variation(
    state: &EngineState,
    conversation_id: &str,
    target_id: &str,
    mode: VariationMode,
    new_content: Option<&str>,
    model: &str,
    voice: &str,
) -> Result<(Vec<Envelope>, String)> {
    let pcsw = state.pcsw_lock(conversation_id);
    let _guard = pcsw.lock().await;
    let cancel = state.begin_turn(conversation_id);
    let trace = TraceContext::new_turn();

    let result = apply_variation_inner(
        state,
        conversation_id,
        target_id,
        mode,
        new_content,
        model,
        voice,
        &cancel,
        &trace,
    )
    .await;

    state.end_turn(conversation_id);
    result
}

#[allow(clippy::too_many_arguments)]
async fn apply_variation_inner(
    state: &EngineState,
    conversation_id: &str,
    target_id: &str,
    mode: VariationMode,
    new_content: Option<&str>,
    model: &str,
    voice: &str,
    cancel: &tokio_util::sync::CancellationToken,
    trace: &TraceContext,
) -> Result<(Vec<Envelope>, String)> {
    let target = state.store.get_message(target_id)?;
    if target.conversation_id != conversation_id {
        return Err(EngineError::ConversationNotFound(conversation_id.to_string()));
    }

    let mut out = Vec::new();
    let new_message = match mode {
        VariationMode::Regenerate => {
            let prompt_content = match &target.previous_id {
                Some(parent_id) => state.store.get_message(parent_id)?.content,
                None => String::new(),
            };
            let new_message = state.store.append_message(
                conversation_id,
                target.previous_id.as_deref(),
                Role::Assistant,
                "",
            )?;
            out.extend(
                generate_reply(
                    state,
                    conversation_id,
                    &new_message,
                    &prompt_content,
                    model,
                    voice,
                    cancel,
                    trace,
                )
                .await?,
            );
            new_message
        }
        VariationMode::Edit => {
            let new_message = state.store.append_message(
                conversation_id,
                target.previous_id.as_deref(),
                target.role,
                new_content.unwrap_or(""),
            )?;
            state
                .store
                .set_message_status(&new_message.id, CompletionStatus::Completed)?;
            state.store.set_tip(conversation_id, &new_message.id)?;
            new_message
        }
        VariationMode::Continue => {
            let prompt_content = target.content.clone();
            let new_message = state.store.append_message(
                conversation_id,
                Some(target_id),
                Role::Assistant,
                "",
            )?;
            out.extend(
                generate_reply(
                    state,
                    conversation_id,
                    &new_message,
                    &prompt_content,
                    model,
                    voice,
                    cancel,
                    trace,
                )
                .await?,
            );
            new_message
        }
    };

    let siblings = state.store.siblings_of(&new_message.id)?;
    out.push(emit(
        state,
        conversation_id,
        Body::BranchUpdate(BranchUpdate {
            conversation_id: conversation_id.to_string(),
            parent_id: new_message.previous_id.clone(),
            siblings: siblings.into_iter().map(|m| m.id).collect(),
            tip_message_id: new_message.id.clone(),
        }),
    ));

    Ok((out, new_message.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::Observability;
    use alicia_llm::{ChatContext, LlmProvider, StreamChunk};
    use alicia_memory::{MemoryRetriever, MockEmbedder, StaticPromptProvider};
    use alicia_store::Store;
    use alicia_tools::ToolRegistry;
    use alicia_tts::TtsPipeline;
    use async_trait::async_trait;
    use futures_util::stream::{self, BoxStream, StreamExt};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    struct NullProvider;

    #[async_trait]
    impl LlmProvider for NullProvider {
        fn name(&self) -> &str {
            "null"
        }
        async fn stream_chat(
            &self,
            _context: ChatContext,
            _cancel: CancellationToken,
        ) -> BoxStream<'static, StreamChunk> {
            stream::iter(vec![
                StreamChunk::text("hello again."),
                StreamChunk::finished(),
            ])
            .boxed()
        }
    }

    struct NullTts;

    #[async_trait]
    impl alicia_tts::TtsClient for NullTts {
        async fn synthesize(
            &self,
            _text: &str,
            _voice: &str,
        ) -> std::result::Result<alicia_tts::SynthesizedAudio, alicia_tts::TtsError> {
            Ok(alicia_tts::SynthesizedAudio {
                format: "pcm16".to_string(),
                duration_ms: 0,
                data: vec![],
            })
        }
    }

    fn engine_state() -> EngineState {
        let store = Arc::new(Store::open_in_memory(4).unwrap());
        let memory = Arc::new(MemoryRetriever::new(
            store.clone(),
            Arc::new(MockEmbedder::new(4)),
            Arc::new(StaticPromptProvider::new("fallback")),
        ));
        let tools = Arc::new(ToolRegistry::new());
        let llm: Arc<dyn LlmProvider> = Arc::new(NullProvider);
        let tts = Arc::new(TtsPipeline::new(Arc::new(NullTts), store.clone(), 32 * 1024));
        EngineState::new(store, memory, tools, llm, tts, Arc::new(Observability::new()))
    }

    #[tokio::test]
    async fn regenerate_creates_sibling_and_moves_tip() {
        let state = engine_state();
        let conv = state.store.create_conversation("user-1").unwrap();
        let user_msg = state
            .store
            .append_message(&conv.id, None, Role::User, "hi")
            .unwrap();
        let assistant_msg = state
            .store
            .append_message(&conv.id, Some(&user_msg.id), Role::Assistant, "hello")
            .unwrap();
        state.store.set_tip(&conv.id, &assistant_msg.id).unwrap();

        let (envelopes, new_id) = apply_variation(
            &state,
            &conv.id,
            &assistant_msg.id,
            VariationMode::Regenerate,
            None,
            "default",
            "default",
        )
        .await
        .unwrap();

        let updated = state.store.get_conversation(&conv.id).unwrap();
        assert_eq!(updated.tip_message_id, Some(new_id.clone()));

        let siblings = state.store.siblings_of(&new_id).unwrap();
        assert_eq!(siblings.len(), 2);

        let regenerated = state.store.get_message(&new_id).unwrap();
        assert!(!regenerated.content.is_empty());

        let branch_update = envelopes
            .iter()
            .find_map(|e| match &e.body {
                Body::BranchUpdate(b) => Some(b),
                _ => None,
            })
            .expect("expected a BranchUpdate envelope");
        assert_eq!(branch_update.tip_message_id, new_id);
        assert_eq!(branch_update.siblings.len(), 2);
    }
}
