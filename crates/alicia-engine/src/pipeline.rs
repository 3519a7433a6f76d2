use std::collections::BTreeMap;
use std::time::Duration;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use alicia_core::types::{CompletionStatus, Role, TaggedValue, ToolUseStatus};
use alicia_llm::{ChatContext, ChatMessage, ToolDefinition};
use alicia_protocol::bodies::{
    Acknowledgement, AssistantSentence, AudioChunk, ErrorMessage, MemoryTrace, StartAnswer,
    ToolUseRequest, ToolUseResult,
};
use alicia_protocol::envelope::{Body, Envelope};
use alicia_store::types::Message;
use alicia_tools::ToolResultValue;
use alicia_tts::AudioDelivery;

use crate::error::{EngineError, Result};
use crate::observability::{ScoreType, TraceContext};
use crate::state::EngineState;

const MAX_TOOL_ROUNDS: usize = 4;
const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);
const MEMORY_K: usize = 8;
const MEMORY_THRESHOLD: f32 = 0.2;
const MEMORY_PINNED_FLOOR: f32 = 0.0;

/// Run one turn to completion, returning every envelope the client should
/// observe, in emission order (§5's ordering guarantee). Side effects
/// (persisted rows, counters) land in the Store as they occur; the
/// returned envelopes are what a transport layer (`alicia-gateway`) would
/// actually write to the socket.
pub async fn run_turn(
    state: &EngineState,
    conversation_id: &str,
    client_stanza_id: i32,
    user_message_id: &str,
    content: &str,
    model: &str,
    voice: &str,
) -> Result<Vec<Envelope>> {
    let pcsw = state.pcsw_lock(conversation_id);
    let _guard = pcsw.lock().await;
    let cancel = state.begin_turn(conversation_id);
    let trace = TraceContext::new_turn();
    state.observability.turn_started(conversation_id, &trace);

    let result = run_turn_inner(
        state,
        conversation_id,
        client_stanza_id,
        user_message_id,
        content,
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
async fn run_turn_inner(
    state: &EngineState,
    conversation_id: &str,
    client_stanza_id: i32,
    user_message_id: &str,
    content: &str,
    model: &str,
    voice: &str,
    cancel: &CancellationToken,
    trace: &TraceContext,
) -> Result<Vec<Envelope>> {
    let mut out = Vec::new();

    let conversation = state.store.get_conversation(conversation_id)?;
    state.store.ack_client_stanza(conversation_id, client_stanza_id)?;

    let user_msg = state.store.append_message(
        conversation_id,
        conversation.tip_message_id.as_deref(),
        Role::User,
        content,
    )?;
    state.store.set_tip(conversation_id, &user_msg.id)?;

    out.push(emit(
        state,
        conversation_id,
        Body::Acknowledgement(Acknowledgement {
            conversation_id: conversation_id.to_string(),
            acknowledged_stanza_id: client_stanza_id,
            success: true,
        }),
    ));

    if content.is_empty() {
        state
            .store
            .set_message_status(&user_msg.id, CompletionStatus::Completed)?;
        let assistant = state.store.append_message(
            conversation_id,
            Some(&user_msg.id),
            Role::Assistant,
            "",
        )?;
        state
            .store
            .set_message_status(&assistant.id, CompletionStatus::Failed)?;
        out.push(emit(
            state,
            conversation_id,
            Body::ErrorMessage(ErrorMessage {
                id: uuid::Uuid::now_v7().to_string(),
                conversation_id: conversation_id.to_string(),
                code: 202,
                message: "empty user message produces no completion".to_string(),
                severity: 1,
                recoverable: true,
                originating_id: Some(user_message_id.to_string()),
            }),
        ));
        return Ok(out);
    }

    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }

    // --- Retrieving ---
    let retrieved = state
        .memory
        .retrieve(
            &conversation.user_id,
            &user_msg.id,
            conversation_id,
            content,
            MEMORY_K,
            MEMORY_THRESHOLD,
            MEMORY_PINNED_FLOOR,
        )
        .await?;
    state.observability.retrieve_completed(trace, retrieved.len());
    for memory in &retrieved {
        out.push(emit(
            state,
            conversation_id,
            Body::MemoryTrace(MemoryTrace {
                id: uuid::Uuid::now_v7().to_string(),
                message_id: user_msg.id.clone(),
                conversation_id: conversation_id.to_string(),
                memory_id: memory.memory_id.clone(),
                content: memory.content.clone(),
                relevance: memory.similarity,
            }),
        ));
    }

    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }

    // --- Generating / Streaming / tool loop ---
    let assistant_msg = state.store.append_message(
        conversation_id,
        Some(&user_msg.id),
        Role::Assistant,
        "",
    )?;
    out.extend(generate_reply(state, conversation_id, &assistant_msg, content, model, voice, cancel, trace).await?);

    Ok(out)
}

/// Stream a reply into `assistant_msg` (already created, empty content) and
/// emit `StartAnswer`/tool/sentence envelopes, finishing with the message
/// persisted and the conversation tip moved onto it. Shared by a fresh
/// turn (`run_turn`) and by `apply_variation`'s regenerate/continue modes,
/// which create the branch row themselves and call this to actually fill
/// it in.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn generate_reply(
    state: &EngineState,
    conversation_id: &str,
    assistant_msg: &Message,
    prompt_content: &str,
    model: &str,
    voice: &str,
    cancel: &CancellationToken,
    trace: &TraceContext,
) -> Result<Vec<Envelope>> {
    let mut out = Vec::new();
    let previous_id = assistant_msg.previous_id.clone().unwrap_or_default();

    out.push(emit(
        state,
        conversation_id,
        Body::StartAnswer(StartAnswer {
            id: assistant_msg.id.clone(),
            previous_id: previous_id.clone(),
            conversation_id: conversation_id.to_string(),
            answer_type: None,
            planned_sentence_count: None,
        }),
    ));

    let tool_defs: Vec<ToolDefinition> = state
        .tools
        .definitions()
        .into_iter()
        .map(|(name, description, schema)| ToolDefinition {
            name,
            description,
            schema,
        })
        .collect();

    let mut messages = vec![ChatMessage {
        role: Role::User,
        content: prompt_content.to_string(),
    }];

    let mut segmenter = alicia_tts::SentenceSegmenter::new();
    let mut full_text = String::new();
    let mut rounds = 0usize;

    'tool_loop: loop {
        rounds += 1;
        let ctx = ChatContext {
            model: model.to_string(),
            system: String::new(),
            messages: messages.clone(),
            tools: tool_defs.clone(),
            max_tokens: 4096,
        };
        let mut stream = state.llm.stream_chat(ctx, cancel.clone()).await;
        let mut chunk_count = 0usize;

        while let Some(chunk) = stream.next().await {
            chunk_count += 1;
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if let Some(err) = chunk.error {
                if matches!(err, alicia_llm::LlmError::Cancelled) {
                    return Err(EngineError::Cancelled);
                }
                state
                    .store
                    .set_message_status(&assistant_msg.id, CompletionStatus::Failed)?;
                out.push(emit(
                    state,
                    conversation_id,
                    Body::ErrorMessage(ErrorMessage {
                        id: uuid::Uuid::now_v7().to_string(),
                        conversation_id: conversation_id.to_string(),
                        code: 503,
                        message: err.to_string(),
                        severity: 3,
                        recoverable: false,
                        originating_id: Some(assistant_msg.id.clone()),
                    }),
                ));
                return Ok(out);
            }

            if let Some(text) = chunk.content {
                full_text.push_str(&text);
                for sentence in segmenter.push(&text) {
                    emit_sentence(state, conversation_id, &assistant_msg.id, &previous_id, voice, sentence, false, &mut out).await?;
                }
            }

            if let Some(tool_call) = chunk.tool_call {
                if rounds > MAX_TOOL_ROUNDS {
                    warn!("tool loop exceeded max rounds, forcing completion");
                    break 'tool_loop;
                }
                let tool_use = state.store.create_tool_use(
                    &assistant_msg.id,
                    &tool_call.name,
                    serde_json::from_str(&tool_call.arguments_fragment)
                        .unwrap_or(serde_json::json!({})),
                )?;
                state
                    .store
                    .transition_tool_use(&tool_use.id, ToolUseStatus::Running, None, None)?;
                out.push(emit(
                    state,
                    conversation_id,
                    Body::ToolUseRequest(ToolUseRequest {
                        id: tool_use.id.clone(),
                        message_id: assistant_msg.id.clone(),
                        conversation_id: conversation_id.to_string(),
                        tool_name: tool_call.name.clone(),
                        parameters: tagged_map(&tool_use.arguments),
                        execution: alicia_protocol::bodies::ExecutionMode::Server,
                        timeout_ms: Some(DEFAULT_TOOL_TIMEOUT.as_millis() as u64),
                    }),
                ));

                let exec_result = state
                    .tools
                    .execute(
                        &tool_call.name,
                        tool_use.arguments.clone(),
                        DEFAULT_TOOL_TIMEOUT,
                        cancel.clone(),
                    )
                    .await;

                let (success, result_value, error_code, error_message) = match &exec_result {
                    Ok(value) => (true, Some(value.clone()), None, None),
                    Err(e) => (false, None, Some(301i32), Some(e.to_string())),
                };
                state.observability.tool_executed(trace, &tool_call.name, success);
                state.store.transition_tool_use(
                    &tool_use.id,
                    if success {
                        ToolUseStatus::Success
                    } else {
                        ToolUseStatus::Error
                    },
                    result_value.as_ref().map(|v| v.to_json()),
                    error_message.as_deref(),
                )?;

                out.push(emit(
                    state,
                    conversation_id,
                    Body::ToolUseResult(ToolUseResult {
                        id: uuid::Uuid::now_v7().to_string(),
                        request_id: tool_use.id.clone(),
                        conversation_id: conversation_id.to_string(),
                        success,
                        result: result_value.as_ref().map(|v| TaggedValue::from_json(v.to_json())),
                        error_code,
                        error_message: error_message.clone(),
                    }),
                ));

                let result_text = match &result_value {
                    Some(v) => serde_json::to_string(&v.to_json()).unwrap_or_default(),
                    None => error_message.clone().unwrap_or_default(),
                };
                messages.push(ChatMessage {
                    role: Role::Assistant,
                    content: format!("[tool:{} result] {}", tool_call.name, result_text),
                });
                continue 'tool_loop;
            }

            if chunk.done {
                break 'tool_loop;
            }
        }
        state.observability.llm_chat_completed(trace, state.llm.name(), chunk_count);
        break;
    }

    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }

    if let Some(last) = segmenter.flush_final() {
        emit_sentence(state, conversation_id, &assistant_msg.id, &previous_id, voice, last, true, &mut out).await?;
    } else if let Some(last_sent) = out.iter_mut().rev().find_map(|e| match &mut e.body {
        Body::AssistantSentence(s) => Some(s),
        _ => None,
    }) {
        last_sent.is_final = Some(true);
    }

    state.store.set_message_content(&assistant_msg.id, &full_text)?;
    state
        .store
        .set_message_status(&assistant_msg.id, CompletionStatus::Completed)?;
    state.store.set_tip(conversation_id, &assistant_msg.id)?;
    state
        .observability
        .submit_score(trace, "turn_completed", 1.0, ScoreType::Quality);

    Ok(out)
}

async fn emit_sentence(
    state: &EngineState,
    conversation_id: &str,
    assistant_message_id: &str,
    user_message_id: &str,
    voice: &str,
    sentence: alicia_tts::SegmentedSentence,
    is_final: bool,
    out: &mut Vec<Envelope>,
) -> Result<()> {
    let row = state.store.create_sentence(assistant_message_id, &sentence.text)?;
    let delivery = state
        .tts
        .synthesize_sentence(&row.id, &sentence.text, voice)
        .await;

    let (audio_inline, separate) = match delivery {
        AudioDelivery::Inline { data, .. } => (Some(data), None),
        AudioDelivery::Separate { format, duration_ms, data } => {
            (None, Some((format, duration_ms, data)))
        }
        AudioDelivery::SynthesisFailed(_) => (None, None),
    };

    out.push(emit(
        state,
        conversation_id,
        Body::AssistantSentence(AssistantSentence {
            id: Some(row.id.clone()),
            previous_id: user_message_id.to_string(),
            conversation_id: conversation_id.to_string(),
            sequence: sentence.sequence,
            text: sentence.text.clone(),
            is_final: Some(is_final),
            audio: audio_inline,
        }),
    ));

    if let Some((format, duration_ms, data)) = separate {
        out.push(emit(
            state,
            conversation_id,
            Body::AudioChunk(AudioChunk {
                conversation_id: conversation_id.to_string(),
                format,
                sequence: sentence.sequence,
                duration_ms: duration_ms as i32,
                track_sid: None,
                data: Some(data),
                is_last: Some(is_final),
                timestamp: None,
            }),
        ));
    }
    Ok(())
}

fn emit_server_stanza(state: &EngineState, conversation_id: &str) -> i32 {
    let mut sequencer = state.sequencer_for(conversation_id);
    let id = sequencer.next_server();
    state.save_sequencer(conversation_id, sequencer);
    let _ = state.store.next_server_stanza(conversation_id);
    id
}

/// Allocate the next server stanza id, build the envelope, and persist it
/// to the append-only envelope log keyed by that stanza id so a later
/// `Configuration{last_sequence_seen}` resume can replay the tail. Every
/// server-originated envelope in the turn goes through this, not just the
/// ones a test happens to exercise.
pub(crate) fn emit(state: &EngineState, conversation_id: &str, body: Body) -> Envelope {
    let stanza = emit_server_stanza(state, conversation_id);
    let envelope = Envelope::new(stanza, conversation_id, body);
    match alicia_protocol::codec::encode(&envelope) {
        Ok(bytes) => {
            if let Err(e) = state
                .store
                .append_envelope_log(conversation_id, stanza, &bytes)
            {
                warn!(error = %e, "failed to persist envelope log entry");
            }
        }
        Err(e) => warn!(error = %e, "failed to encode envelope for replay log"),
    }
    envelope
}

fn tagged_map(value: &serde_json::Value) -> BTreeMap<String, TaggedValue> {
    match value {
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(k, v)| (k.clone(), TaggedValue::from_json(v.clone())))
            .collect(),
        _ => BTreeMap::new(),
    }
}
