//! Tracing spans + a fire-and-forget score sink.
//!
//! Spans use `#[instrument(skip(self), fields(...))]`; `ScoreEmitter` runs
//! scoring submissions on an always-on fire-and-forget `tokio::spawn` path
//! rather than behind a feature flag, since scoring is always wanted.

use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub enum ScoreType {
    Accuracy,
    Quality,
    HallucinationProxy,
}

impl ScoreType {
    fn as_str(self) -> &'static str {
        match self {
            ScoreType::Accuracy => "accuracy",
            ScoreType::Quality => "quality",
            ScoreType::HallucinationProxy => "hallucination_proxy",
        }
    }
}

/// Reserved `meta` keys trace context is injected under, per §4.10.
pub const META_TRACE_ID: &str = "messaging.trace_id";
pub const META_SPAN_ID: &str = "messaging.span_id";

#[derive(Debug, Clone)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
}

impl TraceContext {
    pub fn new_turn() -> Self {
        Self {
            trace_id: Uuid::now_v7().to_string(),
            span_id: Uuid::now_v7().to_string(),
        }
    }

    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: Uuid::now_v7().to_string(),
        }
    }
}

pub struct Observability;

impl Observability {
    pub fn new() -> Self {
        Self
    }

    #[instrument(skip(self), fields(conversation_id = %conversation_id, trace_id = %trace.trace_id))]
    pub fn turn_started(&self, conversation_id: &str, trace: &TraceContext) {
        info!("turn started");
    }

    #[instrument(skip(self), fields(trace_id = %trace.trace_id))]
    pub fn retrieve_completed(&self, trace: &TraceContext, kept: usize) {
        info!(kept, "memory retrieval completed");
    }

    #[instrument(skip(self), fields(trace_id = %trace.trace_id, tool = %tool_name))]
    pub fn tool_executed(&self, trace: &TraceContext, tool_name: &str, success: bool) {
        info!(success, "tool_execute completed");
    }

    #[instrument(skip(self), fields(trace_id = %trace.trace_id, provider = %provider))]
    pub fn llm_chat_completed(&self, trace: &TraceContext, provider: &str, chunks: usize) {
        info!(chunks, "llm.chat completed");
    }

    #[instrument(skip(self), fields(trace_id = %trace.trace_id))]
    pub fn tts_synthesize_completed(&self, trace: &TraceContext, bytes: usize) {
        info!(bytes, "tts.synthesize completed");
    }

    /// Submit a score. Never blocks or fails the turn — failures inside
    /// the spawned task are swallowed, matching §4.10's "must never block
    /// or fail the turn" requirement.
    pub fn submit_score(&self, trace: &TraceContext, name: &str, value: f64, score_type: ScoreType) {
        let trace_id = trace.trace_id.clone();
        let name = name.to_string();
        let dtype = score_type.as_str();
        tokio::spawn(async move {
            info!(trace_id = %trace_id, name = %name, value, dtype, "score.submit");
        });
    }
}

impl Default for Observability {
    fn default() -> Self {
        Self::new()
    }
}
