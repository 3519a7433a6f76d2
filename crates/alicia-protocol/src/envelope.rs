//! The envelope (§4.1, §6): every transported unit carries a `stanza_id`,
//! `conversation_id`, numeric `type`, optional `meta`, and a typed `body`.

use crate::bodies::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value shape for `meta`'s reserved keys (`timestamp`, `client_version`,
/// `messaging.trace_id`, `messaging.span_id`) and any future ones — kept as
/// a small tagged variant so unrecognized keys still round-trip (§4.1
/// forward-compat requirement).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

pub type Meta = BTreeMap<String, MetaValue>;

/// The closed set of §6 message-type bodies. The discriminant is carried
/// out-of-band on the wire as `Envelope::type_id` (a `u16`), not via serde's
/// string tagging — `codec` dispatches on it explicitly so the numbering in
/// §6 stays the single source of truth for wire compatibility.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    ErrorMessage(ErrorMessage),
    UserMessage(UserMessage),
    AssistantMessage(AssistantMessage),
    AudioChunk(AudioChunk),
    ReasoningStep(ReasoningStep),
    ToolUseRequest(ToolUseRequest),
    ToolUseResult(ToolUseResult),
    Acknowledgement(Acknowledgement),
    Transcription(Transcription),
    ControlStop(ControlStop),
    ControlVariation(ControlVariation),
    Configuration(Configuration),
    StartAnswer(StartAnswer),
    MemoryTrace(MemoryTrace),
    Commentary(Commentary),
    AssistantSentence(AssistantSentence),
    Feedback(Feedback),
    FeedbackConfirmation(FeedbackConfirmation),
    UserNote(UserNote),
    NoteConfirmation(NoteConfirmation),
    MemoryAction(MemoryAction),
    MemoryConfirmation(MemoryConfirmation),
    ServerInfo(ServerInfo),
    SessionStats(SessionStats),
    ConversationUpdate(ConversationUpdate),
    BranchUpdate(BranchUpdate),
}

impl Body {
    /// The fixed wire type number for this body, per §6.
    pub fn type_id(&self) -> u16 {
        match self {
            Body::ErrorMessage(_) => 1,
            Body::UserMessage(_) => 2,
            Body::AssistantMessage(_) => 3,
            Body::AudioChunk(_) => 4,
            Body::ReasoningStep(_) => 5,
            Body::ToolUseRequest(_) => 6,
            Body::ToolUseResult(_) => 7,
            Body::Acknowledgement(_) => 8,
            Body::Transcription(_) => 9,
            Body::ControlStop(_) => 10,
            Body::ControlVariation(_) => 11,
            Body::Configuration(_) => 12,
            Body::StartAnswer(_) => 13,
            Body::MemoryTrace(_) => 14,
            Body::Commentary(_) => 15,
            Body::AssistantSentence(_) => 16,
            Body::Feedback(_) => 20,
            Body::FeedbackConfirmation(_) => 21,
            Body::UserNote(_) => 22,
            Body::NoteConfirmation(_) => 23,
            Body::MemoryAction(_) => 24,
            Body::MemoryConfirmation(_) => 25,
            Body::ServerInfo(_) => 26,
            Body::SessionStats(_) => 27,
            Body::ConversationUpdate(_) => 28,
            Body::BranchUpdate(_) => 50,
        }
    }

    pub fn conversation_id(&self) -> &str {
        match self {
            Body::ErrorMessage(b) => &b.conversation_id,
            Body::UserMessage(b) => &b.conversation_id,
            Body::AssistantMessage(b) => &b.conversation_id,
            Body::AudioChunk(b) => &b.conversation_id,
            Body::ReasoningStep(b) => &b.conversation_id,
            Body::ToolUseRequest(b) => &b.conversation_id,
            Body::ToolUseResult(b) => &b.conversation_id,
            Body::Acknowledgement(b) => &b.conversation_id,
            Body::Transcription(b) => &b.conversation_id,
            Body::ControlStop(b) => &b.conversation_id,
            Body::ControlVariation(b) => &b.conversation_id,
            Body::Configuration(b) => b.conversation_id.as_deref().unwrap_or(""),
            Body::StartAnswer(b) => &b.conversation_id,
            Body::MemoryTrace(b) => &b.conversation_id,
            Body::Commentary(b) => &b.conversation_id,
            Body::AssistantSentence(b) => &b.conversation_id,
            Body::Feedback(b) => &b.conversation_id,
            Body::FeedbackConfirmation(b) => &b.conversation_id,
            Body::UserNote(b) => &b.conversation_id,
            Body::NoteConfirmation(b) => &b.conversation_id,
            Body::MemoryAction(b) => &b.conversation_id,
            Body::MemoryConfirmation(b) => &b.conversation_id,
            Body::ServerInfo(_) => "",
            Body::SessionStats(b) => &b.conversation_id,
            Body::ConversationUpdate(b) => &b.conversation_id,
            Body::BranchUpdate(b) => &b.conversation_id,
        }
    }
}

/// Every transported unit (§4.1). `stanza_id` is signed: strictly positive
/// and increasing from the client, strictly negative and decreasing from
/// the server (§6). Zero must never appear in transit.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub stanza_id: i32,
    pub conversation_id: String,
    pub body: Body,
    pub meta: Option<Meta>,
}

impl Envelope {
    pub fn new(stanza_id: i32, conversation_id: impl Into<String>, body: Body) -> Self {
        Self {
            stanza_id,
            conversation_id: conversation_id.into(),
            body,
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn type_id(&self) -> u16 {
        self.body.type_id()
    }
}
