//! Binary self-describing codec: length-prefixed map/array/string/bytes,
//! tagged scalars. Built on MessagePack (`rmpv`/`rmp-serde`), which gives
//! exactly that wire shape for free; this module owns the envelope
//! framing and the `type` → body dispatch, kept outside serde's own enum
//! tagging so the numeric type id stays authoritative on the wire.

use crate::bodies::*;
use crate::envelope::{Body, Envelope, Meta};
use alicia_core::error::AliciaError;
use serde::{Deserialize, Serialize};

/// On-the-wire shape: the body is kept as an untyped `rmpv::Value` until
/// `type` tells us which struct to decode it into.
#[derive(Serialize, Deserialize)]
struct WireEnvelope {
    stanza_id: i32,
    conversation_id: String,
    #[serde(rename = "type")]
    type_id: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    meta: Option<Meta>,
    body: rmpv::Value,
}

/// Encode an envelope to its wire bytes. MUST emit identical field keys and
/// wire types across clients and servers for a given type (§4.1).
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, AliciaError> {
    let body_value = body_to_value(&envelope.body)?;
    let wire = WireEnvelope {
        stanza_id: envelope.stanza_id,
        conversation_id: envelope.conversation_id.clone(),
        type_id: envelope.body.type_id(),
        meta: envelope.meta.clone(),
        body: body_value,
    };
    rmp_serde::to_vec_named(&wire)
        .map_err(|e| AliciaError::MalformedData(format!("encode failed: {e}")))
}

/// Decode wire bytes back into an envelope. Rejects undecodable frames with
/// `MalformedData` (101) and unregistered type numbers with `UnknownType`
/// (102), per §4.1.
pub fn decode(bytes: &[u8]) -> Result<Envelope, AliciaError> {
    let wire: WireEnvelope = rmp_serde::from_slice(bytes)
        .map_err(|e| AliciaError::MalformedData(format!("decode failed: {e}")))?;
    let body = value_to_body(wire.type_id, wire.body)?;
    Ok(Envelope {
        stanza_id: wire.stanza_id,
        conversation_id: wire.conversation_id,
        body,
        meta: wire.meta,
    })
}

fn body_to_value(body: &Body) -> Result<rmpv::Value, AliciaError> {
    let to_value = |v: &(impl Serialize + ?Sized)| {
        rmpv::ext::to_value(v).map_err(|e| AliciaError::MalformedData(e.to_string()))
    };
    match body {
        Body::ErrorMessage(b) => to_value(b),
        Body::UserMessage(b) => to_value(b),
        Body::AssistantMessage(b) => to_value(b),
        Body::AudioChunk(b) => to_value(b),
        Body::ReasoningStep(b) => to_value(b),
        Body::ToolUseRequest(b) => to_value(b),
        Body::ToolUseResult(b) => to_value(b),
        Body::Acknowledgement(b) => to_value(b),
        Body::Transcription(b) => to_value(b),
        Body::ControlStop(b) => to_value(b),
        Body::ControlVariation(b) => to_value(b),
        Body::Configuration(b) => to_value(b),
        Body::StartAnswer(b) => to_value(b),
        Body::MemoryTrace(b) => to_value(b),
        Body::Commentary(b) => to_value(b),
        Body::AssistantSentence(b) => to_value(b),
        Body::Feedback(b) => to_value(b),
        Body::FeedbackConfirmation(b) => to_value(b),
        Body::UserNote(b) => to_value(b),
        Body::NoteConfirmation(b) => to_value(b),
        Body::MemoryAction(b) => to_value(b),
        Body::MemoryConfirmation(b) => to_value(b),
        Body::ServerInfo(b) => to_value(b),
        Body::SessionStats(b) => to_value(b),
        Body::ConversationUpdate(b) => to_value(b),
        Body::BranchUpdate(b) => to_value(b),
    }
}

fn value_to_body(type_id: u16, value: rmpv::Value) -> Result<Body, AliciaError> {
    let from_value = |v: rmpv::Value| {
        rmpv::ext::from_value(v).map_err(|e| AliciaError::MalformedData(e.to_string()))
    };
    Ok(match type_id {
        1 => Body::ErrorMessage(from_value(value)?),
        2 => Body::UserMessage(from_value(value)?),
        3 => Body::AssistantMessage(from_value(value)?),
        4 => Body::AudioChunk(from_value(value)?),
        5 => Body::ReasoningStep(from_value(value)?),
        6 => Body::ToolUseRequest(from_value(value)?),
        7 => Body::ToolUseResult(from_value(value)?),
        8 => Body::Acknowledgement(from_value(value)?),
        9 => Body::Transcription(from_value(value)?),
        10 => Body::ControlStop(from_value(value)?),
        11 => Body::ControlVariation(from_value(value)?),
        12 => Body::Configuration(from_value(value)?),
        13 => Body::StartAnswer(from_value(value)?),
        14 => Body::MemoryTrace(from_value(value)?),
        15 => Body::Commentary(from_value(value)?),
        16 => Body::AssistantSentence(from_value(value)?),
        20 => Body::Feedback(from_value(value)?),
        21 => Body::FeedbackConfirmation(from_value(value)?),
        22 => Body::UserNote(from_value(value)?),
        23 => Body::NoteConfirmation(from_value(value)?),
        24 => Body::MemoryAction(from_value(value)?),
        25 => Body::MemoryConfirmation(from_value(value)?),
        26 => Body::ServerInfo(from_value(value)?),
        27 => Body::SessionStats(from_value(value)?),
        28 => Body::ConversationUpdate(from_value(value)?),
        50 => Body::BranchUpdate(from_value(value)?),
        other => return Err(AliciaError::UnknownType(other)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::MetaValue;
    use std::collections::BTreeMap;

    fn sample_user_message() -> Envelope {
        Envelope::new(
            1,
            "conv-1",
            Body::UserMessage(UserMessage {
                id: "u1".into(),
                previous_id: None,
                conversation_id: "conv-1".into(),
                content: "hi".into(),
                timestamp: None,
            }),
        )
    }

    #[test]
    fn round_trip_user_message() {
        let env = sample_user_message();
        let bytes = encode(&env).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(env, decoded);
    }

    #[test]
    fn round_trip_with_meta() {
        let mut meta = BTreeMap::new();
        meta.insert(
            "messaging.trace_id".to_string(),
            MetaValue::String("trace-123".into()),
        );
        meta.insert("timestamp".to_string(), MetaValue::Int(1_700_000_000));
        let env = sample_user_message().with_meta(meta);
        let bytes = encode(&env).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(env, decoded);
    }

    #[test]
    fn round_trip_assistant_sentence_with_audio() {
        let env = Envelope::new(
            -5,
            "conv-1",
            Body::AssistantSentence(AssistantSentence {
                id: Some("s1".into()),
                previous_id: "a1".into(),
                conversation_id: "conv-1".into(),
                sequence: 1,
                text: "hello there".into(),
                is_final: Some(true),
                audio: Some(vec![1, 2, 3, 4]),
            }),
        );
        let bytes = encode(&env).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(env, decoded);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = value_to_body(9999, rmpv::Value::Nil).unwrap_err();
        assert_eq!(err.code(), 102);
    }

    #[test]
    fn malformed_bytes_are_rejected() {
        let err = decode(&[0xff, 0x00, 0x01]).unwrap_err();
        assert_eq!(err.code(), 101);
    }

    #[test]
    fn tool_use_request_round_trips_tagged_parameters() {
        use alicia_core::types::TaggedValue;
        let mut params = std::collections::BTreeMap::new();
        params.insert("query".to_string(), TaggedValue::String("weather?".into()));
        let env = Envelope::new(
            2,
            "conv-1",
            Body::ToolUseRequest(ToolUseRequest {
                id: "t1".into(),
                message_id: "m1".into(),
                conversation_id: "conv-1".into(),
                tool_name: "search".into(),
                parameters: params,
                execution: ExecutionMode::Server,
                timeout_ms: Some(30_000),
            }),
        );
        let bytes = encode(&env).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(env, decoded);
    }
}
