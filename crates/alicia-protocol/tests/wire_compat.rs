// Verify the wire format matches what clients expect. These tests ensure
// protocol compatibility is never broken (P4: decode(encode(x)) == x).

use alicia_protocol::bodies::{Acknowledgement, ErrorMessage, UserMessage};
use alicia_protocol::codec::{decode, encode};
use alicia_protocol::envelope::{Body, Envelope};

#[test]
fn user_message_round_trip() {
    let env = Envelope::new(
        1,
        "conv-1",
        Body::UserMessage(UserMessage {
            id: "u1".into(),
            previous_id: None,
            conversation_id: "conv-1".into(),
            content: "hello".into(),
            timestamp: None,
        }),
    );
    let bytes = encode(&env).unwrap();
    let decoded = decode(&bytes).unwrap();
    assert_eq!(decoded, env);
    assert_eq!(decoded.type_id(), 2);
}

#[test]
fn acknowledgement_round_trip() {
    let env = Envelope::new(
        -1,
        "conv-1",
        Body::Acknowledgement(Acknowledgement {
            conversation_id: "conv-1".into(),
            acknowledged_stanza_id: 1,
            success: true,
        }),
    );
    let bytes = encode(&env).unwrap();
    let decoded = decode(&bytes).unwrap();
    assert_eq!(decoded, env);
}

#[test]
fn error_message_round_trip_preserves_optional_originating_id() {
    let env = Envelope::new(
        -2,
        "conv-1",
        Body::ErrorMessage(ErrorMessage {
            id: "e1".into(),
            conversation_id: "conv-1".into(),
            code: 503,
            message: "provider unavailable".into(),
            severity: 2,
            recoverable: false,
            originating_id: Some("u1".into()),
        }),
    );
    let bytes = encode(&env).unwrap();
    let decoded = decode(&bytes).unwrap();
    match decoded.body {
        Body::ErrorMessage(ref e) => {
            assert_eq!(e.code, 503);
            assert_eq!(e.originating_id.as_deref(), Some("u1"));
        }
        _ => panic!("expected ErrorMessage"),
    }
    assert_eq!(decoded, env);
}

#[test]
fn server_stanza_ids_are_negative_client_stanza_ids_are_positive() {
    let client_env = Envelope::new(
        1,
        "conv-1",
        Body::UserMessage(UserMessage {
            id: "u1".into(),
            previous_id: None,
            conversation_id: "conv-1".into(),
            content: "hi".into(),
            timestamp: None,
        }),
    );
    assert!(client_env.stanza_id > 0);

    let server_env = Envelope::new(
        -1,
        "conv-1",
        Body::Acknowledgement(Acknowledgement {
            conversation_id: "conv-1".into(),
            acknowledged_stanza_id: 1,
            success: true,
        }),
    );
    assert!(server_env.stanza_id < 0);
}

#[test]
fn decode_rejects_unknown_type_number() {
    // Hand-construct a wire frame with type 9999 — no registered body shape.
    #[derive(serde::Serialize)]
    struct RawFrame {
        stanza_id: i32,
        conversation_id: String,
        #[serde(rename = "type")]
        type_id: u16,
        body: rmpv::Value,
    }
    let raw = RawFrame {
        stanza_id: 1,
        conversation_id: "conv-1".into(),
        type_id: 9999,
        body: rmpv::Value::Map(vec![]),
    };
    let bytes = rmp_serde::to_vec_named(&raw).unwrap();
    let err = decode(&bytes).unwrap_err();
    assert_eq!(err.code(), 102);
}
