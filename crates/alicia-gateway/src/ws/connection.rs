//! Binary WS transport: one connection bound to one conversation id,
//! resolved from the first envelope received rather than a separate JSON
//! handshake, since this protocol is MessagePack end to end and the wire
//! format has no JSON signaling frame type to carry one.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};

use alicia_engine::VariationMode as EngineVariationMode;
use alicia_protocol::bodies::{ErrorMessage, VariationMode as WireVariationMode};
use alicia_protocol::codec;
use alicia_protocol::envelope::{Body, Envelope};

use crate::app::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, "new WS connection");

    let (mut tx, mut rx) = socket.split();
    let mut conversation_id: Option<String> = None;

    let mut heartbeat = tokio::time::interval(Duration::from_secs(
        state.config.gateway.heartbeat_interval_secs,
    ));
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Binary(bytes))) => {
                        if bytes.len() > state.config.gateway.max_payload_bytes {
                            warn!(conn_id, size = bytes.len(), "payload too large, closing");
                            break;
                        }
                        if !handle_frame(&state, &mut conversation_id, &bytes, &mut tx).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
            _ = heartbeat.tick() => {
                if tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    info!(conn_id, "WS connection closed");
}

/// Decode one inbound envelope and dispatch it. Returns `false` when the
/// connection should close.
async fn handle_frame(
    state: &Arc<AppState>,
    conversation_id: &mut Option<String>,
    bytes: &[u8],
    tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
) -> bool {
    let envelope = match codec::decode(bytes) {
        Ok(e) => e,
        Err(e) => {
            warn!(error = %e, "malformed frame, ignoring");
            return true;
        }
    };

    match envelope.body {
        Body::UserMessage(user_msg) => {
            let conv_id = conversation_id.get_or_insert_with(|| user_msg.conversation_id.clone());
            let conv_id = conv_id.clone();
            let result = alicia_engine::run_turn(
                &state.engine,
                &conv_id,
                envelope.stanza_id,
                &user_msg.id,
                &user_msg.content,
                &state.config.llm.default_model,
                &state.config.tts.voice,
            )
            .await;

            match result {
                Ok(outbound) => send_all(tx, &outbound).await,
                Err(e) => {
                    warn!(error = %e, "turn failed");
                    let stanza = next_server_stanza(&state.engine, &conv_id);
                    let err_envelope = Envelope::new(
                        stanza,
                        conv_id,
                        Body::ErrorMessage(ErrorMessage {
                            id: uuid::Uuid::now_v7().to_string(),
                            conversation_id: user_msg.conversation_id.clone(),
                            code: 500,
                            message: e.to_string(),
                            severity: 3,
                            recoverable: false,
                            originating_id: Some(user_msg.id.clone()),
                        }),
                    );
                    send_all(tx, &[err_envelope]).await
                }
            }
        }
        Body::ControlStop(stop) => {
            match alicia_engine::execute_stop(&state.engine, &stop.conversation_id) {
                Ok(_) => true,
                Err(e) => {
                    warn!(error = %e, "control_stop failed");
                    true
                }
            }
        }
        Body::ControlVariation(variation) => {
            let mode = match variation.mode {
                WireVariationMode::Regenerate => EngineVariationMode::Regenerate,
                WireVariationMode::Edit => EngineVariationMode::Edit,
                WireVariationMode::Continue => EngineVariationMode::Continue,
            };
            match alicia_engine::apply_variation(
                &state.engine,
                &variation.conversation_id,
                &variation.target_id,
                mode,
                variation.new_content.as_deref(),
                &state.config.llm.default_model,
                &state.config.tts.voice,
            )
            .await
            {
                Ok((envelopes, _new_message_id)) => send_all(tx, &envelopes).await,
                Err(e) => {
                    warn!(error = %e, "control_variation failed");
                    true
                }
            }
        }
        Body::Configuration(config) => {
            if let (Some(conv_id), Some(last_seen)) =
                (config.conversation_id.clone(), config.last_sequence_seen)
            {
                *conversation_id = Some(conv_id.clone());
                match state.engine.store.replay_since(&conv_id, last_seen) {
                    Ok(logged) => {
                        for entry in logged {
                            if tx.send(Message::Binary(entry.bytes.into())).await.is_err() {
                                return false;
                            }
                        }
                        true
                    }
                    Err(e) => {
                        warn!(error = %e, "replay failed");
                        true
                    }
                }
            } else {
                true
            }
        }
        _ => {
            warn!(type_id = envelope.body.type_id(), "unexpected client-originated type");
            true
        }
    }
}

fn next_server_stanza(engine: &alicia_engine::EngineState, conversation_id: &str) -> i32 {
    let mut sequencer = engine.sequencer_for(conversation_id);
    let id = sequencer.next_server();
    engine.save_sequencer(conversation_id, sequencer);
    let _ = engine.store.next_server_stanza(conversation_id);
    id
}

async fn send_all(
    tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    envelopes: &[Envelope],
) -> bool {
    for envelope in envelopes {
        let bytes = match codec::encode(envelope) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "encode failed, dropping envelope");
                continue;
            }
        };
        if tx.send(Message::Binary(bytes.into())).await.is_err() {
            return false;
        }
    }
    true
}
