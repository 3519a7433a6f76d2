use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use alicia_store::Store;

use crate::client::{SynthesizedAudio, TtsClient, TtsError};

const SYNTH_TIMEOUT: Duration = Duration::from_secs(15);

/// How a completed sentence's audio reaches the wire — resolves §9's open
/// question with one deterministic rule: audio at or under the inline
/// threshold rides on `AssistantSentence.audio`; anything larger goes out
/// as a separate `AudioChunk` that follows the sentence.
pub enum AudioDelivery {
    Inline {
        format: String,
        duration_ms: i64,
        data: Vec<u8>,
    },
    Separate {
        format: String,
        duration_ms: i64,
        data: Vec<u8>,
    },
    SynthesisFailed(TtsError),
}

pub struct TtsPipeline {
    client: Arc<dyn TtsClient>,
    store: Arc<Store>,
    inline_max_bytes: usize,
}

impl TtsPipeline {
    pub fn new(client: Arc<dyn TtsClient>, store: Arc<Store>, inline_max_bytes: usize) -> Self {
        Self {
            client,
            store,
            inline_max_bytes,
        }
    }

    /// Synthesize a completed sentence's audio and persist the sentence
    /// row (`streaming` → `completed`). Synthesis failure does not fail
    /// the turn — the sentence is persisted text-only and the caller
    /// decides whether to surface `SynthesisFailed`.
    pub async fn synthesize_sentence(
        &self,
        sentence_id: &str,
        text: &str,
        voice: &str,
    ) -> AudioDelivery {
        let result = timeout(SYNTH_TIMEOUT, self.client.synthesize(text, voice)).await;
        let audio = match result {
            Ok(Ok(audio)) => audio,
            Ok(Err(e)) => {
                let _ = self.store.complete_sentence(sentence_id, None, None, None);
                return AudioDelivery::SynthesisFailed(e);
            }
            Err(_elapsed) => {
                let _ = self.store.complete_sentence(sentence_id, None, None, None);
                return AudioDelivery::SynthesisFailed(TtsError::Timeout(voice.to_string()));
            }
        };

        let SynthesizedAudio {
            format,
            duration_ms,
            data,
        } = audio;

        if data.len() <= self.inline_max_bytes {
            let _ = self
                .store
                .complete_sentence(sentence_id, Some(&format), Some(duration_ms), Some(&data));
            AudioDelivery::Inline {
                format,
                duration_ms,
                data,
            }
        } else {
            let _ = self
                .store
                .complete_sentence(sentence_id, Some(&format), Some(duration_ms), Some(&data));
            AudioDelivery::Separate {
                format,
                duration_ms,
                data,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedClient {
        bytes: usize,
    }

    #[async_trait]
    impl TtsClient for FixedClient {
        async fn synthesize(&self, _text: &str, _voice: &str) -> Result<SynthesizedAudio, TtsError> {
            Ok(SynthesizedAudio {
                format: "pcm16".to_string(),
                duration_ms: 500,
                data: vec![0u8; self.bytes],
            })
        }
    }

    #[tokio::test]
    async fn small_audio_is_delivered_inline() {
        let store = Arc::new(Store::open_in_memory(4).unwrap());
        let conv = store.create_conversation("user-1").unwrap();
        let msg = store
            .append_message(&conv.id, None, alicia_core::types::Role::Assistant, "")
            .unwrap();
        let sentence = store.create_sentence(&msg.id, "hello").unwrap();
        let pipeline = TtsPipeline::new(Arc::new(FixedClient { bytes: 128 }), store, 32 * 1024);
        let delivery = pipeline
            .synthesize_sentence(&sentence.id, "hello", "default")
            .await;
        assert!(matches!(delivery, AudioDelivery::Inline { .. }));
    }

    #[tokio::test]
    async fn large_audio_is_delivered_separately() {
        let store = Arc::new(Store::open_in_memory(4).unwrap());
        let conv = store.create_conversation("user-1").unwrap();
        let msg = store
            .append_message(&conv.id, None, alicia_core::types::Role::Assistant, "")
            .unwrap();
        let sentence = store.create_sentence(&msg.id, "hello").unwrap();
        let pipeline = TtsPipeline::new(
            Arc::new(FixedClient { bytes: 64 * 1024 }),
            store,
            32 * 1024,
        );
        let delivery = pipeline
            .synthesize_sentence(&sentence.id, "hello", "default")
            .await;
        assert!(matches!(delivery, AudioDelivery::Separate { .. }));
    }
}
