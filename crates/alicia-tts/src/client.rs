use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum TtsError {
    #[error("synthesis for voice {0} timed out")]
    Timeout(String),

    #[error("synthesis failed: {0}")]
    Failed(String),
}

pub struct SynthesizedAudio {
    pub format: String,
    pub duration_ms: i64,
    pub data: Vec<u8>,
}

/// External speech-synthesis collaborator — only the interface lives
/// here, per the "out of scope" boundary.
#[async_trait]
pub trait TtsClient: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<SynthesizedAudio, TtsError>;
}
