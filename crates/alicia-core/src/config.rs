use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8099;
pub const MAX_PAYLOAD_BYTES: usize = 512 * 1024;
pub const HANDSHAKE_TIMEOUT_MS: u64 = 10_000;
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AliciaConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub tts: TtsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl AliciaConfig {
    /// Load config: explicit path > `ALICIA_CONFIG` env > defaults. Env vars
    /// prefixed `ALICIA_` (e.g. `ALICIA_GATEWAY_PORT=9000`) override file
    /// values.
    pub fn load(path: Option<&str>) -> Result<Self, figment::Error> {
        let mut figment = Figment::new();
        let resolved_path = path
            .map(|p| p.to_string())
            .or_else(|| std::env::var("ALICIA_CONFIG").ok());
        if let Some(p) = resolved_path {
            figment = figment.merge(Toml::file(p));
        }
        figment = figment.merge(Env::prefixed("ALICIA_").split("_"));
        figment.extract()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub bind: String,
    pub port: u16,
    pub max_payload_bytes: usize,
    pub handshake_timeout_ms: u64,
    pub heartbeat_interval_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            max_payload_bytes: MAX_PAYLOAD_BYTES,
            handshake_timeout_ms: HANDSHAKE_TIMEOUT_MS,
            heartbeat_interval_secs: HEARTBEAT_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub database_path: String,
    /// Bounded queue depth per conversation before `QueueOverflow` (504), §5.
    pub turn_queue_depth: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: "alicia.db".to_string(),
            turn_queue_depth: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    pub embedding_dim: usize,
    pub knn_k: usize,
    pub similarity_threshold: f32,
    /// Pinned memories bypass the threshold but still need this floor, §4.4.
    pub pinned_similarity_floor: f32,
    pub embed_timeout_ms: u64,
    pub embed_retry_budget: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            embedding_dim: 1536,
            knn_k: 8,
            similarity_threshold: 0.2,
            pinned_similarity_floor: 0.0,
            embed_timeout_ms: 10_000,
            embed_retry_budget: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub default_model: String,
    pub request_timeout_ms: u64,
    pub circuit_breaker_failure_threshold: u32,
    pub circuit_breaker_open_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_model: "default".to_string(),
            request_timeout_ms: 120_000,
            circuit_breaker_failure_threshold: 5,
            circuit_breaker_open_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    pub default_timeout_ms: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    pub voice: String,
    pub synth_timeout_ms: u64,
    /// Audio at or under this size inlines on `AssistantSentence.audio`;
    /// larger audio is sent as a separate `AudioChunk` (§9 open question #2).
    pub inline_audio_max_bytes: usize,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            voice: "default".to_string(),
            synth_timeout_ms: 15_000,
            inline_audio_max_bytes: 32 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub service_name: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "alicia".to_string(),
        }
    }
}
