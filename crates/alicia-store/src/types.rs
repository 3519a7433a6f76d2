//! §3 Data Model entities, as stored rows.

use alicia_core::types::{CompletionStatus, ConversationStatus, Role, SyncStatus, ToolUseStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub title: Option<String>,
    pub status: ConversationStatus,
    /// Free-form key/value preferences, stored as a JSON object.
    pub preferences: serde_json::Value,
    pub client_stanza_high: i32,
    pub server_stanza_low: i32,
    pub tip_message_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sequence_number: i64,
    pub previous_id: Option<String>,
    pub role: Role,
    pub content: String,
    pub completion_status: CompletionStatus,
    pub local_id: Option<String>,
    pub server_id: Option<String>,
    pub sync_status: SyncStatus,
    pub synced_at: Option<String>,
    pub edited: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sentence {
    pub id: String,
    pub message_id: String,
    pub sentence_sequence_number: i64,
    pub text: String,
    pub audio_format: Option<String>,
    pub audio_duration_ms: Option<i64>,
    pub audio: Option<Vec<u8>>,
    pub completion_status: CompletionStatus,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUse {
    pub id: String,
    pub message_id: String,
    pub sequence_number: i64,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub status: ToolUseStatus,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub id: String,
    pub message_id: String,
    pub sequence_number: i64,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub importance: f32,
    pub confidence: f32,
    pub rating: Option<i32>,
    pub tags: Vec<String>,
    pub pinned: bool,
    pub archived: bool,
    pub source_message_id: Option<String>,
    pub created_at: String,
    pub last_accessed_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub id: String,
    pub memory_id: String,
    pub message_id: String,
    pub conversation_id: String,
    pub similarity: f32,
    pub rank: i32,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub schema: serde_json::Value,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteKind {
    Up,
    Down,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteTarget {
    Message,
    Sentence,
    ToolUse,
    MemoryUsage,
    MemoryExtraction,
    Reasoning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub id: String,
    pub target_type: VoteTarget,
    pub target_id: String,
    pub kind: VoteKind,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub target_type: VoteTarget,
    pub target_id: String,
    pub text: String,
    pub category: Option<String>,
    pub created_at: String,
}

/// A retrieved memory with its similarity score, for C5's k-NN contract.
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub memory: Memory,
    pub similarity: f32,
}

/// One logged envelope, used to replay the server tail on resume (§4.3).
#[derive(Debug, Clone)]
pub struct LoggedEnvelope {
    pub conversation_id: String,
    pub stanza_id: i32,
    pub bytes: Vec<u8>,
}
