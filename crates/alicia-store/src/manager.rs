use std::str::FromStr;
use std::sync::Mutex;

use alicia_core::types::{
    CompletionStatus, ConversationStatus, Role, SyncStatus, ToolUseStatus,
};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db;
use crate::error::{Result, StoreError};
use crate::types::{
    Conversation, LoggedEnvelope, Memory, MemoryUsage, Message, Note, ReasoningStep,
    ScoredMemory, Sentence, Tool, ToolUse, Vote, VoteKind, VoteTarget,
};

/// Durable record of every conversation entity, plus the per-conversation
/// serial writer's backing counters. One `Mutex<Connection>` per process —
/// SQLite serializes writers internally, so a single connection behind a
/// mutex is sufficient; the *logical* per-conversation lock that
/// serializes whole turns lives in `alicia-engine`, not here.
pub struct Store {
    conn: Mutex<Connection>,
    embedding_dim: usize,
}

impl Store {
    pub fn open(path: &str, embedding_dim: usize) -> Result<Self> {
        db::register_vec_extension();
        let conn = Connection::open(path)?;
        db::init_db(&conn, embedding_dim)?;
        Ok(Self {
            conn: Mutex::new(conn),
            embedding_dim,
        })
    }

    pub fn open_in_memory(embedding_dim: usize) -> Result<Self> {
        db::register_vec_extension();
        let conn = Connection::open_in_memory()?;
        db::init_db(&conn, embedding_dim)?;
        Ok(Self {
            conn: Mutex::new(conn),
            embedding_dim,
        })
    }

    /// Run a closure inside a SQL transaction — the "run in transaction"
    /// primitive §4.4 requires for every multi-row atomic write.
    pub fn in_transaction<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    // ---------------------------------------------------------------
    // Conversations
    // ---------------------------------------------------------------

    pub fn create_conversation(&self, user_id: &str) -> Result<Conversation> {
        let conn = self.conn.lock().unwrap();
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO conversations
                (id, user_id, title, status, preferences, client_stanza_high,
                 server_stanza_low, tip_message_id, created_at, updated_at, deleted_at)
             VALUES (?1, ?2, NULL, 'active', '{}', 0, 0, NULL, ?3, ?3, NULL)",
            params![id, user_id, now],
        )?;
        drop(conn);
        self.get_conversation(&id)
    }

    pub fn get_conversation(&self, id: &str) -> Result<Conversation> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, user_id, title, status, preferences, client_stanza_high,
                    server_stanza_low, tip_message_id, created_at, updated_at, deleted_at
             FROM conversations WHERE id = ?1",
            params![id],
            row_to_conversation,
        )
        .optional()?
        .ok_or_else(|| StoreError::ConversationNotFound(id.to_string()))
    }

    /// Commit a durably-received client stanza id (I1: never decreases).
    pub fn ack_client_stanza(&self, conversation_id: &str, stanza_id: i32) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE conversations SET client_stanza_high = MAX(client_stanza_high, ?2),
                updated_at = ?3 WHERE id = ?1",
            params![conversation_id, stanza_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Allocate and persist the next server stanza id (I1: never increases).
    pub fn next_server_stanza(&self, conversation_id: &str) -> Result<i32> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE conversations SET server_stanza_low = server_stanza_low - 1,
                updated_at = ?2 WHERE id = ?1",
            params![conversation_id, Utc::now().to_rfc3339()],
        )?;
        conn.query_row(
            "SELECT server_stanza_low FROM conversations WHERE id = ?1",
            params![conversation_id],
            |row| row.get(0),
        )
        .map_err(StoreError::from)
    }

    // ---------------------------------------------------------------
    // Messages / branching (§3, §4.4, §9 DAG design note)
    // ---------------------------------------------------------------

    /// Append a message to a conversation. `previous_id`, if set, must
    /// already belong to this conversation (I2).
    pub fn append_message(
        &self,
        conversation_id: &str,
        previous_id: Option<&str>,
        role: Role,
        content: &str,
    ) -> Result<Message> {
        let conn = self.conn.lock().unwrap();
        if let Some(prev) = previous_id {
            let belongs: Option<String> = conn
                .query_row(
                    "SELECT conversation_id FROM messages WHERE id = ?1",
                    params![prev],
                    |row| row.get(0),
                )
                .optional()?;
            match belongs {
                Some(ref c) if c == conversation_id => {}
                _ => {
                    return Err(StoreError::InvalidPreviousId(
                        prev.to_string(),
                        conversation_id.to_string(),
                    ))
                }
            }
        }
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let seq: i64 = conn.query_row(
            "SELECT COALESCE(MAX(sequence_number), 0) + 1 FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
            |row| row.get(0),
        )?;
        conn.execute(
            "INSERT INTO messages
                (id, conversation_id, sequence_number, previous_id, role, content,
                 completion_status, local_id, server_id, sync_status, synced_at, edited,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', NULL, NULL, 'pending', NULL, 0, ?7, ?7)",
            params![id, conversation_id, seq, previous_id, role.to_string(), content, now],
        )?;
        drop(conn);
        self.get_message(&id)
    }

    pub fn get_message(&self, id: &str) -> Result<Message> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, conversation_id, sequence_number, previous_id, role, content,
                    completion_status, local_id, server_id, sync_status, synced_at, edited,
                    created_at, updated_at
             FROM messages WHERE id = ?1",
            params![id],
            row_to_message,
        )
        .optional()?
        .ok_or_else(|| StoreError::MessageNotFound(id.to_string()))
    }

    pub fn set_message_status(&self, id: &str, status: CompletionStatus) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE messages SET completion_status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.to_string(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn set_message_content(&self, id: &str, content: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE messages SET content = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, content, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Set the conversation's tip. I3: never shortens the reachable set —
    /// callers only ever point the tip at a message already chained from a
    /// root, so this never needs to validate reachability beyond I2.
    pub fn set_tip(&self, conversation_id: &str, message_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE conversations SET tip_message_id = ?2, updated_at = ?3 WHERE id = ?1",
            params![conversation_id, message_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Walk the active branch from root to tip (reversed `previous_id`
    /// chain), used to build prompt context (§4.4).
    pub fn walk_active_branch(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let tip = self.get_conversation(conversation_id)?.tip_message_id;
        let Some(mut current) = tip else {
            return Ok(Vec::new());
        };
        let mut chain = Vec::new();
        loop {
            let msg = self.get_message(&current)?;
            let prev = msg.previous_id.clone();
            chain.push(msg);
            match prev {
                Some(p) => current = p,
                None => break,
            }
        }
        chain.reverse();
        Ok(chain)
    }

    /// Enumerate other messages sharing a message's `previous_id` (branch
    /// navigation, §4.4).
    pub fn siblings_of(&self, message_id: &str) -> Result<Vec<Message>> {
        let target = self.get_message(message_id)?;
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, sequence_number, previous_id, role, content,
                    completion_status, local_id, server_id, sync_status, synced_at, edited,
                    created_at, updated_at
             FROM messages
             WHERE conversation_id = ?1
               AND ((previous_id IS NULL AND ?2 IS NULL) OR previous_id = ?2)
             ORDER BY sequence_number",
        )?;
        let rows = stmt.query_map(
            params![target.conversation_id, target.previous_id],
            row_to_message,
        )?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::from)
    }

    // ---------------------------------------------------------------
    // Sentences (§3, §4.8)
    // ---------------------------------------------------------------

    pub fn create_sentence(&self, message_id: &str, text: &str) -> Result<Sentence> {
        let conn = self.conn.lock().unwrap();
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let seq: i64 = conn.query_row(
            "SELECT COALESCE(MAX(sentence_sequence_number), 0) + 1 FROM sentences
             WHERE message_id = ?1",
            params![message_id],
            |row| row.get(0),
        )?;
        conn.execute(
            "INSERT INTO sentences
                (id, message_id, sentence_sequence_number, text, audio_format,
                 audio_duration_ms, audio, completion_status, created_at)
             VALUES (?1, ?2, ?3, ?4, NULL, NULL, NULL, 'streaming', ?5)",
            params![id, message_id, seq, text, now],
        )?;
        Ok(Sentence {
            id,
            message_id: message_id.to_string(),
            sentence_sequence_number: seq,
            text: text.to_string(),
            audio_format: None,
            audio_duration_ms: None,
            audio: None,
            completion_status: CompletionStatus::Streaming,
            created_at: now,
        })
    }

    pub fn complete_sentence(
        &self,
        id: &str,
        audio_format: Option<&str>,
        audio_duration_ms: Option<i64>,
        audio: Option<&[u8]>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE sentences SET completion_status = 'completed', audio_format = ?2,
                audio_duration_ms = ?3, audio = ?4 WHERE id = ?1",
            params![id, audio_format, audio_duration_ms, audio],
        )?;
        Ok(())
    }

    pub fn fail_incomplete_sentences(&self, message_id: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE sentences SET completion_status = 'failed'
             WHERE message_id = ?1 AND completion_status != 'completed'",
            params![message_id],
        )
        .map_err(StoreError::from)
    }

    // ---------------------------------------------------------------
    // Tool uses (§3, §4.6)
    // ---------------------------------------------------------------

    pub fn create_tool_use(
        &self,
        message_id: &str,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolUse> {
        let conn = self.conn.lock().unwrap();
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let seq: i64 = conn.query_row(
            "SELECT COALESCE(MAX(sequence_number), 0) + 1 FROM tool_uses WHERE message_id = ?1",
            params![message_id],
            |row| row.get(0),
        )?;
        let args_json = serde_json::to_string(&arguments)?;
        conn.execute(
            "INSERT INTO tool_uses
                (id, message_id, sequence_number, tool_name, arguments, result, status,
                 error, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, 'pending', NULL, ?6, ?6)",
            params![id, message_id, seq, tool_name, args_json, now],
        )?;
        Ok(ToolUse {
            id,
            message_id: message_id.to_string(),
            sequence_number: seq,
            tool_name: tool_name.to_string(),
            arguments,
            result: None,
            status: ToolUseStatus::Pending,
            error: None,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub fn transition_tool_use(
        &self,
        id: &str,
        status: ToolUseStatus,
        result: Option<serde_json::Value>,
        error: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let result_json = result.map(|r| serde_json::to_string(&r)).transpose()?;
        conn.execute(
            "UPDATE tool_uses SET status = ?2, result = ?3, error = ?4, updated_at = ?5
             WHERE id = ?1",
            params![
                id,
                status.to_string(),
                result_json,
                error,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Reasoning steps (§3)
    // ---------------------------------------------------------------

    pub fn create_reasoning_step(&self, message_id: &str, content: &str) -> Result<ReasoningStep> {
        let conn = self.conn.lock().unwrap();
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let seq: i64 = conn.query_row(
            "SELECT COALESCE(MAX(sequence_number), 0) + 1 FROM reasoning_steps
             WHERE message_id = ?1",
            params![message_id],
            |row| row.get(0),
        )?;
        conn.execute(
            "INSERT INTO reasoning_steps (id, message_id, sequence_number, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, message_id, seq, content, now],
        )?;
        Ok(ReasoningStep {
            id,
            message_id: message_id.to_string(),
            sequence_number: seq,
            content: content.to_string(),
            created_at: now,
        })
    }

    // ---------------------------------------------------------------
    // Memories & retrieval (§3, §4.4, §4.5)
    // ---------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn upsert_memory(
        &self,
        user_id: &str,
        content: &str,
        embedding: &[f32],
        importance: f32,
        confidence: f32,
        tags: &[String],
        pinned: bool,
        source_message_id: Option<&str>,
    ) -> Result<Memory> {
        if embedding.len() != self.embedding_dim {
            return Err(StoreError::Database(rusqlite::Error::InvalidParameterCount(
                embedding.len(),
                self.embedding_dim,
            )));
        }
        let conn = self.conn.lock().unwrap();
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let tags_json = serde_json::to_string(tags)?;
        conn.execute(
            "INSERT INTO memories
                (id, user_id, content, importance, confidence, rating, tags, pinned,
                 archived, source_message_id, created_at, last_accessed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?7, 0, ?8, ?9, ?9)",
            params![
                id, user_id, content, importance, confidence, tags_json,
                pinned as i32, source_message_id, now
            ],
        )?;
        let rowid = conn.last_insert_rowid();
        let embedding_bytes: Vec<u8> = embedding.iter().flat_map(|f| f.to_le_bytes()).collect();
        conn.execute(
            "INSERT INTO vec_memories (rowid, embedding) VALUES (?1, ?2)",
            params![rowid, embedding_bytes],
        )?;
        Ok(Memory {
            id,
            user_id: user_id.to_string(),
            content: content.to_string(),
            embedding: embedding.to_vec(),
            importance,
            confidence,
            rating: None,
            tags: tags.to_vec(),
            pinned,
            archived: false,
            source_message_id: source_message_id.map(|s| s.to_string()),
            created_at: now.clone(),
            last_accessed_at: now,
        })
    }

    pub fn archive_memory(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("UPDATE memories SET archived = 1 WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// k-NN over memory embeddings, cosine similarity, excludes archived
    /// memories (I6), pinned memories surfaced with a similarity floor
    /// (§4.4). Tie-break (§4.5): similarity desc, importance desc, recency
    /// desc, then lexicographic id asc.
    pub fn knn_memories(
        &self,
        user_id: &str,
        query_embedding: &[f32],
        k: usize,
        threshold: f32,
        pinned_floor: f32,
    ) -> Result<Vec<ScoredMemory>> {
        let conn = self.conn.lock().unwrap();
        let query_bytes: Vec<u8> = query_embedding
            .iter()
            .flat_map(|f| f.to_le_bytes())
            .collect();
        // Oversample via vec0's native kNN, then filter by user/archived/
        // threshold in Rust where the tie-break policy is explicit.
        let oversample = (k * 4).max(32);
        let mut stmt = conn.prepare(
            "SELECT m.id, m.user_id, m.content, m.importance, m.confidence, m.rating,
                    m.tags, m.pinned, m.archived, m.source_message_id, m.created_at,
                    m.last_accessed_at, v.distance
             FROM vec_memories v
             JOIN memories m ON m.rowid = v.rowid
             WHERE v.embedding MATCH ?1 AND k = ?2
             ORDER BY v.distance",
        )?;
        let rows = stmt.query_map(params![query_bytes, oversample as i64], |row| {
            let distance: f32 = row.get(12)?;
            Ok((row_to_memory(row)?, distance))
        })?;

        let mut candidates: Vec<ScoredMemory> = Vec::new();
        for row in rows {
            let (memory, distance) = row?;
            if memory.user_id != user_id || memory.archived {
                continue;
            }
            // vec0's `distance` for cosine metric is `1 - cosine_similarity`.
            let similarity = 1.0 - distance;
            let floor = if memory.pinned {
                pinned_floor
            } else {
                threshold
            };
            if similarity < floor {
                continue;
            }
            candidates.push(ScoredMemory { memory, similarity });
        }

        candidates.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.memory
                        .importance
                        .partial_cmp(&a.memory.importance)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| b.memory.last_accessed_at.cmp(&a.memory.last_accessed_at))
                .then_with(|| a.memory.id.cmp(&b.memory.id))
        });
        candidates.truncate(k);
        Ok(candidates)
    }

    pub fn record_memory_usage(
        &self,
        memory_id: &str,
        message_id: &str,
        conversation_id: &str,
        similarity: f32,
        rank: i32,
    ) -> Result<MemoryUsage> {
        let conn = self.conn.lock().unwrap();
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO memory_usages
                (id, memory_id, message_id, conversation_id, similarity, rank, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![id, memory_id, message_id, conversation_id, similarity, rank, now],
        )?;
        conn.execute(
            "UPDATE memories SET last_accessed_at = ?2 WHERE id = ?1",
            params![memory_id, now],
        )?;
        Ok(MemoryUsage {
            id,
            memory_id: memory_id.to_string(),
            message_id: message_id.to_string(),
            conversation_id: conversation_id.to_string(),
            similarity,
            rank,
            created_at: now,
        })
    }

    // ---------------------------------------------------------------
    // Tools, votes, notes (§3)
    // ---------------------------------------------------------------

    /// `EnsureTool`: idempotent insert-or-reuse by name (§4.6).
    pub fn ensure_tool(&self, name: &str, description: &str, schema: serde_json::Value) -> Result<Tool> {
        let conn = self.conn.lock().unwrap();
        let schema_json = serde_json::to_string(&schema)?;
        conn.execute(
            "INSERT INTO tools (name, description, schema, enabled) VALUES (?1, ?2, ?3, 1)
             ON CONFLICT(name) DO NOTHING",
            params![name, description, schema_json],
        )?;
        conn.query_row(
            "SELECT name, description, schema, enabled FROM tools WHERE name = ?1",
            params![name],
            row_to_tool,
        )
        .map_err(StoreError::from)
    }

    pub fn record_vote(&self, target_type: VoteTarget, target_id: &str, kind: VoteKind) -> Result<Vote> {
        let conn = self.conn.lock().unwrap();
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let kind_str = serde_json::to_value(kind)?.as_str().unwrap().to_string();
        let target_str = serde_json::to_value(target_type)?.as_str().unwrap().to_string();
        conn.execute(
            "INSERT INTO votes (id, target_type, target_id, kind, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, target_str, target_id, kind_str, now],
        )?;
        Ok(Vote {
            id,
            target_type,
            target_id: target_id.to_string(),
            kind,
            created_at: now,
        })
    }

    pub fn record_note(
        &self,
        target_type: VoteTarget,
        target_id: &str,
        text: &str,
        category: Option<&str>,
    ) -> Result<Note> {
        let conn = self.conn.lock().unwrap();
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let target_str = serde_json::to_value(target_type)?.as_str().unwrap().to_string();
        conn.execute(
            "INSERT INTO notes (id, target_type, target_id, text, category, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, target_str, target_id, text, category, now],
        )?;
        Ok(Note {
            id,
            target_type,
            target_id: target_id.to_string(),
            text: text.to_string(),
            category: category.map(|s| s.to_string()),
            created_at: now,
        })
    }

    // ---------------------------------------------------------------
    // Envelope log — resume replay (§4.3)
    // ---------------------------------------------------------------

    pub fn append_envelope_log(&self, conversation_id: &str, stanza_id: i32, bytes: &[u8]) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO envelope_log (conversation_id, stanza_id, bytes, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![conversation_id, stanza_id, bytes, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Envelopes with `stanza_id < last_sequence_seen` in server numbering
    /// (i.e. more negative — emitted after what the client last saw),
    /// returned in strict (ascending-magnitude / descending id) order.
    pub fn replay_since(&self, conversation_id: &str, last_sequence_seen: i32) -> Result<Vec<LoggedEnvelope>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT conversation_id, stanza_id, bytes FROM envelope_log
             WHERE conversation_id = ?1 AND stanza_id < ?2
             ORDER BY stanza_id DESC",
        )?;
        let rows = stmt.query_map(params![conversation_id, last_sequence_seen], |row| {
            Ok(LoggedEnvelope {
                conversation_id: row.get(0)?,
                stanza_id: row.get(1)?,
                bytes: row.get(2)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::from)
    }
}

fn row_to_conversation(row: &rusqlite::Row) -> rusqlite::Result<Conversation> {
    let status_str: String = row.get(3)?;
    let preferences_str: String = row.get(4)?;
    Ok(Conversation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        status: parse_status(&status_str),
        preferences: serde_json::from_str(&preferences_str).unwrap_or(serde_json::json!({})),
        client_stanza_high: row.get(5)?,
        server_stanza_low: row.get(6)?,
        tip_message_id: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        deleted_at: row.get(10)?,
    })
}

fn parse_status(s: &str) -> ConversationStatus {
    match s {
        "archived" => ConversationStatus::Archived,
        "deleted" => ConversationStatus::Deleted,
        _ => ConversationStatus::Active,
    }
}

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<Message> {
    let role_str: String = row.get(4)?;
    let status_str: String = row.get(6)?;
    let sync_str: String = row.get(9)?;
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sequence_number: row.get(2)?,
        previous_id: row.get(3)?,
        role: Role::from_str(&role_str).unwrap_or(Role::User),
        content: row.get(5)?,
        completion_status: CompletionStatus::from_str(&status_str).unwrap_or(CompletionStatus::Pending),
        local_id: row.get(7)?,
        server_id: row.get(8)?,
        sync_status: match sync_str.as_str() {
            "synced" => SyncStatus::Synced,
            "conflict" => SyncStatus::Conflict,
            _ => SyncStatus::Pending,
        },
        synced_at: row.get(10)?,
        edited: row.get::<_, i64>(11)? != 0,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

fn row_to_memory(row: &rusqlite::Row) -> rusqlite::Result<Memory> {
    let tags_str: String = row.get(6)?;
    Ok(Memory {
        id: row.get(0)?,
        user_id: row.get(1)?,
        content: row.get(2)?,
        embedding: Vec::new(),
        importance: row.get(3)?,
        confidence: row.get(4)?,
        rating: row.get(5)?,
        tags: serde_json::from_str(&tags_str).unwrap_or_default(),
        pinned: row.get::<_, i64>(7)? != 0,
        archived: row.get::<_, i64>(8)? != 0,
        source_message_id: row.get(9)?,
        created_at: row.get(10)?,
        last_accessed_at: row.get(11)?,
    })
}

fn row_to_tool(row: &rusqlite::Row) -> rusqlite::Result<Tool> {
    let schema_str: String = row.get(2)?;
    Ok(Tool {
        name: row.get(0)?,
        description: row.get(1)?,
        schema: serde_json::from_str(&schema_str).unwrap_or(serde_json::json!({})),
        enabled: row.get::<_, i64>(3)? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Store {
        Store::open_in_memory(4).unwrap()
    }

    #[test]
    fn conversation_round_trips() {
        let store = store();
        let conv = store.create_conversation("user-1").unwrap();
        let fetched = store.get_conversation(&conv.id).unwrap();
        assert_eq!(conv.id, fetched.id);
        assert_eq!(fetched.client_stanza_high, 0);
        assert_eq!(fetched.server_stanza_low, 0);
    }

    #[test]
    fn server_stanza_low_strictly_decreases() {
        let store = store();
        let conv = store.create_conversation("user-1").unwrap();
        let first = store.next_server_stanza(&conv.id).unwrap();
        let second = store.next_server_stanza(&conv.id).unwrap();
        assert_eq!(first, -1);
        assert_eq!(second, -2);
    }

    #[test]
    fn append_message_rejects_previous_id_from_another_conversation() {
        let store = store();
        let conv_a = store.create_conversation("user-1").unwrap();
        let conv_b = store.create_conversation("user-1").unwrap();
        let msg_a = store
            .append_message(&conv_a.id, None, Role::User, "hello")
            .unwrap();
        let result = store.append_message(&conv_b.id, Some(&msg_a.id), Role::User, "hi");
        assert!(matches!(result, Err(StoreError::InvalidPreviousId(_, _))));
    }

    #[test]
    fn walk_active_branch_follows_tip_to_root() {
        let store = store();
        let conv = store.create_conversation("user-1").unwrap();
        let m1 = store
            .append_message(&conv.id, None, Role::User, "first")
            .unwrap();
        let m2 = store
            .append_message(&conv.id, Some(&m1.id), Role::Assistant, "second")
            .unwrap();
        store.set_tip(&conv.id, &m2.id).unwrap();
        let chain = store.walk_active_branch(&conv.id).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].id, m1.id);
        assert_eq!(chain[1].id, m2.id);
    }

    #[test]
    fn siblings_share_the_same_previous_id() {
        let store = store();
        let conv = store.create_conversation("user-1").unwrap();
        let root = store
            .append_message(&conv.id, None, Role::User, "root")
            .unwrap();
        let branch_a = store
            .append_message(&conv.id, Some(&root.id), Role::Assistant, "a")
            .unwrap();
        let branch_b = store
            .append_message(&conv.id, Some(&root.id), Role::Assistant, "b")
            .unwrap();
        let siblings = store.siblings_of(&branch_a.id).unwrap();
        assert_eq!(siblings.len(), 2);
        assert!(siblings.iter().any(|m| m.id == branch_a.id));
        assert!(siblings.iter().any(|m| m.id == branch_b.id));
    }

    #[test]
    fn knn_memories_excludes_archived_and_respects_threshold() {
        let store = store();
        let m1 = store
            .upsert_memory(
                "user-1",
                "likes rust",
                &[1.0, 0.0, 0.0, 0.0],
                0.8,
                0.9,
                &[],
                false,
                None,
            )
            .unwrap();
        let m2 = store
            .upsert_memory(
                "user-1",
                "likes golang",
                &[0.0, 1.0, 0.0, 0.0],
                0.8,
                0.9,
                &[],
                false,
                None,
            )
            .unwrap();
        store.archive_memory(&m2.id).unwrap();
        let results = store
            .knn_memories("user-1", &[1.0, 0.0, 0.0, 0.0], 5, 0.1, 0.0)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].memory.id, m1.id);
    }

    #[test]
    fn envelope_log_replays_only_newer_entries() {
        let store = store();
        let conv = store.create_conversation("user-1").unwrap();
        store.append_envelope_log(&conv.id, -1, b"first").unwrap();
        store.append_envelope_log(&conv.id, -2, b"second").unwrap();
        store.append_envelope_log(&conv.id, -3, b"third").unwrap();
        let replay = store.replay_since(&conv.id, -1).unwrap();
        assert_eq!(replay.len(), 2);
        assert_eq!(replay[0].stanza_id, -2);
        assert_eq!(replay[1].stanza_id, -3);
    }
}
