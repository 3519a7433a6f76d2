use rusqlite::{Connection, Result};

/// Register the `sqlite-vec` extension so `vec0` virtual tables (used for
/// k-NN memory retrieval, §4.4) are available on every connection. Safe to
/// call once per process before any connection is opened.
pub fn register_vec_extension() {
    unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite_vec::sqlite3_vec_init as *const (),
        )));
    }
}

/// Initialise all tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection, embedding_dim: usize) -> Result<()> {
    create_conversations_table(conn)?;
    create_messages_table(conn)?;
    create_sentences_table(conn)?;
    create_tool_uses_table(conn)?;
    create_reasoning_steps_table(conn)?;
    create_memories_table(conn, embedding_dim)?;
    create_memory_usages_table(conn)?;
    create_tools_table(conn)?;
    create_votes_table(conn)?;
    create_notes_table(conn)?;
    create_envelope_log_table(conn)?;
    Ok(())
}

fn create_conversations_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS conversations (
            id                  TEXT PRIMARY KEY,
            user_id             TEXT NOT NULL,
            title               TEXT,
            status              TEXT NOT NULL DEFAULT 'active',
            preferences         TEXT NOT NULL DEFAULT '{}',
            client_stanza_high  INTEGER NOT NULL DEFAULT 0,
            server_stanza_low   INTEGER NOT NULL DEFAULT 0,
            tip_message_id      TEXT,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL,
            deleted_at          TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id);",
    )
}

fn create_messages_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS messages (
            id                  TEXT PRIMARY KEY,
            conversation_id     TEXT NOT NULL,
            sequence_number     INTEGER NOT NULL,
            previous_id         TEXT,
            role                TEXT NOT NULL,
            content             TEXT NOT NULL,
            completion_status   TEXT NOT NULL DEFAULT 'pending',
            local_id            TEXT,
            server_id           TEXT,
            sync_status         TEXT NOT NULL DEFAULT 'pending',
            synced_at           TEXT,
            edited              INTEGER NOT NULL DEFAULT 0,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL,
            UNIQUE(conversation_id, sequence_number),
            FOREIGN KEY(conversation_id) REFERENCES conversations(id)
        );
        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, sequence_number);
        CREATE INDEX IF NOT EXISTS idx_messages_previous
            ON messages(conversation_id, previous_id);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_server_id
            ON messages(server_id) WHERE server_id IS NOT NULL;",
    )
}

fn create_sentences_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sentences (
            id                          TEXT PRIMARY KEY,
            message_id                  TEXT NOT NULL,
            sentence_sequence_number    INTEGER NOT NULL,
            text                        TEXT NOT NULL,
            audio_format                TEXT,
            audio_duration_ms           INTEGER,
            audio                       BLOB,
            completion_status           TEXT NOT NULL DEFAULT 'pending',
            created_at                  TEXT NOT NULL,
            UNIQUE(message_id, sentence_sequence_number),
            FOREIGN KEY(message_id) REFERENCES messages(id)
        );
        CREATE INDEX IF NOT EXISTS idx_sentences_message ON sentences(message_id);",
    )
}

fn create_tool_uses_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tool_uses (
            id              TEXT PRIMARY KEY,
            message_id      TEXT NOT NULL,
            sequence_number INTEGER NOT NULL,
            tool_name       TEXT NOT NULL,
            arguments       TEXT NOT NULL,
            result          TEXT,
            status          TEXT NOT NULL DEFAULT 'pending',
            error           TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL,
            UNIQUE(message_id, sequence_number),
            FOREIGN KEY(message_id) REFERENCES messages(id)
        );
        CREATE INDEX IF NOT EXISTS idx_tool_uses_message ON tool_uses(message_id);",
    )
}

fn create_reasoning_steps_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS reasoning_steps (
            id              TEXT PRIMARY KEY,
            message_id      TEXT NOT NULL,
            sequence_number INTEGER NOT NULL,
            content         TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            UNIQUE(message_id, sequence_number),
            FOREIGN KEY(message_id) REFERENCES messages(id)
        );",
    )
}

fn create_memories_table(conn: &Connection, embedding_dim: usize) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS memories (
            id                  TEXT PRIMARY KEY,
            user_id             TEXT NOT NULL,
            content             TEXT NOT NULL,
            importance          REAL NOT NULL DEFAULT 0.5,
            confidence          REAL NOT NULL DEFAULT 0.5,
            rating              INTEGER,
            tags                TEXT NOT NULL DEFAULT '[]',
            pinned              INTEGER NOT NULL DEFAULT 0,
            archived            INTEGER NOT NULL DEFAULT 0,
            source_message_id   TEXT,
            created_at          TEXT NOT NULL,
            last_accessed_at    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_memories_user ON memories(user_id, archived);",
    )?;
    // vec0 virtual table holding the embedding vectors, rowid-joined to
    // `memories.rowid`. Declared separately since the dimension is
    // configurable (MemoryConfig::embedding_dim).
    conn.execute_batch(&format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS vec_memories USING vec0(
            embedding float[{embedding_dim}]
        );"
    ))
}

fn create_memory_usages_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS memory_usages (
            id              TEXT PRIMARY KEY,
            memory_id       TEXT NOT NULL,
            message_id      TEXT NOT NULL,
            conversation_id TEXT NOT NULL,
            similarity      REAL NOT NULL,
            rank            INTEGER NOT NULL,
            created_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_memory_usages_message ON memory_usages(message_id);",
    )
}

fn create_tools_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tools (
            name        TEXT PRIMARY KEY,
            description TEXT NOT NULL,
            schema      TEXT NOT NULL,
            enabled     INTEGER NOT NULL DEFAULT 1
        );",
    )
}

fn create_votes_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS votes (
            id          TEXT PRIMARY KEY,
            target_type TEXT NOT NULL,
            target_id   TEXT NOT NULL,
            kind        TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_votes_target ON votes(target_type, target_id);",
    )
}

fn create_notes_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS notes (
            id          TEXT PRIMARY KEY,
            target_type TEXT NOT NULL,
            target_id   TEXT NOT NULL,
            text        TEXT NOT NULL,
            category    TEXT,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_notes_target ON notes(target_type, target_id);",
    )
}

/// Append-only log of emitted envelopes, keyed by `(conversation_id,
/// stanza_id)`. Backs §4.3's resume-replay contract.
fn create_envelope_log_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS envelope_log (
            conversation_id TEXT NOT NULL,
            stanza_id       INTEGER NOT NULL,
            bytes           BLOB NOT NULL,
            created_at      TEXT NOT NULL,
            PRIMARY KEY(conversation_id, stanza_id)
        );",
    )
}
