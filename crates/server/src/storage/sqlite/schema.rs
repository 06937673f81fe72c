//! SQL statements used by the SQLite repository.

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS conversations (
    hash TEXT PRIMARY KEY,
    credential_id TEXT NOT NULL,
    model TEXT NOT NULL,
    messages TEXT NOT NULL,
    metadata TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_conversations_updated_at ON conversations(updated_at);
"#;

pub const SELECT_CONVERSATION: &str = r#"
SELECT hash, credential_id, model, messages, metadata, created_at, updated_at
FROM conversations
WHERE hash = ?1
"#;

/// Insert or replace, keeping the original `created_at`.
pub const UPSERT_CONVERSATION: &str = r#"
INSERT INTO conversations (hash, credential_id, model, messages, metadata, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
ON CONFLICT(hash) DO UPDATE SET
    credential_id = excluded.credential_id,
    model = excluded.model,
    messages = excluded.messages,
    metadata = excluded.metadata,
    updated_at = excluded.updated_at
"#;

pub const COUNT_CONVERSATIONS: &str = r#"
SELECT COUNT(*) FROM conversations
"#;

/// Deletes everything but the `?1` most recently updated rows.
pub const PRUNE_CONVERSATIONS: &str = r#"
DELETE FROM conversations
WHERE hash IN (
    SELECT hash FROM conversations
    ORDER BY updated_at DESC
    LIMIT -1 OFFSET ?1
)
"#;
