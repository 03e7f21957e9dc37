//! Database schema migrations.
//!
//! Applies the conversation/message schema and records applied versions in
//! `schema_migrations`.

use rusqlite::Connection;
use tracing::info;

use parley_core::error::ParleyError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), ParleyError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| ParleyError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| ParleyError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: conversations");
    }

    Ok(())
}

/// Version 1: conversations and their append-only message log.
///
/// Timestamps are microseconds since the Unix epoch.
fn apply_v1(conn: &Connection) -> Result<(), ParleyError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS conversations (
            id              TEXT PRIMARY KEY NOT NULL,
            owner           TEXT NOT NULL,
            title           TEXT NOT NULL,
            created_at      INTEGER NOT NULL,
            updated_at      INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_owner
            ON conversations (owner, created_at DESC);

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY NOT NULL,
            conversation_id TEXT NOT NULL,
            seq             INTEGER NOT NULL,
            role            TEXT NOT NULL
                            CHECK (role IN ('user', 'assistant')),
            content_kind    TEXT NOT NULL DEFAULT 'text'
                            CHECK (content_kind IN ('text', 'analysis')),
            content         TEXT NOT NULL,
            payload         TEXT,
            is_error        INTEGER NOT NULL DEFAULT 0
                            CHECK (is_error IN (0, 1)),
            created_at      INTEGER NOT NULL,
            UNIQUE (conversation_id, seq),
            FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages (conversation_id, seq ASC);

        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'conversations');
        ",
    )
    .map_err(|e| ParleyError::Storage(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}
