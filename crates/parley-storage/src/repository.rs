//! SQLite-backed conversation store.
//!
//! Conversations and their append-only message logs. Appends assign the
//! next `seq` and a strictly increasing timestamp inside one IMMEDIATE
//! transaction, so concurrent writers never share an ordinal.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::debug;
use uuid::Uuid;

use parley_core::error::ParleyError;
use parley_core::types::{Conversation, Message, MessageContent, Role, DEFAULT_TITLE};

use crate::db::Database;

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, seq, role, content_kind, content, payload, is_error, created_at";

const CONVERSATION_COLUMNS: &str = "id, owner, title, created_at, updated_at";

/// Storage statistics from the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub conversations: u64,
    pub messages: u64,
    pub error_messages: u64,
    pub db_size_bytes: u64,
}

/// Persistent store for conversations and messages.
#[derive(Clone, Debug)]
pub struct ConversationStore {
    db: Arc<Database>,
}

impl ConversationStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create a conversation together with its greeting message.
    ///
    /// Both rows are written in one transaction: a conversation is never
    /// visible without at least one message.
    pub fn create_conversation(
        &self,
        owner: &str,
        greeting: &str,
    ) -> Result<Conversation, ParleyError> {
        let id = Uuid::new_v4();
        let now = now_micros();

        self.db.with_conn_mut(|conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(storage_err("begin create_conversation"))?;

            tx.execute(
                "INSERT INTO conversations (id, owner, title, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                rusqlite::params![id.to_string(), owner, DEFAULT_TITLE, now],
            )
            .map_err(storage_err("insert conversation"))?;

            tx.execute(
                "INSERT INTO messages (id, conversation_id, seq, role, content_kind, content, is_error, created_at)
                 VALUES (?1, ?2, 1, 'assistant', 'text', ?3, 0, ?4)",
                rusqlite::params![Uuid::new_v4().to_string(), id.to_string(), greeting, now],
            )
            .map_err(storage_err("insert greeting"))?;

            tx.commit().map_err(storage_err("commit create_conversation"))?;
            Ok(())
        })?;

        debug!(conversation_id = %id, owner, "Conversation created");

        Ok(Conversation {
            id,
            owner: owner.to_string(),
            title: DEFAULT_TITLE.to_string(),
            created_at: micros_to_datetime(now),
            updated_at: micros_to_datetime(now),
        })
    }

    /// Append a message to a conversation's log.
    ///
    /// Fails with `NotFound` when the conversation does not exist. The
    /// timestamp is the current time, bumped past the previous message's
    /// timestamp when the clock has not advanced.
    pub fn append_message(
        &self,
        conversation_id: Uuid,
        role: Role,
        content: &MessageContent,
        is_error: bool,
    ) -> Result<Message, ParleyError> {
        let id = Uuid::new_v4();
        let payload = match content {
            MessageContent::Text { .. } => None,
            MessageContent::Analysis { .. } => Some(serde_json::to_string(content)?),
        };
        let text = content.as_text();

        let (seq, created_at) = self.db.with_conn_mut(|conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(storage_err("begin append_message"))?;

            let exists: bool = tx
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM conversations WHERE id = ?1)",
                    [conversation_id.to_string()],
                    |row| row.get(0),
                )
                .map_err(storage_err("check conversation"))?;
            if !exists {
                return Err(ParleyError::NotFound);
            }

            let (last_seq, last_ts): (i64, i64) = tx
                .query_row(
                    "SELECT COALESCE(MAX(seq), 0), COALESCE(MAX(created_at), 0)
                     FROM messages WHERE conversation_id = ?1",
                    [conversation_id.to_string()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .map_err(storage_err("read last message"))?;

            let seq = last_seq + 1;
            let created_at = now_micros().max(last_ts + 1);

            tx.execute(
                "INSERT INTO messages (id, conversation_id, seq, role, content_kind, content, payload, is_error, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    id.to_string(),
                    conversation_id.to_string(),
                    seq,
                    role.as_str(),
                    content.kind(),
                    text,
                    payload,
                    is_error as i32,
                    created_at,
                ],
            )
            .map_err(storage_err("insert message"))?;

            tx.execute(
                "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
                rusqlite::params![conversation_id.to_string(), created_at],
            )
            .map_err(storage_err("touch conversation"))?;

            tx.commit().map_err(storage_err("commit append_message"))?;
            Ok((seq, created_at))
        })?;

        Ok(Message {
            id,
            conversation_id,
            seq,
            role,
            content: content.clone(),
            created_at: micros_to_datetime(created_at),
            is_error,
        })
    }

    /// Fetch a conversation owned by `owner`.
    ///
    /// A missing conversation and one owned by someone else both yield
    /// `NotFound`.
    pub fn get_conversation(&self, id: Uuid, owner: &str) -> Result<Conversation, ParleyError> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM conversations WHERE id = ?1 AND owner = ?2",
                CONVERSATION_COLUMNS
            );
            conn.query_row(&sql, rusqlite::params![id.to_string(), owner], |row| {
                Ok(row_to_conversation(row))
            })
            .optional()
            .map_err(storage_err("get conversation"))?
            .ok_or(ParleyError::NotFound)?
        })
    }

    /// Conversations owned by `owner`, most recently created first.
    pub fn list_conversations(&self, owner: &str) -> Result<Vec<Conversation>, ParleyError> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM conversations WHERE owner = ?1
                 ORDER BY created_at DESC, rowid DESC",
                CONVERSATION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql).map_err(storage_err("prepare list"))?;
            let rows = stmt
                .query_map([owner], |row| Ok(row_to_conversation(row)))
                .map_err(storage_err("list conversations"))?;

            let mut conversations = Vec::new();
            for row in rows {
                conversations.push(row.map_err(storage_err("read conversation"))??);
            }
            Ok(conversations)
        })
    }

    /// All messages of a conversation in append order.
    pub fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, ParleyError> {
        self.db
            .with_conn(|conn| query_messages(conn, conversation_id))
    }

    /// Number of user messages in a conversation.
    pub fn count_user_messages(&self, conversation_id: Uuid) -> Result<u64, ParleyError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1 AND role = 'user'",
                    [conversation_id.to_string()],
                    |row| row.get(0),
                )
                .map_err(storage_err("count user messages"))?;
            Ok(count as u64)
        })
    }

    /// Replace the title while it still holds the default.
    ///
    /// Returns `false` when the conversation was already renamed.
    pub fn set_title_if_default(
        &self,
        conversation_id: Uuid,
        title: &str,
    ) -> Result<bool, ParleyError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE conversations SET title = ?2, updated_at = MAX(updated_at, ?3)
                     WHERE id = ?1 AND title = ?4",
                    rusqlite::params![conversation_id.to_string(), title, now_micros(), DEFAULT_TITLE],
                )
                .map_err(storage_err("set title"))?;
            if changed > 0 {
                return Ok(true);
            }

            let exists: bool = conn
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM conversations WHERE id = ?1)",
                    [conversation_id.to_string()],
                    |row| row.get(0),
                )
                .map_err(storage_err("check conversation"))?;
            if exists {
                Ok(false)
            } else {
                Err(ParleyError::NotFound)
            }
        })
    }

    /// Delete a conversation owned by `owner` and its messages.
    pub fn delete_conversation(&self, id: Uuid, owner: &str) -> Result<(), ParleyError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "DELETE FROM conversations WHERE id = ?1 AND owner = ?2",
                    rusqlite::params![id.to_string(), owner],
                )
                .map_err(storage_err("delete conversation"))?;
            if changed == 0 {
                return Err(ParleyError::NotFound);
            }
            debug!(conversation_id = %id, "Conversation deleted");
            Ok(())
        })
    }
    /// Row counts and approximate file size.
    pub fn stats(&self) -> Result<StoreStats, ParleyError> {
        self.db.with_conn(|conn| {
            let count = |sql: &str| -> Result<u64, ParleyError> {
                let n: i64 = conn
                    .query_row(sql, [], |row| row.get(0))
                    .map_err(storage_err("stats"))?;
                Ok(n as u64)
            };

            let conversations = count("SELECT COUNT(*) FROM conversations")?;
            let messages = count("SELECT COUNT(*) FROM messages")?;
            let error_messages = count("SELECT COUNT(*) FROM messages WHERE is_error = 1")?;
            // page_count * page_size gives approximate DB size.
            let page_count = count("PRAGMA page_count")?;
            let page_size = count("PRAGMA page_size")?;

            Ok(StoreStats {
                conversations,
                messages,
                error_messages,
                db_size_bytes: page_count * page_size,
            })
        })
    }
}

fn query_messages(conn: &Connection, conversation_id: Uuid) -> Result<Vec<Message>, ParleyError> {
    let sql = format!(
        "SELECT {} FROM messages WHERE conversation_id = ?1 ORDER BY seq ASC",
        MESSAGE_COLUMNS
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(storage_err("prepare messages"))?;
    let rows = stmt
        .query_map([conversation_id.to_string()], |row| Ok(row_to_message(row)))
        .map_err(storage_err("list messages"))?;

    let mut messages = Vec::new();
    for row in rows {
        messages.push(row.map_err(storage_err("read message"))??);
    }
    Ok(messages)
}

// =============================================================================
// Row mapping
// =============================================================================

fn row_to_conversation(row: &Row<'_>) -> Result<Conversation, ParleyError> {
    let id: String = row.get(0).map_err(storage_err("column id"))?;
    Ok(Conversation {
        id: parse_uuid(&id)?,
        owner: row.get(1).map_err(storage_err("column owner"))?,
        title: row.get(2).map_err(storage_err("column title"))?,
        created_at: micros_to_datetime(row.get(3).map_err(storage_err("column created_at"))?),
        updated_at: micros_to_datetime(row.get(4).map_err(storage_err("column updated_at"))?),
    })
}

fn row_to_message(row: &Row<'_>) -> Result<Message, ParleyError> {
    let id: String = row.get(0).map_err(storage_err("column id"))?;
    let conversation_id: String = row.get(1).map_err(storage_err("column conversation_id"))?;
    let role: String = row.get(3).map_err(storage_err("column role"))?;
    let kind: String = row.get(4).map_err(storage_err("column content_kind"))?;
    let text: String = row.get(5).map_err(storage_err("column content"))?;
    let payload: Option<String> = row.get(6).map_err(storage_err("column payload"))?;
    let is_error: i32 = row.get(7).map_err(storage_err("column is_error"))?;

    let content = match (kind.as_str(), payload) {
        ("analysis", Some(json)) => serde_json::from_str(&json)?,
        _ => MessageContent::Text { text },
    };

    Ok(Message {
        id: parse_uuid(&id)?,
        conversation_id: parse_uuid(&conversation_id)?,
        seq: row.get(2).map_err(storage_err("column seq"))?,
        role: role
            .parse()
            .map_err(|e: ParleyError| ParleyError::Storage(e.to_string()))?,
        content,
        created_at: micros_to_datetime(row.get(8).map_err(storage_err("column created_at"))?),
        is_error: is_error != 0,
    })
}

fn parse_uuid(s: &str) -> Result<Uuid, ParleyError> {
    Uuid::parse_str(s).map_err(|e| ParleyError::Storage(format!("Invalid UUID '{}': {}", s, e)))
}

fn storage_err(context: &'static str) -> impl Fn(rusqlite::Error) -> ParleyError {
    move |e| ParleyError::Storage(format!("{}: {}", context, e))
}

fn now_micros() -> i64 {
    Utc::now().timestamp_micros()
}

fn micros_to_datetime(micros: i64) -> DateTime<Utc> {
    Utc.timestamp_micros(micros).single().unwrap_or_default()
}
