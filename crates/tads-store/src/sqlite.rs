use std::str::FromStr;

use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior};
use tads_models::history::{
    clamp_limit, MessageRecord, MessageStatus, NewMessage, NewSession, SessionPage,
    SessionRecord, SessionStatus,
};
use tads_models::store_schema::{HISTORY_DDL, MESSAGE_COLUMNS, SESSION_COLUMNS};
use tads_models::ModelError;

use crate::cursor::{decode_cursor, encode_cursor};
use crate::error::StoreError;

/// SQLite-backed session and message store.
///
/// Ids come from `AUTOINCREMENT`. Every write that depends on existing rows
/// (seq allocation, latest-message checks) runs inside one immediate transaction.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the history database at `path` with WAL journaling.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    /// Open an in-memory database with the schema applied.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(HISTORY_DDL)?;
        Ok(Self { conn })
    }

    pub fn create_session(&self, new: &NewSession) -> Result<SessionRecord, StoreError> {
        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO sessions (symbol, trade_date, prompt, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                new.symbol,
                new.trade_date,
                new.prompt,
                SessionStatus::Running.as_str(),
                now,
                now,
            ],
        )?;
        Ok(SessionRecord {
            id: self.conn.last_insert_rowid(),
            symbol: new.symbol.clone(),
            trade_date: new.trade_date,
            prompt: new.prompt.clone(),
            status: SessionStatus::Running,
            created_at: now,
            updated_at: now,
        })
    }

    /// Append a message at an explicit `seq`, which must be exactly one past
    /// the session's current maximum.
    pub fn append_message(
        &mut self,
        message: &NewMessage,
        seq: u32,
    ) -> Result<MessageRecord, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let max = max_seq(&tx, message.session_id)?;
        if seq != max + 1 {
            return Err(StoreError::ConstraintViolation(format!(
                "seq {seq} does not follow {max} in session {}",
                message.session_id
            )));
        }
        let record = insert_message(&tx, message, seq)?;
        tx.commit()?;
        Ok(record)
    }

    /// Append a message at the next free `seq` of its session.
    pub fn append_next_message(&mut self, message: &NewMessage) -> Result<MessageRecord, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let seq = max_seq(&tx, message.session_id)? + 1;
        let record = insert_message(&tx, message, seq)?;
        tx.commit()?;
        Ok(record)
    }

    /// Sessions newest first. `cursor` is the `next_cursor` of the previous page.
    pub fn list_sessions(
        &self,
        cursor: Option<&str>,
        limit: Option<u32>,
    ) -> Result<SessionPage, StoreError> {
        let limit = clamp_limit(limit);
        let after = cursor.map(decode_cursor).transpose()?;
        // One extra row tells us whether another page exists.
        let fetch = i64::from(limit) + 1;

        let mut items = match after {
            Some(last_id) => {
                let mut stmt = self.conn.prepare_cached(&format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions WHERE id < ?1 ORDER BY id DESC LIMIT ?2"
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![last_id, fetch], session_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = self.conn.prepare_cached(&format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY id DESC LIMIT ?1"
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![fetch], session_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };

        let has_more = items.len() > limit as usize;
        items.truncate(limit as usize);
        let next_cursor = if has_more {
            items.last().map(|s| encode_cursor(s.id))
        } else {
            None
        };
        Ok(SessionPage {
            items,
            next_cursor,
            has_more,
        })
    }

    /// A session with its messages in ascending `seq` order.
    pub fn get_session(
        &self,
        session_id: i64,
    ) -> Result<(SessionRecord, Vec<MessageRecord>), StoreError> {
        let session = self.find_session(session_id)?;
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE session_id = ?1 ORDER BY seq ASC"
        ))?;
        let messages = stmt
            .query_map(rusqlite::params![session_id], message_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok((session, messages))
    }

    pub fn update_session_status(
        &self,
        session_id: i64,
        status: SessionStatus,
    ) -> Result<SessionRecord, StoreError> {
        let changed = self.conn.execute(
            "UPDATE sessions SET status = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![status.as_str(), Utc::now(), session_id],
        )?;
        if changed == 0 {
            return Err(session_not_found(session_id));
        }
        self.find_session(session_id)
    }

    /// Change status and finish reason of the most recent message of a session.
    pub fn update_message_status(
        &mut self,
        session_id: i64,
        message_id: i64,
        status: MessageStatus,
        finish_reason: Option<&str>,
    ) -> Result<MessageRecord, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let latest: Option<i64> = tx
            .query_row(
                "SELECT id FROM messages WHERE session_id = ?1 ORDER BY seq DESC LIMIT 1",
                rusqlite::params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        match latest {
            None => {
                return Err(StoreError::NotFound(format!(
                    "message {message_id} in session {session_id}"
                )))
            }
            Some(id) if id != message_id => {
                let exists: Option<i64> = tx
                    .query_row(
                        "SELECT id FROM messages WHERE id = ?1 AND session_id = ?2",
                        rusqlite::params![message_id, session_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                return Err(match exists {
                    Some(_) => StoreError::ConstraintViolation(format!(
                        "message {message_id} is not the latest message of session {session_id}"
                    )),
                    None => StoreError::NotFound(format!(
                        "message {message_id} in session {session_id}"
                    )),
                });
            }
            Some(_) => {}
        }

        tx.execute(
            "UPDATE messages SET status = ?1, finish_reason = ?2, updated_at = ?3 WHERE id = ?4",
            rusqlite::params![status.as_str(), finish_reason, Utc::now(), message_id],
        )?;
        let record = tx.query_row(
            &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
            rusqlite::params![message_id],
            message_from_row,
        )?;
        tx.commit()?;
        Ok(record)
    }

    pub fn message_count(&self, session_id: i64) -> Result<u32, StoreError> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE session_id = ?1",
            rusqlite::params![session_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn find_session(&self, session_id: i64) -> Result<SessionRecord, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"))?;
        stmt.query_row(rusqlite::params![session_id], session_from_row)
            .optional()?
            .ok_or_else(|| session_not_found(session_id))
    }
}

fn session_not_found(session_id: i64) -> StoreError {
    StoreError::NotFound(format!("session {session_id}"))
}

/// Highest `seq` of a session, 0 when it has no messages. Fails if the session is unknown.
fn max_seq(conn: &Connection, session_id: i64) -> Result<u32, StoreError> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT id FROM sessions WHERE id = ?1",
            rusqlite::params![session_id],
            |row| row.get(0),
        )
        .optional()?;
    if exists.is_none() {
        return Err(session_not_found(session_id));
    }
    let max: u32 = conn.query_row(
        "SELECT COALESCE(MAX(seq), 0) FROM messages WHERE session_id = ?1",
        rusqlite::params![session_id],
        |row| row.get(0),
    )?;
    Ok(max)
}

fn insert_message(
    conn: &Connection,
    message: &NewMessage,
    seq: u32,
) -> Result<MessageRecord, StoreError> {
    let now = Utc::now();
    conn.execute(
        "INSERT INTO messages \
         (session_id, role, agent, content, status, finish_reason, seq, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            message.session_id,
            message.role.as_str(),
            message.agent,
            message.content,
            message.status.as_str(),
            message.finish_reason,
            seq,
            now,
            now,
        ],
    )?;
    let id = conn.last_insert_rowid();
    conn.execute(
        "UPDATE sessions SET updated_at = ?1 WHERE id = ?2",
        rusqlite::params![now, message.session_id],
    )?;
    Ok(MessageRecord {
        id,
        session_id: message.session_id,
        role: message.role,
        agent: message.agent.clone(),
        content: message.content.clone(),
        status: message.status,
        finish_reason: message.finish_reason.clone(),
        seq,
        created_at: now,
        updated_at: now,
    })
}

fn text_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = ModelError>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.get(0)?,
        symbol: row.get(1)?,
        trade_date: row.get(2)?,
        prompt: row.get(3)?,
        status: text_column(row, 4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRecord> {
    Ok(MessageRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        role: text_column(row, 2)?,
        agent: row.get(3)?,
        content: row.get(4)?,
        status: text_column(row, 5)?,
        finish_reason: row.get(6)?,
        seq: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}
