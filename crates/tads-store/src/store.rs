use std::sync::{Mutex, MutexGuard};

use tads_models::history::{
    MessageRecord, MessageStatus, NewMessage, NewSession, SessionPage, SessionRecord,
    SessionStatus,
};

use crate::error::StoreError;
use crate::locks::SessionLocks;
use crate::sqlite::SqliteStore;

/// Shared handle to the record store.
///
/// SQLite access is synchronized via `Mutex` since `rusqlite::Connection` is
/// not `Sync`. Multi-step writers additionally take the session's lock from
/// [`RecordStore::locks`] so their writes are not interleaved with another
/// writer of the same session.
pub struct RecordStore {
    sqlite: Mutex<SqliteStore>,
    locks: SessionLocks,
}

impl RecordStore {
    pub fn new(sqlite: SqliteStore) -> Self {
        Self {
            sqlite: Mutex::new(sqlite),
            locks: SessionLocks::new(),
        }
    }

    /// Open a store from a configured path. `:memory:` gives an in-process database.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let sqlite = if path == ":memory:" {
            SqliteStore::open_in_memory()?
        } else {
            SqliteStore::open(path)?
        };
        Ok(Self::new(sqlite))
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self::new(SqliteStore::open_in_memory()?))
    }

    pub fn locks(&self) -> &SessionLocks {
        &self.locks
    }

    fn sqlite(&self) -> Result<MutexGuard<'_, SqliteStore>, StoreError> {
        self.sqlite
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("SQLite mutex poisoned: {e}")))
    }

    pub fn create_session(&self, new: &NewSession) -> Result<SessionRecord, StoreError> {
        let record = self.sqlite()?.create_session(new)?;
        tracing::debug!(session_id = record.id, symbol = %record.symbol, "Session created");
        Ok(record)
    }

    pub fn append_message(&self, message: &NewMessage, seq: u32) -> Result<MessageRecord, StoreError> {
        self.sqlite()?.append_message(message, seq)
    }

    pub fn append_next_message(&self, message: &NewMessage) -> Result<MessageRecord, StoreError> {
        self.sqlite()?.append_next_message(message)
    }

    pub fn list_sessions(
        &self,
        cursor: Option<&str>,
        limit: Option<u32>,
    ) -> Result<SessionPage, StoreError> {
        self.sqlite()?.list_sessions(cursor, limit)
    }

    pub fn get_session(
        &self,
        session_id: i64,
    ) -> Result<(SessionRecord, Vec<MessageRecord>), StoreError> {
        self.sqlite()?.get_session(session_id)
    }

    pub fn update_session_status(
        &self,
        session_id: i64,
        status: SessionStatus,
    ) -> Result<SessionRecord, StoreError> {
        self.sqlite()?.update_session_status(session_id, status)
    }

    pub fn update_message_status(
        &self,
        session_id: i64,
        message_id: i64,
        status: MessageStatus,
        finish_reason: Option<&str>,
    ) -> Result<MessageRecord, StoreError> {
        self.sqlite()?
            .update_message_status(session_id, message_id, status, finish_reason)
    }

    pub fn message_count(&self, session_id: i64) -> Result<u32, StoreError> {
        self.sqlite()?.message_count(session_id)
    }
}
