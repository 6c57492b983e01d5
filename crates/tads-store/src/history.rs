use std::sync::Arc;

use tads_models::history::{HistoryInfoResponse, HistoryListParams, HistoryListResponse};
use tracing::debug;

use crate::error::StoreError;
use crate::store::RecordStore;

/// Read-only view over persisted sessions. Every call goes to the store.
#[derive(Clone)]
pub struct HistoryService {
    store: Arc<RecordStore>,
}

impl HistoryService {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    /// One page of sessions, newest first.
    pub fn list(&self, params: &HistoryListParams) -> Result<HistoryListResponse, StoreError> {
        let page = self
            .store
            .list_sessions(params.cursor.as_deref(), params.limit)?;
        debug!(
            returned = page.items.len(),
            has_more = page.has_more,
            "History page listed"
        );
        Ok(page.into())
    }

    /// A session and its full message log.
    pub fn info(&self, session_id: i64) -> Result<HistoryInfoResponse, StoreError> {
        let (session, messages) = self.store.get_session(session_id)?;
        debug!(session_id, messages = messages.len(), "History info loaded");
        Ok(HistoryInfoResponse { session, messages })
    }
}
