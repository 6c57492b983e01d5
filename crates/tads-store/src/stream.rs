use std::collections::BTreeMap;
use std::sync::Arc;

use tads_models::chat::{ChatResp, ToolCall};
use tads_models::history::{MessageRecord, MessageRole, MessageStatus, NewMessage};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::RecordStore;

#[derive(Debug, Default)]
struct PendingToolCall {
    id: Option<String>,
    name: Option<String>,
    args: String,
}

#[derive(Debug)]
struct PendingMessage {
    agent: String,
    content: String,
    tools: BTreeMap<u32, PendingToolCall>,
}

impl PendingMessage {
    fn new(agent: &str) -> Self {
        Self {
            agent: agent.to_string(),
            content: String::new(),
            tools: BTreeMap::new(),
        }
    }

    fn absorb(&mut self, chunk: &ChatResp) {
        self.content.push_str(&chunk.content);
        for tool in &chunk.tool_chunks {
            let pending = self.tools.entry(tool.index).or_default();
            if tool.id.is_some() {
                pending.id = tool.id.clone();
            }
            if tool.name.is_some() {
                pending.name = tool.name.clone();
            }
            pending.args.push_str(&tool.args);
        }
    }

    fn tool_calls(&self) -> Vec<ToolCall> {
        self.tools
            .values()
            .map(|t| ToolCall {
                id: t.id.clone(),
                name: t.name.clone().unwrap_or_default(),
                arguments: t.args.clone(),
            })
            .collect()
    }
}

/// Accumulates streamed chat chunks for one thread and persists each message
/// once its final chunk arrives.
///
/// Deltas are buffered per agent. Tool-call arguments are concatenated per
/// tool index. On `finish_reason` the assistant message is appended, followed
/// by one `tool` message per tool call.
pub struct ChatStreamWriter {
    store: Arc<RecordStore>,
    thread_id: String,
    session_id: i64,
    /// Agents in first-seen order.
    pending: Vec<PendingMessage>,
}

impl ChatStreamWriter {
    pub fn new(store: Arc<RecordStore>, thread_id: impl Into<String>, session_id: i64) -> Self {
        Self {
            store,
            thread_id: thread_id.into(),
            session_id,
            pending: Vec::new(),
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// Agents with a message still being streamed.
    pub fn pending_agents(&self) -> Vec<&str> {
        self.pending.iter().map(|p| p.agent.as_str()).collect()
    }

    /// Feed one chunk. Returns the records written if the chunk finished a message.
    pub async fn push(&mut self, chunk: ChatResp) -> Result<Vec<MessageRecord>, StoreError> {
        if chunk.thread_id != self.thread_id {
            return Err(StoreError::ConstraintViolation(format!(
                "chunk for thread {} sent to writer of thread {}",
                chunk.thread_id, self.thread_id
            )));
        }

        let position = match self.pending.iter().position(|p| p.agent == chunk.agent) {
            Some(position) => position,
            None => {
                self.pending.push(PendingMessage::new(&chunk.agent));
                self.pending.len() - 1
            }
        };
        self.pending[position].absorb(&chunk);

        let Some(finish_reason) = chunk.finish_reason else {
            return Ok(Vec::new());
        };
        let message = self.pending.remove(position);
        self.flush(
            vec![message],
            MessageStatus::Completed,
            Some(finish_reason.as_str()),
        )
        .await
    }

    /// Persist every partially streamed message with status `interrupted`.
    pub async fn abort(&mut self) -> Result<Vec<MessageRecord>, StoreError> {
        let pending = std::mem::take(&mut self.pending);
        if !pending.is_empty() {
            warn!(
                thread_id = %self.thread_id,
                session_id = self.session_id,
                pending = pending.len(),
                "Chat stream aborted, flushing partial messages"
            );
        }
        self.flush(pending, MessageStatus::Interrupted, None).await
    }

    async fn flush(
        &self,
        messages: Vec<PendingMessage>,
        status: MessageStatus,
        finish_reason: Option<&str>,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }
        let _guard = self.store.locks().lock(self.session_id).await?;

        let mut written = Vec::new();
        for message in messages {
            let tool_calls = message.tool_calls();
            if !message.content.is_empty() || tool_calls.is_empty() {
                written.push(self.store.append_next_message(&NewMessage {
                    session_id: self.session_id,
                    role: MessageRole::Assistant,
                    agent: message.agent.clone(),
                    content: message.content.clone(),
                    status,
                    finish_reason: finish_reason.map(str::to_string),
                })?);
            }
            for call in tool_calls {
                written.push(self.store.append_next_message(&NewMessage {
                    session_id: self.session_id,
                    role: MessageRole::Tool,
                    agent: message.agent.clone(),
                    content: serde_json::to_string(&call)?,
                    status,
                    finish_reason: finish_reason.map(str::to_string),
                })?);
            }
        }
        debug!(
            thread_id = %self.thread_id,
            session_id = self.session_id,
            written = written.len(),
            status = %status,
            "Chat messages persisted"
        );
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tads_models::chat::ToolChunkResp;
    use tads_models::history::NewSession;

    fn setup() -> (Arc<RecordStore>, i64) {
        let store = Arc::new(RecordStore::in_memory().unwrap());
        let id = store
            .create_session(&NewSession {
                symbol: "AAPL".to_string(),
                trade_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                prompt: "Analyze AAPL for 2024-01-01".to_string(),
            })
            .unwrap()
            .id;
        (store, id)
    }

    fn chunk(agent: &str, content: &str, finish: Option<&str>) -> ChatResp {
        ChatResp {
            thread_id: "thread-1".to_string(),
            agent: agent.to_string(),
            content: content.to_string(),
            tool_chunks: vec![],
            finish_reason: finish.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn deltas_are_joined_until_finish() {
        let (store, id) = setup();
        let mut writer = ChatStreamWriter::new(store.clone(), "thread-1", id);

        assert!(writer.push(chunk("trader", "Buy ", None)).await.unwrap().is_empty());
        assert!(writer.push(chunk("trader", "100 ", None)).await.unwrap().is_empty());
        let written = writer
            .push(chunk("trader", "shares", Some("stop")))
            .await
            .unwrap();

        assert_eq!(written.len(), 1);
        assert_eq!(written[0].content, "Buy 100 shares");
        assert_eq!(written[0].status, MessageStatus::Completed);
        assert_eq!(written[0].finish_reason.as_deref(), Some("stop"));
        assert!(writer.pending_agents().is_empty());
    }

    #[tokio::test]
    async fn tool_args_concatenate_per_index() {
        let (store, id) = setup();
        let mut writer = ChatStreamWriter::new(store.clone(), "thread-1", id);

        let mut first = chunk("market_analyst", "", None);
        first.tool_chunks = vec![
            ToolChunkResp {
                index: 0,
                id: Some("call_0".to_string()),
                name: Some("get_quote".to_string()),
                args: "{\"sym".to_string(),
            },
            ToolChunkResp {
                index: 1,
                id: Some("call_1".to_string()),
                name: Some("get_news".to_string()),
                args: "{}".to_string(),
            },
        ];
        writer.push(first).await.unwrap();

        let mut last = chunk("market_analyst", "", Some("tool_calls"));
        last.tool_chunks = vec![ToolChunkResp {
            index: 0,
            id: None,
            name: None,
            args: "bol\":\"AAPL\"}".to_string(),
        }];
        let written = writer.push(last).await.unwrap();

        assert_eq!(written.len(), 2);
        assert!(written.iter().all(|m| m.role == MessageRole::Tool));
        let call: ToolCall = serde_json::from_str(&written[0].content).unwrap();
        assert_eq!(call.name, "get_quote");
        assert_eq!(call.arguments, "{\"symbol\":\"AAPL\"}");
        assert_eq!(written[1].seq, written[0].seq + 1);
    }

    #[tokio::test]
    async fn abort_flushes_partial_messages_as_interrupted() {
        let (store, id) = setup();
        let mut writer = ChatStreamWriter::new(store.clone(), "thread-1", id);
        writer.push(chunk("bull_researcher", "Growth is", None)).await.unwrap();
        writer.push(chunk("bear_researcher", "Valuation", None)).await.unwrap();

        let flushed = writer.abort().await.unwrap();
        assert_eq!(flushed.len(), 2);
        assert!(flushed.iter().all(|m| m.status == MessageStatus::Interrupted));
        assert_eq!(flushed[0].agent, "bull_researcher");
        assert_eq!(store.message_count(id).unwrap(), 2);
        assert!(writer.abort().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn foreign_thread_is_rejected() {
        let (store, id) = setup();
        let mut writer = ChatStreamWriter::new(store, "thread-1", id);
        let mut other = chunk("trader", "x", Some("stop"));
        other.thread_id = "thread-2".to_string();
        assert!(matches!(
            writer.push(other).await,
            Err(StoreError::ConstraintViolation(_))
        ));
    }
}
