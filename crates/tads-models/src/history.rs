use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Default and maximum page sizes for session listings.
pub const DEFAULT_PAGE_LIMIT: u32 = 50;
pub const MAX_PAGE_LIMIT: u32 = 200;

/// Clamp a requested page size to `[1, MAX_PAGE_LIMIT]`, defaulting when absent.
pub fn clamp_limit(limit: Option<u32>) -> u32 {
    limit
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .clamp(1, MAX_PAGE_LIMIT)
}

macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ModelError::UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

text_enum!(SessionStatus, "session status", {
    Running => "running",
    Completed => "completed",
    Failed => "failed",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

text_enum!(MessageRole, "message role", {
    System => "system",
    User => "user",
    Assistant => "assistant",
    Tool => "tool",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Streaming,
    Completed,
    Interrupted,
    Failed,
}

text_enum!(MessageStatus, "message status", {
    Streaming => "streaming",
    Completed => "completed",
    Interrupted => "interrupted",
    Failed => "failed",
});

/// Durable row for one trading run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionRecord {
    pub id: i64,
    pub symbol: String,
    pub trade_date: NaiveDate,
    pub prompt: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied by the caller when creating a session; the store assigns the rest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewSession {
    pub symbol: String,
    pub trade_date: NaiveDate,
    pub prompt: String,
}

/// Durable row for one message of a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageRecord {
    pub id: i64,
    pub session_id: i64,
    pub role: MessageRole,
    pub agent: String,
    pub content: String,
    pub status: MessageStatus,
    pub finish_reason: Option<String>,
    /// 1-based, gap-free within a session.
    pub seq: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A message waiting to be appended. The store assigns `id` and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewMessage {
    pub session_id: i64,
    pub role: MessageRole,
    pub agent: String,
    pub content: String,
    pub status: MessageStatus,
    pub finish_reason: Option<String>,
}

impl NewMessage {
    /// A completed message from an agent.
    pub fn completed(
        session_id: i64,
        role: MessageRole,
        agent: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            session_id,
            role,
            agent: agent.into(),
            content: content.into(),
            status: MessageStatus::Completed,
            finish_reason: Some("stop".to_string()),
        }
    }
}

/// One page of sessions, newest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionPage {
    pub items: Vec<SessionRecord>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HistoryListParams {
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryListResponse {
    pub items: Vec<SessionRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

impl From<SessionPage> for HistoryListResponse {
    fn from(page: SessionPage) -> Self {
        Self {
            items: page.items,
            next_cursor: page.next_cursor,
            has_more: page.has_more,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryInfoResponse {
    pub session: SessionRecord,
    pub messages: Vec<MessageRecord>,
}
