use serde::{Deserialize, Serialize};

/// One incremental chunk of a streamed agent reply.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChatResp {
    pub thread_id: String,
    pub agent: String,
    /// Text delta; appended to what was already received for this agent.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tool_chunks: Vec<ToolChunkResp>,
    /// Set on the last chunk of a message.
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Partial tool call. `args` accumulates across chunks with the same `index`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ToolChunkResp {
    pub index: u32,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub args: String,
}

/// A tool call after all of its chunks were received.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: Option<String>,
    pub name: String,
    pub arguments: String,
}
