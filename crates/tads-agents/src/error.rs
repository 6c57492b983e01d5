use tads_models::ModelError;
use tads_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Text generator error: {0}")]
    Generator(String),

    #[error("Agent response parse error: {0}")]
    Parse(String),

    #[error("{collaborator} timed out after {seconds} seconds")]
    CollaboratorTimeout { collaborator: String, seconds: u64 },

    #[error("Workflow failed: {0}")]
    WorkflowFatal(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Invalid decision: {0}")]
    InvalidDecision(#[from] ModelError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    pub fn timeout(collaborator: impl Into<String>, seconds: u64) -> Self {
        AgentError::CollaboratorTimeout {
            collaborator: collaborator.into(),
            seconds,
        }
    }
}
