use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::AgentError;

/// Opaque text generation backend: a system prompt and a user prompt in, text out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String, AgentError>;
}

/// Configuration for a Claude CLI invocation.
#[derive(Debug, Clone)]
pub struct ClaudeCliConfig {
    pub model: String,
    pub timeout: Duration,
}

impl Default for ClaudeCliConfig {
    fn default() -> Self {
        Self {
            model: "claude-3-5-haiku-latest".to_string(),
            timeout: Duration::from_secs(90),
        }
    }
}

/// Text generator backed by the `claude` CLI.
#[derive(Debug, Clone, Default)]
pub struct ClaudeCliGenerator {
    pub config: ClaudeCliConfig,
}

impl ClaudeCliGenerator {
    pub fn new(model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            config: ClaudeCliConfig {
                model: model.into(),
                timeout,
            },
        }
    }
}

#[async_trait]
impl TextGenerator for ClaudeCliGenerator {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String, AgentError> {
        invoke_claude(system_prompt, user_prompt, &self.config).await
    }
}

/// Invoke the `claude` CLI with a system prompt and user prompt.
/// Returns the raw stdout text.
pub async fn invoke_claude(
    system_prompt: &str,
    user_prompt: &str,
    config: &ClaudeCliConfig,
) -> Result<String, AgentError> {
    debug!(model = %config.model, "Invoking claude CLI");

    let result = tokio::time::timeout(config.timeout, async {
        Command::new("claude")
            .args([
                "-p",
                user_prompt,
                "--system-prompt",
                system_prompt,
                "--model",
                &config.model,
                "--output-format",
                "text",
            ])
            .kill_on_drop(true)
            .output()
            .await
    })
    .await
    .map_err(|_| AgentError::timeout("claude CLI", config.timeout.as_secs()))?
    .map_err(|e| AgentError::Generator(format!("Failed to spawn claude: {e}")))?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        warn!(status = %result.status, stderr = %stderr, "Claude CLI failed");
        return Err(AgentError::Generator(format!(
            "claude exited {}: {}",
            result.status, stderr
        )));
    }

    let stdout = String::from_utf8_lossy(&result.stdout).to_string();
    if stdout.trim().is_empty() {
        return Err(AgentError::Generator(
            "Claude returned empty response".to_string(),
        ));
    }

    Ok(stdout)
}

/// Check if the `claude` CLI is available on the system.
pub async fn check_cli_available() -> bool {
    match Command::new("claude").arg("--version").output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}
