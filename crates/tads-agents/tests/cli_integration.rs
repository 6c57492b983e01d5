//! Integration tests that invoke the real Claude CLI.
//!
//! These tests are `#[ignore]` by default. They need the `claude` CLI on PATH
//! and valid Anthropic credentials.
//!
//! Run explicitly with:
//! ```bash
//! cargo test -p tads-agents --test cli_integration -- --ignored
//! ```

use std::sync::Arc;
use std::time::Duration;

use tads_agents::generator::{check_cli_available, invoke_claude, ClaudeCliConfig};
use tads_agents::parser::extract_json;
use tads_agents::test_support::aapl_market_data;
use tads_agents::{AnalystCapability, ClaudeCliGenerator, LlmAnalyst};
use tads_models::analysis::{AnalystKind, AnalystRequest};
use uuid::Uuid;

#[tokio::test]
#[ignore]
async fn cli_is_available() {
    assert!(
        check_cli_available().await,
        "claude CLI not found on PATH"
    );
}

/// Catches changes in the CLI's output format that would break JSON extraction.
#[tokio::test]
#[ignore]
async fn cli_output_is_parseable_json() {
    if !check_cli_available().await {
        eprintln!("Skipping: claude CLI not available");
        return;
    }

    let config = ClaudeCliConfig {
        model: "claude-3-5-haiku-latest".to_string(),
        timeout: Duration::from_secs(30),
    };
    let system_prompt = concat!(
        "You are a test agent. Respond ONLY with a JSON object, no other text.\n",
        "The JSON must have exactly these fields:\n",
        "- \"status\": the string \"ok\"\n",
        "- \"echo\": repeat back the user's message exactly\n",
    );

    let raw = invoke_claude(system_prompt, "ping", &config)
        .await
        .expect("Claude CLI invocation failed");
    let json_str = extract_json(&raw).unwrap_or_else(|e| {
        panic!("Failed to extract JSON from CLI output ({e}).\nRaw output:\n---\n{raw}\n---")
    });
    let parsed: serde_json::Value =
        serde_json::from_str(&json_str).expect("Extracted JSON is not valid");

    assert_eq!(parsed["status"], "ok", "Unexpected response structure: {parsed}");
}

#[tokio::test]
#[ignore]
async fn cli_reports_errors_for_invalid_model() {
    if !check_cli_available().await {
        eprintln!("Skipping: claude CLI not available");
        return;
    }

    let config = ClaudeCliConfig {
        model: "nonexistent-model-12345".to_string(),
        timeout: Duration::from_secs(15),
    };
    let result = invoke_claude("You are a test.", "hello", &config).await;

    assert!(result.is_err(), "Expected error for invalid model, got: {result:?}");
}

/// A market analyst backed by the real CLI returns a valid, non-degraded report.
#[tokio::test]
#[ignore]
async fn market_analyst_round_trip() {
    if !check_cli_available().await {
        eprintln!("Skipping: claude CLI not available");
        return;
    }

    let generator = Arc::new(ClaudeCliGenerator::new(
        "claude-3-5-haiku-latest",
        Duration::from_secs(90),
    ));
    let analyst = LlmAnalyst::new(AnalystKind::Market, 1, generator);
    let request = AnalystRequest {
        request_id: Uuid::new_v4(),
        analyst: AnalystKind::Market,
        symbol: "AAPL".to_string(),
        trade_date: chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        market_data: aapl_market_data(),
    };

    let report = analyst.analyze(&request).await.expect("analysis failed");
    assert!(!report.is_degraded());
    assert!(report.validate().is_ok());
    assert!(!report.content.is_empty());
}
