use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tads_models::analysis::ReportRating;
use tads_models::debate::{JudgeVerdict, Position};
use tads_models::trade_decision::TradeAction;

use crate::error::AgentError;

/// Extract the first JSON object from a string that may contain surrounding text.
///
/// Handles common model response formats:
/// - Clean JSON: `{"key": "value"}`
/// - Markdown-wrapped: ```json\n{"key": "value"}\n```
/// - Prefix text: `Here is the analysis:\n{"key": "value"}`
pub fn extract_json(text: &str) -> Result<String, AgentError> {
    let trimmed = text.trim();

    if trimmed.starts_with('{') && serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
        return Ok(trimmed.to_string());
    }

    if let Some(json_str) = extract_from_markdown_block(trimmed) {
        if serde_json::from_str::<serde_json::Value>(&json_str).is_ok() {
            return Ok(json_str);
        }
    }

    if let Some(json_str) = extract_first_object(trimmed) {
        if serde_json::from_str::<serde_json::Value>(&json_str).is_ok() {
            return Ok(json_str);
        }
    }

    Err(AgentError::Parse(format!(
        "No valid JSON object found in response (length={})",
        text.len()
    )))
}

/// Extract JSON from a markdown code block (```json ... ``` or ``` ... ```)
fn extract_from_markdown_block(text: &str) -> Option<String> {
    let start_markers = ["```json\n", "```json\r\n", "```\n", "```\r\n"];

    for marker in &start_markers {
        if let Some(start) = text.find(marker) {
            let json_start = start + marker.len();
            if let Some(end) = text[json_start..].find("```") {
                let extracted = text[json_start..json_start + end].trim();
                return Some(extracted.to_string());
            }
        }
    }

    None
}

/// Find the first balanced { ... } in the text.
fn extract_first_object(text: &str) -> Option<String> {
    let mut depth = 0;
    let mut start = None;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_string => {
                escape_next = true;
            }
            '"' => {
                in_string = !in_string;
            }
            '{' if !in_string => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if !in_string && depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start {
                        return Some(text[s..=i].to_string());
                    }
                }
            }
            _ => {}
        }
    }

    None
}

/// Extract and deserialize a typed reply. `what` names the reply in errors.
pub fn parse_reply<T: DeserializeOwned>(raw: &str, what: &str) -> Result<T, AgentError> {
    let json_str = extract_json(raw)?;
    serde_json::from_str(&json_str)
        .map_err(|e| AgentError::Parse(format!("Failed to parse {what}: {e}\nJSON: {json_str}")))
}

/// What an analyst model is asked to return.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AnalystReply {
    pub rating: ReportRating,
    pub confidence: Decimal,
    pub content: String,
    #[serde(default)]
    pub key_points: Vec<String>,
}

/// What the trader model is asked to return.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TraderReply {
    pub plan: String,
    pub action: TradeAction,
    #[serde(default)]
    pub quantity: Decimal,
}

pub fn parse_analyst_reply(raw: &str) -> Result<AnalystReply, AgentError> {
    let reply: AnalystReply = parse_reply(raw, "analyst reply")?;
    if reply.rating.is_degraded() {
        return Err(AgentError::Parse(format!(
            "analyst returned reserved rating {}",
            reply.rating.as_str()
        )));
    }
    Ok(reply)
}

pub fn parse_position(raw: &str) -> Result<Position, AgentError> {
    parse_reply(raw, "debate position")
}

pub fn parse_verdict(raw: &str) -> Result<JudgeVerdict, AgentError> {
    parse_reply(raw, "judge verdict")
}

pub fn parse_trader_reply(raw: &str) -> Result<TraderReply, AgentError> {
    parse_reply(raw, "trader plan")
}
