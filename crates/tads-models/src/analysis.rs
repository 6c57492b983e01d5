use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{check_unit_interval, ModelError};
use crate::trading_state::MarketData;

/// The four independent analysts of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AnalystKind {
    Market,
    Social,
    News,
    Fundamentals,
}

impl AnalystKind {
    /// Report order used everywhere a run is rendered or persisted.
    pub const ALL: [AnalystKind; 4] = [
        AnalystKind::Market,
        AnalystKind::Social,
        AnalystKind::News,
        AnalystKind::Fundamentals,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalystKind::Market => "market",
            AnalystKind::Social => "social",
            AnalystKind::News => "news",
            AnalystKind::Fundamentals => "fundamentals",
        }
    }

    /// Agent name used in persisted messages.
    pub fn agent_name(&self) -> &'static str {
        match self {
            AnalystKind::Market => "market_analyst",
            AnalystKind::Social => "social_analyst",
            AnalystKind::News => "news_analyst",
            AnalystKind::Fundamentals => "fundamentals_analyst",
        }
    }
}

impl std::fmt::Display for AnalystKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rating attached to an analyst report. `Error` and `Timeout` mark degraded reports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportRating {
    Bullish,
    Neutral,
    Bearish,
    Error,
    Timeout,
}

impl ReportRating {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportRating::Bullish => "bullish",
            ReportRating::Neutral => "neutral",
            ReportRating::Bearish => "bearish",
            ReportRating::Error => "error",
            ReportRating::Timeout => "timeout",
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, ReportRating::Error | ReportRating::Timeout)
    }
}

/// Request handed to an analyst capability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalystRequest {
    pub request_id: Uuid,
    pub analyst: AnalystKind,
    pub symbol: String,
    pub trade_date: NaiveDate,
    pub market_data: Vec<MarketData>,
}

/// A single analyst's report. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisReport {
    pub analyst: AnalystKind,
    pub symbol: String,
    pub trade_date: NaiveDate,
    pub content: String,
    pub rating: ReportRating,
    /// Relative weight of this report (higher counts more).
    pub priority: u8,
    /// 0.0 to 1.0.
    pub confidence: Decimal,
    pub key_points: Vec<String>,
    /// Set when the report is degraded or was produced under unusual conditions.
    pub warning: Option<String>,
    pub produced_at: DateTime<Utc>,
}

impl AnalysisReport {
    /// An empty placeholder recorded in place of a report that could not be produced.
    pub fn degraded(
        analyst: AnalystKind,
        symbol: &str,
        trade_date: NaiveDate,
        rating: ReportRating,
        warning: impl Into<String>,
    ) -> Self {
        Self {
            analyst,
            symbol: symbol.to_string(),
            trade_date,
            content: String::new(),
            rating,
            priority: 0,
            confidence: Decimal::ZERO,
            key_points: vec![],
            warning: Some(warning.into()),
            produced_at: Utc::now(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.rating.is_degraded()
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        check_unit_interval("confidence", self.confidence)
    }

    /// Text form used in prompts and persisted messages.
    pub fn render(&self) -> String {
        let mut out = format!(
            "[{}] rating={} confidence={}",
            self.analyst.agent_name(),
            self.rating.as_str(),
            self.confidence
        );
        if let Some(warning) = &self.warning {
            out.push_str(&format!("\nWARNING: {warning}"));
        }
        if !self.content.is_empty() {
            out.push('\n');
            out.push_str(&self.content);
        }
        for point in &self.key_points {
            out.push_str(&format!("\n- {point}"));
        }
        out
    }
}
