use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{check_unit_interval, ModelError};

/// Final action a run can emit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

impl TradeAction {
    pub const ALL: [TradeAction; 3] = [TradeAction::Buy, TradeAction::Sell, TradeAction::Hold];

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Buy => "buy",
            TradeAction::Sell => "sell",
            TradeAction::Hold => "hold",
        }
    }
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TradeAction {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(TradeAction::Buy),
            "sell" => Ok(TradeAction::Sell),
            "hold" => Ok(TradeAction::Hold),
            other => Err(ModelError::UnknownVariant {
                kind: "trade action",
                value: other.to_string(),
            }),
        }
    }
}

/// The terminal artifact of a trading run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradingDecision {
    pub action: TradeAction,
    /// Shares to trade. Always zero for `hold`.
    pub quantity: Decimal,
    /// 0.0 to 1.0.
    pub confidence: Decimal,
    /// 0.0 to 1.0, higher is riskier.
    pub risk: Decimal,
    pub rationale: String,
    pub decided_at: DateTime<Utc>,
}

impl TradingDecision {
    pub fn new(
        action: TradeAction,
        quantity: Decimal,
        confidence: Decimal,
        risk: Decimal,
        rationale: String,
    ) -> Result<Self, ModelError> {
        let decision = Self {
            action,
            quantity,
            confidence,
            risk,
            rationale,
            decided_at: Utc::now(),
        };
        decision.validate()?;
        Ok(decision)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.quantity < Decimal::ZERO {
            return Err(ModelError::OutOfRange {
                field: "quantity",
                value: self.quantity,
            });
        }
        if self.action == TradeAction::Hold && !self.quantity.is_zero() {
            return Err(ModelError::HoldWithQuantity(self.quantity));
        }
        check_unit_interval("confidence", self.confidence)?;
        check_unit_interval("risk", self.risk)?;
        Ok(())
    }
}
