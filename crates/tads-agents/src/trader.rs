use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tads_models::trade_decision::TradeAction;
use tads_models::trading_state::{TraderPlan, TradingState};

use crate::error::AgentError;
use crate::generator::TextGenerator;
use crate::parser::parse_trader_reply;
use crate::prompts::{trader_system_prompt, trader_user_prompt};

/// Turns the investment decision into a concrete plan. Mockable for testing.
#[async_trait]
pub trait TraderCapability: Send + Sync {
    async fn plan(&self, state: &TradingState) -> Result<TraderPlan, AgentError>;
}

pub struct LlmTrader {
    generator: Arc<dyn TextGenerator>,
}

impl LlmTrader {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl TraderCapability for LlmTrader {
    async fn plan(&self, state: &TradingState) -> Result<TraderPlan, AgentError> {
        let raw = self
            .generator
            .generate(&trader_system_prompt(), &trader_user_prompt(state))
            .await?;
        let reply = parse_trader_reply(&raw)?;
        let quantity = match reply.action {
            TradeAction::Hold => Decimal::ZERO,
            _ => reply.quantity.max(Decimal::ZERO),
        };
        Ok(TraderPlan {
            plan: reply.plan,
            action: reply.action,
            quantity,
        })
    }
}
