use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tads_models::debate::{DebateKind, DebateRole, DebateState, JudgeVerdict, Position};
use tads_models::trading_state::TradingState;

use crate::error::AgentError;
use crate::generator::TextGenerator;
use crate::parser::{parse_position, parse_verdict};
use crate::prompts::{
    debater_system_prompt, debater_user_prompt, judge_system_prompt, judge_user_prompt,
};

/// Read-only inputs shared by every participant of a debate.
#[derive(Debug, Clone, PartialEq)]
pub struct DebateContext {
    pub symbol: String,
    pub trade_date: NaiveDate,
    /// Rendered analyst reports.
    pub reports: String,
    pub investment_decision: Option<String>,
    pub trader_plan: Option<String>,
}

impl DebateContext {
    fn base(state: &TradingState) -> Self {
        Self {
            symbol: state.symbol.clone(),
            trade_date: state.trade_date,
            reports: state
                .reports
                .iter()
                .map(|r| r.render())
                .collect::<Vec<_>>()
                .join("\n\n"),
            investment_decision: None,
            trader_plan: None,
        }
    }

    pub fn for_investment(state: &TradingState) -> Self {
        Self::base(state)
    }

    /// Context for the risk debate, which also sees the investment decision and trader plan.
    pub fn for_risk(state: &TradingState) -> Self {
        Self {
            investment_decision: state.invest_debate.judge_decision().map(str::to_string),
            trader_plan: state.trader_plan.as_ref().map(|p| {
                format!("{} ({} {})", p.plan, p.action, p.quantity)
            }),
            ..Self::base(state)
        }
    }
}

/// A debate participant. Mockable for testing.
#[async_trait]
pub trait DebaterCapability: Send + Sync {
    fn role(&self) -> DebateRole;

    async fn argue(
        &self,
        context: &DebateContext,
        transcript: &DebateState,
    ) -> Result<Position, AgentError>;
}

/// Decides after every round whether a debate continues. The debate kind is
/// `transcript.kind()`.
#[async_trait]
pub trait JudgeCapability: Send + Sync {
    async fn judge(
        &self,
        context: &DebateContext,
        transcript: &DebateState,
    ) -> Result<JudgeVerdict, AgentError>;
}

pub struct LlmDebater {
    role: DebateRole,
    generator: Arc<dyn TextGenerator>,
}

impl LlmDebater {
    pub fn new(role: DebateRole, generator: Arc<dyn TextGenerator>) -> Self {
        Self { role, generator }
    }
}

#[async_trait]
impl DebaterCapability for LlmDebater {
    fn role(&self) -> DebateRole {
        self.role
    }

    async fn argue(
        &self,
        context: &DebateContext,
        transcript: &DebateState,
    ) -> Result<Position, AgentError> {
        let raw = self
            .generator
            .generate(
                &debater_system_prompt(self.role),
                &debater_user_prompt(self.role, context, transcript),
            )
            .await?;
        parse_position(&raw)
    }
}

pub struct LlmJudge {
    generator: Arc<dyn TextGenerator>,
}

impl LlmJudge {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl JudgeCapability for LlmJudge {
    async fn judge(
        &self,
        context: &DebateContext,
        transcript: &DebateState,
    ) -> Result<JudgeVerdict, AgentError> {
        let raw = self
            .generator
            .generate(
                &judge_system_prompt(transcript.kind()),
                &judge_user_prompt(context, transcript),
            )
            .await?;
        parse_verdict(&raw)
    }
}

/// Rule-based judge: concludes once every position of the latest round
/// agrees on one action, otherwise lets the debate continue.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnanimityJudge;

#[async_trait]
impl JudgeCapability for UnanimityJudge {
    async fn judge(
        &self,
        _context: &DebateContext,
        transcript: &DebateState,
    ) -> Result<JudgeVerdict, AgentError> {
        let latest = transcript.latest_round();
        let mut actions = transcript
            .turns()
            .iter()
            .filter(|t| t.round == latest)
            .map(|t| t.action);
        let Some(first) = actions.next() else {
            return Ok(JudgeVerdict {
                conclude: false,
                decision: String::new(),
                rating: None,
            });
        };
        if !actions.all(|a| a == first) {
            return Ok(JudgeVerdict {
                conclude: false,
                decision: String::new(),
                rating: None,
            });
        }
        let judge = match transcript.kind() {
            DebateKind::Investment => "Research manager",
            DebateKind::Risk => "Risk manager",
        };
        Ok(JudgeVerdict {
            conclude: true,
            decision: format!("{judge}: all participants agree to {first} in round {latest}"),
            rating: Some(first),
        })
    }
}
