use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::{AnalysisReport, AnalystKind};
use crate::debate::DebateState;
use crate::error::ModelError;
use crate::trade_decision::{TradeAction, TradingDecision};

/// Workflow phase of a trading run.
///
/// ```text
/// analysis → debate → trading → risk → complete
///      \________\________\_______\____→ failed
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Analysis,
    Debate,
    Trading,
    Risk,
    Complete,
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Complete | Phase::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Analysis => "analysis",
            Phase::Debate => "debate",
            Phase::Trading => "trading",
            Phase::Risk => "risk",
            Phase::Complete => "complete",
            Phase::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One OHLCV bar supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketData {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// One report slot per analyst.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnalystReports {
    pub market: Option<AnalysisReport>,
    pub social: Option<AnalysisReport>,
    pub news: Option<AnalysisReport>,
    pub fundamentals: Option<AnalysisReport>,
}

impl AnalystReports {
    pub fn get(&self, kind: AnalystKind) -> Option<&AnalysisReport> {
        match kind {
            AnalystKind::Market => self.market.as_ref(),
            AnalystKind::Social => self.social.as_ref(),
            AnalystKind::News => self.news.as_ref(),
            AnalystKind::Fundamentals => self.fundamentals.as_ref(),
        }
    }

    /// Store a report in its analyst's slot, replacing any previous one.
    pub fn insert(&mut self, report: AnalysisReport) {
        let slot = match report.analyst {
            AnalystKind::Market => &mut self.market,
            AnalystKind::Social => &mut self.social,
            AnalystKind::News => &mut self.news,
            AnalystKind::Fundamentals => &mut self.fundamentals,
        };
        *slot = Some(report);
    }

    pub fn is_complete(&self) -> bool {
        AnalystKind::ALL.iter().all(|k| self.get(*k).is_some())
    }

    pub fn missing(&self) -> Vec<AnalystKind> {
        AnalystKind::ALL
            .iter()
            .copied()
            .filter(|k| self.get(*k).is_none())
            .collect()
    }

    /// Present reports in `AnalystKind::ALL` order.
    pub fn iter(&self) -> impl Iterator<Item = &AnalysisReport> {
        AnalystKind::ALL.into_iter().filter_map(move |k| self.get(k))
    }
}

/// The trader's investment plan, produced after the investment debate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraderPlan {
    pub plan: String,
    pub action: TradeAction,
    pub quantity: Decimal,
}

impl TraderPlan {
    pub fn is_ready(&self) -> bool {
        !self.plan.trim().is_empty()
    }
}

/// All in-memory state of one (symbol, trade date) run.
///
/// Mutated only by the workflow controller that owns it. Deserializing checks
/// the same invariants as `check_invariants`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "TradingStateRecord")]
pub struct TradingState {
    pub run_id: Uuid,
    pub symbol: String,
    pub trade_date: NaiveDate,
    pub market_data: Vec<MarketData>,
    pub reports: AnalystReports,
    pub invest_debate: DebateState,
    pub risk_debate: DebateState,
    pub trader_plan: Option<TraderPlan>,
    pub decision: Option<TradingDecision>,
    pub phase: Phase,
    pub analysis_phase_complete: bool,
    pub debate_phase_complete: bool,
    pub trading_phase_complete: bool,
    pub risk_phase_complete: bool,
    workflow_complete: bool,
    /// Store id once the run has been persisted.
    pub session_id: Option<i64>,
    pub failure: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Wire form of `TradingState`, validated on the way in.
#[derive(Deserialize)]
struct TradingStateRecord {
    run_id: Uuid,
    symbol: String,
    trade_date: NaiveDate,
    market_data: Vec<MarketData>,
    reports: AnalystReports,
    invest_debate: DebateState,
    risk_debate: DebateState,
    trader_plan: Option<TraderPlan>,
    decision: Option<TradingDecision>,
    phase: Phase,
    analysis_phase_complete: bool,
    debate_phase_complete: bool,
    trading_phase_complete: bool,
    risk_phase_complete: bool,
    workflow_complete: bool,
    session_id: Option<i64>,
    failure: Option<String>,
    started_at: DateTime<Utc>,
}

impl TryFrom<TradingStateRecord> for TradingState {
    type Error = ModelError;

    fn try_from(record: TradingStateRecord) -> Result<Self, Self::Error> {
        let state = Self {
            run_id: record.run_id,
            symbol: record.symbol,
            trade_date: record.trade_date,
            market_data: record.market_data,
            reports: record.reports,
            invest_debate: record.invest_debate,
            risk_debate: record.risk_debate,
            trader_plan: record.trader_plan,
            decision: record.decision,
            phase: record.phase,
            analysis_phase_complete: record.analysis_phase_complete,
            debate_phase_complete: record.debate_phase_complete,
            trading_phase_complete: record.trading_phase_complete,
            risk_phase_complete: record.risk_phase_complete,
            workflow_complete: record.workflow_complete,
            session_id: record.session_id,
            failure: record.failure,
            started_at: record.started_at,
        };
        state.check_invariants()?;
        Ok(state)
    }
}

impl TradingState {
    pub fn new(symbol: impl Into<String>, trade_date: NaiveDate, market_data: Vec<MarketData>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            symbol: symbol.into(),
            trade_date,
            market_data,
            reports: AnalystReports::default(),
            invest_debate: DebateState::investment(),
            risk_debate: DebateState::risk(),
            trader_plan: None,
            decision: None,
            phase: Phase::Analysis,
            analysis_phase_complete: false,
            debate_phase_complete: false,
            trading_phase_complete: false,
            risk_phase_complete: false,
            workflow_complete: false,
            session_id: None,
            failure: None,
            started_at: Utc::now(),
        }
    }

    pub fn is_workflow_complete(&self) -> bool {
        self.workflow_complete
    }

    pub fn all_phases_complete(&self) -> bool {
        self.analysis_phase_complete
            && self.debate_phase_complete
            && self.trading_phase_complete
            && self.risk_phase_complete
    }

    /// Mark the run complete. Requires every phase flag and a decision.
    pub fn mark_complete(&mut self) -> Result<(), ModelError> {
        if !self.all_phases_complete() {
            return Err(ModelError::Invariant(
                "cannot complete a run with unfinished phases".to_string(),
            ));
        }
        if self.decision.is_none() {
            return Err(ModelError::Invariant(
                "cannot complete a run without a trading decision".to_string(),
            ));
        }
        self.workflow_complete = true;
        self.phase = Phase::Complete;
        Ok(())
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.phase = Phase::Failed;
        self.failure = Some(reason.into());
    }

    /// Verify the cross-field invariants of the state.
    pub fn check_invariants(&self) -> Result<(), ModelError> {
        if self.workflow_complete && (!self.all_phases_complete() || self.decision.is_none()) {
            return Err(ModelError::Invariant(
                "workflow_complete set without all phases and a decision".to_string(),
            ));
        }
        if self.invest_debate.count() as usize != self.invest_debate.turns().len()
            || self.risk_debate.count() as usize != self.risk_debate.turns().len()
        {
            return Err(ModelError::Invariant(
                "debate count out of sync with its history".to_string(),
            ));
        }
        if self.phase == Phase::Complete && !self.workflow_complete {
            return Err(ModelError::Invariant(
                "phase is complete but workflow_complete is unset".to_string(),
            ));
        }
        Ok(())
    }
}
