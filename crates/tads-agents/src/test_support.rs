//! Scripted and mock capabilities for tests.
//!
//! The mocks record how often they were called so tests can assert that a
//! collaborator was (or was not) invoked. `ScenarioAnalyst` reads the supplied
//! market data and rates the trend the way the analyst prompts describe.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use tads_models::analysis::{AnalysisReport, AnalystKind, AnalystRequest, ReportRating};
use tads_models::debate::{DebateKind, DebateRole, DebateState, JudgeVerdict, Position};
use tads_models::trade_decision::TradeAction;
use tads_models::trading_state::{MarketData, TraderPlan, TradingState};

use crate::analyst::AnalystCapability;
use crate::debate::DebateEngine;
use crate::error::AgentError;
use crate::generator::TextGenerator;
use crate::participants::{DebateContext, DebaterCapability, JudgeCapability, UnanimityJudge};
use crate::trader::TraderCapability;
use crate::workflow::{WorkflowController, WorkflowSettings};

/// A text generator that replays canned replies in order.
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<String>>,
    system_prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(str::to_string).collect()),
            system_prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.system_prompts.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn last_system_prompt(&self) -> Option<String> {
        self.system_prompts.lock().ok()?.last().cloned()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, system_prompt: &str, _user_prompt: &str) -> Result<String, AgentError> {
        if let Ok(mut prompts) = self.system_prompts.lock() {
            prompts.push(system_prompt.to_string());
        }
        self.replies
            .lock()
            .map_err(|e| AgentError::Generator(e.to_string()))?
            .pop_front()
            .ok_or_else(|| AgentError::Generator("script exhausted".to_string()))
    }
}

enum AnalystBehavior {
    Report(ReportRating, Decimal),
    Fail,
    Slow(Duration),
}

pub struct MockAnalyst {
    kind: AnalystKind,
    behavior: AnalystBehavior,
    calls: AtomicUsize,
}

impl MockAnalyst {
    pub fn new(kind: AnalystKind, rating: ReportRating, confidence: Decimal) -> Self {
        Self::with_behavior(kind, AnalystBehavior::Report(rating, confidence))
    }

    pub fn failing(kind: AnalystKind) -> Self {
        Self::with_behavior(kind, AnalystBehavior::Fail)
    }

    /// Sleeps for `delay` before answering with a neutral report.
    pub fn slow(kind: AnalystKind, delay: Duration) -> Self {
        Self::with_behavior(kind, AnalystBehavior::Slow(delay))
    }

    fn with_behavior(kind: AnalystKind, behavior: AnalystBehavior) -> Self {
        Self {
            kind,
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalystCapability for MockAnalyst {
    fn kind(&self) -> AnalystKind {
        self.kind
    }

    async fn analyze(&self, request: &AnalystRequest) -> Result<AnalysisReport, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            AnalystBehavior::Report(rating, confidence) => {
                Ok(report(request, *rating, *confidence, "Scripted analysis"))
            }
            AnalystBehavior::Fail => Err(AgentError::Generator(format!(
                "{} analyst unavailable",
                self.kind
            ))),
            AnalystBehavior::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(report(request, ReportRating::Neutral, Decimal::new(5, 1), "Late analysis"))
            }
        }
    }
}

fn report(
    request: &AnalystRequest,
    rating: ReportRating,
    confidence: Decimal,
    content: &str,
) -> AnalysisReport {
    AnalysisReport {
        analyst: request.analyst,
        symbol: request.symbol.clone(),
        trade_date: request.trade_date,
        content: content.to_string(),
        rating,
        priority: 1,
        confidence,
        key_points: vec![],
        warning: None,
        produced_at: Utc::now(),
    }
}

/// An analyst that rates the close-to-close move of the supplied bars.
///
/// The market analyst reads the trend (more than 2% either way is directional);
/// the other analysts report neutral with moderate confidence. No bars gives a
/// neutral report with a warning.
pub struct ScenarioAnalyst {
    kind: AnalystKind,
}

impl ScenarioAnalyst {
    pub fn new(kind: AnalystKind) -> Self {
        Self { kind }
    }

    pub fn all() -> Vec<Arc<dyn AnalystCapability>> {
        AnalystKind::ALL
            .into_iter()
            .map(|kind| Arc::new(Self::new(kind)) as Arc<dyn AnalystCapability>)
            .collect()
    }
}

#[async_trait]
impl AnalystCapability for ScenarioAnalyst {
    fn kind(&self) -> AnalystKind {
        self.kind
    }

    async fn analyze(&self, request: &AnalystRequest) -> Result<AnalysisReport, AgentError> {
        let (Some(first), Some(last)) = (request.market_data.first(), request.market_data.last())
        else {
            let mut neutral = report(request, ReportRating::Neutral, Decimal::new(3, 1), "");
            neutral.warning = Some("no market data supplied".to_string());
            return Ok(neutral);
        };
        if self.kind != AnalystKind::Market || first.close.is_zero() {
            return Ok(report(
                request,
                ReportRating::Neutral,
                Decimal::new(5, 1),
                "No strong signal",
            ));
        }

        let change = (last.close - first.close) / first.close;
        let threshold = Decimal::new(2, 2);
        let rating = if change > threshold {
            ReportRating::Bullish
        } else if change < -threshold {
            ReportRating::Bearish
        } else {
            ReportRating::Neutral
        };
        let confidence = (Decimal::new(5, 1) + change.abs() * Decimal::from(5))
            .round_dp(4)
            .min(Decimal::new(95, 2));
        let mut analysis = report(
            request,
            rating,
            confidence,
            &format!(
                "Close moved {}% over {} bars",
                (change * Decimal::from(100)).round_dp(2),
                request.market_data.len()
            ),
        );
        analysis.priority = 2;
        analysis.key_points = vec![format!("last close {}", last.close)];
        Ok(analysis)
    }
}

enum DebaterBehavior {
    Constant(TradeAction, Decimal),
    Sequence(Mutex<VecDeque<Position>>),
    Fail,
}

pub struct ScriptedDebater {
    role: DebateRole,
    behavior: DebaterBehavior,
    calls: AtomicUsize,
}

impl ScriptedDebater {
    /// Argues the same action with the same confidence every turn.
    pub fn constant(role: DebateRole, action: TradeAction, confidence: Decimal) -> Self {
        Self::with_behavior(role, DebaterBehavior::Constant(action, confidence))
    }

    /// Replays positions in order, then fails.
    pub fn sequence(role: DebateRole, positions: Vec<(TradeAction, Decimal)>) -> Self {
        let positions = positions
            .into_iter()
            .map(|(action, confidence)| Position {
                action,
                confidence,
                argument: format!("{} argues {action}", role.display_name()),
            })
            .collect();
        Self::with_behavior(role, DebaterBehavior::Sequence(Mutex::new(positions)))
    }

    pub fn failing(role: DebateRole) -> Self {
        Self::with_behavior(role, DebaterBehavior::Fail)
    }

    fn with_behavior(role: DebateRole, behavior: DebaterBehavior) -> Self {
        Self {
            role,
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DebaterCapability for ScriptedDebater {
    fn role(&self) -> DebateRole {
        self.role
    }

    async fn argue(
        &self,
        _context: &DebateContext,
        transcript: &DebateState,
    ) -> Result<Position, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            DebaterBehavior::Constant(action, confidence) => Ok(Position {
                action: *action,
                confidence: *confidence,
                argument: format!(
                    "{} argues {action} in round {}",
                    self.role.display_name(),
                    transcript.next_round()
                ),
            }),
            DebaterBehavior::Sequence(positions) => positions
                .lock()
                .map_err(|e| AgentError::Generator(e.to_string()))?
                .pop_front()
                .ok_or_else(|| AgentError::Generator("script exhausted".to_string())),
            DebaterBehavior::Fail => Err(AgentError::Generator(format!(
                "{} unavailable",
                self.role.agent_name()
            ))),
        }
    }
}

pub struct ScriptedJudge {
    verdict: JudgeVerdict,
    calls: AtomicUsize,
}

impl ScriptedJudge {
    /// Concludes after the first round.
    pub fn concluding(decision: &str, rating: Option<TradeAction>) -> Self {
        Self::with_verdict(true, decision, rating)
    }

    /// Never concludes and gives no best-effort decision.
    pub fn never_concludes() -> Self {
        Self::with_verdict(false, "", None)
    }

    /// Never concludes but always offers a best-effort decision.
    pub fn leaning(decision: &str, rating: Option<TradeAction>) -> Self {
        Self::with_verdict(false, decision, rating)
    }

    fn with_verdict(conclude: bool, decision: &str, rating: Option<TradeAction>) -> Self {
        Self {
            verdict: JudgeVerdict {
                conclude,
                decision: decision.to_string(),
                rating,
            },
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JudgeCapability for ScriptedJudge {
    async fn judge(
        &self,
        _context: &DebateContext,
        _transcript: &DebateState,
    ) -> Result<JudgeVerdict, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.verdict.clone())
    }
}

enum TraderBehavior {
    Plan(TraderPlan),
    Fail,
}

pub struct MockTrader {
    behavior: TraderBehavior,
    calls: AtomicUsize,
}

impl MockTrader {
    pub fn buy(quantity: Decimal) -> Self {
        Self::with_behavior(TraderBehavior::Plan(TraderPlan {
            plan: format!("Buy {quantity} shares at the open"),
            action: TradeAction::Buy,
            quantity,
        }))
    }

    /// Returns a plan with blank text.
    pub fn empty() -> Self {
        Self::with_behavior(TraderBehavior::Plan(TraderPlan {
            plan: String::new(),
            action: TradeAction::Hold,
            quantity: Decimal::ZERO,
        }))
    }

    pub fn failing() -> Self {
        Self::with_behavior(TraderBehavior::Fail)
    }

    fn with_behavior(behavior: TraderBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TraderCapability for MockTrader {
    async fn plan(&self, _state: &TradingState) -> Result<TraderPlan, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            TraderBehavior::Plan(plan) => Ok(plan.clone()),
            TraderBehavior::Fail => Err(AgentError::Generator("trader unavailable".to_string())),
        }
    }
}

/// Five daily AAPL bars ending 2023-12-29, closing up about 4%.
pub fn aapl_market_data() -> Vec<MarketData> {
    let closes = [185_64, 186_92, 188_01, 191_56, 193_15];
    closes
        .iter()
        .enumerate()
        .map(|(i, close)| {
            let close = Decimal::new(*close, 2);
            MarketData {
                timestamp: Utc
                    .with_ymd_and_hms(2023, 12, 22 + i as u32, 21, 0, 0)
                    .single()
                    .expect("valid bar timestamp"),
                open: close - Decimal::ONE,
                high: close + Decimal::ONE,
                low: close - Decimal::TWO,
                close,
                volume: Decimal::from(50_000_000),
            }
        })
        .collect()
}

pub fn aapl_state() -> TradingState {
    let trade_date = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid trade date");
    TradingState::new("AAPL", trade_date, aapl_market_data())
}

/// Investment debaters who agree on `buy` and risk debaters who split between
/// `buy` and `hold`.
pub fn scripted_debaters(kind: DebateKind) -> Vec<Arc<dyn DebaterCapability>> {
    let debaters = match kind {
        DebateKind::Investment => vec![
            ScriptedDebater::constant(DebateRole::Bull, TradeAction::Buy, Decimal::new(8, 1)),
            ScriptedDebater::constant(DebateRole::Bear, TradeAction::Buy, Decimal::new(55, 2)),
        ],
        DebateKind::Risk => vec![
            ScriptedDebater::constant(DebateRole::Risky, TradeAction::Buy, Decimal::new(7, 1)),
            ScriptedDebater::constant(DebateRole::Safe, TradeAction::Hold, Decimal::new(6, 1)),
            ScriptedDebater::constant(DebateRole::Neutral, TradeAction::Buy, Decimal::new(65, 2)),
        ],
    };
    debaters
        .into_iter()
        .map(|d| Arc::new(d) as Arc<dyn DebaterCapability>)
        .collect()
}

/// A controller with scripted debaters, the unanimity judge and short timeouts.
pub fn scripted_controller(
    analysts: Vec<Arc<dyn AnalystCapability>>,
    trader: Arc<dyn TraderCapability>,
) -> WorkflowController {
    let turn_timeout = Duration::from_secs(5);
    let engine = |kind: DebateKind| {
        DebateEngine::new(kind, scripted_debaters(kind), Arc::new(UnanimityJudge), turn_timeout)
    };
    let settings = WorkflowSettings {
        total_timeout: Duration::from_secs(30),
        analyst_deadline: Duration::from_secs(5),
        turn_timeout,
        max_invest_rounds: 2,
        max_risk_rounds: 2,
    };
    let invest = engine(DebateKind::Investment).expect("scripted debaters cover every role");
    let risk = engine(DebateKind::Risk).expect("scripted debaters cover every role");
    WorkflowController::new(analysts, invest, risk, trader, settings)
        .expect("engines are in investment, risk order")
}
