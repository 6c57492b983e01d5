use std::sync::Arc;
use std::time::{Duration, Instant};

use tads_models::analysis::{AnalysisReport, ReportRating};
use tads_models::config::{AgentsConfig, DebateConfig};
use tads_models::debate::DebateKind;
use tads_models::trading_state::{Phase, TradingState};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::aggregator::ReportAggregator;
use crate::analyst::AnalystCapability;
use crate::debate::DebateEngine;
use crate::decision::synthesize_decision;
use crate::error::AgentError;
use crate::participants::DebateContext;
use crate::recorder::SessionRecorder;
use crate::trader::TraderCapability;

/// Deadlines and round limits of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowSettings {
    pub total_timeout: Duration,
    pub analyst_deadline: Duration,
    /// Bound on the trader call.
    pub turn_timeout: Duration,
    pub max_invest_rounds: u32,
    pub max_risk_rounds: u32,
}

impl WorkflowSettings {
    pub fn from_config(agents: &AgentsConfig, debate: &DebateConfig) -> Self {
        Self {
            total_timeout: Duration::from_secs(agents.total_timeout_seconds),
            analyst_deadline: Duration::from_secs(agents.analyst_timeout_seconds),
            turn_timeout: Duration::from_secs(debate.turn_timeout_seconds),
            max_invest_rounds: debate.max_invest_rounds,
            max_risk_rounds: debate.max_risk_rounds,
        }
    }
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self::from_config(&AgentsConfig::default(), &DebateConfig::default())
    }
}

/// Owns the collaborators of a run and drives a `TradingState` through its phases.
pub struct WorkflowController {
    analysts: Vec<Arc<dyn AnalystCapability>>,
    aggregator: ReportAggregator,
    invest: DebateEngine,
    risk: DebateEngine,
    trader: Arc<dyn TraderCapability>,
    recorder: Option<SessionRecorder>,
    settings: WorkflowSettings,
}

impl WorkflowController {
    pub fn new(
        analysts: Vec<Arc<dyn AnalystCapability>>,
        invest: DebateEngine,
        risk: DebateEngine,
        trader: Arc<dyn TraderCapability>,
        settings: WorkflowSettings,
    ) -> Result<Self, AgentError> {
        if invest.kind() != DebateKind::Investment || risk.kind() != DebateKind::Risk {
            return Err(AgentError::WorkflowFatal(format!(
                "debate engines out of order: got {} and {}",
                invest.kind(),
                risk.kind()
            )));
        }
        Ok(Self {
            analysts,
            aggregator: ReportAggregator::new(),
            invest,
            risk,
            trader,
            recorder: None,
            settings,
        })
    }

    pub fn with_aggregator(mut self, aggregator: ReportAggregator) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn with_recorder(mut self, recorder: SessionRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    /// Perform one phase transition.
    ///
    /// A phase whose completion flag is already set is passed through without
    /// calling any collaborator. Terminal phases are returned unchanged.
    pub async fn advance(
        &self,
        state: &mut TradingState,
        cancel: &CancellationToken,
    ) -> Result<Phase, AgentError> {
        let from = state.phase;
        let start = Instant::now();

        match state.phase {
            Phase::Complete | Phase::Failed => return Ok(state.phase),
            Phase::Analysis => {
                if !state.analysis_phase_complete {
                    self.analyze(state, cancel).await?;
                }
                state.phase = Phase::Debate;
            }
            Phase::Debate => {
                if !state.debate_phase_complete {
                    let context = DebateContext::for_investment(state);
                    self.invest
                        .run_debate(
                            &mut state.invest_debate,
                            &context,
                            self.settings.max_invest_rounds,
                            cancel,
                        )
                        .await?;
                    state.debate_phase_complete = true;
                }
                state.phase = Phase::Trading;
            }
            Phase::Trading => {
                if !state.trading_phase_complete {
                    self.plan_trade(state, cancel).await?;
                }
                state.phase = Phase::Risk;
            }
            Phase::Risk => {
                if !state.risk_phase_complete {
                    let context = DebateContext::for_risk(state);
                    self.risk
                        .run_debate(
                            &mut state.risk_debate,
                            &context,
                            self.settings.max_risk_rounds,
                            cancel,
                        )
                        .await?;
                    state.risk_phase_complete = true;
                }
                if state.decision.is_none() {
                    state.decision = Some(synthesize_decision(state)?);
                }
                state.mark_complete()?;
            }
        }

        info!(
            symbol = %state.symbol,
            from = %from,
            phase = %state.phase,
            elapsed_ms = start.elapsed().as_millis(),
            "Phase advanced"
        );
        Ok(state.phase)
    }

    /// Drive the run to a terminal phase, persisting after every step.
    ///
    /// On error the state is marked failed, the partial history is persisted
    /// and the error is returned. The run is bounded by `total_timeout`.
    pub async fn run(
        &self,
        state: &mut TradingState,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        let start = Instant::now();
        let run_token = cancel.child_token();
        let timer_token = run_token.clone();
        let total_timeout = self.settings.total_timeout;
        let timer = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(total_timeout) => timer_token.cancel(),
                _ = timer_token.cancelled() => {}
            }
        });

        info!(symbol = %state.symbol, trade_date = %state.trade_date, run_id = %state.run_id, "Run started");
        let result = self.drive(state, &run_token).await;
        let deadline_hit = run_token.is_cancelled() && !cancel.is_cancelled();
        run_token.cancel();
        timer.abort();

        match result {
            Ok(()) => {
                info!(
                    symbol = %state.symbol,
                    session_id = ?state.session_id,
                    elapsed_ms = start.elapsed().as_millis(),
                    "Run complete"
                );
                Ok(())
            }
            Err(e) => {
                let e = match e {
                    AgentError::Cancelled if deadline_hit => {
                        AgentError::timeout("run", total_timeout.as_secs())
                    }
                    other => other,
                };
                error!(
                    symbol = %state.symbol,
                    phase = %state.phase,
                    error = %e,
                    elapsed_ms = start.elapsed().as_millis(),
                    "Run failed"
                );
                state.mark_failed(e.to_string());
                if let Err(persist_err) = self.persist(state).await {
                    error!(error = %persist_err, "Failed to persist failed run");
                }
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        state: &mut TradingState,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        self.persist(state).await?;
        while !state.phase.is_terminal() {
            self.advance(state, cancel).await?;
            self.persist(state).await?;
        }
        Ok(())
    }

    async fn persist(&self, state: &mut TradingState) -> Result<(), AgentError> {
        if let Some(recorder) = &self.recorder {
            recorder.sync(state).await?;
        }
        Ok(())
    }

    async fn analyze(
        &self,
        state: &mut TradingState,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        let outcome = self
            .aggregator
            .collect(
                &state.symbol,
                state.trade_date,
                &state.market_data,
                &self.analysts,
                self.settings.analyst_deadline,
                cancel,
            )
            .await;
        let cancelled = outcome.cancelled;
        for report in outcome.reports {
            state.reports.insert(report);
        }
        if cancelled {
            return Err(AgentError::Cancelled);
        }

        for kind in state.reports.missing() {
            warn!(analyst = %kind, symbol = %state.symbol, "Analyst not configured");
            state.reports.insert(AnalysisReport::degraded(
                kind,
                &state.symbol,
                state.trade_date,
                ReportRating::Error,
                format!("{kind} analyst not configured"),
            ));
        }
        state.analysis_phase_complete = true;
        Ok(())
    }

    async fn plan_trade(
        &self,
        state: &mut TradingState,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        let plan = match tokio::time::timeout(self.settings.turn_timeout, self.trader.plan(state)).await
        {
            Ok(Ok(plan)) => plan,
            Ok(Err(e)) => return Err(AgentError::WorkflowFatal(format!("trader failed: {e}"))),
            Err(_) => {
                let timeout = AgentError::timeout("trader", self.settings.turn_timeout.as_secs());
                return Err(AgentError::WorkflowFatal(timeout.to_string()));
            }
        };
        if !plan.is_ready() {
            return Err(AgentError::WorkflowFatal(
                "trader produced an empty plan".to_string(),
            ));
        }
        info!(
            symbol = %state.symbol,
            action = %plan.action,
            quantity = %plan.quantity,
            "Trader plan ready"
        );
        state.trader_plan = Some(plan);
        state.trading_phase_complete = true;
        Ok(())
    }
}
