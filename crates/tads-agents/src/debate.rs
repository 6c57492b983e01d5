use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tads_models::debate::{
    Consensus, DebateKind, DebateOutcome, DebateRole, DebateState, DebateTurn, JudgeVerdict,
};
use tads_models::trade_decision::TradeAction;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::AgentError;
use crate::participants::{DebateContext, DebaterCapability, JudgeCapability};

/// Drives one kind of debate: rounds of participant turns, each followed by a judge call.
pub struct DebateEngine {
    kind: DebateKind,
    /// Indexed like `kind.participants()`.
    debaters: Vec<Arc<dyn DebaterCapability>>,
    judge: Arc<dyn JudgeCapability>,
    turn_timeout: Duration,
}

impl DebateEngine {
    /// Build an engine. Every participant role of `kind` needs exactly one debater.
    pub fn new(
        kind: DebateKind,
        debaters: Vec<Arc<dyn DebaterCapability>>,
        judge: Arc<dyn JudgeCapability>,
        turn_timeout: Duration,
    ) -> Result<Self, AgentError> {
        let mut ordered = Vec::with_capacity(kind.participants().len());
        for role in kind.participants() {
            let mut matching = debaters.iter().filter(|d| d.role() == *role);
            let Some(debater) = matching.next() else {
                return Err(AgentError::WorkflowFatal(format!(
                    "{kind} debate has no {} debater",
                    role.agent_name()
                )));
            };
            if matching.next().is_some() {
                return Err(AgentError::WorkflowFatal(format!(
                    "{kind} debate has more than one {} debater",
                    role.agent_name()
                )));
            }
            ordered.push(Arc::clone(debater));
        }
        Ok(Self {
            kind,
            debaters: ordered,
            judge,
            turn_timeout,
        })
    }

    pub fn kind(&self) -> DebateKind {
        self.kind
    }

    /// Run the debate until the judge concludes or `max_rounds` is reached.
    ///
    /// A debater or judge failure force-terminates the debate with the turns
    /// recorded so far; it is not returned as an error. The only error paths
    /// are cancellation and a state that refuses the outcome. Resumes a
    /// partially played round when the state already holds turns.
    pub async fn run_debate(
        &self,
        state: &mut DebateState,
        context: &DebateContext,
        max_rounds: u32,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        if state.is_concluded() {
            return Ok(());
        }
        if state.kind() != self.kind {
            return Err(AgentError::WorkflowFatal(format!(
                "{} engine cannot run a {} debate",
                self.kind,
                state.kind()
            )));
        }

        let start = Instant::now();
        let max_rounds = max_rounds.max(1);
        let mut last_verdict: Option<JudgeVerdict> = None;

        loop {
            // A round cut off before its verdict is judged before anyone speaks again.
            let round = match state.awaiting_verdict() {
                Some(round) => round,
                None if state.next_round() <= max_rounds => state.next_round(),
                None => break,
            };

            for (role, debater) in self.kind.participants().iter().zip(&self.debaters) {
                if state.has_spoken(*role, round) {
                    continue;
                }
                if cancel.is_cancelled() {
                    warn!(debate = %self.kind, round, turns = state.count(), "Debate cancelled");
                    return Err(AgentError::Cancelled);
                }

                let turn_start = Instant::now();
                let result =
                    tokio::time::timeout(self.turn_timeout, debater.argue(context, state)).await;
                match result {
                    Ok(Ok(position)) => {
                        info!(
                            debate = %self.kind,
                            round,
                            role = role.agent_name(),
                            action = %position.action,
                            confidence = %position.confidence,
                            elapsed_ms = turn_start.elapsed().as_millis(),
                            "Debate turn recorded"
                        );
                        state.push_turn(DebateTurn::new(round, *role, position))?;
                    }
                    Ok(Err(e)) => {
                        warn!(debate = %self.kind, round, role = role.agent_name(), error = %e, "Debater failed");
                        let reason = format!("{} failed: {e}", role.display_name());
                        return self.force_conclude(state, last_verdict.as_ref(), &reason);
                    }
                    Err(_) => {
                        let timeout = AgentError::timeout(role.agent_name(), self.turn_timeout.as_secs());
                        warn!(debate = %self.kind, round, error = %timeout, "Debater timed out");
                        return self.force_conclude(state, last_verdict.as_ref(), &timeout.to_string());
                    }
                }
            }

            if cancel.is_cancelled() {
                warn!(debate = %self.kind, round, turns = state.count(), "Debate cancelled before judging");
                return Err(AgentError::Cancelled);
            }

            let result =
                tokio::time::timeout(self.turn_timeout, self.judge.judge(context, state)).await;
            let verdict = match result {
                Ok(Ok(verdict)) => verdict,
                Ok(Err(e)) => {
                    warn!(debate = %self.kind, round, error = %e, "Judge failed");
                    let reason = format!("{} failed: {e}", self.kind.judge_agent());
                    return self.force_conclude(state, last_verdict.as_ref(), &reason);
                }
                Err(_) => {
                    let timeout =
                        AgentError::timeout(self.kind.judge_agent(), self.turn_timeout.as_secs());
                    warn!(debate = %self.kind, round, error = %timeout, "Judge timed out");
                    return self.force_conclude(state, last_verdict.as_ref(), &timeout.to_string());
                }
            };

            if verdict.conclude {
                let rating = verdict.rating.unwrap_or_else(|| tie_break(state));
                let decision = if verdict.decision.trim().is_empty() {
                    fallback_decision(state, rating, "the judge gave no decision text")
                } else {
                    verdict.decision.clone()
                };
                let consensus = Consensus::derive(
                    rating,
                    state.points(),
                    true,
                    agreement_summary(state, rating),
                );
                info!(
                    debate = %self.kind,
                    rounds = round,
                    rating = %rating,
                    agreement = %consensus.agreement_level,
                    elapsed_ms = start.elapsed().as_millis(),
                    "Debate converged"
                );
                state.conclude(DebateOutcome {
                    judge_decision: decision,
                    consensus,
                    rounds: round,
                    forced: false,
                    concluded_at: Utc::now(),
                })?;
                return Ok(());
            }
            state.record_verdict(round);
            last_verdict = Some(verdict);
        }

        let reason = format!("round limit of {max_rounds} reached");
        self.force_conclude(state, last_verdict.as_ref(), &reason)
    }

    /// End the debate without convergence, using the judge's last best-effort
    /// decision when there is one.
    fn force_conclude(
        &self,
        state: &mut DebateState,
        last_verdict: Option<&JudgeVerdict>,
        reason: &str,
    ) -> Result<(), AgentError> {
        let rating = last_verdict
            .and_then(|v| v.rating)
            .unwrap_or_else(|| tie_break(state));
        let decision = match last_verdict {
            Some(v) if !v.decision.trim().is_empty() => v.decision.clone(),
            _ => fallback_decision(state, rating, reason),
        };
        let consensus = Consensus::derive(
            rating,
            state.points(),
            false,
            format!("{} (forced: {reason})", agreement_summary(state, rating)),
        );
        warn!(
            debate = %self.kind,
            rounds = state.latest_round(),
            rating = %rating,
            agreement = %consensus.agreement_level,
            reason,
            "Debate force-terminated"
        );
        state.conclude(DebateOutcome {
            judge_decision: decision,
            consensus,
            rounds: state.latest_round(),
            forced: true,
            concluded_at: Utc::now(),
        })?;
        Ok(())
    }
}

/// Action of the strongest latest-round position.
///
/// Equal confidence resolves to the most cautious choice: `hold` when
/// investment positions disagree, otherwise the safe, then neutral, risk role.
pub fn tie_break(state: &DebateState) -> TradeAction {
    let latest = state.latest_round();
    let candidates: Vec<&DebateTurn> = state
        .turns()
        .iter()
        .filter(|t| t.round == latest)
        .collect();
    let Some(top) = candidates.iter().map(|t| t.confidence).max() else {
        return TradeAction::Hold;
    };
    let tied: Vec<&DebateTurn> = candidates
        .into_iter()
        .filter(|t| t.confidence == top)
        .collect();

    match state.kind() {
        DebateKind::Investment => {
            let first = tied[0].action;
            if tied.iter().all(|t| t.action == first) {
                first
            } else {
                TradeAction::Hold
            }
        }
        DebateKind::Risk => tied
            .iter()
            .min_by_key(|t| caution_rank(t.role))
            .map(|t| t.action)
            .unwrap_or(TradeAction::Hold),
    }
}

fn caution_rank(role: DebateRole) -> u8 {
    match role {
        DebateRole::Safe => 0,
        DebateRole::Neutral => 1,
        _ => 2,
    }
}

fn agreement_summary(state: &DebateState, rating: TradeAction) -> String {
    let total = state.count();
    let agreeing = state.turns().iter().filter(|t| t.action == rating).count();
    format!("{agreeing}/{total} positions support {rating}")
}

fn fallback_decision(state: &DebateState, rating: TradeAction, reason: &str) -> String {
    if state.count() == 0 {
        return format!(
            "No arguments were recorded in the {} debate ({reason}); defaulting to hold",
            state.kind()
        );
    }
    format!(
        "The {} debate ended without a judge decision after {} round(s) ({reason}); \
         the strongest latest position favours {rating}",
        state.kind(),
        state.latest_round()
    )
}
