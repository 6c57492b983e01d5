use std::sync::Arc;

use tads_models::history::{MessageRole, MessageStatus, NewMessage, NewSession, SessionStatus};
use tads_models::trading_state::{Phase, TradingState};
use tads_store::RecordStore;
use tracing::{debug, info};

use crate::decision::render_decision;
use crate::error::AgentError;

/// Agent name of the final decision message.
pub const DECISION_AGENT: &str = "portfolio_manager";

/// One message of the projected history, before it is given a session and seq.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedMessage {
    pub role: MessageRole,
    pub agent: String,
    pub content: String,
    pub status: MessageStatus,
    pub finish_reason: String,
}

impl ProjectedMessage {
    fn completed(role: MessageRole, agent: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role,
            agent: agent.into(),
            content: content.into(),
            status: MessageStatus::Completed,
            finish_reason: "stop".to_string(),
        }
    }

    fn into_new_message(self, session_id: i64) -> NewMessage {
        NewMessage {
            session_id,
            role: self.role,
            agent: self.agent,
            content: self.content,
            status: self.status,
            finish_reason: Some(self.finish_reason),
        }
    }
}

pub fn session_prompt(state: &TradingState) -> String {
    format!("Analyze {} for {}", state.symbol, state.trade_date)
}

/// Flatten a run into its ordered message history.
///
/// State only grows, so the projection of a later state always extends the
/// projection of an earlier one.
pub fn project(state: &TradingState) -> Vec<ProjectedMessage> {
    let mut messages = vec![ProjectedMessage::completed(
        MessageRole::User,
        "user",
        session_prompt(state),
    )];

    for report in state.reports.iter() {
        let mut message = ProjectedMessage::completed(
            MessageRole::Assistant,
            report.analyst.agent_name(),
            report.render(),
        );
        if report.is_degraded() {
            message.status = MessageStatus::Failed;
            message.finish_reason = report.rating.as_str().to_string();
        }
        messages.push(message);
    }

    for turn in state.invest_debate.turns() {
        messages.push(ProjectedMessage::completed(
            MessageRole::Assistant,
            turn.role.agent_name(),
            turn.render(),
        ));
    }
    if let Some(decision) = state.invest_debate.judge_decision() {
        messages.push(ProjectedMessage::completed(
            MessageRole::Assistant,
            state.invest_debate.kind().judge_agent(),
            decision,
        ));
    }

    if let Some(plan) = &state.trader_plan {
        messages.push(ProjectedMessage::completed(
            MessageRole::Assistant,
            "trader",
            format!("{}\nProposed: {} {}", plan.plan, plan.action, plan.quantity),
        ));
    }

    for turn in state.risk_debate.turns() {
        messages.push(ProjectedMessage::completed(
            MessageRole::Assistant,
            turn.role.agent_name(),
            turn.render(),
        ));
    }
    if let Some(decision) = state.risk_debate.judge_decision() {
        messages.push(ProjectedMessage::completed(
            MessageRole::Assistant,
            state.risk_debate.kind().judge_agent(),
            decision,
        ));
    }

    if let Some(decision) = &state.decision {
        messages.push(ProjectedMessage::completed(
            MessageRole::Assistant,
            DECISION_AGENT,
            render_decision(decision),
        ));
    }

    if state.phase == Phase::Failed {
        let reason = state.failure.as_deref().unwrap_or("unknown error");
        let mut message =
            ProjectedMessage::completed(MessageRole::System, "workflow", format!("Run failed: {reason}"));
        message.finish_reason = "error".to_string();
        messages.push(message);
    }

    messages
}

/// Persists a run as a session with an append-only message history.
pub struct SessionRecorder {
    store: Arc<RecordStore>,
}

impl SessionRecorder {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    /// Append every message of the projection the store does not have yet.
    /// Creates the session on first call. Returns the number of appended messages.
    pub async fn sync(&self, state: &mut TradingState) -> Result<usize, AgentError> {
        let session_id = match state.session_id {
            Some(id) => id,
            None => {
                let session = self.store.create_session(&NewSession {
                    symbol: state.symbol.clone(),
                    trade_date: state.trade_date,
                    prompt: session_prompt(state),
                })?;
                info!(session_id = session.id, symbol = %state.symbol, "Session created");
                state.session_id = Some(session.id);
                session.id
            }
        };

        let _guard = self.store.locks().lock(session_id).await?;
        let stored = self.store.message_count(session_id)? as usize;
        let projected = project(state);
        if stored > projected.len() {
            return Err(AgentError::WorkflowFatal(format!(
                "session {session_id} holds {stored} messages but the run only has {}",
                projected.len()
            )));
        }

        let mut appended = 0;
        for (index, message) in projected.into_iter().enumerate().skip(stored) {
            let seq = u32::try_from(index + 1)
                .map_err(|_| AgentError::WorkflowFatal("message sequence overflow".to_string()))?;
            self.store
                .append_message(&message.into_new_message(session_id), seq)?;
            appended += 1;
        }

        let status = match state.phase {
            Phase::Complete => Some(SessionStatus::Completed),
            Phase::Failed => Some(SessionStatus::Failed),
            _ => None,
        };
        if let Some(status) = status {
            self.store.update_session_status(session_id, status)?;
        }

        debug!(
            session_id,
            phase = %state.phase,
            appended,
            total = stored + appended,
            "Session synced"
        );
        Ok(appended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use tads_models::analysis::{AnalysisReport, AnalystKind, ReportRating};
    use tads_models::debate::{DebateRole, DebateTurn, Position};
    use tads_models::trade_decision::TradeAction;

    fn state() -> TradingState {
        TradingState::new("AAPL", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), vec![])
    }

    fn recorder() -> SessionRecorder {
        SessionRecorder::new(Arc::new(RecordStore::in_memory().unwrap()))
    }

    #[test]
    fn projection_starts_with_prompt() {
        let messages = project(&state());
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[0].content, "Analyze AAPL for 2024-01-01");
    }

    #[test]
    fn degraded_reports_are_failed_messages() {
        let mut state = state();
        state.reports.insert(AnalysisReport::degraded(
            AnalystKind::News,
            "AAPL",
            state.trade_date,
            ReportRating::Timeout,
            "news analyst timed out",
        ));
        let messages = project(&state);
        assert_eq!(messages[1].agent, "news_analyst");
        assert_eq!(messages[1].status, MessageStatus::Failed);
        assert_eq!(messages[1].finish_reason, "timeout");
    }

    #[tokio::test]
    async fn sync_appends_only_the_new_suffix() {
        let recorder = recorder();
        let mut state = state();

        assert_eq!(recorder.sync(&mut state).await.unwrap(), 1);
        let session_id = state.session_id.unwrap();
        assert_eq!(recorder.sync(&mut state).await.unwrap(), 0);

        state
            .invest_debate
            .push_turn(DebateTurn::new(
                1,
                DebateRole::Bull,
                Position {
                    action: TradeAction::Buy,
                    confidence: dec!(0.7),
                    argument: "Margins expanding".to_string(),
                },
            ))
            .unwrap();
        assert_eq!(recorder.sync(&mut state).await.unwrap(), 1);

        let (session, messages) = recorder.store().get_session(session_id).unwrap();
        assert_eq!(session.status, SessionStatus::Running);
        let seqs: Vec<u32> = messages.iter().map(|m| m.seq).collect();
        assert_eq!(seqs, vec![1, 2]);
        assert_eq!(messages[1].agent, "bull_researcher");
    }

    #[tokio::test]
    async fn failed_run_records_reason_and_status() {
        let recorder = recorder();
        let mut state = state();
        recorder.sync(&mut state).await.unwrap();
        state.mark_failed("trader produced an empty plan");
        recorder.sync(&mut state).await.unwrap();

        let (session, messages) = recorder
            .store()
            .get_session(state.session_id.unwrap())
            .unwrap();
        assert_eq!(session.status, SessionStatus::Failed);
        let last = messages.last().unwrap();
        assert_eq!(last.role, MessageRole::System);
        assert!(last.content.contains("empty plan"));
    }
}
