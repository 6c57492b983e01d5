//! End-to-end runs of the trading workflow with scripted capabilities.
//!
//! Analysts, debaters, judges and the trader are deterministic mocks from
//! `tads_agents::test_support`; persistence goes to an in-memory SQLite store.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tads_agents::test_support::{
    aapl_state, scripted_controller, MockAnalyst, MockTrader, ScenarioAnalyst, ScriptedDebater,
    ScriptedJudge,
};
use tads_agents::{
    AgentError, AnalystCapability, DebateContext, DebateEngine, DebaterCapability,
    SessionRecorder, WorkflowController, WorkflowSettings,
};
use tads_models::analysis::{AnalystKind, ReportRating};
use tads_models::debate::{DebateKind, DebateRole, DebateState, STRONG_AGREEMENT};
use tads_models::history::{MessageRole, SessionStatus};
use tads_models::trade_decision::{TradeAction, TradingDecision};
use tads_models::trading_state::Phase;
use tads_store::{HistoryService, RecordStore};
use tokio_util::sync::CancellationToken;

fn store() -> Arc<RecordStore> {
    Arc::new(RecordStore::in_memory().unwrap())
}

#[tokio::test]
async fn aapl_analysis_moves_to_debate() {
    let controller = scripted_controller(ScenarioAnalyst::all(), Arc::new(MockTrader::buy(dec!(100))));
    let mut state = aapl_state();

    let phase = controller
        .advance(&mut state, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(phase, Phase::Debate);
    assert!(state.analysis_phase_complete);
    assert!(state.reports.is_complete());
    let market = state.reports.get(AnalystKind::Market).unwrap();
    assert_eq!(market.rating, ReportRating::Bullish);
    assert!(market.content.contains("Close moved"));
    assert!(!state.debate_phase_complete);
}

#[tokio::test]
async fn advance_is_idempotent_once_a_phase_is_done() {
    let market = Arc::new(MockAnalyst::new(AnalystKind::Market, ReportRating::Bullish, dec!(0.8)));
    let analysts = vec![market.clone() as Arc<dyn AnalystCapability>];
    let controller = scripted_controller(analysts, Arc::new(MockTrader::buy(dec!(100))));
    let mut state = aapl_state();
    let cancel = CancellationToken::new();

    controller.advance(&mut state, &cancel).await.unwrap();
    let reports = state.reports.clone();

    // Re-entering the analysis phase with its flag set passes straight through.
    state.phase = Phase::Analysis;
    let phase = controller.advance(&mut state, &cancel).await.unwrap();

    assert_eq!(phase, Phase::Debate);
    assert_eq!(market.calls(), 1);
    assert_eq!(state.reports, reports);
}

/// Every collaborator of a controller, kept so tests can count their calls.
struct Collaborators {
    analyst: Arc<MockAnalyst>,
    debaters: Vec<Arc<ScriptedDebater>>,
    judges: Vec<Arc<ScriptedJudge>>,
    trader: Arc<MockTrader>,
}

impl Collaborators {
    fn debate_calls(&self) -> usize {
        self.debaters.iter().map(|d| d.calls()).sum::<usize>()
            + self.judges.iter().map(|j| j.calls()).sum::<usize>()
    }
}

fn counted_controller() -> (WorkflowController, Collaborators) {
    let analyst = Arc::new(MockAnalyst::new(AnalystKind::Market, ReportRating::Bullish, dec!(0.8)));
    let trader = Arc::new(MockTrader::buy(dec!(100)));
    let mut debaters = Vec::new();
    let mut judges = Vec::new();
    let mut engine = |kind: DebateKind| {
        let members: Vec<Arc<ScriptedDebater>> = kind
            .participants()
            .iter()
            .map(|role| Arc::new(ScriptedDebater::constant(*role, TradeAction::Buy, dec!(0.7))))
            .collect();
        let judge = Arc::new(ScriptedJudge::concluding("Buy", Some(TradeAction::Buy)));
        debaters.extend(members.iter().cloned());
        judges.push(judge.clone());
        DebateEngine::new(
            kind,
            members
                .into_iter()
                .map(|d| d as Arc<dyn DebaterCapability>)
                .collect(),
            judge,
            Duration::from_secs(5),
        )
        .unwrap()
    };
    let invest = engine(DebateKind::Investment);
    let risk = engine(DebateKind::Risk);
    let controller = WorkflowController::new(
        vec![analyst.clone() as Arc<dyn AnalystCapability>],
        invest,
        risk,
        trader.clone(),
        WorkflowSettings::default(),
    )
    .unwrap();
    (
        controller,
        Collaborators {
            analyst,
            debaters,
            judges,
            trader,
        },
    )
}

#[tokio::test]
async fn advance_skips_every_phase_already_done() {
    let (controller, collaborators) = counted_controller();
    let cancel = CancellationToken::new();
    let mut state = aapl_state();
    state.analysis_phase_complete = true;
    state.debate_phase_complete = true;
    state.trading_phase_complete = true;
    state.risk_phase_complete = true;
    state.decision = Some(
        TradingDecision::new(TradeAction::Buy, dec!(100), dec!(0.7), dec!(0.4), "Buy".to_string())
            .unwrap(),
    );

    state.phase = Phase::Debate;
    assert_eq!(controller.advance(&mut state, &cancel).await.unwrap(), Phase::Trading);
    assert_eq!(collaborators.debate_calls(), 0);
    assert!(!state.invest_debate.is_concluded());

    assert_eq!(controller.advance(&mut state, &cancel).await.unwrap(), Phase::Risk);
    assert_eq!(collaborators.trader.calls(), 0);
    assert!(state.trader_plan.is_none());

    assert_eq!(controller.advance(&mut state, &cancel).await.unwrap(), Phase::Complete);
    assert_eq!(collaborators.debate_calls(), 0);
    assert_eq!(collaborators.analyst.calls(), 0);
    assert!(state.is_workflow_complete());
    assert_eq!(state.decision.as_ref().unwrap().quantity, dec!(100));
}

#[tokio::test]
async fn advance_at_each_done_phase_returns_the_next_one() {
    let cancel = CancellationToken::new();
    let cases = [
        (Phase::Debate, Phase::Trading),
        (Phase::Trading, Phase::Risk),
        (Phase::Risk, Phase::Complete),
    ];
    for (from, to) in cases {
        let (controller, collaborators) = counted_controller();
        let mut state = aapl_state();
        state.analysis_phase_complete = true;
        state.debate_phase_complete = true;
        state.trading_phase_complete = true;
        state.risk_phase_complete = true;
        state.decision = Some(
            TradingDecision::new(TradeAction::Hold, dec!(0), dec!(0.5), dec!(0.5), "Hold".to_string())
                .unwrap(),
        );
        state.phase = from;

        assert_eq!(controller.advance(&mut state, &cancel).await.unwrap(), to);
        assert_eq!(collaborators.debate_calls(), 0, "debate called at {from}");
        assert_eq!(collaborators.trader.calls(), 0, "trader called at {from}");
    }
}

#[tokio::test]
async fn non_converging_investment_debate_is_forced_after_three_rounds() {
    let engine = DebateEngine::new(
        DebateKind::Investment,
        vec![
            Arc::new(ScriptedDebater::sequence(
                DebateRole::Bull,
                vec![
                    (TradeAction::Buy, dec!(0.9)),
                    (TradeAction::Buy, dec!(0.8)),
                    (TradeAction::Buy, dec!(0.85)),
                ],
            )) as Arc<dyn DebaterCapability>,
            Arc::new(ScriptedDebater::sequence(
                DebateRole::Bear,
                vec![
                    (TradeAction::Sell, dec!(0.7)),
                    (TradeAction::Sell, dec!(0.75)),
                    (TradeAction::Sell, dec!(0.6)),
                ],
            )) as Arc<dyn DebaterCapability>,
        ],
        Arc::new(ScriptedJudge::never_concludes()),
        Duration::from_secs(5),
    )
    .unwrap();
    let mut debate = DebateState::investment();

    engine
        .run_debate(
            &mut debate,
            &DebateContext::for_investment(&aapl_state()),
            3,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let outcome = debate.outcome().unwrap();
    assert_eq!(debate.count(), 6);
    assert_eq!(outcome.rounds, 3);
    assert!(outcome.forced);
    assert!(!outcome.judge_decision.trim().is_empty());
    assert!(outcome.consensus.agreement_level < STRONG_AGREEMENT);
}

#[tokio::test]
async fn full_run_is_persisted_gap_free() {
    let store = store();
    let controller = scripted_controller(ScenarioAnalyst::all(), Arc::new(MockTrader::buy(dec!(100))))
        .with_recorder(SessionRecorder::new(store.clone()));
    let mut state = aapl_state();

    controller
        .run(&mut state, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(state.phase, Phase::Complete);
    assert!(state.is_workflow_complete());
    assert!(state.all_phases_complete());
    assert!(state.check_invariants().is_ok());

    let decision = state.decision.as_ref().unwrap();
    assert_eq!(decision.action, TradeAction::Buy);
    // The risk debate never reaches unanimity, so the plan quantity is halved.
    assert!(state.risk_debate.outcome().unwrap().forced);
    assert_eq!(decision.quantity, dec!(50));
    assert!(decision.risk >= dec!(0.5));
    assert!(decision.confidence > Decimal::ZERO && decision.confidence <= Decimal::ONE);

    let info = HistoryService::new(store)
        .info(state.session_id.unwrap())
        .unwrap();
    assert_eq!(info.session.status, SessionStatus::Completed);
    let seqs: Vec<u32> = info.messages.iter().map(|m| m.seq).collect();
    assert_eq!(seqs, (1..=info.messages.len() as u32).collect::<Vec<_>>());

    // prompt + 4 reports + 2 invest turns + judge + plan + 6 risk turns + judge + decision
    assert_eq!(info.messages.len(), 17);
    assert_eq!(info.messages[0].role, MessageRole::User);
    assert_eq!(info.messages[7].agent, "research_manager");
    assert_eq!(info.messages[8].agent, "trader");
    assert!(info.messages[16]
        .content
        .starts_with("FINAL TRANSACTION PROPOSAL: **BUY**"));
}

#[tokio::test]
async fn empty_trader_plan_fails_the_run() {
    let store = store();
    let trader = Arc::new(MockTrader::empty());
    let controller = scripted_controller(ScenarioAnalyst::all(), trader.clone())
        .with_recorder(SessionRecorder::new(store.clone()));
    let mut state = aapl_state();

    let err = controller
        .run(&mut state, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::WorkflowFatal(ref m) if m.contains("empty plan")));
    assert_eq!(trader.calls(), 1);
    assert_eq!(state.phase, Phase::Failed);
    assert!(!state.is_workflow_complete());
    assert!(state.decision.is_none());

    let (session, messages) = store.get_session(state.session_id.unwrap()).unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    let last = messages.last().unwrap();
    assert_eq!(last.role, MessageRole::System);
    assert!(last.content.contains("empty plan"));
    // The investment debate was persisted before the failure.
    assert!(messages.iter().any(|m| m.agent == "research_manager"));
}

#[tokio::test]
async fn cancelled_run_persists_completed_prefix() {
    let store = store();
    let analysts = vec![
        Arc::new(MockAnalyst::new(AnalystKind::Market, ReportRating::Bullish, dec!(0.8)))
            as Arc<dyn AnalystCapability>,
        Arc::new(MockAnalyst::slow(AnalystKind::News, Duration::from_secs(30)))
            as Arc<dyn AnalystCapability>,
    ];
    let controller = scripted_controller(analysts, Arc::new(MockTrader::buy(dec!(100))))
        .with_recorder(SessionRecorder::new(store.clone()));
    let mut state = aapl_state();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = controller.run(&mut state, &cancel).await.unwrap_err();

    assert!(matches!(err, AgentError::Cancelled));
    assert_eq!(state.phase, Phase::Failed);
    assert!(!state.analysis_phase_complete);
    assert_eq!(
        state.reports.get(AnalystKind::Market).unwrap().rating,
        ReportRating::Bullish
    );

    let (session, messages) = store.get_session(state.session_id.unwrap()).unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    assert!(messages.iter().any(|m| m.agent == "market_analyst"));
}

#[tokio::test]
async fn recorder_sync_is_idempotent() {
    let store = store();
    let recorder = SessionRecorder::new(store.clone());
    let controller = scripted_controller(ScenarioAnalyst::all(), Arc::new(MockTrader::buy(dec!(10))));
    let mut state = aapl_state();
    controller
        .run(&mut state, &CancellationToken::new())
        .await
        .unwrap();

    let first = recorder.sync(&mut state).await.unwrap();
    let second = recorder.sync(&mut state).await.unwrap();
    assert_eq!(first, 17);
    assert_eq!(second, 0);
    assert_eq!(store.message_count(state.session_id.unwrap()).unwrap(), 17);
}

#[tokio::test]
async fn history_lists_runs_newest_first() {
    let store = store();
    for _ in 0..3 {
        let controller =
            scripted_controller(ScenarioAnalyst::all(), Arc::new(MockTrader::buy(dec!(10))))
                .with_recorder(SessionRecorder::new(store.clone()));
        let mut state = aapl_state();
        controller
            .run(&mut state, &CancellationToken::new())
            .await
            .unwrap();
    }

    let history = HistoryService::new(store);
    let page = history
        .list(&tads_models::history::HistoryListParams {
            cursor: None,
            limit: Some(2),
        })
        .unwrap();
    assert_eq!(page.items.len(), 2);
    assert!(page.has_more);
    assert!(page.items[0].id > page.items[1].id);

    let rest = history
        .list(&tads_models::history::HistoryListParams {
            cursor: page.next_cursor.clone(),
            limit: Some(2),
        })
        .unwrap();
    assert_eq!(rest.items.len(), 1);
    assert!(!rest.has_more);
}
