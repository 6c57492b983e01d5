use rust_decimal::Decimal;
use tads_models::trade_decision::{TradeAction, TradingDecision};
use tads_models::trading_state::TradingState;

use crate::error::AgentError;

/// Minimum risk reported when the risk debate had to be force-terminated.
const FORCED_RISK_FLOOR: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

/// Combine both debate outcomes, the trader plan and the analyst signal into
/// the final decision. Pure: reads the state, never mutates it.
pub fn synthesize_decision(state: &TradingState) -> Result<TradingDecision, AgentError> {
    let invest = state
        .invest_debate
        .outcome()
        .ok_or_else(|| AgentError::WorkflowFatal("investment debate has no outcome".to_string()))?;
    let risk = state
        .risk_debate
        .outcome()
        .ok_or_else(|| AgentError::WorkflowFatal("risk debate has no outcome".to_string()))?;
    let plan = state
        .trader_plan
        .as_ref()
        .ok_or_else(|| AgentError::WorkflowFatal("no trader plan".to_string()))?;

    let action = risk.consensus.rating;
    let quantity = match action {
        TradeAction::Hold => Decimal::ZERO,
        _ if invest.forced || risk.forced => (plan.quantity / Decimal::TWO).floor(),
        _ => plan.quantity,
    }
    .max(Decimal::ZERO);

    let mut signals = vec![
        invest.consensus.agreement_level,
        risk.consensus.agreement_level,
    ];
    if let Some(analyst) = analyst_signal(state) {
        signals.push(analyst);
    }
    let confidence = (signals.iter().copied().sum::<Decimal>() / Decimal::from(signals.len()))
        .round_dp(4)
        .clamp(Decimal::ZERO, Decimal::ONE);

    let mut risk_score = (Decimal::ONE - risk.consensus.agreement_level)
        .clamp(Decimal::ZERO, Decimal::ONE);
    if risk.forced {
        risk_score = risk_score.max(FORCED_RISK_FLOOR);
    }

    let rationale = format!(
        "Investment: {}\nTrader: {}\nRisk: {}",
        invest.judge_decision, plan.plan, risk.judge_decision
    );

    Ok(TradingDecision::new(
        action,
        quantity,
        confidence,
        risk_score,
        rationale,
    )?)
}

/// Priority-weighted mean confidence of the usable analyst reports, or `None`
/// when every report is degraded or unweighted.
pub fn analyst_signal(state: &TradingState) -> Option<Decimal> {
    let (weighted, total) = state
        .reports
        .iter()
        .filter(|r| !r.is_degraded() && r.priority > 0)
        .fold((Decimal::ZERO, Decimal::ZERO), |(weighted, total), r| {
            let priority = Decimal::from(r.priority);
            (weighted + priority * r.confidence, total + priority)
        });
    if total.is_zero() {
        None
    } else {
        Some(weighted / total)
    }
}

/// Text of the final persisted proposal line.
pub fn render_decision(decision: &TradingDecision) -> String {
    format!(
        "FINAL TRANSACTION PROPOSAL: **{}** quantity={} confidence={} risk={}\n{}",
        decision.action.as_str().to_uppercase(),
        decision.quantity,
        decision.confidence,
        decision.risk,
        decision.rationale
    )
}
