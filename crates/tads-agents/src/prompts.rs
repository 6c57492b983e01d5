use tads_models::analysis::{AnalystKind, AnalystRequest};
use tads_models::debate::{DebateKind, DebateRole, DebateState};
use tads_models::trading_state::TradingState;

use crate::participants::DebateContext;

fn analyst_reply_schema() -> String {
    let example = serde_json::json!({
        "rating": "bullish | neutral | bearish",
        "confidence": "0.65",
        "content": "<concise report>",
        "key_points": ["<short supporting fact>"]
    });
    serde_json::to_string_pretty(&example).unwrap_or_default()
}

fn position_schema() -> String {
    let example = serde_json::json!({
        "action": "buy | sell | hold",
        "confidence": "0.70",
        "argument": "<your argument for this round>"
    });
    serde_json::to_string_pretty(&example).unwrap_or_default()
}

fn verdict_schema() -> String {
    let example = serde_json::json!({
        "conclude": false,
        "decision": "<decision text, required when conclude is true>",
        "rating": "buy | sell | hold | null"
    });
    serde_json::to_string_pretty(&example).unwrap_or_default()
}

fn trader_schema() -> String {
    let example = serde_json::json!({
        "plan": "<investment plan>",
        "action": "buy | sell | hold",
        "quantity": "100"
    });
    serde_json::to_string_pretty(&example).unwrap_or_default()
}

pub fn analyst_system_prompt(kind: AnalystKind) -> String {
    let focus = match kind {
        AnalystKind::Market => {
            "You are the market analyst. Read the OHLCV bars and judge trend, momentum and \
             volatility. Compare the latest close against recent highs and lows, note \
             volume confirmation, and call out stretched or compressed ranges."
        }
        AnalystKind::Social => {
            "You are the social media analyst. Assess crowd sentiment and attention around \
             the symbol for the trade date: tone of retail discussion, unusual spikes in \
             attention, and whether sentiment is leading or lagging price."
        }
        AnalystKind::News => {
            "You are the news analyst. Summarize company and macro news relevant to the \
             symbol for the trade date and judge whether it is a tailwind or headwind. \
             Separate confirmed events from speculation."
        }
        AnalystKind::Fundamentals => {
            "You are the fundamentals analyst. Evaluate valuation, profitability, balance \
             sheet strength and recent guidance. State which metrics drive your view."
        }
    };
    format!(
        "{focus}\n\n\
         You are one of four independent analysts in a trading agents debate system. \
         Other agents will debate using your report, so be specific and concise.\n\n\
         You MUST respond with ONLY a JSON object matching this schema:\n\
         {}\n\n\
         `rating` is one of bullish, neutral, bearish. `confidence` is a decimal string \
         between \"0.0\" and \"1.0\".",
        analyst_reply_schema()
    )
}

pub fn analyst_user_prompt(request: &AnalystRequest) -> Result<String, serde_json::Error> {
    serde_json::to_string(request)
}

pub fn debater_system_prompt(role: DebateRole) -> String {
    let stance = match role {
        DebateRole::Bull => {
            "You are the Bull Analyst. Build the strongest evidence-based case for investing: \
             growth potential, competitive advantages, positive indicators. Rebut the bear's \
             latest points directly."
        }
        DebateRole::Bear => {
            "You are the Bear Analyst. Build the strongest evidence-based case against \
             investing: risks, weaknesses, negative indicators. Rebut the bull's latest \
             points directly."
        }
        DebateRole::Risky => {
            "You are the Risky Risk Analyst. Champion high-reward opportunities in the \
             trader's plan and challenge overly cautious views."
        }
        DebateRole::Safe => {
            "You are the Safe Risk Analyst. Protect capital: minimize volatility and \
             drawdown, and point out where the trader's plan takes unnecessary risk."
        }
        DebateRole::Neutral => {
            "You are the Neutral Risk Analyst. Weigh upside against downside and argue for \
             a balanced position size, challenging both extremes."
        }
    };
    format!(
        "{stance}\n\n\
         Take a position each round. You may change your action if the evidence convinces \
         you; state your confidence honestly.\n\n\
         You MUST respond with ONLY a JSON object matching this schema:\n\
         {}",
        position_schema()
    )
}

fn context_block(context: &DebateContext) -> String {
    let mut out = format!(
        "Symbol: {}\nTrade date: {}\n\nAnalyst reports:\n{}",
        context.symbol, context.trade_date, context.reports
    );
    if let Some(decision) = &context.investment_decision {
        out.push_str(&format!("\n\nResearch manager decision:\n{decision}"));
    }
    if let Some(plan) = &context.trader_plan {
        out.push_str(&format!("\n\nTrader plan:\n{plan}"));
    }
    out
}

pub fn debater_user_prompt(
    role: DebateRole,
    context: &DebateContext,
    transcript: &DebateState,
) -> String {
    let history = transcript.render_history();
    let own = transcript.render_history_of(role);
    format!(
        "{}\n\nDebate so far:\n{}\n\nYour previous arguments:\n{}\n\nRound {} begins. Respond as {}.",
        context_block(context),
        if history.is_empty() { "(none)" } else { history.as_str() },
        if own.is_empty() { "(none)" } else { own.as_str() },
        transcript.next_round(),
        role.display_name()
    )
}

pub fn judge_system_prompt(kind: DebateKind) -> String {
    let duty = match kind {
        DebateKind::Investment => {
            "You are the research manager judging a debate between a bull and a bear \
             analyst. Decide whether the arguments are settled enough to commit to buy, \
             sell or hold. Do not default to hold just because both sides have points."
        }
        DebateKind::Risk => {
            "You are the risk manager judging a debate between risky, safe and neutral \
             risk analysts about the trader's plan. Decide whether the plan should be \
             executed, reduced to hold, or reversed."
        }
    };
    format!(
        "{duty}\n\n\
         Set `conclude` to true only when the debate has converged. When concluding, \
         `decision` must state the decision and its reasoning and `rating` must be set.\n\n\
         You MUST respond with ONLY a JSON object matching this schema:\n\
         {}",
        verdict_schema()
    )
}

pub fn judge_user_prompt(context: &DebateContext, transcript: &DebateState) -> String {
    format!(
        "{}\n\nDebate transcript ({} turns):\n{}",
        context_block(context),
        transcript.count(),
        transcript.render_history()
    )
}

pub fn trader_system_prompt() -> String {
    format!(
        "You are the trader. Turn the research manager's investment decision into a \
         concrete investment plan: action, position size in shares and the reasoning. \
         Use the analyst reports for entry context.\n\n\
         You MUST respond with ONLY a JSON object matching this schema:\n\
         {}\n\n\
         `quantity` must be \"0\" when the action is hold.",
        trader_schema()
    )
}

pub fn trader_user_prompt(state: &TradingState) -> String {
    let reports = state
        .reports
        .iter()
        .map(|r| r.render())
        .collect::<Vec<_>>()
        .join("\n\n");
    let decision = state.invest_debate.judge_decision().unwrap_or("(none)");
    format!(
        "Symbol: {}\nTrade date: {}\n\nAnalyst reports:\n{}\n\nInvestment decision:\n{}",
        state.symbol, state.trade_date, reports, decision
    )
}
