use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::trade_decision::TradeAction;

/// Agreement level at or above which a converged consensus counts as strong.
pub const STRONG_AGREEMENT: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

/// Ceiling applied to the agreement level of a forced (non-converged) consensus.
pub const FORCED_AGREEMENT_CAP: Decimal = Decimal::from_parts(49, 0, 0, false, 2);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DebateKind {
    Investment,
    Risk,
}

impl DebateKind {
    /// Speaking order within one round.
    pub fn participants(&self) -> &'static [DebateRole] {
        match self {
            DebateKind::Investment => &[DebateRole::Bull, DebateRole::Bear],
            DebateKind::Risk => &[DebateRole::Risky, DebateRole::Safe, DebateRole::Neutral],
        }
    }

    pub fn judge_agent(&self) -> &'static str {
        match self {
            DebateKind::Investment => "research_manager",
            DebateKind::Risk => "risk_manager",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DebateKind::Investment => "investment",
            DebateKind::Risk => "risk",
        }
    }
}

impl std::fmt::Display for DebateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DebateRole {
    Bull,
    Bear,
    Risky,
    Safe,
    Neutral,
}

impl DebateRole {
    pub fn agent_name(&self) -> &'static str {
        match self {
            DebateRole::Bull => "bull_researcher",
            DebateRole::Bear => "bear_researcher",
            DebateRole::Risky => "risky_analyst",
            DebateRole::Safe => "safe_analyst",
            DebateRole::Neutral => "neutral_analyst",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            DebateRole::Bull => "Bull Analyst",
            DebateRole::Bear => "Bear Analyst",
            DebateRole::Risky => "Risky Analyst",
            DebateRole::Safe => "Safe Analyst",
            DebateRole::Neutral => "Neutral Analyst",
        }
    }
}

/// A participant's stance for one turn, as returned by a debater capability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub action: TradeAction,
    /// 0.0 to 1.0.
    pub confidence: Decimal,
    pub argument: String,
}

/// One appended entry of a debate history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebateTurn {
    /// 1-based round number.
    pub round: u32,
    pub role: DebateRole,
    pub action: TradeAction,
    pub confidence: Decimal,
    pub argument: String,
    pub spoken_at: DateTime<Utc>,
}

impl DebateTurn {
    pub fn new(round: u32, role: DebateRole, position: Position) -> Self {
        Self {
            round,
            role,
            action: position.action,
            confidence: position.confidence.clamp(Decimal::ZERO, Decimal::ONE),
            argument: position.argument,
            spoken_at: Utc::now(),
        }
    }

    pub fn render(&self) -> String {
        format!(
            "{} (round {}, {} @ {}): {}",
            self.role.display_name(),
            self.round,
            self.action,
            self.confidence,
            self.argument
        )
    }
}

/// Compact view of a turn used when scoring agreement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebatePoint {
    pub role: DebateRole,
    pub round: u32,
    pub action: TradeAction,
    pub confidence: Decimal,
}

impl From<&DebateTurn> for DebatePoint {
    fn from(turn: &DebateTurn) -> Self {
        Self {
            role: turn.role,
            round: turn.round,
            action: turn.action,
            confidence: turn.confidence,
        }
    }
}

/// Agreement artifact derived from a finished debate. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Consensus {
    pub rating: TradeAction,
    /// Fraction of points whose action matches `rating`, 0.0 to 1.0.
    pub agreement_level: Decimal,
    pub points: Vec<DebatePoint>,
    /// False when the debate was force-terminated at its round limit or by a failure.
    pub converged: bool,
    pub summary: String,
}

impl Consensus {
    pub fn derive(
        rating: TradeAction,
        points: Vec<DebatePoint>,
        converged: bool,
        summary: impl Into<String>,
    ) -> Self {
        let mut agreement_level = if points.is_empty() {
            Decimal::ZERO
        } else {
            let agreeing = points.iter().filter(|p| p.action == rating).count();
            (Decimal::from(agreeing) / Decimal::from(points.len())).round_dp(4)
        };
        if !converged {
            agreement_level = agreement_level.min(FORCED_AGREEMENT_CAP);
        }

        Self {
            rating,
            agreement_level,
            points,
            converged,
            summary: summary.into(),
        }
    }

    pub fn is_strong(&self) -> bool {
        self.converged && self.agreement_level >= STRONG_AGREEMENT
    }
}

/// What a judge capability returns after reviewing a transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JudgeVerdict {
    /// True to end the debate now.
    pub conclude: bool,
    /// Decision text; may be empty while the debate continues.
    #[serde(default)]
    pub decision: String,
    #[serde(default)]
    pub rating: Option<TradeAction>,
}

/// Terminal result of a debate. Set once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebateOutcome {
    pub judge_decision: String,
    pub consensus: Consensus,
    pub rounds: u32,
    pub forced: bool,
    pub concluded_at: DateTime<Utc>,
}

/// Append-only debate history with a terminal outcome.
///
/// `count` always equals the number of appended turns, and no turn can be
/// appended once the outcome is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebateState {
    kind: DebateKind,
    turns: Vec<DebateTurn>,
    count: u32,
    /// Highest round the judge has ruled on.
    #[serde(default)]
    judged_round: u32,
    outcome: Option<DebateOutcome>,
}

impl DebateState {
    pub fn new(kind: DebateKind) -> Self {
        Self {
            kind,
            turns: Vec::new(),
            count: 0,
            judged_round: 0,
            outcome: None,
        }
    }

    pub fn investment() -> Self {
        Self::new(DebateKind::Investment)
    }

    pub fn risk() -> Self {
        Self::new(DebateKind::Risk)
    }

    pub fn kind(&self) -> DebateKind {
        self.kind
    }

    pub fn turns(&self) -> &[DebateTurn] {
        &self.turns
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn outcome(&self) -> Option<&DebateOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_concluded(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn judge_decision(&self) -> Option<&str> {
        self.outcome.as_ref().map(|o| o.judge_decision.as_str())
    }

    pub fn consensus(&self) -> Option<&Consensus> {
        self.outcome.as_ref().map(|o| &o.consensus)
    }

    /// Highest round that has at least one turn.
    pub fn latest_round(&self) -> u32 {
        self.turns.last().map(|t| t.round).unwrap_or(0)
    }

    /// Round the next turn belongs to. A round is over once every participant spoke.
    pub fn next_round(&self) -> u32 {
        let latest = self.latest_round();
        if latest == 0 {
            return 1;
        }
        let spoken = self.turns.iter().filter(|t| t.round == latest).count();
        if spoken >= self.kind.participants().len() {
            latest + 1
        } else {
            latest
        }
    }

    pub fn judged_round(&self) -> u32 {
        self.judged_round
    }

    /// A round whose turns are all recorded but which has no verdict yet.
    pub fn awaiting_verdict(&self) -> Option<u32> {
        let latest = self.latest_round();
        (latest > self.judged_round && self.next_round() > latest).then_some(latest)
    }

    /// Note that the judge ruled on `round` without concluding.
    pub fn record_verdict(&mut self, round: u32) {
        self.judged_round = self.judged_round.max(round);
    }

    /// Whether `role` already spoke in `round`.
    pub fn has_spoken(&self, role: DebateRole, round: u32) -> bool {
        self.turns.iter().any(|t| t.role == role && t.round == round)
    }

    /// Turns spoken by one participant, in order.
    pub fn history_of(&self, role: DebateRole) -> impl Iterator<Item = &DebateTurn> {
        self.turns.iter().filter(move |t| t.role == role)
    }

    pub fn points(&self) -> Vec<DebatePoint> {
        self.turns.iter().map(DebatePoint::from).collect()
    }

    pub fn push_turn(&mut self, turn: DebateTurn) -> Result<(), ModelError> {
        if self.outcome.is_some() {
            return Err(ModelError::DebateConcluded);
        }
        self.turns.push(turn);
        self.count += 1;
        Ok(())
    }

    pub fn conclude(&mut self, outcome: DebateOutcome) -> Result<(), ModelError> {
        if self.outcome.is_some() {
            return Err(ModelError::DebateConcluded);
        }
        if outcome.judge_decision.trim().is_empty() {
            return Err(ModelError::EmptyJudgeDecision);
        }
        self.outcome = Some(outcome);
        Ok(())
    }

    /// Shared history as text, one turn per line.
    pub fn render_history(&self) -> String {
        self.turns
            .iter()
            .map(DebateTurn::render)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn render_history_of(&self, role: DebateRole) -> String {
        self.history_of(role)
            .map(DebateTurn::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(action: TradeAction, confidence: Decimal) -> Position {
        Position {
            action,
            confidence,
            argument: format!("argue {action}"),
        }
    }

    fn outcome(decision: &str, consensus: Consensus) -> DebateOutcome {
        DebateOutcome {
            judge_decision: decision.to_string(),
            consensus,
            rounds: 1,
            forced: false,
            concluded_at: Utc::now(),
        }
    }

    #[test]
    fn constants() {
        assert_eq!(STRONG_AGREEMENT, dec!(0.5));
        assert_eq!(FORCED_AGREEMENT_CAP, dec!(0.49));
    }

    #[test]
    fn count_tracks_turns() {
        let mut state = DebateState::investment();
        state
            .push_turn(DebateTurn::new(1, DebateRole::Bull, position(TradeAction::Buy, dec!(0.8))))
            .unwrap();
        state
            .push_turn(DebateTurn::new(1, DebateRole::Bear, position(TradeAction::Sell, dec!(0.6))))
            .unwrap();
        assert_eq!(state.count(), 2);
        assert_eq!(state.turns().len(), 2);
        assert_eq!(state.history_of(DebateRole::Bull).count(), 1);
        assert_eq!(state.latest_round(), 1);
        assert_eq!(state.next_round(), 2);
        assert!(state.has_spoken(DebateRole::Bear, 1));
    }

    #[test]
    fn next_round_waits_for_every_participant() {
        let mut state = DebateState::risk();
        assert_eq!(state.next_round(), 1);
        state
            .push_turn(DebateTurn::new(1, DebateRole::Risky, position(TradeAction::Buy, dec!(0.9))))
            .unwrap();
        assert_eq!(state.next_round(), 1);
        assert!(!state.has_spoken(DebateRole::Safe, 1));
    }

    #[test]
    fn full_round_awaits_a_verdict() {
        let mut state = DebateState::investment();
        assert_eq!(state.awaiting_verdict(), None);
        state
            .push_turn(DebateTurn::new(1, DebateRole::Bull, position(TradeAction::Buy, dec!(0.8))))
            .unwrap();
        assert_eq!(state.awaiting_verdict(), None);
        state
            .push_turn(DebateTurn::new(1, DebateRole::Bear, position(TradeAction::Sell, dec!(0.6))))
            .unwrap();
        assert_eq!(state.awaiting_verdict(), Some(1));

        state.record_verdict(1);
        assert_eq!(state.awaiting_verdict(), None);
        assert_eq!(state.judged_round(), 1);
        assert_eq!(state.next_round(), 2);
    }

    #[test]
    fn no_turns_after_conclusion() {
        let mut state = DebateState::investment();
        state
            .push_turn(DebateTurn::new(1, DebateRole::Bull, position(TradeAction::Buy, dec!(0.8))))
            .unwrap();
        let consensus = Consensus::derive(TradeAction::Buy, state.points(), true, "bulls win");
        state.conclude(outcome("Buy", consensus.clone())).unwrap();

        let err = state
            .push_turn(DebateTurn::new(2, DebateRole::Bear, position(TradeAction::Sell, dec!(0.6))))
            .unwrap_err();
        assert_eq!(err, ModelError::DebateConcluded);
        assert_eq!(
            state.conclude(outcome("Sell", consensus)).unwrap_err(),
            ModelError::DebateConcluded
        );
        assert_eq!(state.judge_decision(), Some("Buy"));
    }

    #[test]
    fn empty_decision_rejected() {
        let mut state = DebateState::risk();
        let consensus = Consensus::derive(TradeAction::Hold, vec![], true, "");
        assert_eq!(
            state.conclude(outcome("  ", consensus)).unwrap_err(),
            ModelError::EmptyJudgeDecision
        );
        assert!(!state.is_concluded());
    }

    #[test]
    fn agreement_is_fraction_of_matching_points() {
        let points = vec![
            DebatePoint {
                role: DebateRole::Risky,
                round: 1,
                action: TradeAction::Buy,
                confidence: dec!(0.9),
            },
            DebatePoint {
                role: DebateRole::Safe,
                round: 1,
                action: TradeAction::Hold,
                confidence: dec!(0.7),
            },
            DebatePoint {
                role: DebateRole::Neutral,
                round: 1,
                action: TradeAction::Buy,
                confidence: dec!(0.6),
            },
            DebatePoint {
                role: DebateRole::Risky,
                round: 2,
                action: TradeAction::Buy,
                confidence: dec!(0.9),
            },
        ];
        let consensus = Consensus::derive(TradeAction::Buy, points, true, "");
        assert_eq!(consensus.agreement_level, dec!(0.75));
        assert!(consensus.is_strong());
    }

    #[test]
    fn forced_consensus_is_capped_and_flagged() {
        let points = vec![
            DebatePoint {
                role: DebateRole::Bull,
                round: 1,
                action: TradeAction::Buy,
                confidence: dec!(0.9),
            },
            DebatePoint {
                role: DebateRole::Bear,
                round: 1,
                action: TradeAction::Buy,
                confidence: dec!(0.5),
            },
        ];
        let consensus = Consensus::derive(TradeAction::Buy, points, false, "forced");
        assert_eq!(consensus.agreement_level, dec!(0.49));
        assert!(!consensus.converged);
        assert!(!consensus.is_strong());
    }

    #[test]
    fn render_history_keeps_order() {
        let mut state = DebateState::investment();
        state
            .push_turn(DebateTurn::new(1, DebateRole::Bull, position(TradeAction::Buy, dec!(0.8))))
            .unwrap();
        state
            .push_turn(DebateTurn::new(1, DebateRole::Bear, position(TradeAction::Sell, dec!(0.6))))
            .unwrap();
        let text = state.render_history();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Bull Analyst (round 1, buy @ 0.8)"));
        assert!(lines[1].starts_with("Bear Analyst"));
        assert!(state.render_history_of(DebateRole::Bear).contains("argue sell"));
    }

    #[test]
    fn turn_confidence_is_clamped() {
        let turn = DebateTurn::new(1, DebateRole::Bull, position(TradeAction::Buy, dec!(1.7)));
        assert_eq!(turn.confidence, Decimal::ONE);
    }
}
