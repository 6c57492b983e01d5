pub mod analysis;
pub mod chat;
pub mod config;
pub mod debate;
pub mod error;
pub mod history;
pub mod store_schema;
pub mod trade_decision;
pub mod trading_state;

pub use analysis::{AnalysisReport, AnalystKind, AnalystRequest, ReportRating};
pub use chat::{ChatResp, ToolCall, ToolChunkResp};
pub use config::{AgentsConfig, AnalystConfig, DebateConfig, StoreConfig, TadsConfig};
pub use debate::{
    Consensus, DebateKind, DebateOutcome, DebatePoint, DebateRole, DebateState, DebateTurn,
    JudgeVerdict, Position, FORCED_AGREEMENT_CAP, STRONG_AGREEMENT,
};
pub use error::ModelError;
pub use history::{
    clamp_limit, HistoryInfoResponse, HistoryListParams, HistoryListResponse, MessageRecord,
    MessageRole, MessageStatus, NewMessage, NewSession, SessionPage, SessionRecord, SessionStatus,
    DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT,
};
pub use trade_decision::{TradeAction, TradingDecision};
pub use trading_state::{AnalystReports, MarketData, Phase, TraderPlan, TradingState};
