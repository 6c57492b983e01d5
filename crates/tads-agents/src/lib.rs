pub mod aggregator;
pub mod analyst;
pub mod debate;
pub mod decision;
pub mod error;
pub mod generator;
pub mod parser;
pub mod participants;
pub mod prompts;
pub mod recorder;
pub mod report_cache;
pub mod trader;
pub mod workflow;

pub mod test_support;

pub use aggregator::{CollectOutcome, ReportAggregator};
pub use analyst::{AnalystCapability, LlmAnalyst};
pub use debate::{tie_break, DebateEngine};
pub use decision::synthesize_decision;
pub use error::AgentError;
pub use generator::{ClaudeCliConfig, ClaudeCliGenerator, TextGenerator};
pub use participants::{
    DebateContext, DebaterCapability, JudgeCapability, LlmDebater, LlmJudge, UnanimityJudge,
};
pub use recorder::SessionRecorder;
pub use report_cache::ReportCache;
pub use trader::{LlmTrader, TraderCapability};
pub use workflow::{WorkflowController, WorkflowSettings};
