//! TADS - Trading Agents Decision System
//!
//! Analyst agents report on a symbol, two structured debates (bull/bear, then
//! risky/safe/neutral) converge on a consensus, and the resulting trading
//! decision is persisted as a session with an append-only message history.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use tads::models::config::TadsConfig;
//! use tads::models::trading_state::TradingState;
//! use tads::agents::WorkflowController;
//! use tads::store::{HistoryService, RecordStore};
//! ```

pub use tads_agents as agents;
pub use tads_models as models;
pub use tads_store as store;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tads_agents::{
    AgentError, AnalystCapability, ClaudeCliGenerator, DebateEngine, DebaterCapability,
    LlmAnalyst, LlmDebater, LlmJudge, LlmTrader, ReportAggregator, ReportCache, SessionRecorder,
    TextGenerator, WorkflowController, WorkflowSettings,
};
use tads_models::config::TadsConfig;
use tads_models::debate::DebateKind;
use tads_models::trading_state::TradingState;
use tads_store::{HistoryService, RecordStore};
use tokio_util::sync::CancellationToken;

/// Open the configured history database, creating its directory if needed.
pub fn open_store(config: &TadsConfig) -> Result<Arc<RecordStore>, anyhow::Error> {
    let path = &config.store.sqlite_path;
    if path != ":memory:" {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }
    Ok(Arc::new(RecordStore::open(path)?))
}

/// Build a workflow controller backed by the Claude CLI from configuration.
pub fn build_controller(
    config: &TadsConfig,
    store: Arc<RecordStore>,
) -> Result<WorkflowController, anyhow::Error> {
    let agents = &config.agents;
    let analyst_timeout = Duration::from_secs(agents.analyst_timeout_seconds);
    let turn_timeout = Duration::from_secs(config.debate.turn_timeout_seconds);

    let analysts: Vec<Arc<dyn AnalystCapability>> = agents
        .enabled_analysts()
        .into_iter()
        .map(|a| {
            let model = a.model.clone().unwrap_or_else(|| agents.analyst_model.clone());
            let generator = Arc::new(ClaudeCliGenerator::new(model, analyst_timeout));
            Arc::new(LlmAnalyst::new(a.kind, a.priority, generator)) as Arc<dyn AnalystCapability>
        })
        .collect();

    let reasoning: Arc<dyn TextGenerator> = Arc::new(ClaudeCliGenerator::new(
        agents.reasoning_model.clone(),
        turn_timeout,
    ));
    let engine = |kind: DebateKind| -> Result<DebateEngine, AgentError> {
        let debaters = kind
            .participants()
            .iter()
            .map(|role| {
                Arc::new(LlmDebater::new(*role, Arc::clone(&reasoning)))
                    as Arc<dyn DebaterCapability>
            })
            .collect();
        DebateEngine::new(
            kind,
            debaters,
            Arc::new(LlmJudge::new(Arc::clone(&reasoning))),
            turn_timeout,
        )
    };

    let cache = Arc::new(ReportCache::new(
        agents.report_cache_capacity,
        Duration::from_secs(agents.report_cache_ttl_seconds),
    ));

    let controller = WorkflowController::new(
        analysts,
        engine(DebateKind::Investment)?,
        engine(DebateKind::Risk)?,
        Arc::new(LlmTrader::new(Arc::clone(&reasoning))),
        WorkflowSettings::from_config(agents, &config.debate),
    )?
    .with_aggregator(ReportAggregator::with_cache(cache))
    .with_recorder(SessionRecorder::new(store));

    Ok(controller)
}

pub fn build_history(store: Arc<RecordStore>) -> HistoryService {
    HistoryService::new(store)
}

/// Run a trading workflow to completion using the given controller.
pub async fn analyze(
    controller: &WorkflowController,
    state: &mut TradingState,
    cancel: &CancellationToken,
) -> Result<(), AgentError> {
    controller.run(state, cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tads_models::history::HistoryListParams;

    fn memory_config() -> TadsConfig {
        let mut config = TadsConfig::default();
        config.store.sqlite_path = ":memory:".to_string();
        config
    }

    #[test]
    fn builds_controller_from_default_config() {
        let config = memory_config();
        let store = open_store(&config).unwrap();
        let controller = build_controller(&config, store).unwrap();
        assert_eq!(controller.settings().max_invest_rounds, 1);
        assert_eq!(controller.settings().total_timeout, Duration::from_secs(600));
    }

    #[test]
    fn history_on_empty_store() {
        let store = open_store(&memory_config()).unwrap();
        let page = build_history(store)
            .list(&HistoryListParams::default())
            .unwrap();
        assert!(page.items.is_empty());
        assert!(!page.has_more);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn open_store_creates_parent_directory() {
        let dir = std::env::temp_dir().join(format!("tads-{}", std::process::id()));
        let mut config = TadsConfig::default();
        config.store.sqlite_path = dir.join("nested/tads.db").to_string_lossy().to_string();
        assert!(open_store(&config).is_ok());
        let _ = std::fs::remove_dir_all(dir);
    }
}
