use serde::{Deserialize, Serialize};

use crate::analysis::AnalystKind;

/// Top-level configuration for TADS.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TadsConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub debate: DebateConfig,
}

/// Configuration for the session store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// Path to the SQLite history database. `:memory:` keeps everything in process.
    pub sqlite_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "data/tads.db".to_string(),
        }
    }
}

/// Configuration for the analyst, trader and judge agents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentsConfig {
    /// Deadline for an entire run in seconds.
    pub total_timeout_seconds: u64,
    /// Per-analyst deadline in seconds.
    pub analyst_timeout_seconds: u64,
    /// Default model for analysts.
    pub analyst_model: String,
    /// Model for debaters, judges and the trader.
    pub reasoning_model: String,
    /// Maximum number of analyst reports kept in memory.
    pub report_cache_capacity: u64,
    /// How long a successful analyst report may be reused, in seconds.
    pub report_cache_ttl_seconds: u64,
    pub analysts: Vec<AnalystConfig>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            total_timeout_seconds: 600,
            analyst_timeout_seconds: 90,
            analyst_model: "claude-3-5-haiku-latest".to_string(),
            reasoning_model: "claude-sonnet-4-5-20250929".to_string(),
            report_cache_capacity: 1_000,
            report_cache_ttl_seconds: 900,
            analysts: AnalystKind::ALL
                .into_iter()
                .map(|kind| AnalystConfig {
                    kind,
                    model: None,
                    priority: 1,
                    enabled: true,
                })
                .collect(),
        }
    }
}

impl AgentsConfig {
    /// Enabled analyst entries, first entry wins when a kind is listed twice.
    pub fn enabled_analysts(&self) -> Vec<&AnalystConfig> {
        let mut seen = Vec::new();
        self.analysts
            .iter()
            .filter(|a| a.enabled)
            .filter(|a| {
                if seen.contains(&a.kind) {
                    false
                } else {
                    seen.push(a.kind);
                    true
                }
            })
            .collect()
    }
}

/// Configuration for a single analyst.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalystConfig {
    pub kind: AnalystKind,
    /// Override model for this analyst. Falls back to `AgentsConfig::analyst_model`.
    #[serde(default)]
    pub model: Option<String>,
    /// Weight of this analyst's signal in decision synthesis.
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_priority() -> u8 {
    1
}

fn default_enabled() -> bool {
    true
}

/// Round limits for the two debates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebateConfig {
    pub max_invest_rounds: u32,
    pub max_risk_rounds: u32,
    /// Deadline for a single debater or judge call, in seconds.
    pub turn_timeout_seconds: u64,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            max_invest_rounds: 1,
            max_risk_rounds: 1,
            turn_timeout_seconds: 120,
        }
    }
}
