use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde_json::json;
use tads_models::config::TadsConfig;
use tads_models::history::HistoryListParams;
use tads_models::trading_state::{MarketData, TradingState};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tads", about = "Trading Agents Decision System")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/tads.toml")]
    config: String,

    /// Pretty-print the output JSON
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full analysis, debate and decision workflow for one symbol
    Run {
        #[arg(long)]
        symbol: String,

        /// Trade date, YYYY-MM-DD
        #[arg(long)]
        date: NaiveDate,

        /// JSON array of OHLCV bars to hand to the analysts
        #[arg(long)]
        market_data: Option<String>,
    },
    /// Browse persisted runs
    History {
        #[command(subcommand)]
        command: HistoryCommand,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryCommand {
    /// List sessions, newest first
    List {
        #[arg(long)]
        cursor: Option<String>,

        #[arg(long)]
        limit: Option<u32>,
    },
    /// Show one session with all of its messages
    Info { session_id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let store = tads::open_store(&config).context("Failed to open history store")?;

    let output = match cli.command {
        Command::Run {
            symbol,
            date,
            market_data,
        } => {
            let market_data = match &market_data {
                Some(path) => read_market_data(path)?,
                None => Vec::new(),
            };
            let controller = tads::build_controller(&config, store)
                .context("Failed to build workflow controller")?;

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, cancelling run");
                    on_signal.cancel();
                }
            });

            let mut state = TradingState::new(symbol, date, market_data);
            let result = tads::analyze(&controller, &mut state, &cancel).await;
            let summary = json!({
                "session_id": state.session_id,
                "symbol": state.symbol,
                "trade_date": state.trade_date,
                "phase": state.phase,
                "decision": state.decision,
                "failure": state.failure,
            });
            print_json(&summary, cli.pretty)?;
            result.map_err(|e| anyhow::anyhow!("Run failed: {e}"))?;
            return Ok(());
        }
        Command::History { command } => {
            let history = tads::build_history(store);
            match command {
                HistoryCommand::List { cursor, limit } => serde_json::to_value(
                    history
                        .list(&HistoryListParams { cursor, limit })
                        .context("Failed to list sessions")?,
                )?,
                HistoryCommand::Info { session_id } => serde_json::to_value(
                    history
                        .info(session_id)
                        .with_context(|| format!("Failed to load session {session_id}"))?,
                )?,
            }
        }
    };

    print_json(&output, cli.pretty)
}

/// Missing config file falls back to defaults; a malformed one is an error.
fn load_config(path: &str) -> Result<TadsConfig> {
    match std::fs::read_to_string(path) {
        Ok(config_str) => toml::from_str(&config_str).with_context(|| "Failed to parse config"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path, "Config file not found, using defaults");
            Ok(TadsConfig::default())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to read config: {path}")),
    }
}

fn read_market_data(path: &str) -> Result<Vec<MarketData>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read market data: {path}"))?;
    serde_json::from_str(&raw).context("Failed to parse market data JSON")
}

fn print_json(value: &serde_json::Value, pretty: bool) -> Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{output}");
    Ok(())
}
