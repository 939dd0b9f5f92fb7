//! Feedback CLI
//!
//! The `feedback` command drives the risk-gated feedback loop from files.
//!
//! ## Commands
//!
//! - `assess`: Risk opinion for one action, without committing anything
//! - `process`: Run newline-delimited feedback events through the loop
//! - `train`: Train a model snapshot from a labeled dataset
//! - `fetch`: Fetch one payload from a configured market data source
//! - `check-config`: Validate a configuration file

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, Level};

use feedback_core::metrics::METRICS;
use feedback_core::telemetry::{init_tracing, LogFormat};
use feedback_core::{
    AiModelOrchestrator, FeedbackConfig, FeedbackEvent, FeedbackLoop, FeedbackOutcome,
    FeedbackSource, MarketDataCollector, Table,
};

#[derive(Parser)]
#[command(name = "feedback")]
#[command(version = feedback_core::VERSION)]
#[command(about = "Risk-gated feedback loop for predictive market models", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the risk assessment for one action as JSON
    Assess {
        /// Configuration file (.json or .toml)
        #[arg(short, long, env = "FEEDBACK_CONFIG")]
        config: PathBuf,

        /// JSON object carrying category, magnitude and optional
        /// asset_class / pattern signals
        #[arg(short, long)]
        action: PathBuf,
    },

    /// Process feedback events, one JSON object per line
    Process {
        #[arg(short, long, env = "FEEDBACK_CONFIG")]
        config: PathBuf,

        /// Newline-delimited JSON events
        events: PathBuf,
    },

    /// Train a snapshot from a JSON array of row objects
    Train {
        #[arg(short, long, env = "FEEDBACK_CONFIG")]
        config: PathBuf,

        /// JSON file holding an array of row objects
        #[arg(short, long)]
        data: PathBuf,

        /// Target column (default: updater.default_target)
        #[arg(short, long)]
        target: Option<String>,
    },

    /// Fetch one payload from a configured market data source
    Fetch {
        #[arg(short, long, env = "FEEDBACK_CONFIG")]
        config: PathBuf,

        /// Data type, e.g. `price` or `volume`
        data_type: String,
    },

    /// Validate a configuration file
    CheckConfig {
        /// Configuration file (.json or .toml)
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(LogFormat::from_json_flag(cli.json), level);

    match cli.command {
        Commands::Assess { config, action } => cmd_assess(&config, &action),
        Commands::Process { config, events } => cmd_process(&config, &events).await,
        Commands::Train {
            config,
            data,
            target,
        } => cmd_train(&config, &data, target.as_deref()).await,
        Commands::Fetch { config, data_type } => cmd_fetch(&config, &data_type).await,
        Commands::CheckConfig { path } => cmd_check_config(&path),
    }
}

fn load_config(path: &Path) -> Result<FeedbackConfig> {
    FeedbackConfig::from_path(path)
        .with_context(|| format!("Failed to load config {}", path.display()))
}

fn read_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

/// Parse newline-delimited events. Blank lines are skipped.
fn read_events(reader: impl BufRead) -> Result<Vec<FeedbackEvent>> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read events")?;
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(&line)
            .with_context(|| format!("Line {}: invalid JSON", index + 1))?;
        match FeedbackEvent::from_value(value) {
            Some(event) => events.push(event),
            None => bail!("Line {}: feedback event must be a JSON object", index + 1),
        }
    }
    Ok(events)
}

fn cmd_assess(config_path: &Path, action_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let gate = config.risk_manager()?;

    let value = read_json(action_path)?;
    let Some(event) = FeedbackEvent::from_value(value) else {
        bail!("{} must hold a JSON object", action_path.display());
    };
    print_json(&gate.assess_risk(&event.action()))
}

async fn cmd_process(config_path: &Path, events_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let fitter = Arc::new(config.updater.fitter());
    let feedback_loop = FeedbackLoop::from_config(&config, fitter)?;

    let file = std::fs::File::open(events_path)
        .with_context(|| format!("Failed to open {}", events_path.display()))?;
    let events = read_events(BufReader::new(file))?;
    info!(count = events.len(), "processing feedback events");

    for event in events {
        let outcome: FeedbackOutcome = feedback_loop.process_feedback_detailed(event).await;
        print_json(&outcome)?;
    }

    METRICS.flush();
    Ok(())
}

async fn cmd_train(config_path: &Path, data_path: &Path, target: Option<&str>) -> Result<()> {
    let config = load_config(config_path)?;
    let table = Table::from_value(&read_json(data_path)?)
        .with_context(|| format!("Invalid dataset in {}", data_path.display()))?;
    let target = target.unwrap_or(&config.updater.default_target);

    let orchestrator = AiModelOrchestrator::new(Arc::new(config.updater.fitter()));
    let result = orchestrator.train(&table, target).await;
    print_json(&result)?;

    if let Some(snapshot) = orchestrator.current() {
        info!(
            snapshot_id = %snapshot.snapshot_id,
            digest = %snapshot.digest,
            rows = snapshot.trained_rows,
            "snapshot trained"
        );
    }
    Ok(())
}

async fn cmd_fetch(config_path: &Path, data_type: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let collector = MarketDataCollector::new(config.market_data)?;
    match collector.fetch_data(data_type).await {
        Some(event) => print_json(&event),
        None => bail!("No {data_type} data fetched; see logs for the reason"),
    }
}

fn cmd_check_config(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    println!("Configuration OK: {}", path.display());
    println!(
        "  risk thresholds:     {}",
        config.risk.risk_thresholds.len()
    );
    println!(
        "  compliance rules:    {} categories, {} asset classes, {} patterns",
        config.compliance.prohibited_categories.len(),
        config.compliance.prohibited_asset_classes.len(),
        config.compliance.prohibited_patterns.len()
    );
    println!(
        "  updater target:      {}",
        config.updater.default_target
    );
    println!(
        "  market data sources: {}",
        config.market_data.data_sources.len()
    );
    if config.risk.risk_thresholds.is_empty() {
        println!("  warning: no risk thresholds configured; every action will be denied");
    }
    Ok(())
}
