//! Feedback daemon.
//!
//! Reads feedback events from stdin, one JSON object per line, and feeds
//! them through the single-consumer worker queue. Runs until stdin closes.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn, Level};

use feedback_core::metrics::METRICS;
use feedback_core::telemetry::{init_tracing, LogFormat};
use feedback_core::{
    spawn_worker, FeedbackConfig, FeedbackEvent, FeedbackLoop, FeedbackOutcome, FeedbackSender,
    PendingOutcome,
};

#[derive(Parser)]
#[command(name = "feedbackd")]
#[command(version = feedback_core::VERSION)]
#[command(about = "Feedback loop daemon", long_about = None)]
struct Args {
    /// Configuration file (.json or .toml)
    #[arg(short, long, env = "FEEDBACK_CONFIG")]
    config: PathBuf,

    /// Maximum queued events before readers wait
    #[arg(long, default_value_t = 64)]
    queue_capacity: usize,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Summary {
    applied: usize,
    denied: usize,
    failed: usize,
    skipped: usize,
}

impl Summary {
    fn record(&mut self, outcome: &FeedbackOutcome) {
        if outcome.is_applied() {
            self.applied += 1;
        } else if outcome.is_denied() {
            self.denied += 1;
        } else {
            self.failed += 1;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(LogFormat::from_json_flag(args.json), level);

    let config = FeedbackConfig::from_path(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;
    let fitter = Arc::new(config.updater.fitter());
    let feedback_loop = Arc::new(FeedbackLoop::from_config(&config, fitter)?);

    let worker = spawn_worker(feedback_loop, args.queue_capacity);
    info!(
        version = feedback_core::VERSION,
        config = %args.config.display(),
        "feedbackd started"
    );

    let summary = run(BufReader::new(tokio::io::stdin()), worker.sender()).await?;
    let processed = worker.shutdown().await?;

    info!(
        processed,
        applied = summary.applied,
        denied = summary.denied,
        failed = summary.failed,
        skipped = summary.skipped,
        "feedbackd stopped"
    );
    METRICS.flush();
    Ok(())
}

/// Queue each line as one event without waiting for earlier ones to finish.
/// The reader only stalls once `--queue-capacity` events are waiting.
/// Outcomes are tallied in arrival order.
async fn run(input: impl AsyncBufRead + Unpin, sender: FeedbackSender) -> Result<Summary> {
    let mut summary = Summary::default();
    let mut pending: VecDeque<PendingOutcome> = VecDeque::new();
    let mut lines = input.lines();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let event = match serde_json::from_str::<Value>(&line).map(FeedbackEvent::from_value) {
            Ok(Some(event)) => event,
            Ok(None) => {
                warn!(line = line_no, "skipping non-object feedback");
                summary.skipped += 1;
                continue;
            }
            Err(err) => {
                warn!(line = line_no, error = %err, "skipping invalid JSON");
                summary.skipped += 1;
                continue;
            }
        };

        pending.push_back(sender.enqueue(event).await?);
        while let Some(ready) = pending.front_mut().and_then(PendingOutcome::try_outcome) {
            pending.pop_front();
            summary.record(&ready?);
        }
    }

    for outstanding in pending {
        summary.record(&outstanding.outcome().await?);
    }
    Ok(summary)
}
