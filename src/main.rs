//! Eco reward - recognition-to-reward consolidation engine
//!
//! Replays a stream of per-frame waste classifications (JSON Lines, from a
//! file or stdin) through the reward engine and keeps a persistent points
//! ledger.
//!
//! Module structure:
//! - `domain/` - Core types (ClassificationEvent, RewardEvent, Timestamp)
//! - `services/` - Decision core (consensus, classifier, cooldown, engine)
//! - `io/` - Boundaries (classification source, ledger, ledger store)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use eco_reward::infra::{Config, Metrics};
use eco_reward::io::{run_source, LedgerStore, PointsLedger};
use eco_reward::services::{create_engine_worker, RewardEngine};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Eco reward - turns sustained waste recognitions into points
#[derive(Parser, Debug)]
#[command(name = "eco-reward", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Classification stream in JSON Lines format ("-" for stdin)
    #[arg(short, long, default_value = "-")]
    input: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for per-frame visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(git_hash = %env!("GIT_HASH"), "eco-reward starting");

    let args = Args::parse();
    let config = Config::load_from_path(&Config::resolve_config_path(args.config.as_deref()));

    let engine_config = config.engine();
    info!(
        config_file = %config.config_file(),
        confidence_threshold = %engine_config.confidence_threshold,
        required_streak_length = %engine_config.required_streak_length,
        cooldown_ms = %engine_config.cooldown.as_millis(),
        session_gap_ms = ?engine_config.session_gap.map(|g| g.as_millis()),
        max_forward_jump_ms = ?engine_config.max_forward_jump.map(|g| g.as_millis()),
        categories = ?engine_config.categories.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
        ledger_file = %config.ledger_file(),
        "config_loaded"
    );

    // Restore the running total before any new award is applied
    let store = LedgerStore::new(config.ledger_file());
    let snapshot = store.restore()?;
    let ledger = Arc::new(PointsLedger::with_totals(snapshot.total, snapshot.by_category));

    let metrics = Arc::new(Metrics::new());
    let engine = RewardEngine::new(engine_config, metrics.clone())?;

    let (cmd_tx, worker) = create_engine_worker(
        engine,
        ledger.clone(),
        Some(store),
        metrics.clone(),
        config.channel_capacity(),
    );
    let worker_handle = tokio::spawn(worker.run());

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    // Periodic metrics reporter (lock-free reads)
    let reporter_metrics = metrics.clone();
    let reporter_ledger = ledger.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        interval.tick().await;
        loop {
            interval.tick().await;
            reporter_metrics.report(reporter_ledger.total()).log();
        }
    });

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = if args.input == "-" {
        Box::new(BufReader::new(tokio::io::stdin()))
    } else {
        let file = tokio::fs::File::open(&args.input)
            .await
            .with_context(|| format!("Failed to open input {}", args.input))?;
        Box::new(BufReader::new(file))
    };

    // Source owns the only sender; the worker stops once it returns
    run_source(reader, cmd_tx, metrics.clone(), shutdown_rx).await?;
    worker_handle.await?;

    metrics.report(ledger.total()).log();
    info!(
        ledger_total = %ledger.total(),
        by_category = ?ledger.category_totals(),
        "eco-reward shutdown complete"
    );
    Ok(())
}
