//! Meridian daemon: entry point for running a Meridian node.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use meridian_node::{init_logging, spawn_pipeline, MeridianNode, NodeConfig, ShutdownController};

#[derive(Parser)]
#[command(name = "meridian-daemon", about = "Meridian sub-block pipeline daemon")]
struct Cli {
    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long, env = "MERIDIAN_CONFIG")]
    config: Option<PathBuf>,

    /// Log format: "human" or "json".
    #[arg(long, env = "MERIDIAN_LOG_FORMAT")]
    log_format: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "MERIDIAN_LOG_LEVEL")]
    log_level: Option<String>,

    /// Pipeline period in milliseconds.
    #[arg(long, env = "MERIDIAN_PIPELINE_INTERVAL_MS")]
    pipeline_interval_ms: Option<u64>,

    /// Write the audit log to this JSONL file instead of keeping it in memory.
    #[arg(long, env = "MERIDIAN_AUDIT_LOG")]
    audit_log: Option<PathBuf>,

    /// Collect Prometheus metrics.
    #[arg(long, env = "MERIDIAN_ENABLE_METRICS")]
    metrics: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => NodeConfig::from_toml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => NodeConfig::default(),
    };
    if let Some(format) = cli.log_format {
        config.log_format = format;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    if let Some(ms) = cli.pipeline_interval_ms {
        config.pipeline_interval_ms = ms;
    }
    if cli.audit_log.is_some() {
        config.audit_log_path = cli.audit_log;
    }
    config.enable_metrics |= cli.metrics;
    config.validate().context("invalid configuration")?;

    init_logging(config.log_format()?, &config.log_level)?;
    if let Some(path) = &cli.config {
        tracing::info!(path = %path.display(), "loaded config");
    }
    if config.validators.is_empty() {
        tracing::warn!("no [[validators]] configured; every commit will fail with no_eligible_validator");
    }

    let node = Arc::new(MeridianNode::in_memory(config).context("building node")?);
    tracing::info!(
        interval_ms = node.config().pipeline_interval_ms,
        batch = node.config().default_batch_size,
        audit_log = ?node.config().audit_log_path,
        "Meridian node starting"
    );

    let shutdown = ShutdownController::new();
    let pipeline = spawn_pipeline(node.clone(), &shutdown);

    shutdown.wait_for_signal().await;
    pipeline.await.context("pipeline task panicked")?;

    if let Some(metrics) = node.metrics() {
        match metrics.encode() {
            Ok(text) => tracing::info!(metrics = %text, "final metrics"),
            Err(e) => tracing::warn!(error = %e, "could not encode metrics"),
        }
    }
    tracing::info!(
        height = node.ledger_height().unwrap_or_default(),
        pooled = node.pool_size(),
        pending = node.list_pending_sub_blocks().len(),
        "Meridian daemon exited cleanly"
    );
    Ok(())
}
