//! Feedshare — distributes a batch of feed provider totals to campaigns.
//!
//! Reads a JSON batch file, runs the distribution engine, stores the
//! resulting rows and writes the run report.

use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use feedshare_core::config::AppConfig;
use feedshare_core::{DistributedStatRecord, DuplicatePolicy, RawClickRow, RawFeedRow};
use feedshare_distribution::{DistributionOrchestrator, RunStatus, RunSummary, VerificationTotals};
use feedshare_reporting::{FeedSummaryQuery, PublisherStatsQuery, StatsStore};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "feedshare")]
#[command(about = "Distribute feed provider totals to campaigns by click share")]
#[command(version)]
struct Cli {
    /// JSON batch file with `clicks` and `feeds` arrays
    #[arg(short, long)]
    input: String,

    /// Where to write the run report (default: stdout)
    #[arg(short, long)]
    output: Option<String>,

    /// Optional TOML config file
    #[arg(short, long, env = "FEEDSHARE_CONFIG")]
    config: Option<String>,

    /// Worker threads (overrides config)
    #[arg(long, env = "FEEDSHARE__DISTRIBUTION__WORKERS")]
    workers: Option<usize>,

    /// Duplicate key policy: reject_key or fail_run (overrides config)
    #[arg(long)]
    duplicate_policy: Option<DuplicatePolicy>,

    /// Batch id stamped on every output row (default: random)
    #[arg(long)]
    batch_id: Option<Uuid>,

    /// Traffic source to report on after the run
    #[arg(long)]
    query_ts: Option<i64>,

    /// First day of the publisher stats query (YYYY-MM-DD)
    #[arg(long, requires_all = ["query_ts", "query_to"])]
    query_from: Option<NaiveDate>,

    /// Last day of the publisher stats query (YYYY-MM-DD)
    #[arg(long, requires_all = ["query_ts", "query_from"])]
    query_to: Option<NaiveDate>,

    /// Print the feeds stored for the query traffic source
    #[arg(long, default_value_t = false, requires = "query_ts")]
    list_feeds: bool,

    /// Write run metrics in Prometheus text format to this file
    #[arg(long)]
    metrics_out: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BatchFile {
    #[serde(default)]
    clicks: Vec<RawClickRow>,
    #[serde(default)]
    feeds: Vec<RawFeedRow>,
}

#[derive(Debug, Serialize)]
struct RunReport<'a> {
    summary: &'a RunSummary,
    records: &'a [DistributedStatRecord],
    verification: &'a VerificationTotals,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "feedshare=info,feedshare_distribution=info,feedshare_reporting=info".into()
            }),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("Feedshare starting up");

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install metrics recorder")?;

    // Load configuration
    let mut config = AppConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(workers) = cli.workers {
        config.distribution.workers = workers;
    }
    if let Some(policy) = cli.duplicate_policy {
        config.distribution.duplicate_policy = policy;
    }
    config.validate().context("invalid configuration")?;

    info!(
        workers = config.distribution.workers,
        duplicate_policy = %config.distribution.duplicate_policy,
        max_rejection_ratio = config.distribution.max_rejection_ratio,
        max_group_failure_ratio = config.distribution.max_group_failure_ratio,
        "Configuration loaded"
    );

    let raw = tokio::fs::read(&cli.input)
        .await
        .with_context(|| format!("failed to read batch file {}", cli.input))?;
    let batch: BatchFile = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse batch file {}", cli.input))?;

    info!(
        input = %cli.input,
        click_rows = batch.clicks.len(),
        feed_rows = batch.feeds.len(),
        "Batch loaded"
    );

    // The engine is CPU-bound and spawns its own scoped workers.
    let orchestrator = DistributionOrchestrator::new(config.distribution.clone());
    let batch_id = cli.batch_id.unwrap_or_else(Uuid::new_v4);
    let run = tokio::task::spawn_blocking(move || {
        orchestrator.run_batch(batch_id, &batch.clicks, &batch.feeds)
    })
    .await
    .context("distribution task panicked")?;

    let store = StatsStore::new();
    store.replace_groups(&run.settled_groups, run.records.iter().cloned());

    let report = RunReport {
        summary: &run.summary,
        records: &run.records,
        verification: &run.verification,
    };
    let body = serde_json::to_vec_pretty(&report)?;
    match &cli.output {
        Some(path) => {
            tokio::fs::write(path, &body)
                .await
                .with_context(|| format!("failed to write report to {path}"))?;
            info!(output = %path, records = run.records.len(), "Run report written");
        }
        None => println!("{}", String::from_utf8_lossy(&body)),
    }

    if let (Some(traffic_source_id), Some(from), Some(to)) = (cli.query_ts, cli.query_from, cli.query_to) {
        let query = PublisherStatsQuery {
            traffic_source_id,
            from,
            to,
        };
        let stats = query
            .execute(&store, config.reporting.max_query_days)
            .context("publisher stats query failed")?;
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }

    if let (true, Some(traffic_source_id)) = (cli.list_feeds, cli.query_ts) {
        let listing = FeedSummaryQuery { traffic_source_id }.execute(&store);
        println!("{}", serde_json::to_string_pretty(&listing)?);
    }

    if let Some(path) = &cli.metrics_out {
        tokio::fs::write(path, metrics.render())
            .await
            .with_context(|| format!("failed to write metrics to {path}"))?;
        info!(output = %path, "Metrics written");
    }

    if !run.verification.is_balanced() {
        error!(batch_id = %batch_id, "Verification totals do not balance");
    }

    match run.summary.status {
        RunStatus::Completed | RunStatus::Degraded => {
            info!(batch_id = %batch_id, status = ?run.summary.status, "Feedshare finished");
            Ok(())
        }
        status => anyhow::bail!("distribution run {batch_id} ended with status {status:?}"),
    }
}
