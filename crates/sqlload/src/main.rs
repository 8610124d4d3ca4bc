//! `sqlload` binary: bulk-load a SQL dump file into Postgres.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use sqlload::{LoadConfig, Loader, PgSessionFactory, RunReport};

/// CLI entry point wrapper.
#[derive(Parser, Debug)]
#[command(name = "sqlload")]
struct Args {
    #[command(subcommand)]
    cmd: Command,
}

/// Top-level CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    Run(RunArgs),
}

/// CLI options for running a load.
#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the SQL dump file.
    #[arg(long)]
    file: PathBuf,

    /// Database connection string, e.g. `postgres://user@host/db` or
    /// `host=localhost dbname=db`.
    #[arg(long, env = "SQLLOAD_DSN")]
    dsn: String,

    /// Override the DSN's user.
    #[arg(long, env = "SQLLOAD_USER")]
    user: Option<String>,

    /// Override the DSN's password.
    #[arg(long, env = "SQLLOAD_PASSWORD")]
    password: Option<String>,

    /// Statements per transaction (also the shard-queue capacity).
    #[arg(long, env = "SQLLOAD_BATCH_SIZE", default_value_t = 1000)]
    batch_size: usize,

    /// Number of parallel shards/workers per phase.
    #[arg(long, env = "SQLLOAD_PARTITIONS", default_value_t = 4)]
    partitions: usize,

    /// Timeout for the pre-batch session liveness probe.
    #[arg(long, env = "SQLLOAD_LIVENESS_TIMEOUT", default_value = "10s")]
    liveness_timeout: humantime::Duration,

    /// Write a JSON run report to this path.
    #[arg(long)]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sqlload=info,warn")),
        )
        .init();

    let args = Args::parse();
    match args.cmd {
        Command::Run(args) => run(args).await,
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    anyhow::ensure!(args.batch_size > 0, "--batch-size must be > 0");
    anyhow::ensure!(args.partitions > 0, "--partitions must be > 0");

    let factory = PgSessionFactory::from_dsn(
        &args.dsn,
        args.user.as_deref(),
        args.password.as_deref(),
    )?;
    let loader = Loader::new(
        LoadConfig {
            batch_size: args.batch_size,
            partitions: args.partitions,
            liveness_timeout: args.liveness_timeout.into(),
        },
        Arc::new(factory),
    );

    let report = loader.run(&args.file).await?;
    info!(
        elapsed = %humantime::format_duration(Duration::from_millis(report.elapsed_ms)),
        executed = report.phases.iter().map(|p| p.executed).sum::<u64>(),
        batches = report.stats.batches,
        discarded = report.stats.discarded,
        "load complete"
    );

    if let Some(path) = &args.report {
        write_report(path, &report).context("write run report")?;
        info!(path = %path.display(), "wrote run report");
    }

    if report.failed() {
        let failed = report
            .phases
            .iter()
            .flat_map(|p| p.shards.iter())
            .filter(|s| s.error.is_some())
            .count();
        anyhow::bail!(
            "load finished with {failed} failed shard(s){}",
            report
                .classifier_error
                .as_deref()
                .map(|e| format!(" and a classifier error: {e}"))
                .unwrap_or_default()
        );
    }
    Ok(())
}

/// Serialize and write the JSON run report.
fn write_report(path: &PathBuf, report: &RunReport) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create dir {}", parent.display()))?;
    }
    let data = serde_json::to_vec_pretty(report).context("serialize run report")?;
    std::fs::write(path, data).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
