//! SellerScan - batch SP-API scanner
//!
//! Main entry point for the command line.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use sellerscan_api::{commands, AppContext, ContextOptions};
use sellerscan_domain::constants::{
    DEFAULT_MAX_RETRIES, DEFAULT_SCAN_JITTER_MS, DEFAULT_SCAN_RATE_LIMIT, MIN_SCAN_CONCURRENCY,
};
use sellerscan_domain::{JobStatus, ScanConfig, ScanRequest};
use sellerscan_infra::{init_tracing, ItemOperation, LogFormat};
use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "sellerscan", version, about = "Batch scans of Amazon SP-API catalog and pricing data")]
struct Cli {
    /// Log output format: pretty or json
    #[arg(long, env = "SELLERSCAN_LOG_FORMAT", default_value = "pretty")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan identifiers and print the report when the job ends
    Scan(ScanArgs),
    /// Print a persisted job (requires SELLERSCAN_DB_PATH)
    Status {
        job_id: String,
    },
}

#[derive(Args, Debug)]
struct ScanArgs {
    /// ASINs to scan
    identifiers: Vec<String>,

    /// File with one identifier per line ('#' starts a comment)
    #[arg(long)]
    input: Option<PathBuf>,

    /// catalog, offers, offers:<condition> or competitive_pricing
    #[arg(long, default_value = "catalog")]
    operation: ItemOperation,

    /// Items per second across the whole job
    #[arg(long, default_value_t = DEFAULT_SCAN_RATE_LIMIT)]
    rate_limit: f64,

    #[arg(long, default_value_t = DEFAULT_SCAN_JITTER_MS)]
    jitter_ms: u64,

    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    max_retries: u32,

    /// Parallel workers (1-8)
    #[arg(long, default_value_t = MIN_SCAN_CONCURRENCY)]
    concurrency: usize,

    #[arg(long, default_value = "cli")]
    source: String,

    /// JSON file mapping SKU to unit and shipping cost
    #[arg(long)]
    cost_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env first so SELLERSCAN_LOG and SELLERSCAN_LOG_FORMAT apply
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_format).map_err(anyhow::Error::msg)?;
    if let Ok(path) = dotenv {
        info!(path = %path.display(), "Loaded .env");
    }

    match cli.command {
        Command::Scan(args) => run_scan(args).await,
        Command::Status { job_id } => show_status(&job_id).await,
    }
}

async fn run_scan(args: ScanArgs) -> anyhow::Result<()> {
    let identifiers = collect_identifiers(&args.identifiers, args.input.as_deref())?;
    let options = ContextOptions {
        operation: args.operation,
        cost_file: args.cost_file.clone(),
        ..ContextOptions::default()
    };
    let ctx = Arc::new(AppContext::new(options).context("failed to initialise SellerScan")?);

    let config = ScanConfig {
        rate_limit: args.rate_limit,
        jitter_ms: args.jitter_ms,
        max_retries: args.max_retries,
        concurrency: args.concurrency,
    };
    let request = ScanRequest::new(identifiers, config).with_source(args.source);
    let job_id = commands::start_scan(&ctx, request).await?;

    let interrupt = {
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!(%job_id, "Interrupted; cancelling scan");
                if let Err(e) = commands::cancel_scan(&ctx, job_id).await {
                    error!(%job_id, error = %e, "Failed to cancel scan");
                }
            }
        })
    };

    let report = commands::scan_report(&ctx, job_id).await;
    interrupt.abort();
    let report = report?;

    print_json(&report)?;
    if report.job.status == JobStatus::Failed {
        bail!(
            "scan job {job_id} failed: {}",
            report.job.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn show_status(raw_job_id: &str) -> anyhow::Result<()> {
    let job_id = commands::parse_job_id(raw_job_id)?;
    let ctx = AppContext::new(ContextOptions::default()).context("failed to initialise SellerScan")?;
    if ctx.db.is_none() {
        bail!("status lookups need SELLERSCAN_DB_PATH; in-memory jobs end with the process");
    }
    let job = commands::get_status(&ctx, job_id).await?;
    print_json(&job)
}

fn collect_identifiers(inline: &[String], input: Option<&Path>) -> anyhow::Result<Vec<String>> {
    let mut identifiers: Vec<String> =
        inline.iter().map(|id| id.trim().to_string()).filter(|id| !id.is_empty()).collect();

    if let Some(path) = input {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        identifiers.extend(
            contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string),
        );
    }

    if identifiers.is_empty() {
        bail!("no identifiers given; pass ASINs or --input <file>");
    }
    Ok(identifiers)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
