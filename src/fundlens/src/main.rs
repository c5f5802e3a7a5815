//! Fundlens — donation attribution and creative-performance analysis.
//!
//! Reads a JSON dataset, runs either batch attribution or the full
//! analysis for one organization, and prints the result as JSON.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use fundlens_analytics::{AnalysisEngine, AnalysisRequest};
use fundlens_core::types::DateWindow;
use fundlens_core::{AppConfig, Dataset, FundlensError, FundlensResult};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "fundlens")]
#[command(about = "Donation attribution and creative-performance analytics")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, env = "FUNDLENS_CONFIG")]
    config: Option<String>,

    /// Abandon the run after this many seconds (overrides config)
    #[arg(long, env = "FUNDLENS__RUNTIME__TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Worker threads for parallel stages, 0 for one per core (overrides config)
    #[arg(long, env = "FUNDLENS__RUNTIME__WORKER_THREADS")]
    worker_threads: Option<usize>,

    /// Pretty-print the JSON output
    #[arg(long, default_value_t = false)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve every donation in the dataset to a channel
    Attribute {
        /// Dataset JSON file
        #[arg(short, long)]
        input: PathBuf,

        /// Only attribute donations of this organization
        #[arg(long)]
        org: Option<Uuid>,
    },

    /// Run the full creative-performance analysis for one organization
    Analyze {
        /// Dataset JSON file
        #[arg(short, long)]
        input: PathBuf,

        /// Organization to analyze
        #[arg(long)]
        org: Uuid,

        /// First day of the window (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,

        /// Last day of the window, inclusive (YYYY-MM-DD)
        #[arg(long)]
        end: NaiveDate,

        /// Minimum impressions for a creative to be analyzed
        #[arg(long, env = "FUNDLENS__ANALYSIS__MIN_IMPRESSIONS")]
        min_impressions: Option<u64>,

        /// Significance level for adjusted p-values
        #[arg(long, env = "FUNDLENS__ANALYSIS__SIGNIFICANCE_LEVEL")]
        significance_level: Option<f64>,

        /// Decline from peak CTR that marks a creative as fatigued
        #[arg(long, env = "FUNDLENS__ANALYSIS__FATIGUE_THRESHOLD")]
        fatigue_threshold: Option<f64>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fundlens=info".into()),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building async runtime")?;
    let outcome = runtime.block_on(run(cli));
    // A timed-out computation still occupies a blocking thread; exit without
    // waiting for it.
    runtime.shutdown_background();
    outcome
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match cli.config.as_deref() {
        Some(path) => AppConfig::load(Some(path))
            .with_context(|| format!("loading config from {path}"))?,
        None => AppConfig::load(None).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            AppConfig::default()
        }),
    };

    if let Some(secs) = cli.timeout_secs {
        config.runtime.timeout_secs = secs;
    }
    if let Some(threads) = cli.worker_threads {
        config.runtime.worker_threads = threads;
    }
    if let Commands::Analyze {
        min_impressions,
        significance_level,
        fatigue_threshold,
        ..
    } = &cli.command
    {
        if let Some(v) = min_impressions {
            config.analysis.min_impressions = *v;
        }
        if let Some(v) = significance_level {
            config.analysis.significance_level = *v;
        }
        if let Some(v) = fatigue_threshold {
            config.analysis.fatigue_threshold = *v;
        }
    }
    config.validate()?;

    if config.runtime.worker_threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(config.runtime.worker_threads)
            .build_global()
            .context("configuring worker pool")?;
    }

    info!(
        timeout_secs = config.runtime.timeout_secs,
        worker_threads = config.runtime.worker_threads,
        min_impressions = config.analysis.min_impressions,
        significance_level = config.analysis.significance_level,
        "Configuration loaded"
    );

    let input = match &cli.command {
        Commands::Attribute { input, .. } | Commands::Analyze { input, .. } => input.clone(),
    };
    let raw = tokio::fs::read_to_string(&input)
        .await
        .with_context(|| format!("reading dataset {}", input.display()))?;
    let dataset = Dataset::from_json(&raw)?;
    info!(
        events = dataset.events.len(),
        rules = dataset.rules.len(),
        mappings = dataset.mappings.len(),
        delivery_rows = dataset.delivery.len(),
        creatives = dataset.creatives.len(),
        "Dataset loaded"
    );

    let limit = Duration::from_secs(config.runtime.timeout_secs);
    let pretty = cli.pretty;
    let command = cli.command;
    let output =
        run_with_deadline(limit, move || execute(&config, command, &dataset, pretty)).await?;
    println!("{output}");
    Ok(())
}

/// Runs `work` on the blocking pool. Partial results are never returned:
/// either the whole run finishes inside `limit` or the caller gets
/// `Timeout` and the work is abandoned.
async fn run_with_deadline<F>(limit: Duration, work: F) -> anyhow::Result<String>
where
    F: FnOnce() -> FundlensResult<String> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(work);
    match tokio::time::timeout(limit, task).await {
        Ok(joined) => Ok(joined.context("analysis task failed")??),
        Err(_) => {
            error!(timeout_secs = limit.as_secs(), "Run exceeded its deadline, abandoning");
            Err(FundlensError::Timeout(limit.as_secs()).into())
        }
    }
}

fn execute(
    config: &AppConfig,
    command: Commands,
    dataset: &Dataset,
    pretty: bool,
) -> FundlensResult<String> {
    let engine = AnalysisEngine::new(&config.attribution, &config.analysis);
    let value = match command {
        Commands::Attribute { org, .. } => {
            let batch = match org {
                Some(org) => engine.attribute(&dataset.for_organization(org))?,
                None => engine.attribute(dataset)?,
            };
            serde_json::to_value(batch)?
        }
        Commands::Analyze { org, start, end, .. } => {
            let request = AnalysisRequest {
                organization_id: org,
                window: DateWindow::new(start, end)?,
            };
            serde_json::to_value(engine.run(&request, dataset)?)?
        }
    };
    let rendered = if pretty {
        serde_json::to_string_pretty(&value)?
    } else {
        serde_json::to_string(&value)?
    };
    Ok(rendered)
}
