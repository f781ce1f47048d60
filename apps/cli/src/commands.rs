//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use url::Url;

use agencyscout_core::pipeline::{ScrapeConfig, ScrapeResult, run_scrape};
use agencyscout_shared::config::{clamp_concurrency, resolve_results_wanted};
use agencyscout_shared::{
    AppConfig, CrawlConfig, PageKind, RunSnapshot, ScrapeProgress, init_config, load_config,
};
use agencyscout_storage::Dataset;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// AgencyScout — extract structured agency records from a business directory.
#[derive(Parser)]
#[command(
    name = "agencyscout",
    version,
    about = "Crawl a business directory and extract structured agency records.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run a scrape against the configured directory.
    Run {
        /// Organization category filter.
        #[arg(short, long)]
        category: Option<String>,

        /// Geographic filter.
        #[arg(short, long)]
        location: Option<String>,

        /// Explicit start URL (repeatable; overrides category/location).
        #[arg(long = "start-url")]
        start_urls: Vec<String>,

        /// How many records to collect before stopping.
        #[arg(short, long)]
        results: Option<i64>,

        /// Maximum listing-page depth per branch.
        #[arg(long)]
        max_pages: Option<u32>,

        /// Emit listing-level links only, skipping profile fetches.
        #[arg(long)]
        no_details: bool,

        /// Concurrent workers (clamped to 1–10).
        #[arg(long)]
        concurrency: Option<u32>,

        /// Per-request timeout in seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Dataset path (defaults to the configured path).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Export dataset records as JSON Lines.
    Export {
        /// Dataset path (defaults to the configured path).
        #[arg(long)]
        db: Option<PathBuf>,

        /// Output file; stdout when omitted.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Show run history and dataset counts.
    Stats {
        /// Dataset path (defaults to the configured path).
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "agencyscout=info",
        1 => "agencyscout=debug",
        _ => "agencyscout=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            category,
            location,
            start_urls,
            results,
            max_pages,
            no_details,
            concurrency,
            timeout_secs,
            out,
        } => {
            cmd_run(RunFlags {
                category,
                location,
                start_urls,
                results,
                max_pages,
                no_details,
                concurrency,
                timeout_secs,
                out,
            })
            .await
        }
        Command::Export { db, out } => cmd_export(db, out).await,
        Command::Stats { db } => cmd_stats(db).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

struct RunFlags {
    category: Option<String>,
    location: Option<String>,
    start_urls: Vec<String>,
    results: Option<i64>,
    max_pages: Option<u32>,
    no_details: bool,
    concurrency: Option<u32>,
    timeout_secs: Option<u64>,
    out: Option<PathBuf>,
}

async fn cmd_run(flags: RunFlags) -> Result<()> {
    let app = load_config()?;
    let mut crawl = CrawlConfig::try_from(&app)?;

    // CLI flags override config file values.
    if let Some(category) = flags.category {
        crawl.category = trimmed(category);
    }
    if let Some(location) = flags.location {
        crawl.location = trimmed(location);
    }
    if !flags.start_urls.is_empty() {
        let mut urls = Vec::new();
        for raw in &flags.start_urls {
            urls.push(Url::parse(raw).map_err(|e| eyre!("invalid start URL '{raw}': {e}"))?);
        }
        crawl.start_urls = urls;
    }
    if let Some(results) = flags.results {
        crawl.results_wanted = resolve_results_wanted(results);
    }
    if let Some(max_pages) = flags.max_pages {
        crawl.max_pages = max_pages.max(1);
    }
    if flags.no_details {
        crawl.collect_details = false;
    }
    if let Some(concurrency) = flags.concurrency {
        crawl.concurrency = clamp_concurrency(concurrency as usize);
    }
    if let Some(secs) = flags.timeout_secs {
        crawl.request_timeout = Duration::from_secs(secs.max(1));
    }

    let db_path = flags
        .out
        .unwrap_or_else(|| PathBuf::from(&app.defaults.dataset_path));

    info!(
        category = crawl.category.as_deref().unwrap_or("-"),
        location = crawl.location.as_deref().unwrap_or("-"),
        quota = crawl.results_wanted,
        details = crawl.collect_details,
        "starting scrape"
    );

    let progress = Arc::new(CliProgress::new());
    let result = run_scrape(
        &ScrapeConfig {
            crawl,
            db_path: db_path.clone(),
        },
        progress,
    )
    .await?;

    print_summary(&result);
    Ok(())
}

fn print_summary(result: &ScrapeResult) {
    let s = &result.snapshot;
    println!();
    println!("  Scrape complete.");
    println!("  Saved:        {}", s.saved);
    println!("  List pages:   {}", s.list_pages);
    println!("  Detail pages: {}", s.detail_pages);
    println!("  Blocked:      {}", s.blocked);
    println!("  Failed:       {}", s.failed);
    println!("  Dataset:      {}", result.db_path.display());
    println!("  Time:         {:.1}s", result.elapsed.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ScrapeProgress for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn page_processed(&self, kind: PageKind, url: &str, snapshot: &RunSnapshot) {
        self.spinner.set_message(format!(
            "saved {} · lists {} · details {} · blocked {} — {kind} {url}",
            snapshot.saved, snapshot.list_pages, snapshot.detail_pages, snapshot.blocked,
        ));
    }

    fn done(&self, _snapshot: &RunSnapshot) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// export / stats
// ---------------------------------------------------------------------------

async fn cmd_export(db: Option<PathBuf>, out: Option<PathBuf>) -> Result<()> {
    let db_path = resolve_db_path(db)?;
    let dataset = Dataset::open(&db_path).await?;
    let records = dataset.list_records().await?;

    match out {
        Some(path) => {
            let mut lines = records.join("\n");
            if !lines.is_empty() {
                lines.push('\n');
            }
            std::fs::write(&path, lines)?;
            println!("Exported {} records to {}", records.len(), path.display());
        }
        None => {
            for record in &records {
                println!("{record}");
            }
        }
    }
    Ok(())
}

async fn cmd_stats(db: Option<PathBuf>) -> Result<()> {
    let db_path = resolve_db_path(db)?;
    let dataset = Dataset::open(&db_path).await?;

    println!("Dataset: {}", db_path.display());
    println!("Records: {}", dataset.record_count().await?);
    println!();

    let runs = dataset.list_runs().await?;
    if runs.is_empty() {
        println!("No runs recorded yet.");
        return Ok(());
    }

    println!("Runs:");
    for run in runs {
        let status = if run.finished_at.is_some() {
            "finished"
        } else {
            "interrupted"
        };
        println!("  {} — {} ({status})", run.id, run.started_at);
        if let Some(stats) = run.stats_json {
            println!("    {stats}");
        }
    }
    Ok(())
}

fn resolve_db_path(db: Option<PathBuf>) -> Result<PathBuf> {
    match db {
        Some(path) => Ok(path),
        None => {
            let app = load_config()?;
            Ok(PathBuf::from(app.defaults.dataset_path))
        }
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

fn trimmed(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
