//! End-to-end scrape pipeline: config → dataset → crawl engine → result.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use agencyscout_crawler::Engine;
use agencyscout_shared::{CrawlConfig, Result, RunSnapshot, ScoutError, ScrapeProgress};
use agencyscout_storage::Dataset;

/// Configuration for one scrape run.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Merged crawl configuration (file + CLI flags).
    pub crawl: CrawlConfig,
    /// Dataset path for emitted records.
    pub db_path: PathBuf,
}

/// Result of a completed scrape run.
#[derive(Debug)]
pub struct ScrapeResult {
    /// Run identifier in the dataset's history.
    pub run_id: String,
    /// Final counters.
    pub snapshot: RunSnapshot,
    /// Total elapsed time.
    pub elapsed: std::time::Duration,
    /// Where the records were written.
    pub db_path: PathBuf,
}

/// Run the full scrape pipeline.
///
/// 1. Open the dataset and record the run start
/// 2. Run the crawl engine to completion
/// 3. Persist final counters with the run history
pub async fn run_scrape(
    config: &ScrapeConfig,
    progress: Arc<dyn ScrapeProgress>,
) -> Result<ScrapeResult> {
    let start = Instant::now();

    info!(
        db = %config.db_path.display(),
        quota = config.crawl.results_wanted,
        workers = config.crawl.concurrency,
        "starting scrape pipeline"
    );

    progress.phase("Opening dataset");
    let dataset = Dataset::open(&config.db_path).await?;
    let run_id = dataset.start_run().await?;

    progress.phase("Crawling directory");
    let engine = Engine::new(config.crawl.clone(), dataset.clone(), progress.clone())?;
    let snapshot = Arc::new(engine).run().await?;

    let stats_json = serde_json::to_string(&snapshot)
        .map_err(|e| ScoutError::Storage(format!("stats serialization: {e}")))?;
    dataset.finish_run(&run_id, &stats_json).await?;

    let result = ScrapeResult {
        run_id,
        snapshot,
        elapsed: start.elapsed(),
        db_path: config.db_path.clone(),
    };

    info!(
        run_id = %result.run_id,
        saved = snapshot.saved,
        blocked = snapshot.blocked,
        elapsed_ms = result.elapsed.as_millis() as u64,
        "scrape pipeline complete"
    );

    Ok(result)
}
