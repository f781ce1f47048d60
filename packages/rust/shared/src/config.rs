//! Application configuration for AgencyScout.
//!
//! User config lives at `~/.agencyscout/agencyscout.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, ScoutError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "agencyscout.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".agencyscout";

// ---------------------------------------------------------------------------
// Config structs (matching agencyscout.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Crawl defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Target directory settings.
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// Politeness and retry tuning.
    #[serde(default)]
    pub politeness: PolitenessConfig,

    /// Session-pool tuning.
    #[serde(default)]
    pub sessions: SessionLimits,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// How many records to collect before stopping.
    #[serde(default = "default_results_wanted")]
    pub results_wanted: i64,

    /// Maximum listing-page depth per branch.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Concurrent workers.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Fetch profile pages, or only emit listing-level links.
    #[serde(default = "default_true")]
    pub collect_details: bool,

    /// Dataset path for emitted records.
    #[serde(default = "default_dataset_path")]
    pub dataset_path: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            results_wanted: default_results_wanted(),
            max_pages: default_max_pages(),
            concurrency: default_concurrency(),
            collect_details: default_true(),
            dataset_path: default_dataset_path(),
        }
    }
}

fn default_results_wanted() -> i64 {
    100
}
fn default_max_pages() -> u32 {
    25
}
fn default_concurrency() -> u32 {
    5
}
fn default_true() -> bool {
    true
}
fn default_dataset_path() -> String {
    "var/agencyscout.db".into()
}

/// `[directory]` section — where listing crawls start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Root listing URL; category/location become query parameters.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Default organization category filter.
    #[serde(default)]
    pub category: String,

    /// Default geographic filter.
    #[serde(default)]
    pub location: String,

    /// Explicit start URLs; overrides category/location derivation.
    #[serde(default)]
    pub start_urls: Vec<String>,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            category: String::new(),
            location: String::new(),
            start_urls: Vec::new(),
        }
    }
}

fn default_base_url() -> String {
    "https://clutch.co/agencies".into()
}

/// `[politeness]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolitenessConfig {
    /// Lower bound of the random pre-fetch delay.
    #[serde(default = "default_delay_min_ms")]
    pub delay_min_ms: u64,

    /// Upper bound of the random pre-fetch delay.
    #[serde(default = "default_delay_max_ms")]
    pub delay_max_ms: u64,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Retryable-failure bound per request.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Bodies shorter than this are treated as block pages.
    #[serde(default = "default_min_body_bytes")]
    pub min_body_bytes: usize,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            delay_min_ms: default_delay_min_ms(),
            delay_max_ms: default_delay_max_ms(),
            request_timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            min_body_bytes: default_min_body_bytes(),
        }
    }
}

fn default_delay_min_ms() -> u64 {
    300
}
fn default_delay_max_ms() -> u64 {
    900
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_min_body_bytes() -> usize {
    200
}

/// `[sessions]` section — rotation thresholds for the session pool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SessionLimits {
    /// Maximum live sessions.
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: usize,

    /// Requests served before a session is retired.
    #[serde(default = "default_max_usage_count")]
    pub max_usage_count: u32,

    /// Bad verdicts tolerated before a session is evicted.
    #[serde(default = "default_max_error_score")]
    pub max_error_score: u32,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_pool_size: default_max_pool_size(),
            max_usage_count: default_max_usage_count(),
            max_error_score: default_max_error_score(),
        }
    }
}

fn default_max_pool_size() -> usize {
    20
}
fn default_max_usage_count() -> u32 {
    5
}
fn default_max_error_score() -> u32 {
    2
}

// ---------------------------------------------------------------------------
// Crawl config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Workers are clamped to this range regardless of configuration.
pub const CONCURRENCY_RANGE: (usize, usize) = (1, 10);

/// Runtime crawl configuration — merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Result quota; `usize::MAX` means unbounded.
    pub results_wanted: usize,
    /// Maximum listing-page depth per branch.
    pub max_pages: u32,
    /// Worker count, clamped to [`CONCURRENCY_RANGE`].
    pub concurrency: usize,
    /// Fetch profile pages, or only emit listing-level links.
    pub collect_details: bool,
    /// Active category filter.
    pub category: Option<String>,
    /// Active location filter.
    pub location: Option<String>,
    /// Explicit start URLs; overrides derivation when non-empty.
    pub start_urls: Vec<Url>,
    /// Root listing URL for derivation.
    pub base_url: Url,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Retryable-failure bound per request.
    pub max_retries: u32,
    /// Block-page body-length threshold.
    pub min_body_bytes: usize,
    /// Random pre-fetch delay bounds in milliseconds.
    pub delay_ms: (u64, u64),
    /// Session-pool thresholds.
    pub sessions: SessionLimits,
}

impl CrawlConfig {
    /// The start URLs for a run: explicit URLs when given, otherwise the
    /// base listing URL with category/location as query parameters.
    pub fn start_urls(&self) -> Vec<Url> {
        if !self.start_urls.is_empty() {
            return self.start_urls.clone();
        }

        let mut url = self.base_url.clone();
        let category = self.category.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let location = self.location.as_deref().map(str::trim).filter(|s| !s.is_empty());
        if category.is_some() || location.is_some() {
            let mut pairs = url.query_pairs_mut();
            if let Some(category) = category {
                pairs.append_pair("category", category);
            }
            if let Some(location) = location {
                pairs.append_pair("location", location);
            }
        }
        vec![url]
    }

    /// Host of the directory being scraped, for record provenance.
    pub fn source_host(&self) -> String {
        self.start_urls()
            .first()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "unknown".into())
    }
}

impl TryFrom<&AppConfig> for CrawlConfig {
    type Error = ScoutError;

    fn try_from(config: &AppConfig) -> Result<Self> {
        let base_url = Url::parse(&config.directory.base_url).map_err(|e| {
            ScoutError::config(format!(
                "invalid directory.base_url '{}': {e}",
                config.directory.base_url
            ))
        })?;

        let mut start_urls = Vec::new();
        for raw in &config.directory.start_urls {
            let url = Url::parse(raw)
                .map_err(|e| ScoutError::config(format!("invalid start URL '{raw}': {e}")))?;
            start_urls.push(url);
        }

        Ok(Self {
            results_wanted: resolve_results_wanted(config.defaults.results_wanted),
            max_pages: config.defaults.max_pages.max(1),
            concurrency: clamp_concurrency(config.defaults.concurrency as usize),
            collect_details: config.defaults.collect_details,
            category: non_empty(&config.directory.category),
            location: non_empty(&config.directory.location),
            start_urls,
            base_url,
            request_timeout: Duration::from_secs(config.politeness.request_timeout_secs.max(1)),
            max_retries: config.politeness.max_retries,
            min_body_bytes: config.politeness.min_body_bytes,
            delay_ms: (
                config.politeness.delay_min_ms,
                config.politeness.delay_max_ms.max(config.politeness.delay_min_ms),
            ),
            sessions: config.sessions,
        })
    }
}

/// A requested result count below 1 means "unbounded", with a warning —
/// matching how the directory scraper has always treated bad input.
pub fn resolve_results_wanted(raw: i64) -> usize {
    if raw >= 1 {
        raw as usize
    } else {
        tracing::warn!(raw, "invalid results_wanted, collecting without bound");
        usize::MAX
    }
}

/// Clamp worker concurrency into the supported range.
pub fn clamp_concurrency(requested: usize) -> usize {
    requested.clamp(CONCURRENCY_RANGE.0, CONCURRENCY_RANGE.1)
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.agencyscout/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ScoutError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.agencyscout/agencyscout.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ScoutError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| ScoutError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ScoutError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ScoutError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ScoutError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("results_wanted"));
        assert!(toml_str.contains("base_url"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.results_wanted, 100);
        assert_eq!(parsed.defaults.max_pages, 25);
        assert_eq!(parsed.politeness.min_body_bytes, 200);
        assert_eq!(parsed.sessions.max_pool_size, 20);
    }

    #[test]
    fn crawl_config_from_defaults() {
        let app = AppConfig::default();
        let crawl = CrawlConfig::try_from(&app).expect("crawl config");
        assert_eq!(crawl.results_wanted, 100);
        assert_eq!(crawl.concurrency, 5);
        assert!(crawl.collect_details);
        assert_eq!(crawl.delay_ms, (300, 900));
    }

    #[test]
    fn invalid_results_wanted_means_unbounded() {
        assert_eq!(resolve_results_wanted(0), usize::MAX);
        assert_eq!(resolve_results_wanted(-7), usize::MAX);
        assert_eq!(resolve_results_wanted(25), 25);
    }

    #[test]
    fn concurrency_is_clamped() {
        assert_eq!(clamp_concurrency(0), 1);
        assert_eq!(clamp_concurrency(5), 5);
        assert_eq!(clamp_concurrency(64), 10);
    }

    #[test]
    fn start_urls_derive_from_filters() {
        let mut app = AppConfig::default();
        app.directory.category = "advertising".into();
        app.directory.location = "Chicago".into();
        let crawl = CrawlConfig::try_from(&app).unwrap();

        let starts = crawl.start_urls();
        assert_eq!(starts.len(), 1);
        let query: Vec<(String, String)> = starts[0]
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(query.contains(&("category".into(), "advertising".into())));
        assert!(query.contains(&("location".into(), "Chicago".into())));
    }

    #[test]
    fn explicit_start_urls_override_derivation() {
        let mut app = AppConfig::default();
        app.directory.category = "advertising".into();
        app.directory.start_urls = vec!["https://clutch.co/us/web-developers".into()];
        let crawl = CrawlConfig::try_from(&app).unwrap();

        let starts = crawl.start_urls();
        assert_eq!(starts.len(), 1);
        assert_eq!(starts[0].path(), "/us/web-developers");
        assert!(starts[0].query().is_none());
    }

    #[test]
    fn bad_start_url_is_a_config_error() {
        let mut app = AppConfig::default();
        app.directory.start_urls = vec!["not a url".into()];
        let result = CrawlConfig::try_from(&app);
        assert!(result.is_err());
    }
}
