//! Core domain types for AgencyScout crawl runs and extracted records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

// ---------------------------------------------------------------------------
// PageKind
// ---------------------------------------------------------------------------

/// What a crawl request is expected to yield: a paginated listing of
/// organization links, or a single organization's profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageKind {
    Listing,
    Detail,
}

impl std::fmt::Display for PageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageKind::Listing => write!(f, "listing"),
            PageKind::Detail => write!(f, "detail"),
        }
    }
}

// ---------------------------------------------------------------------------
// CrawlRequest
// ---------------------------------------------------------------------------

/// A single unit of frontier work. Immutable except `retries`, which
/// increments each time a retryable failure re-admits the request.
#[derive(Debug, Clone)]
pub struct CrawlRequest {
    /// Absolute URL to fetch.
    pub url: Url,
    /// Listing or detail processing.
    pub kind: PageKind,
    /// 1-based page number within a listing branch (1 for detail pages).
    pub page_no: u32,
    /// Referer to present, usually the page that discovered this URL.
    pub referer: Option<String>,
    /// Retryable-failure count so far.
    pub retries: u32,
}

impl CrawlRequest {
    /// A listing-page request at the given branch page number.
    pub fn listing(url: Url, page_no: u32, referer: Option<String>) -> Self {
        Self {
            url,
            kind: PageKind::Listing,
            page_no,
            referer,
            retries: 0,
        }
    }

    /// A detail-page request discovered on `referer`.
    pub fn detail(url: Url, referer: impl Into<String>) -> Self {
        Self {
            url,
            kind: PageKind::Detail,
            page_no: 1,
            referer: Some(referer.into()),
            retries: 0,
        }
    }

    /// The same request with the retry counter bumped.
    pub fn retry(&self) -> Self {
        Self {
            retries: self.retries + 1,
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// AgencyRecord
// ---------------------------------------------------------------------------

/// The merged, normalized output entity for one organization profile.
/// Missing fields are explicit `None`; immutable once emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgencyRecord {
    /// Organization name. The only mandatory field.
    pub name: String,
    /// Aggregate rating, tolerantly parsed.
    pub rating: Option<f64>,
    /// Number of reviews behind the rating.
    pub review_count: Option<u64>,
    /// Verification badge text, if the profile carries one.
    pub verified: Option<String>,
    /// Minimum project budget band, as displayed.
    pub min_budget: Option<String>,
    /// Hourly rate band, as displayed.
    pub hourly_rate: Option<String>,
    /// Employee-count band, as displayed.
    pub company_size: Option<String>,
    /// Formatted postal address.
    pub address: Option<String>,
    /// Office locations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<String>,
    /// Offered services, deduplicated and capped.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<String>,
    /// Served industries, deduplicated and capped.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub industries: Vec<String>,
    /// Award badges.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub awards: Vec<String>,
    /// Client testimonials (first few).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub testimonials: Vec<String>,
    /// Profile description / about section.
    pub description: Option<String>,
    /// Organization website.
    pub website: Option<String>,
    /// Contact phone.
    pub phone: Option<String>,
    /// Contact email.
    pub email: Option<String>,
    /// Profile URL this record was extracted from.
    pub url: String,
    /// Directory host the record came from.
    pub source: String,
    /// When the profile page was fetched.
    pub fetched_at: DateTime<Utc>,
    /// Category filter active for the run, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Location filter active for the run, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_filter: Option<String>,
}

// ---------------------------------------------------------------------------
// RunSnapshot
// ---------------------------------------------------------------------------

/// Point-in-time view of a run's counters, reported to the status seam
/// and persisted with the run history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSnapshot {
    /// Records emitted to the sink (full or link-only).
    pub saved: usize,
    /// Listing pages processed.
    pub list_pages: usize,
    /// Detail pages processed.
    pub detail_pages: usize,
    /// Requests that hit a block signal.
    pub blocked: usize,
    /// Requests that failed permanently.
    pub failed: usize,
}

// ---------------------------------------------------------------------------
// ScrapeProgress
// ---------------------------------------------------------------------------

/// Best-effort status reporter consumed by the engine and pipeline.
/// Implementations must not block.
pub trait ScrapeProgress: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each processed page with the current counters.
    fn page_processed(&self, kind: PageKind, url: &str, snapshot: &RunSnapshot);
    /// Called when the run completes.
    fn done(&self, snapshot: &RunSnapshot);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ScrapeProgress for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn page_processed(&self, _kind: PageKind, _url: &str, _snapshot: &RunSnapshot) {}
    fn done(&self, _snapshot: &RunSnapshot) {}
}
