//! Page fetching and block-signal classification.
//!
//! The target front end answers unwanted traffic three ways: hard status
//! codes (403/429), near-empty bodies, and interstitial block pages with
//! recognizable phrases. All three are classified here as [`FetchFailure::Blocked`]
//! so the engine can penalize the serving session and retry elsewhere.
//! The thresholds are tuned empirically against observed behavior and are
//! carried as configuration, not constants.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue};

use agencyscout_shared::CrawlRequest;

use crate::session::SessionHandle;

/// A successfully fetched page, owned by the handling worker.
#[derive(Debug)]
pub struct RawPage {
    pub status: u16,
    pub body: String,
}

/// Block-page signatures the directory has served.
const BLOCK_PHRASES: &[&str] = &[
    "Access Denied",
    "Just a moment",
    "Attention Required",
    "Pardon Our Interruption",
    "Request unsuccessful",
    "are you a robot",
];

/// Why a fetch produced no usable page.
#[derive(Debug, thiserror::Error)]
pub enum FetchFailure {
    /// Connection, TLS, or timeout trouble.
    #[error("network: {0}")]
    Network(String),

    /// The target served a block response.
    #[error("blocked: {0}")]
    Blocked(BlockReason),

    /// Any other non-success status.
    #[error("HTTP {0}")]
    Http(u16),
}

/// What tripped the block classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    Status(u16),
    BodyTooShort(usize),
    Phrase(&'static str),
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::Status(code) => write!(f, "HTTP {code}"),
            BlockReason::BodyTooShort(len) => write!(f, "body of {len} bytes"),
            BlockReason::Phrase(phrase) => write!(f, "block phrase {phrase:?}"),
        }
    }
}

impl FetchFailure {
    /// Network trouble, block responses, and 5xx are worth retrying with a
    /// rotated session; anything else (404 and friends) is permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchFailure::Network(_) | FetchFailure::Blocked(_) => true,
            FetchFailure::Http(status) => (500..600).contains(status),
        }
    }
}

/// Build the shared HTTP client. Per-session identity is applied per
/// request, so the client itself stays anonymous.
pub fn build_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
}

/// Fetch one page with the given session identity, classifying block
/// responses before the body reaches extraction.
pub async fn fetch_page(
    client: &Client,
    request: &CrawlRequest,
    session: &SessionHandle,
    timeout: Duration,
    min_body_bytes: usize,
) -> Result<RawPage, FetchFailure> {
    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::USER_AGENT,
        HeaderValue::from_static(session.user_agent),
    );
    headers.insert(
        reqwest::header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9"),
    );
    headers.insert(
        reqwest::header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache"),
    );
    if let Some(referer) = request.referer.as_deref() {
        if let Ok(value) = HeaderValue::from_str(referer) {
            headers.insert(reqwest::header::REFERER, value);
        }
    }

    let response = client
        .get(request.url.clone())
        .headers(headers)
        .timeout(timeout)
        .send()
        .await
        .map_err(classify_transport_error)?;

    let status = response.status().as_u16();
    if status == 403 || status == 429 {
        return Err(FetchFailure::Blocked(BlockReason::Status(status)));
    }
    if !(200..300).contains(&status) {
        return Err(FetchFailure::Http(status));
    }

    let body = response
        .text()
        .await
        .map_err(|e| FetchFailure::Network(e.to_string()))?;

    if let Some(reason) = classify_body(&body, min_body_bytes) {
        return Err(FetchFailure::Blocked(reason));
    }

    Ok(RawPage { status, body })
}

/// Content-level block detection: implausibly short bodies and known
/// interstitial phrases.
pub fn classify_body(body: &str, min_body_bytes: usize) -> Option<BlockReason> {
    if body.len() < min_body_bytes {
        return Some(BlockReason::BodyTooShort(body.len()));
    }
    let lowered = body.to_lowercase();
    BLOCK_PHRASES
        .iter()
        .copied()
        .find(|phrase| lowered.contains(&phrase.to_lowercase()))
        .map(BlockReason::Phrase)
}

fn classify_transport_error(error: reqwest::Error) -> FetchFailure {
    if error.is_timeout() {
        FetchFailure::Network("request timeout".into())
    } else if error.is_connect() {
        FetchFailure::Network("connection failed".into())
    } else {
        FetchFailure::Network(error.to_string())
    }
}
