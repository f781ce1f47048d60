//! Source extractors for organization profile data.
//!
//! Three independent extractors read the same page through different
//! encodings, in descending order of trustworthiness:
//!
//! - [`schema_org`] — structured-metadata blocks (JSON-LD)
//! - [`embedded_state`] — framework hydration payloads in script tags
//! - [`dom`] — CSS-selector and labeled-text heuristics over the markup
//!
//! Each extractor is a pure function over the page and never fails: any
//! malformed input degrades the affected fields to `None`/empty. The
//! [`crate::merge`] step resolves the three fragments by precedence.

pub mod dom;
pub mod embedded_state;
pub mod schema_org;

/// Partial view of an organization as seen by one source extractor.
///
/// Numeric-looking values (`rating`, `review_count`) are carried as the raw
/// display strings; coercion happens once, in the merger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    pub name: Option<String>,
    pub description: Option<String>,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub rating: Option<String>,
    pub review_count: Option<String>,
    pub min_budget: Option<String>,
    pub hourly_rate: Option<String>,
    pub employees: Option<String>,
    pub verified: Option<String>,
    pub locations: Vec<String>,
    pub services: Vec<String>,
    pub industries: Vec<String>,
    pub awards: Vec<String>,
    pub testimonials: Vec<String>,
}

/// Trim and reject empty strings in one step.
pub(crate) fn clean(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Collapse runs of whitespace into single spaces.
pub(crate) fn collapse_ws(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
