//! Precedence merge of the three source fragments into one record.
//!
//! Structured metadata beats embedded state beats DOM heuristics, field by
//! field — except where a field is only ever collected by one source
//! (awards, testimonials, and the verified badge are DOM-only by
//! construction). The organization name is the one mandatory field: if no
//! source produced it, the page is either not a profile or a fully blocked
//! response, and the merge fails permanently.

use chrono::Utc;
use url::Url;

use agencyscout_shared::AgencyRecord;

use crate::numeric;
use crate::sources::Fragment;

/// Per-run context stamped into every record for provenance.
#[derive(Debug, Clone)]
pub struct MergeContext {
    /// Profile URL the fragments came from.
    pub url: Url,
    /// Directory host.
    pub source: String,
    /// Category filter active for the run.
    pub category: Option<String>,
    /// Location filter active for the run.
    pub location: Option<String>,
}

/// Why a merge refused to produce a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MergeError {
    /// No source produced an organization name. Permanent — not retried.
    #[error("no organization name found")]
    NoName,
}

/// Merge three fragments by precedence into an [`AgencyRecord`].
pub fn merge(
    structured: Fragment,
    state: Fragment,
    dom: Fragment,
    ctx: &MergeContext,
) -> Result<AgencyRecord, MergeError> {
    let name = pick(structured.name, state.name, dom.name).ok_or(MergeError::NoName)?;

    let rating = pick(structured.rating, state.rating, dom.rating)
        .as_deref()
        .and_then(numeric::parse_decimal);
    let review_count = pick(structured.review_count, state.review_count, dom.review_count)
        .as_deref()
        .and_then(numeric::parse_count);

    Ok(AgencyRecord {
        name,
        rating,
        review_count,
        // DOM-only by construction
        verified: dom.verified,
        awards: dom.awards,
        testimonials: dom.testimonials,
        min_budget: pick(structured.min_budget, state.min_budget, dom.min_budget),
        hourly_rate: pick(structured.hourly_rate, state.hourly_rate, dom.hourly_rate),
        company_size: pick(structured.employees, state.employees, dom.employees),
        address: pick(structured.address, state.address, dom.address),
        locations: pick_list(structured.locations, state.locations, dom.locations),
        services: pick_list(structured.services, state.services, dom.services),
        industries: pick_list(structured.industries, state.industries, dom.industries),
        description: pick(structured.description, state.description, dom.description),
        website: pick(structured.website, state.website, dom.website),
        phone: pick(structured.phone, state.phone, dom.phone),
        email: pick(structured.email, state.email, dom.email),
        url: ctx.url.to_string(),
        source: ctx.source.clone(),
        fetched_at: Utc::now(),
        category: ctx.category.clone(),
        location_filter: ctx.location.clone(),
    })
}

fn pick<T>(structured: Option<T>, state: Option<T>, dom: Option<T>) -> Option<T> {
    structured.or(state).or(dom)
}

fn pick_list(structured: Vec<String>, state: Vec<String>, dom: Vec<String>) -> Vec<String> {
    [structured, state, dom]
        .into_iter()
        .find(|list| !list.is_empty())
        .unwrap_or_default()
}
