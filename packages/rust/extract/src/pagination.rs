//! Next-listing-page resolution.
//!
//! The directory's pagination markup changes without notice, so the
//! resolver runs an ordered strategy chain and takes the first hit:
//!
//! 1. an explicit `rel=next` relation or a labeled next-page control
//! 2. a pagination container's child links (next text, or `page=<n+1>`)
//! 3. any link whose `page` query parameter equals `n+1`
//! 4. synthetic construction: the current URL with `page` set to `n+1`
//!
//! A candidate that normalizes identically to the current URL is rejected
//! (self-loop guard). `None` is the natural terminal for a listing branch,
//! not an error.

use scraper::{Html, Selector};
use url::Url;

use agencyscout_shared::norm;

/// Pagination containers seen across the directory's redesigns.
const CONTAINER_SELECTORS: &[&str] = &[
    ".pagination a",
    "ul.pagination a",
    "nav.pager a",
    ".pager a",
    "nav[aria-label] a",
];

/// Resolve the URL of listing page `page_no + 1`, if any.
pub fn resolve_next(doc: &Html, current: &Url, page_no: u32) -> Option<Url> {
    let next_no = page_no + 1;

    let candidates = [
        explicit_next(doc),
        container_child(doc, current, next_no),
        any_page_link(doc, current, next_no),
        Some(synthetic(current, next_no).to_string()),
    ];

    for candidate in candidates.into_iter().flatten() {
        let Ok(resolved) = current.join(&candidate) else {
            continue;
        };
        if is_self_loop(&resolved, current) {
            continue;
        }
        return Some(resolved);
    }
    None
}

/// Strategy 1: `rel=next`, or any link labeled with next-page vocabulary.
fn explicit_next(doc: &Html) -> Option<String> {
    for selector in [r#"a[rel~="next"]"#, r#"link[rel="next"]"#] {
        let sel = Selector::parse(selector).unwrap();
        if let Some(href) = doc.select(&sel).next().and_then(|el| el.value().attr("href")) {
            return Some(href.to_string());
        }
    }

    let anchors = Selector::parse("a[href]").unwrap();
    for el in doc.select(&anchors) {
        let label = el.value().attr("aria-label").unwrap_or_default();
        let text: String = el.text().collect();
        if is_next_label(label) || is_next_label(&text) {
            return el.value().attr("href").map(str::to_string);
        }
    }
    None
}

/// Strategy 2: a pagination container child that is either labeled "next"
/// or points at the expected page number.
fn container_child(doc: &Html, current: &Url, next_no: u32) -> Option<String> {
    for selector in CONTAINER_SELECTORS {
        let sel = Selector::parse(selector).unwrap();
        for el in doc.select(&sel) {
            let Some(href) = el.value().attr("href") else {
                continue;
            };
            let text: String = el.text().collect();
            if is_next_label(&text) || points_at_page(current, href, next_no) {
                return Some(href.to_string());
            }
        }
    }
    None
}

/// Strategy 3: any link on the page whose `page` parameter is `n+1`.
fn any_page_link(doc: &Html, current: &Url, next_no: u32) -> Option<String> {
    let sel = Selector::parse(r#"a[href*="page="]"#).unwrap();
    for el in doc.select(&sel) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        if points_at_page(current, href, next_no) {
            return Some(href.to_string());
        }
    }
    None
}

/// Strategy 4: set/overwrite `page` on the current URL.
fn synthetic(current: &Url, next_no: u32) -> Url {
    let mut next = current.clone();
    let kept: Vec<(String, String)> = current
        .query_pairs()
        .filter(|(k, _)| k != "page")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    {
        let mut pairs = next.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        pairs.append_pair("page", &next_no.to_string());
    }
    next
}

/// Next-page vocabulary across the site's locales and redesigns.
fn is_next_label(raw: &str) -> bool {
    let t = raw.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    matches!(t.as_str(), "next" | "›" | "»" | "next ›" | "next »")
        || t.contains("next page")
        || t.contains("go to next")
}

fn points_at_page(current: &Url, href: &str, next_no: u32) -> bool {
    current
        .join(href)
        .ok()
        .and_then(|u| page_param(&u))
        .is_some_and(|n| n == next_no)
}

fn page_param(url: &Url) -> Option<u32> {
    url.query_pairs()
        .find(|(k, _)| k == "page")
        .and_then(|(_, v)| v.parse().ok())
}

fn is_self_loop(candidate: &Url, current: &Url) -> bool {
    norm::listing_key(candidate.as_str()) == norm::listing_key(current.as_str())
}
