//! DOM-heuristic extractor.
//!
//! The last-resort source: ordered structural-selector chains per field,
//! falling back to labeled-pattern scans of the flattened page text. The
//! selector lists encode every markup variant the directory has shipped;
//! each field takes its first non-empty match. Inherently brittle against
//! redesigns, which is why the merger ranks this source last.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::{Fragment, clean, collapse_ws};
use crate::PROFILE_PATH_SEGMENT;

/// Service-tag containers, newest markup first.
const SERVICE_SELECTORS: &[&str] = &[
    ".service-tags a",
    ".service-tags span",
    ".services-list li",
    ".service-list li",
    ".specializations a",
    ".specializations span",
    ".service-chips li",
];

const INDUSTRY_SELECTORS: &[&str] = &[
    ".industries-tags a",
    ".industry-tags span",
    ".industry-list li",
    ".specialization-list li",
];

const AWARD_SELECTORS: &[&str] = &[
    r#"[data-test="award-badge"]"#,
    ".award-badge",
    ".awards-section .badge",
    ".badge.award",
];

const TESTIMONIAL_SELECTORS: &[&str] = &[
    ".testimonial-card",
    ".testimonial",
    ".client-testimonial",
    ".review-card",
];

const LOCATION_SELECTORS: &[&str] = &[
    ".locations li",
    ".office-locations li",
    ".location-card",
];

/// Output-size bounds; exact-string dedup, not semantic.
const SERVICE_CAP: usize = 20;
const INDUSTRY_CAP: usize = 15;
const TESTIMONIAL_CAP: usize = 3;
const LOCATION_CAP: usize = 10;

/// Extract an organization fragment from raw markup.
pub fn extract(doc: &Html) -> Fragment {
    let text = page_text(doc);

    let locations = {
        let from_dom = collect_texts(doc, LOCATION_SELECTORS, LOCATION_CAP);
        if from_dom.is_empty() {
            labeled(&text, r"(?i)\bLocations?\s*:?\s*\n?([^\n]+)")
                .into_iter()
                .collect()
        } else {
            from_dom
        }
    };

    Fragment {
        name: select_first_text(doc, &["h1"]),
        description: description_section(doc),
        website: visit_website_anchor(doc),
        phone: anchor_with_scheme(doc, "tel:"),
        email: anchor_with_scheme(doc, "mailto:"),
        address: None,
        rating: rating_text(doc),
        review_count: labeled(&text, r"(?i)([0-9][0-9,]*)\s+reviews?"),
        min_budget: labeled(&text, r"(?i)Min\.?(?:imum)?\s+project\s+size\s*:?\s*\n?([^\n]+)"),
        hourly_rate: labeled(&text, r"(?i)Hourly\s+rate\s*:?\s*\n?([^\n]+)"),
        employees: labeled(&text, r"(?i)\bEmployees\s*:?\s*\n?([^\n]+)"),
        verified: select_first_text(doc, &[r#"[class*="verified"]"#]),
        locations,
        services: collect_texts(doc, SERVICE_SELECTORS, SERVICE_CAP),
        industries: collect_texts(doc, INDUSTRY_SELECTORS, INDUSTRY_CAP),
        awards: collect_texts(doc, AWARD_SELECTORS, usize::MAX),
        testimonials: testimonials(doc),
    }
}

/// Profile links discovered in listing markup: direct profile hrefs,
/// data attributes, card fallbacks, redirect-wrapped hrefs, and
/// markdown-style links that survive in text content.
pub fn discover_profile_links(doc: &Html, base: &Url) -> Vec<Url> {
    let mut out = Vec::new();

    let attr_sources: &[(&str, &str)] = &[
        (r#"a[href*="/profile/"]"#, "href"),
        ("a[data-profile-url]", "data-profile-url"),
        (r#"h3 a[href*="/profile/"]"#, "href"),
        (r#".provider-card a[href*="/profile/"]"#, "href"),
        (r#".directory-listing a[href*="/profile/"]"#, "href"),
    ];

    for (selector, attr) in attr_sources {
        let sel = Selector::parse(selector).unwrap();
        for el in doc.select(&sel) {
            let Some(raw) = el.value().attr(attr) else {
                continue;
            };
            let candidate = unwrap_redirect(raw);
            if !candidate.contains(PROFILE_PATH_SEGMENT) {
                continue;
            }
            if let Ok(url) = base.join(&candidate) {
                out.push(url);
            }
        }
    }

    // Markdown-style links occasionally leak into rendered text.
    let md_link = Regex::new(r"\]\(([^)\s]*/profile/[^)\s]*)\)").unwrap();
    let text = page_text(doc);
    for cap in md_link.captures_iter(&text) {
        if let Ok(url) = base.join(&cap[1]) {
            out.push(url);
        }
    }

    out
}

/// The directory wraps outbound links in `…/redirect?u=<encoded>`; unwrap
/// to the real target when present.
fn unwrap_redirect(raw: &str) -> String {
    if let Ok(url) = Url::parse(raw) {
        if url.path().ends_with("/redirect") {
            if let Some((_, target)) = url.query_pairs().find(|(k, _)| k == "u") {
                return target.into_owned();
            }
        }
    }
    raw.to_string()
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

/// First non-empty text for an ordered selector chain.
fn select_first_text(doc: &Html, selectors: &[&str]) -> Option<String> {
    for selector in selectors {
        let sel = Selector::parse(selector).unwrap();
        for el in doc.select(&sel) {
            if let Some(text) = clean(&el.text().collect::<String>()) {
                return Some(collapse_ws(&text));
            }
        }
    }
    None
}

/// All non-empty texts across a selector chain, exact-string deduplicated
/// and capped.
fn collect_texts(doc: &Html, selectors: &[&str], cap: usize) -> Vec<String> {
    let mut seen = Vec::new();
    for selector in selectors {
        let sel = Selector::parse(selector).unwrap();
        for el in doc.select(&sel) {
            if seen.len() >= cap {
                return seen;
            }
            let text = collapse_ws(&el.text().collect::<String>());
            if text.len() > 1 && !seen.contains(&text) {
                seen.push(text);
            }
        }
    }
    seen
}

fn testimonials(doc: &Html) -> Vec<String> {
    collect_texts(doc, TESTIMONIAL_SELECTORS, TESTIMONIAL_CAP)
}

/// First number inside the first rating-classed element.
fn rating_text(doc: &Html) -> Option<String> {
    let raw = select_first_text(doc, &[r#"[class*="rating"]"#])?;
    let number = Regex::new(r"[0-9]+(?:[.,][0-9]+)?").unwrap();
    number.find(&raw).map(|m| m.as_str().to_string())
}

/// Labeled-pattern fallback over flattened page text. The capture group is
/// the field value.
fn labeled(text: &str, pattern: &str) -> Option<String> {
    let re = Regex::new(pattern).unwrap();
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| clean(m.as_str()))
}

/// About/Overview section: heading text match, then sibling content until
/// the next heading.
fn description_section(doc: &Html) -> Option<String> {
    let h2 = Selector::parse("h2").unwrap();
    for heading in doc.select(&h2) {
        let title = heading.text().collect::<String>().to_lowercase();
        if !(title.contains("about") || title.contains("overview") || title.contains("empowering"))
        {
            continue;
        }
        let mut parts = Vec::new();
        for sibling in heading.next_siblings() {
            let Some(el) = ElementRef::wrap(sibling) else {
                continue;
            };
            if el.value().name() == "h2" {
                break;
            }
            if matches!(el.value().name(), "script" | "style" | "noscript") {
                continue;
            }
            let text = collapse_ws(&el.text().collect::<String>());
            if !text.is_empty() {
                parts.push(text);
            }
        }
        if !parts.is_empty() {
            return Some(parts.join(" "));
        }
    }
    None
}

/// "Visit website"-style anchors, skipping contact schemes.
fn visit_website_anchor(doc: &Html) -> Option<String> {
    let anchors = Selector::parse("a[href]").unwrap();
    let wanted = Regex::new(r"(?i)visit|website").unwrap();
    for el in doc.select(&anchors) {
        let text = collapse_ws(&el.text().collect::<String>());
        if !wanted.is_match(&text) {
            continue;
        }
        let href = el.value().attr("href").unwrap_or_default();
        if href.is_empty() || href.starts_with('#') || href.starts_with("tel:")
            || href.starts_with("mailto:")
        {
            continue;
        }
        return Some(href.to_string());
    }
    None
}

/// First `tel:`/`mailto:` anchor, stripped to the bare value.
fn anchor_with_scheme(doc: &Html, scheme: &str) -> Option<String> {
    let sel = Selector::parse(&format!(r#"a[href^="{scheme}"]"#)).unwrap();
    let el = doc.select(&sel).next()?;
    let href = el.value().attr("href")?;
    let value = href.strip_prefix(scheme)?;
    // mailto links can carry ?subject=… parameters
    let value = value.split('?').next().unwrap_or(value);
    clean(value)
}

/// Flattened page text, one line per text node, with script/style/noscript
/// and embedded frames excluded.
pub(crate) fn page_text(doc: &Html) -> String {
    let body_sel = Selector::parse("body").unwrap();
    let Some(body) = doc.select(&body_sel).next() else {
        return String::new();
    };

    const SKIP: &[&str] = &["script", "style", "noscript", "iframe", "template"];
    let mut lines = Vec::new();
    for node in body.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let suppressed = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|el| SKIP.contains(&el.name()))
        });
        if suppressed {
            continue;
        }
        let line = collapse_ws(text);
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines.join("\n")
}
