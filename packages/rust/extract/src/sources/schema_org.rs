//! Structured-metadata extractor (JSON-LD).
//!
//! Directory pages embed `application/ld+json` blocks describing the listed
//! organizations. Each block is parsed independently — one malformed block
//! never hides the others — and nested containers (`@graph`, `mainEntity`,
//! `item`, `itemListElement`) are walked to find the first node whose
//! declared `@type` looks like an organization. On listing pages the same
//! blocks seed profile-link discovery through `url`/`sameAs`/`@id` values.

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use url::Url;

use super::{Fragment, clean};

/// Nesting bound for walking untrusted JSON-LD graphs.
const MAX_WALK_DEPTH: usize = 16;

/// Container keys that JSON-LD wraps entities in.
const CONTAINER_KEYS: &[&str] = &["@graph", "mainEntity", "item", "itemListElement"];

/// Keys whose string values are identity links worth following.
const LINK_KEYS: &[&str] = &["url", "sameAs", "@id"];

/// Parse every JSON-LD script on the page, skipping malformed blocks.
pub fn parse_blocks(doc: &Html) -> Vec<Value> {
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).unwrap();
    let mut blocks = Vec::new();
    for script in doc.select(&selector) {
        let raw: String = script.text().collect();
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => blocks.push(value),
            Err(e) => tracing::debug!(error = %e, "skipping malformed JSON-LD block"),
        }
    }
    blocks
}

/// Extract an organization fragment from the page's JSON-LD, if any block
/// (or nested node) declares an organization-like type.
pub fn extract(doc: &Html) -> Fragment {
    let blocks = parse_blocks(doc);
    let Some(org) = find_organization(&blocks) else {
        return Fragment::default();
    };

    let aggregate = org.get("aggregateRating");

    Fragment {
        name: str_field(org, "name"),
        description: str_field(org, "description"),
        website: str_field(org, "url").or_else(|| same_as(org)),
        phone: str_field(org, "telephone"),
        email: str_field(org, "email"),
        address: org.get("address").and_then(format_address),
        rating: aggregate
            .and_then(|a| a.get("ratingValue"))
            .and_then(value_to_string),
        review_count: aggregate
            .and_then(|a| a.get("reviewCount"))
            .and_then(value_to_string),
        min_budget: str_field(org, "priceRange"),
        employees: org.get("numberOfEmployees").and_then(employees_value),
        ..Fragment::default()
    }
}

/// All URLs reachable through identity/same-as/item links in the page's
/// JSON-LD, resolved against `base`. Seeds profile discovery on listings.
pub fn discover_links(doc: &Html, base: &Url) -> Vec<Url> {
    let blocks = parse_blocks(doc);
    let mut out = Vec::new();
    for block in &blocks {
        walk_links(block, base, &mut out, 0);
    }
    out
}

/// First organization-like node across all blocks, in document order.
pub fn find_organization(blocks: &[Value]) -> Option<&Value> {
    blocks.iter().find_map(|block| find_org_node(block, 0))
}

fn find_org_node(node: &Value, depth: usize) -> Option<&Value> {
    if depth > MAX_WALK_DEPTH {
        return None;
    }
    match node {
        Value::Array(items) => items.iter().find_map(|item| find_org_node(item, depth + 1)),
        Value::Object(map) => {
            if is_organization(node) {
                return Some(node);
            }
            CONTAINER_KEYS
                .iter()
                .filter_map(|key| map.get(*key))
                .find_map(|child| find_org_node(child, depth + 1))
        }
        _ => None,
    }
}

fn is_organization(node: &Value) -> bool {
    let org_type = Regex::new(r"(?i)(Organization|LocalBusiness|Agency|Corporation)").unwrap();
    match node.get("@type") {
        Some(Value::String(t)) => org_type.is_match(t),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .any(|t| org_type.is_match(t)),
        _ => false,
    }
}

fn walk_links(node: &Value, base: &Url, out: &mut Vec<Url>, depth: usize) {
    if depth > MAX_WALK_DEPTH {
        return;
    }
    match node {
        Value::Array(items) => {
            for item in items {
                walk_links(item, base, out, depth + 1);
            }
        }
        Value::Object(map) => {
            for key in LINK_KEYS {
                match map.get(*key) {
                    Some(Value::String(href)) => push_link(href, base, out),
                    Some(Value::Array(hrefs)) => {
                        for href in hrefs.iter().filter_map(Value::as_str) {
                            push_link(href, base, out);
                        }
                    }
                    _ => {}
                }
            }
            for key in CONTAINER_KEYS {
                if let Some(child) = map.get(*key) {
                    walk_links(child, base, out, depth + 1);
                }
            }
        }
        _ => {}
    }
}

fn push_link(href: &str, base: &Url, out: &mut Vec<Url>) {
    let href = href.trim();
    if href.is_empty() {
        return;
    }
    if let Ok(url) = base.join(href) {
        out.push(url);
    }
}

fn str_field(org: &Value, key: &str) -> Option<String> {
    org.get(key).and_then(value_to_string)
}

/// `sameAs` can be a string or an array; take the first usable string.
fn same_as(org: &Value) -> Option<String> {
    match org.get("sameAs") {
        Some(Value::String(s)) => clean(s),
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).find_map(clean),
        _ => None,
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => clean(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `numberOfEmployees` appears as a string, a number, or a QuantitativeValue.
fn employees_value(value: &Value) -> Option<String> {
    value_to_string(value).or_else(|| value.get("value").and_then(value_to_string))
}

/// A postal address is either a plain string or a PostalAddress object;
/// object fields are joined in display order.
fn format_address(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => clean(s),
        Value::Object(_) => {
            let parts: Vec<String> = [
                "streetAddress",
                "addressLocality",
                "addressRegion",
                "postalCode",
                "addressCountry",
            ]
            .iter()
            .filter_map(|field| value.get(*field).and_then(value_to_string))
            .collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(html: &str) -> Html {
        Html::parse_document(html)
    }

    const ORG_PAGE: &str = r#"<html><head>
        <script type="application/ld+json">{ this is not json }</script>
        <script type="application/ld+json">
        {"@context":"https://schema.org","@type":"LocalBusiness",
         "name":"Acme Digital",
         "url":"https://acme.example",
         "telephone":"+1 312 555 0100",
         "description":"Full-service agency.",
         "priceRange":"$5,000+",
         "numberOfEmployees":{"@type":"QuantitativeValue","value":"50 - 249"},
         "address":{"@type":"PostalAddress","streetAddress":"1 Main St",
                    "addressLocality":"Chicago","addressRegion":"IL",
                    "postalCode":"60601","addressCountry":"US"},
         "aggregateRating":{"@type":"AggregateRating","ratingValue":4.8,"reviewCount":"132"}}
        </script>
        </head><body></body></html>"#;

    #[test]
    fn malformed_block_does_not_hide_valid_one() {
        let fragment = extract(&doc(ORG_PAGE));
        assert_eq!(fragment.name.as_deref(), Some("Acme Digital"));
        assert_eq!(fragment.rating.as_deref(), Some("4.8"));
        assert_eq!(fragment.review_count.as_deref(), Some("132"));
        assert_eq!(fragment.employees.as_deref(), Some("50 - 249"));
        assert_eq!(
            fragment.address.as_deref(),
            Some("1 Main St, Chicago, IL, 60601, US")
        );
    }

    #[test]
    fn organization_found_inside_graph() {
        let html = r#"<script type="application/ld+json">
        {"@graph":[{"@type":"WebPage","name":"page"},
                   {"@type":["Thing","Organization"],"name":"Nested Org"}]}
        </script>"#;
        let fragment = extract(&doc(html));
        assert_eq!(fragment.name.as_deref(), Some("Nested Org"));
    }

    #[test]
    fn no_organization_yields_empty_fragment() {
        let html = r#"<script type="application/ld+json">
        {"@type":"BreadcrumbList","itemListElement":[]}
        </script>"#;
        assert_eq!(extract(&doc(html)), Fragment::default());
    }

    #[test]
    fn discovers_links_through_item_lists() {
        let html = r#"<script type="application/ld+json">
        {"@type":"ItemList","itemListElement":[
            {"@type":"ListItem","item":{"@type":"Organization","name":"A",
                "url":"/profile/alpha"}},
            {"@type":"ListItem","item":{"@type":"Organization","name":"B",
                "url":"https://clutch.co/profile/beta",
                "sameAs":["https://beta.example"]}}
        ]}
        </script>"#;
        let base = Url::parse("https://clutch.co/agencies").unwrap();
        let links = discover_links(&doc(html), &base);
        let as_strings: Vec<&str> = links.iter().map(Url::as_str).collect();
        assert!(as_strings.contains(&"https://clutch.co/profile/alpha"));
        assert!(as_strings.contains(&"https://clutch.co/profile/beta"));
        assert!(as_strings.contains(&"https://beta.example/"));
    }

    #[test]
    fn deep_nesting_is_bounded() {
        // Build a payload nested beyond the walk bound; must not recurse forever.
        let mut payload = String::from(r#"{"@type":"Organization","name":"deep"}"#);
        for _ in 0..40 {
            payload = format!(r#"{{"mainEntity":{payload}}}"#);
        }
        let html = format!(r#"<script type="application/ld+json">{payload}</script>"#);
        let fragment = extract(&doc(&html));
        assert!(fragment.name.is_none());
    }
}
