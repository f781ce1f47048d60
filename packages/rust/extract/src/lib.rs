//! Multi-source profile extraction for AgencyScout.
//!
//! This crate provides:
//! - [`sources`] — the three independent extractors (structured metadata,
//!   embedded state, DOM heuristics), each pure and panic-free
//! - [`merge`] — precedence resolution of the three fragments into one
//!   [`agencyscout_shared::AgencyRecord`]
//! - [`pagination`] — next-listing-page resolution with synthetic fallback
//! - [`numeric`] — tolerant coercion of display-formatted numbers

pub mod merge;
pub mod numeric;
pub mod pagination;
pub mod sources;

pub use merge::{MergeContext, MergeError, merge};
pub use pagination::resolve_next;
pub use sources::Fragment;

use url::Url;

/// Path segment that marks an organization profile URL.
pub const PROFILE_PATH_SEGMENT: &str = "/profile/";

/// Whether a URL points at an organization profile page.
pub fn is_profile_url(url: &Url) -> bool {
    url.path().contains(PROFILE_PATH_SEGMENT)
}

/// Union of profile-link candidates from all three sources on a listing
/// page, filtered to profile URLs, in discovery order.
pub fn discover_profile_candidates(doc: &scraper::Html, html: &str, base: &Url) -> Vec<Url> {
    let mut candidates = sources::schema_org::discover_links(doc, base);
    candidates.extend(sources::embedded_state::discover_profile_urls(html, base));
    candidates.extend(sources::dom::discover_profile_links(doc, base));

    let mut seen = Vec::new();
    for candidate in candidates {
        if is_profile_url(&candidate) && !seen.contains(&candidate) {
            seen.push(candidate);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn merge_page(html: &str, url: &str) -> Result<agencyscout_shared::AgencyRecord, MergeError> {
        let doc = Html::parse_document(html);
        let ctx = MergeContext {
            url: Url::parse(url).unwrap(),
            source: "clutch.co".into(),
            category: None,
            location: None,
        };
        merge(
            sources::schema_org::extract(&doc),
            sources::embedded_state::extract(html),
            sources::dom::extract(&doc),
            &ctx,
        )
    }

    // -----------------------------------------------------------------------
    // Full-pipeline extraction over one page
    // -----------------------------------------------------------------------

    #[test]
    fn structured_metadata_outranks_dom() {
        let html = r#"<html><head>
            <script type="application/ld+json">
            {"@type":"Organization","name":"Acme","aggregateRating":
             {"ratingValue":"4.9","reviewCount":"10"}}
            </script></head>
            <body><h1>Acme Corp</h1>
            <div class="rating">3.1</div></body></html>"#;

        let record = merge_page(html, "https://clutch.co/profile/acme").unwrap();
        assert_eq!(record.name, "Acme");
        assert_eq!(record.rating, Some(4.9));
    }

    #[test]
    fn malformed_upper_sources_fall_back_to_dom() {
        // Both machine sources are broken; the <h1> still names the org.
        let html = r#"<html><head>
            <script type="application/ld+json">{broken json</script>
            <script>window.__INITIAL_STATE__ = {also: [broken};</script>
            </head><body><h1>Acme Agency</h1></body></html>"#;

        let record = merge_page(html, "https://clutch.co/profile/acme-agency").unwrap();
        assert_eq!(record.name, "Acme Agency");
        assert_eq!(record.rating, None);
        assert_eq!(record.website, None);
        assert!(record.services.is_empty());
    }

    #[test]
    fn nameless_page_is_rejected() {
        let html = "<html><body><p>Pardon our interruption</p></body></html>";
        let err = merge_page(html, "https://clutch.co/profile/blocked").unwrap_err();
        assert_eq!(err, MergeError::NoName);
    }

    // -----------------------------------------------------------------------
    // Listing-side candidate discovery
    // -----------------------------------------------------------------------

    #[test]
    fn candidates_union_all_three_sources() {
        let html = r#"<html><head>
            <script type="application/ld+json">
            {"@type":"ItemList","itemListElement":[
              {"item":{"@type":"Organization","url":"/profile/from-jsonld"}}]}
            </script>
            <script>window.__NUXT__ = {links: ['/profile/from-state']};</script>
            </head><body>
            <a href="/profile/from-dom">Dom Co</a>
            <a href="/profile/from-jsonld?utm=x">duplicate of jsonld</a>
            <a href="/about">not a profile</a>
            </body></html>"#;

        let doc = Html::parse_document(html);
        let base = Url::parse("https://clutch.co/agencies").unwrap();
        let candidates = discover_profile_candidates(&doc, html, &base);
        let as_strings: Vec<&str> = candidates.iter().map(Url::as_str).collect();

        assert!(as_strings.contains(&"https://clutch.co/profile/from-jsonld"));
        assert!(as_strings.contains(&"https://clutch.co/profile/from-state"));
        assert!(as_strings.contains(&"https://clutch.co/profile/from-dom"));
        assert!(!as_strings.iter().any(|s| s.ends_with("/about")));
    }

    #[test]
    fn is_profile_url_checks_path_only() {
        assert!(is_profile_url(
            &Url::parse("https://clutch.co/profile/acme").unwrap()
        ));
        assert!(!is_profile_url(
            &Url::parse("https://clutch.co/agencies?q=/profile/").unwrap()
        ));
    }
}
