//! URL canonicalization for frontier deduplication.
//!
//! Two URLs that normalize identically are the same crawl target — the
//! whole frontier's dedup invariant rests on this. Profile links get a
//! stricter form that also drops the query string, because the directory
//! attaches volatile tracking parameters to otherwise-identical profile
//! URLs.

use url::Url;

/// Canonicalize a URL: parse, keep http(s) only, drop the fragment, and
/// strip a single trailing slash from a multi-segment path.
/// Returns `None` for unparsable input.
pub fn normalize(raw: &str) -> Option<Url> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    url.set_fragment(None);

    let path = url.path();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path[..path.len() - 1].to_string();
        url.set_path(&trimmed);
    }

    Some(url)
}

/// Canonical dedup key for a listing-page URL. The query survives —
/// `page=2` is a different listing page.
pub fn listing_key(raw: &str) -> Option<String> {
    normalize(raw).map(Into::into)
}

/// Canonical dedup key for a profile-page URL: normalized with the query
/// dropped entirely.
pub fn profile_key(raw: &str) -> Option<String> {
    let mut url = normalize(raw)?;
    url.set_query(None);
    Some(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_is_idempotent() {
        for raw in [
            "https://clutch.co/agencies",
            "https://clutch.co/agencies/",
            "https://clutch.co/agencies?page=2#results",
            "https://clutch.co/profile/acme/?ref=list",
        ] {
            let once = normalize(raw).expect("valid URL").to_string();
            let twice = normalize(&once).expect("still valid").to_string();
            assert_eq!(once, twice, "normalize must be idempotent for {raw}");
        }
    }

    #[test]
    fn trailing_slash_and_fragment_collapse() {
        let a = normalize("https://clutch.co/profile/acme/").unwrap();
        let b = normalize("https://clutch.co/profile/acme#reviews").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn root_slash_survives() {
        let url = normalize("https://clutch.co/").unwrap();
        assert_eq!(url.path(), "/");
    }

    #[test]
    fn listing_key_keeps_query() {
        let one = listing_key("https://clutch.co/agencies?page=1").unwrap();
        let two = listing_key("https://clutch.co/agencies?page=2").unwrap();
        assert_ne!(one, two);
    }

    #[test]
    fn profile_key_drops_volatile_query() {
        let a = profile_key("https://clutch.co/profile/acme?utm_source=list").unwrap();
        let b = profile_key("https://clutch.co/profile/acme/").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unparsable_input_is_none() {
        assert!(normalize("not a url").is_none());
        assert!(normalize("mailto:hi@example.com").is_none());
        assert!(profile_key("").is_none());
    }
}
