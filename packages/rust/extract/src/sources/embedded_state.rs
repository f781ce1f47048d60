//! Embedded-state extractor (framework hydration payloads).
//!
//! The directory has shipped several front ends over the years, each
//! leaving its server-computed state in the markup under a different
//! global: a `__NEXT_DATA__` JSON script tag, `window.__NUXT__`,
//! `window.__INITIAL_STATE__`, or a `Drupal.settings` extend call. The
//! payloads are frequently not strict JSON — unquoted keys, single-quoted
//! strings, trailing commas, `undefined` — so strict parsing falls back to
//! a tolerant object-literal rewrite before giving up.
//!
//! The parsed graph is walked (depth-bounded) to find profile-page paths
//! and a node that looks like the organization's own state.

use regex::Regex;
use serde_json::Value;
use url::Url;

use super::Fragment;
use crate::PROFILE_PATH_SEGMENT;

/// Global-state assignment patterns seen on the target site over time.
const STATE_MARKERS: &[&str] = &[
    "window.__NEXT_DATA__",
    "window.__NUXT__",
    "window.__INITIAL_STATE__",
    "window.__PRELOADED_STATE__",
    "Drupal.settings",
];

/// The object literal must start within this many bytes of its marker,
/// otherwise the brace belongs to something else.
const MARKER_WINDOW: usize = 64;

/// Nesting bound for walking untrusted state graphs.
const MAX_WALK_DEPTH: usize = 64;

/// Extract an organization fragment from the page's embedded state.
pub fn extract(html: &str) -> Fragment {
    let Some(state) = parse_state(html) else {
        return Fragment::default();
    };
    let Some(org) = find_org_map(&state, 0) else {
        return Fragment::default();
    };

    Fragment {
        name: first_str(org, &["name", "title"]),
        description: first_str(org, &["description", "about"]),
        website: first_str(org, &["website", "url", "uri"]),
        phone: first_str(org, &["phone", "telephone"]),
        email: first_str(org, &["email"]),
        address: first_str(org, &["address", "location"]),
        rating: first_display(org, &["rating", "avg_rating", "ratingValue"]),
        review_count: first_display(org, &["review_count", "reviews_count", "reviewCount"]),
        employees: first_display(org, &["employees", "company_size", "size"]),
        min_budget: first_str(org, &["min_project_size", "min_budget"]),
        hourly_rate: first_str(org, &["hourly_rate"]),
        ..Fragment::default()
    }
}

/// All strings in the embedded state that look like profile-page paths,
/// resolved against `base`.
pub fn discover_profile_urls(html: &str, base: &Url) -> Vec<Url> {
    let Some(state) = parse_state(html) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    walk_strings(&state, 0, &mut |s| {
        if s.contains(PROFILE_PATH_SEGMENT) {
            if let Ok(url) = base.join(s.trim()) {
                out.push(url);
            }
        }
    });
    out
}

/// Locate and parse the first usable state payload on the page.
pub fn parse_state(html: &str) -> Option<Value> {
    // Next.js ships its payload as a plain JSON script tag.
    if let Some(raw) = next_data_script(html) {
        match serde_json::from_str(raw.trim()) {
            Ok(value) => return Some(value),
            Err(e) => tracing::debug!(error = %e, "__NEXT_DATA__ script tag unparsable"),
        }
    }

    for &marker in STATE_MARKERS {
        let Some(found) = html.find(marker) else {
            continue;
        };
        let after = found + marker.len();
        let Some(rel) = html[after..].find('{') else {
            continue;
        };
        if rel > MARKER_WINDOW {
            continue;
        }
        let open = after + rel;
        let Some(literal) = capture_object(html, open) else {
            continue;
        };

        if let Ok(value) = serde_json::from_str::<Value>(literal) {
            return Some(value);
        }
        match serde_json::from_str::<Value>(&repair_literal(literal)) {
            Ok(value) => return Some(value),
            Err(e) => tracing::debug!(marker, error = %e, "state payload unparsable after repair"),
        }
    }

    None
}

fn next_data_script(html: &str) -> Option<&str> {
    let re = Regex::new(r#"(?is)<script[^>]*id="__NEXT_DATA__"[^>]*>(.*?)</script>"#).unwrap();
    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Capture a balanced `{…}` literal starting at `open`, honoring string
/// literals (all three JS quote styles) and escapes.
pub(crate) fn capture_object(src: &str, open: usize) -> Option<&str> {
    let bytes = src.as_bytes();
    if bytes.get(open) != Some(&b'{') {
        return None;
    }
    let mut depth = 0usize;
    let mut in_string: Option<u8> = None;
    let mut i = open;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(quote) = in_string {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == quote {
                in_string = None;
            }
        } else {
            match b {
                b'"' | b'\'' | b'`' => in_string = Some(b),
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(&src[open..=i]);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// Rewrite a loose JS object literal into strict JSON: quote bare keys,
/// convert single-quoted strings, drop trailing commas, and map
/// `undefined`/`NaN`/bare references to `null`. Anything the rewrite cannot
/// salvage still fails the subsequent parse and degrades the fragment.
pub(crate) fn repair_literal(src: &str) -> String {
    let chars: Vec<char> = src.chars().collect();
    let mut out = String::with_capacity(src.len() + 16);
    let mut last_sig = '\0';
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' | '\'' => {
                let quote = c;
                out.push('"');
                i += 1;
                while i < chars.len() {
                    let ch = chars[i];
                    if ch == '\\' && i + 1 < chars.len() {
                        let esc = chars[i + 1];
                        // JSON has no \' escape; an escaped single quote
                        // becomes a plain one
                        if esc == '\'' {
                            out.push('\'');
                        } else {
                            out.push('\\');
                            out.push(esc);
                        }
                        i += 2;
                        continue;
                    }
                    if ch == quote {
                        break;
                    }
                    if ch == '"' {
                        out.push_str("\\\"");
                    } else {
                        out.push(ch);
                    }
                    i += 1;
                }
                i += 1; // closing quote
                out.push('"');
                last_sig = '"';
            }
            ',' => {
                let mut j = i + 1;
                while j < chars.len() && chars[j].is_whitespace() {
                    j += 1;
                }
                // trailing comma before a closer: drop it
                if j < chars.len() && (chars[j] == '}' || chars[j] == ']') {
                    i += 1;
                } else {
                    out.push(',');
                    last_sig = ',';
                    i += 1;
                }
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
                {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();

                let mut j = i;
                while j < chars.len() && chars[j].is_whitespace() {
                    j += 1;
                }
                let is_key =
                    j < chars.len() && chars[j] == ':' && matches!(last_sig, '{' | ',' | '\0');

                if is_key {
                    out.push('"');
                    out.push_str(&ident);
                    out.push('"');
                    last_sig = '"';
                } else {
                    match ident.as_str() {
                        "true" | "false" | "null" => out.push_str(&ident),
                        // undefined, NaN, Infinity, bare references, calls:
                        // none of these survive as JSON
                        _ => out.push_str("null"),
                    }
                    last_sig = 'l';
                }
            }
            c => {
                out.push(c);
                if !c.is_whitespace() {
                    last_sig = c;
                }
                i += 1;
            }
        }
    }

    out
}

// ---------------------------------------------------------------------------
// Graph walking
// ---------------------------------------------------------------------------

fn find_org_map(value: &Value, depth: usize) -> Option<&serde_json::Map<String, Value>> {
    if depth > MAX_WALK_DEPTH {
        return None;
    }
    match value {
        Value::Object(map) => {
            if looks_like_org(map) {
                return Some(map);
            }
            map.values().find_map(|v| find_org_map(v, depth + 1))
        }
        Value::Array(items) => items.iter().find_map(|v| find_org_map(v, depth + 1)),
        _ => None,
    }
}

/// An org-like node carries a display name plus an identity field
/// (slug/url/website) — enough to tell it apart from UI state.
fn looks_like_org(map: &serde_json::Map<String, Value>) -> bool {
    let named = ["name", "title"]
        .iter()
        .any(|k| non_empty_str(map.get(*k)).is_some());
    let identified = ["slug", "url", "uri", "website", "profile_url"]
        .iter()
        .any(|k| non_empty_str(map.get(*k)).is_some());
    named && identified
}

fn walk_strings(value: &Value, depth: usize, visit: &mut impl FnMut(&str)) {
    if depth > MAX_WALK_DEPTH {
        return;
    }
    match value {
        Value::String(s) => visit(s),
        Value::Array(items) => {
            for item in items {
                walk_strings(item, depth + 1, visit);
            }
        }
        Value::Object(map) => {
            for v in map.values() {
                walk_strings(v, depth + 1, visit);
            }
        }
        _ => {}
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn first_str(map: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| non_empty_str(map.get(*k)).map(str::to_string))
}

/// Like [`first_str`] but also accepts numbers, rendered as strings for the
/// merger's tolerant coercion.
fn first_display(map: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match map.get(*k) {
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
