//! Route-pattern matching for endpoint policies.
//!
//! Patterns come straight from the control plane and may contain `{param}`
//! segments (one path segment) or `*` (any sequence). Matching is anchored
//! and case-insensitive, and leading slashes are ignored on both sides so
//! `api/users` and `/api/users` compare equal.

use regex::Regex;

/// Whether a route pattern needs wildcard matching at all.
pub fn is_wildcard(route: &str) -> bool {
    route.contains('*') || route.contains('{')
}

/// Translates a route pattern into an anchored, case-insensitive regex
/// source. Everything except `{param}` segments and `*` is matched literally.
pub fn regex_source(pattern: &str) -> String {
    let segments: Vec<String> = pattern
        .trim_start_matches('/')
        .split('/')
        .map(segment_source)
        .collect();
    format!("(?i)^{}$", segments.join("/"))
}

fn segment_source(segment: &str) -> String {
    if segment.len() >= 2 && segment.starts_with('{') && segment.ends_with('}') {
        return "[^/]+".to_string();
    }
    let mut out = String::with_capacity(segment.len());
    for ch in segment.chars() {
        if ch == '*' {
            out.push_str(".*");
        } else {
            out.push_str(&regex::escape(&ch.to_string()));
        }
    }
    out
}

/// Compiles `pattern` and tests it against `path`. Patterns that fail to
/// compile never match.
pub fn matches(pattern: &str, path: &str) -> bool {
    match Regex::new(&regex_source(pattern)) {
        Ok(re) => re.is_match(path.trim_start_matches('/')),
        Err(err) => {
            tracing::warn!(pattern, %err, "unusable route pattern");
            false
        }
    }
}
