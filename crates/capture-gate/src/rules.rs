//! Static rule tables backing the interception verdict.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use url::Url;

/// Hosts whose traffic is never captured: loopback, the relay control plane
/// itself, and browser dev tooling. Capturing our own management calls would
/// feed the ledger with noise on every query.
static EXCLUDED_HOSTS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "localhost",
        "127.0.0.1",
        "0.0.0.0",
        "[::1]",
        "relay.tapforge.dev",
        "api.tapforge.dev",
        "chrome-devtools-frontend.appspot.com",
    ])
});

/// Schemes that never reach the network.
static EXCLUDED_SCHEMES: &[&str] = &[
    "about",
    "blob",
    "chrome",
    "chrome-extension",
    "chrome-untrusted",
    "data",
    "devtools",
    "edge",
    "file",
    "filesystem",
    "javascript",
    "view-source",
];

/// URL fragments that signal an API endpoint: versioned paths, GraphQL,
/// OAuth flows, raw JSON documents.
static API_URL_HINTS: &[&str] = &[
    "/api/",
    "/v1/",
    "/v2/",
    "/v3/",
    "/graphql",
    "/oauth",
    "/token",
    "/rest/",
    "/services/",
    ".json",
];

/// File extensions that mark a navigation as a static asset download.
static STATIC_EXTENSIONS: &[&str] = &[
    ".css", ".js", ".mjs", ".map", ".png", ".jpg", ".jpeg", ".gif", ".webp", ".avif", ".svg",
    ".ico", ".woff", ".woff2", ".ttf", ".otf", ".eot", ".mp3", ".mp4", ".webm",
];

/// Host prefixes/suffixes of known static-asset origins.
static STATIC_HOST_HINTS: &[&str] = &[
    "cdn.",
    "static.",
    "assets.",
    "fonts.googleapis.com",
    "fonts.gstatic.com",
    "cdnjs.cloudflare.com",
    "unpkg.com",
    "jsdelivr.net",
];

/// Exclusion-list check on host and scheme. Unparseable URLs do not match
/// here; later rules decide them.
pub(crate) fn is_excluded_url(raw: &str) -> bool {
    let Ok(parsed) = Url::parse(raw) else {
        return false;
    };
    if EXCLUDED_SCHEMES.contains(&parsed.scheme()) {
        return true;
    }
    match parsed.host_str() {
        Some(host) => {
            let host = host.to_ascii_lowercase();
            EXCLUDED_HOSTS.contains(host.as_str()) || host.ends_with(".localhost")
        }
        None => false,
    }
}

/// Substring scan for API-likelihood hints. Works on the raw string so it
/// also fires for URLs the parser rejects.
pub(crate) fn has_api_signature(raw: &str) -> bool {
    let lowered = raw.to_ascii_lowercase();
    API_URL_HINTS.iter().any(|hint| lowered.contains(hint))
}

/// Whether a navigation URL points at a static asset, by path extension or
/// known asset host. Unparseable URLs count as static so the caller denies
/// them.
pub(crate) fn looks_static(raw: &str) -> bool {
    let Ok(parsed) = Url::parse(raw) else {
        return true;
    };
    let path = parsed.path().to_ascii_lowercase();
    if STATIC_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return true;
    }
    match parsed.host_str() {
        Some(host) => {
            let host = host.to_ascii_lowercase();
            STATIC_HOST_HINTS
                .iter()
                .any(|hint| host.starts_with(hint) || host.ends_with(hint))
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_and_control_plane_are_excluded() {
        assert!(is_excluded_url("http://localhost:3000/api/data"));
        assert!(is_excluded_url("http://127.0.0.1:8080/"));
        assert!(is_excluded_url("https://relay.tapforge.dev/queries/solve"));
        assert!(is_excluded_url("http://dev.localhost/health"));
        assert!(!is_excluded_url("https://shop.example.com/api/cart"));
    }

    #[test]
    fn non_network_schemes_are_excluded() {
        assert!(is_excluded_url("chrome://settings/"));
        assert!(is_excluded_url("devtools://devtools/bundled/inspector.html"));
        assert!(is_excluded_url("data:text/plain;base64,aGk="));
        assert!(is_excluded_url("about:blank"));
    }

    #[test]
    fn api_signatures_match_case_insensitively() {
        assert!(has_api_signature("https://example.com/API/cart"));
        assert!(has_api_signature("https://example.com/graphql?op=Q"));
        assert!(has_api_signature("https://example.com/data/feed.json"));
        assert!(!has_api_signature("https://example.com/about-us"));
    }

    #[test]
    fn static_detection_uses_path_not_query() {
        assert!(looks_static("https://example.com/bundle.js"));
        assert!(looks_static("https://example.com/logo.png?cache=1.css"));
        assert!(looks_static("https://cdn.example.com/page"));
        assert!(looks_static("https://example.com/fonts/a.woff2"));
        assert!(!looks_static("https://example.com/checkout?theme=.css"));
        assert!(looks_static("not a url"));
    }
}
