//! Per-domain cache of previously observed request headers.
//!
//! The capture side records the headers of every intercepted request here;
//! the relay side reads them back when it executes a tool against the same
//! domain, so the call goes out with the session's live credentials
//! (cookies, bearer tokens, CSRF headers) without any explicit login step.
//!
//! This is a plaintext, process-lifetime convenience cache. It is not a
//! secrets store and offers no security boundary.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tapforge_core_types::HeaderMap;
use tracing::debug;
use url::Url;

/// Volume and connection-management headers that make no sense to replay.
static EXCLUDED_HEADERS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "accept-encoding",
        "connection",
        "content-length",
        "host",
        "keep-alive",
        "proxy-connection",
        "te",
        "trailer",
        "transfer-encoding",
        "upgrade",
    ])
});

/// Header names that carry credentials. When vaulted values are merged into
/// a tool's parameter template, these win over template values; everything
/// else defers to the template.
static AUTH_SENSITIVE_HEADERS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "authorization",
        "cookie",
        "proxy-authorization",
        "x-access-token",
        "x-api-key",
        "x-auth-token",
        "x-csrf-token",
        "x-session-id",
        "x-xsrf-token",
    ])
});

/// Whether a header name carries credentials, case-insensitively.
pub fn is_auth_sensitive(name: &str) -> bool {
    AUTH_SENSITIVE_HEADERS.contains(name.to_ascii_lowercase().as_str())
}

/// One domain's cached headers and when they were last observed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VaultEntry {
    pub headers: HeaderMap,
    pub recorded_at: DateTime<Utc>,
}

/// The cache itself: hostname → most recently observed header set.
#[derive(Debug, Default)]
pub struct HeaderVault {
    entries: DashMap<String, VaultEntry>,
}

impl HeaderVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the replayable subset of `headers` under the URL's hostname,
    /// overwriting whatever was there. Returns false when the URL has no
    /// host or nothing survives filtering, so stale credentials are never
    /// clobbered by an empty capture.
    pub fn record(&self, url: &str, headers: &HeaderMap) -> bool {
        let Some(domain) = hostname_of(url) else {
            return false;
        };
        let kept: HeaderMap = headers
            .iter()
            .filter(|(name, _)| is_replayable(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        if kept.is_empty() {
            return false;
        }
        debug!(
            target: "header-vault",
            %domain,
            headers = kept.len(),
            "recorded header set"
        );
        self.entries.insert(
            domain,
            VaultEntry {
                headers: kept,
                recorded_at: Utc::now(),
            },
        );
        true
    }

    /// Headers last observed for a domain, if any.
    pub fn get(&self, domain: &str) -> Option<HeaderMap> {
        self.entries
            .get(&domain.to_ascii_lowercase())
            .map(|entry| entry.headers.clone())
    }

    /// The most recently recorded header set across all domains. Loose
    /// fallback for tools whose domain was never captured directly.
    pub fn most_recent(&self) -> Option<HeaderMap> {
        self.entries
            .iter()
            .max_by_key(|entry| entry.value().recorded_at)
            .map(|entry| entry.value().headers.clone())
    }

    /// Headers for a domain, falling back to the most recent set anywhere.
    pub fn get_or_most_recent(&self, domain: &str) -> Option<HeaderMap> {
        self.get(domain).or_else(|| self.most_recent())
    }

    pub fn domains(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

fn hostname_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(|host| host.to_ascii_lowercase()))
}

fn is_replayable(name: &str) -> bool {
    let lowered = name.to_ascii_lowercase();
    // ":authority" and friends are transport pseudo-headers.
    !lowered.starts_with(':') && !EXCLUDED_HEADERS.contains(lowered.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn record_filters_transport_headers() {
        let vault = HeaderVault::new();
        let stored = vault.record(
            "https://shop.example.com/api/cart",
            &headers(&[
                ("Cookie", "session=abc"),
                ("Content-Length", "42"),
                ("Connection", "keep-alive"),
                (":authority", "shop.example.com"),
                ("X-Csrf-Token", "tok"),
            ]),
        );
        assert!(stored);
        let kept = vault.get("shop.example.com").expect("entry");
        assert_eq!(kept.len(), 2);
        assert_eq!(kept.get("Cookie").map(String::as_str), Some("session=abc"));
        assert_eq!(kept.get("X-Csrf-Token").map(String::as_str), Some("tok"));
    }

    #[test]
    fn record_overwrites_per_domain() {
        let vault = HeaderVault::new();
        vault.record(
            "https://shop.example.com/a",
            &headers(&[("Authorization", "Bearer old")]),
        );
        vault.record(
            "https://shop.example.com/b",
            &headers(&[("Authorization", "Bearer new")]),
        );
        let kept = vault.get("shop.example.com").expect("entry");
        assert_eq!(
            kept.get("Authorization").map(String::as_str),
            Some("Bearer new")
        );
        assert_eq!(vault.len(), 1);
    }

    #[test]
    fn empty_after_filtering_is_not_stored() {
        let vault = HeaderVault::new();
        vault.record(
            "https://shop.example.com/a",
            &headers(&[("Cookie", "session=abc")]),
        );
        let stored = vault.record(
            "https://shop.example.com/b",
            &headers(&[("Content-Length", "10")]),
        );
        assert!(!stored);
        assert!(vault.get("shop.example.com").is_some());
    }

    #[test]
    fn most_recent_tracks_insertion_order() {
        let vault = HeaderVault::new();
        vault.record("https://a.example.com/x", &headers(&[("Cookie", "a=1")]));
        std::thread::sleep(std::time::Duration::from_millis(2));
        vault.record("https://b.example.com/y", &headers(&[("Cookie", "b=2")]));
        let recent = vault.most_recent().expect("entry");
        assert_eq!(recent.get("Cookie").map(String::as_str), Some("b=2"));
    }

    #[test]
    fn lookup_is_case_insensitive_on_domain() {
        let vault = HeaderVault::new();
        vault.record("https://Shop.Example.com/", &headers(&[("Cookie", "x=1")]));
        assert!(vault.get("shop.example.com").is_some());
        assert!(vault.get("SHOP.EXAMPLE.COM").is_some());
    }

    #[test]
    fn auth_sensitive_names_match_case_insensitively() {
        assert!(is_auth_sensitive("Authorization"));
        assert!(is_auth_sensitive("COOKIE"));
        assert!(is_auth_sensitive("x-api-key"));
        assert!(!is_auth_sensitive("Accept"));
    }

    #[test]
    fn unparseable_urls_are_ignored() {
        let vault = HeaderVault::new();
        assert!(!vault.record("not a url", &headers(&[("Cookie", "x=1")])));
        assert!(vault.is_empty());
    }
}
