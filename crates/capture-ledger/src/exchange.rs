//! The exchange record: one logical request/response pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tapforge_core_types::{CaptureSource, ExchangeId, HeaderMap, PayloadKind, ResourceKind};

use crate::events::RequestObserved;

/// A response body fetched after the fact, tagged with its shape at the
/// moment it entered the system.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResponseBody {
    pub content: String,
    pub kind: PayloadKind,
    pub fetched_at: DateTime<Utc>,
}

/// One tracked request/response pair, assembled from up to three
/// independently delivered observation phases.
///
/// Phase 2/3 fields are monotonic: once set they are overwritten at most by
/// a later sighting, never cleared. `completed` flips false→true exactly
/// once. Records live until an explicit [`clear`](crate::CaptureLedger::clear)
/// or process end; nothing here persists across restarts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Exchange {
    pub id: ExchangeId,
    pub source: CaptureSource,
    pub method: String,
    pub url: String,
    pub resource: ResourceKind,
    pub request_headers: HeaderMap,
    pub request_body: Option<String>,
    pub created_at: DateTime<Utc>,
    pub response_headers: Option<HeaderMap>,
    pub status: Option<u16>,
    pub response_body: Option<ResponseBody>,
    pub completed: bool,
    pub final_status: Option<u16>,
}

impl Exchange {
    pub(crate) fn from_request(observed: RequestObserved) -> Self {
        Self {
            id: ExchangeId::new(),
            source: observed.source,
            method: observed.method,
            url: observed.url,
            resource: observed.resource,
            request_headers: observed.headers,
            request_body: observed.body,
            created_at: Utc::now(),
            response_headers: None,
            status: None,
            response_body: None,
            completed: false,
            final_status: None,
        }
    }

    /// Age relative to `now`, saturating at zero for clock skew.
    pub fn age_ms(&self, now: DateTime<Utc>) -> u64 {
        (now - self.created_at).num_milliseconds().max(0) as u64
    }

    /// Dedup key comparison: same URL, same method (methods compare
    /// case-insensitively, sources must match exactly).
    pub fn same_request(&self, source: &CaptureSource, url: &str, method: &str) -> bool {
        self.source == *source && self.url == url && self.method.eq_ignore_ascii_case(method)
    }

    /// Whether the correlated response carried a success-class status.
    pub fn has_success_status(&self) -> bool {
        self.status.map(|status| (200..300).contains(&status)).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapforge_core_types::ResourceKind;

    #[test]
    fn request_fields_carry_over() {
        let observed = RequestObserved::new("https://a/api/x", "post", ResourceKind::Fetch)
            .with_body("{\"q\":1}");
        let exchange = Exchange::from_request(observed);
        assert_eq!(exchange.url, "https://a/api/x");
        assert_eq!(exchange.method, "post");
        assert_eq!(exchange.request_body.as_deref(), Some("{\"q\":1}"));
        assert!(!exchange.completed);
        assert!(exchange.status.is_none());
    }

    #[test]
    fn same_request_ignores_method_case() {
        let exchange =
            Exchange::from_request(RequestObserved::new("https://a/api/x", "GET", ResourceKind::Xhr));
        let source = CaptureSource::default();
        assert!(exchange.same_request(&source, "https://a/api/x", "get"));
        assert!(!exchange.same_request(&source, "https://a/api/y", "GET"));
        assert!(!exchange.same_request(&CaptureSource::new("side"), "https://a/api/x", "GET"));
    }

    #[test]
    fn success_status_requires_2xx() {
        let mut exchange =
            Exchange::from_request(RequestObserved::new("https://a/api/x", "GET", ResourceKind::Xhr));
        assert!(!exchange.has_success_status());
        exchange.status = Some(204);
        assert!(exchange.has_success_status());
        exchange.status = Some(404);
        assert!(!exchange.has_success_status());
    }
}
