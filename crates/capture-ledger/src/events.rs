//! Observation payloads delivered by capture sources, and the ledger's own
//! broadcast events.
//!
//! The three observation phases arrive independently and carry no shared
//! request id, which is why each payload repeats the URL: it is the only
//! correlation key the source gives us.

use serde::{Deserialize, Serialize};
use tapforge_core_types::{CaptureSource, ExchangeId, HeaderMap, PayloadKind, ResourceKind};
use tokio::sync::broadcast;

fn default_resource() -> ResourceKind {
    ResourceKind::Other
}

/// Phase 1: a request is about to go out.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestObserved {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: HeaderMap,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default = "default_resource")]
    pub resource: ResourceKind,
    #[serde(default)]
    pub source: CaptureSource,
}

impl RequestObserved {
    pub fn new(url: impl Into<String>, method: impl Into<String>, resource: ResourceKind) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            headers: HeaderMap::new(),
            body: None,
            resource,
            source: CaptureSource::default(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_source(mut self, source: CaptureSource) -> Self {
        self.source = source;
        self
    }
}

/// Phase 2: response headers arrived for some earlier request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResponseObserved {
    pub url: String,
    pub status: u16,
    #[serde(default)]
    pub headers: HeaderMap,
    #[serde(default)]
    pub source: CaptureSource,
}

impl ResponseObserved {
    pub fn new(url: impl Into<String>, status: u16) -> Self {
        Self {
            url: url.into(),
            status,
            headers: HeaderMap::new(),
            source: CaptureSource::default(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_source(mut self, source: CaptureSource) -> Self {
        self.source = source;
        self
    }
}

/// Phase 3: the transfer finished.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompletionObserved {
    pub url: String,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub source: CaptureSource,
}

impl CompletionObserved {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: None,
            source: CaptureSource::default(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_source(mut self, source: CaptureSource) -> Self {
        self.source = source;
        self
    }
}

/// One line of the JSONL capture wire: any of the three phases, tagged.
/// Recorders write this format; `tapforge replay` reads it back.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum CaptureEvent {
    Request(RequestObserved),
    Response(ResponseObserved),
    Completed(CompletionObserved),
}

/// Ledger-side notifications for observers (UI, catalogs, tests).
#[derive(Clone, Debug)]
pub enum LedgerEvent {
    Recorded {
        id: ExchangeId,
        method: String,
        url: String,
    },
    HeadersAttached {
        id: ExchangeId,
        status: u16,
    },
    BodyAttached {
        id: ExchangeId,
        kind: PayloadKind,
    },
    Completed {
        id: ExchangeId,
        status: Option<u16>,
    },
    Cleared,
}

/// Broadcast channel for ledger events.
pub type LedgerBus = broadcast::Sender<LedgerEvent>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_events_round_trip_the_phase_tag() {
        let line = r#"{"phase":"request","url":"https://a/api/x","method":"GET","resource":"xhr"}"#;
        let event: CaptureEvent = serde_json::from_str(line).expect("parse");
        match event {
            CaptureEvent::Request(req) => {
                assert_eq!(req.method, "GET");
                assert_eq!(req.resource, ResourceKind::Xhr);
                assert_eq!(req.source, CaptureSource::default());
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn response_payload_tolerates_missing_headers() {
        let line = r#"{"phase":"response","url":"https://a/api/x","status":200}"#;
        let event: CaptureEvent = serde_json::from_str(line).expect("parse");
        match event {
            CaptureEvent::Response(res) => {
                assert_eq!(res.status, 200);
                assert!(res.headers.is_empty());
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }
}
