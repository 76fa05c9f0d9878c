//! The tap: a thin adapter between host network callbacks and the ledger.
//!
//! Host capture APIs deliver each phase as a callback that must be answered
//! with an accept/continue decision before the request proceeds. Everything
//! here is synchronous and infallible inside that turn; slower enrichment
//! (body retrieval) is scheduled as a background task keyed by record id.

use std::sync::Arc;

use tapforge_core_types::ExchangeId;

use crate::events::{CaptureEvent, CompletionObserved, RequestObserved, ResponseObserved};
use crate::ledger::CaptureLedger;

/// Answer handed back to the host inside the callback turn. `proceed` is
/// always true: the tap observes traffic, it never blocks it.
#[derive(Clone, Debug)]
pub struct TapDecision {
    pub proceed: bool,
    pub recorded: Option<ExchangeId>,
}

impl TapDecision {
    fn proceed_with(recorded: Option<ExchangeId>) -> Self {
        Self {
            proceed: true,
            recorded,
        }
    }
}

/// One tap per capture surface, all feeding the same shared ledger.
#[derive(Clone)]
pub struct CaptureTap {
    ledger: Arc<CaptureLedger>,
}

impl CaptureTap {
    pub fn new(ledger: Arc<CaptureLedger>) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &Arc<CaptureLedger> {
        &self.ledger
    }

    pub fn on_request(&self, observed: RequestObserved) -> TapDecision {
        let outcome = self.ledger.observe_request(observed);
        TapDecision::proceed_with(outcome.exchange_id().cloned())
    }

    pub fn on_response(&self, observed: ResponseObserved) -> TapDecision {
        let success = (200..300).contains(&observed.status);
        let outcome = self.ledger.observe_response(observed);
        let recorded = outcome.exchange_id().cloned();
        if success && self.ledger.config().auto_fetch_bodies {
            if let Some(id) = &recorded {
                self.ledger.spawn_body_fetch(id.clone());
            }
        }
        TapDecision::proceed_with(recorded)
    }

    pub fn on_completed(&self, observed: CompletionObserved) -> TapDecision {
        let outcome = self.ledger.observe_completion(observed);
        TapDecision::proceed_with(outcome.exchange_id().cloned())
    }

    /// Dispatch one line of the capture wire, used by file replay.
    pub fn apply(&self, event: CaptureEvent) -> TapDecision {
        match event {
            CaptureEvent::Request(observed) => self.on_request(observed),
            CaptureEvent::Response(observed) => self.on_response(observed),
            CaptureEvent::Completed(observed) => self.on_completed(observed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use tapforge_core_types::ResourceKind;

    #[test]
    fn decisions_always_let_traffic_proceed() {
        let ledger = Arc::new(CaptureLedger::new(LedgerConfig::default()));
        let tap = CaptureTap::new(ledger);
        let allowed = tap.on_request(RequestObserved::new(
            "https://shop.example.com/api/cart",
            "GET",
            ResourceKind::Xhr,
        ));
        assert!(allowed.proceed);
        assert!(allowed.recorded.is_some());
        let filtered = tap.on_request(RequestObserved::new(
            "https://shop.example.com/logo.png",
            "GET",
            ResourceKind::Image,
        ));
        assert!(filtered.proceed);
        assert!(filtered.recorded.is_none());
        let orphan = tap.on_completed(CompletionObserved::new("https://nowhere.example.com/x"));
        assert!(orphan.proceed);
        assert!(orphan.recorded.is_none());
    }
}
