//! The capture ledger: dedup, correlation, and enrichment of exchange
//! records assembled from independently delivered observation phases.

use std::sync::Arc;

use capture_gate::{classify, TrafficEvent};
use chrono::{DateTime, Utc};
use header_vault::HeaderVault;
use parking_lot::RwLock;
use tapforge_core_types::{CaptureSource, ExchangeId};
use tokio::sync::broadcast;
use tracing::debug;

use crate::body::{BodyFetcher, BodyProbe};
use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::events::{
    CompletionObserved, LedgerBus, LedgerEvent, RequestObserved, ResponseObserved,
};
use crate::exchange::{Exchange, ResponseBody};
use crate::metrics;

/// Why a phase-1 event produced no new record.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SkipReason {
    /// The gate denied the event.
    Filtered,
    /// A record for the same (url, method) already exists inside the dedup
    /// window.
    Duplicate,
}

/// Result of feeding one observation phase to the ledger.
#[derive(Clone, Debug, PartialEq)]
pub enum IngestOutcome {
    /// Phase 1 created a record.
    Recorded(ExchangeId),
    /// Phase 2/3 matched and enriched an existing record.
    Enriched(ExchangeId),
    /// Phase 1 was dropped on purpose.
    Skipped(SkipReason),
    /// Phase 2/3 found no record inside its window. The event is discarded;
    /// orphan enrichment never creates a record.
    Unmatched,
}

impl IngestOutcome {
    pub fn exchange_id(&self) -> Option<&ExchangeId> {
        match self {
            Self::Recorded(id) | Self::Enriched(id) => Some(id),
            Self::Skipped(_) | Self::Unmatched => None,
        }
    }
}

/// In-memory store of exchange records for one or more capture surfaces.
///
/// Each instance owns its records outright; there is no ambient global
/// list. Surfaces that share a ledger are kept apart by the
/// [`CaptureSource`] tag on every event: correlation and dedup never cross
/// sources.
///
/// All three observation handlers are synchronous and non-blocking (a
/// short `parking_lot` critical section) because the capture host demands
/// an accept/continue answer inside its callback turn. Anything slower,
/// like body retrieval, runs as a background task against the record id.
pub struct CaptureLedger {
    config: LedgerConfig,
    records: RwLock<Vec<Exchange>>,
    bus: LedgerBus,
    vault: Option<Arc<HeaderVault>>,
    fetcher: Option<Arc<dyn BodyFetcher>>,
}

impl CaptureLedger {
    pub fn new(config: LedgerConfig) -> Self {
        let (bus, _) = broadcast::channel(config.bus_capacity.max(1));
        Self {
            config,
            records: RwLock::new(Vec::new()),
            bus,
            vault: None,
            fetcher: None,
        }
    }

    /// Route intercepted request headers into a credential vault.
    pub fn with_vault(mut self, vault: Arc<HeaderVault>) -> Self {
        self.vault = Some(vault);
        self
    }

    /// Enable on-demand response-body retrieval.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn BodyFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.bus.subscribe()
    }

    /// Phase 1. Gate the event, suppress duplicate firings, record the
    /// exchange, and feed the vault. Synchronous.
    pub fn observe_request(&self, observed: RequestObserved) -> IngestOutcome {
        let gate_event = TrafficEvent::new(
            observed.url.clone(),
            observed.method.clone(),
            observed.resource,
        );
        let verdict = classify(&gate_event);
        if !verdict.allows() {
            debug!(
                target: "capture-ledger",
                ?verdict,
                url = %observed.url,
                "event filtered"
            );
            metrics::record_filtered();
            return IngestOutcome::Skipped(SkipReason::Filtered);
        }

        let now = Utc::now();
        let (id, event) = {
            let mut records = self.records.write();
            let duplicate = records.iter().rev().any(|record| {
                record.same_request(&observed.source, &observed.url, &observed.method)
                    && record.age_ms(now) <= self.config.dedup_window_ms
            });
            if duplicate {
                debug!(
                    target: "capture-ledger",
                    url = %observed.url,
                    method = %observed.method,
                    "duplicate request suppressed"
                );
                metrics::record_duplicate();
                return IngestOutcome::Skipped(SkipReason::Duplicate);
            }
            if let Some(vault) = &self.vault {
                vault.record(&observed.url, &observed.headers);
            }
            let exchange = Exchange::from_request(observed);
            let id = exchange.id.clone();
            let event = LedgerEvent::Recorded {
                id: id.clone(),
                method: exchange.method.clone(),
                url: exchange.url.clone(),
            };
            records.push(exchange);
            (id, event)
        };
        metrics::record_recorded();
        let _ = self.bus.send(event);
        IngestOutcome::Recorded(id)
    }

    /// Phase 2. Correlate by URL against the most recent record inside the
    /// response window and attach headers/status in place. Synchronous;
    /// unmatched events are discarded.
    pub fn observe_response(&self, observed: ResponseObserved) -> IngestOutcome {
        let now = Utc::now();
        let matched = {
            let mut records = self.records.write();
            correlate(
                &mut records,
                &observed.source,
                &observed.url,
                self.config.response_window_ms,
                now,
            )
            .map(|record| {
                record.response_headers = Some(observed.headers.clone());
                record.status = Some(observed.status);
                record.id.clone()
            })
        };
        match matched {
            Some(id) => {
                metrics::record_correlated("response");
                let _ = self.bus.send(LedgerEvent::HeadersAttached {
                    id: id.clone(),
                    status: observed.status,
                });
                IngestOutcome::Enriched(id)
            }
            None => {
                debug!(
                    target: "capture-ledger",
                    url = %observed.url,
                    status = observed.status,
                    "response headers matched no exchange"
                );
                metrics::record_miss("response");
                IngestOutcome::Unmatched
            }
        }
    }

    /// Phase 3. Correlate inside the (wider) completion window, flip
    /// `completed` and set the final status. Synchronous; unmatched events
    /// are discarded.
    pub fn observe_completion(&self, observed: CompletionObserved) -> IngestOutcome {
        let now = Utc::now();
        let matched = {
            let mut records = self.records.write();
            correlate(
                &mut records,
                &observed.source,
                &observed.url,
                self.config.completion_window_ms,
                now,
            )
            .map(|record| {
                let first_completion = !record.completed;
                record.completed = true;
                if observed.status.is_some() {
                    record.final_status = observed.status;
                }
                (record.id.clone(), record.final_status, first_completion)
            })
        };
        match matched {
            Some((id, status, first_completion)) => {
                metrics::record_correlated("completion");
                if first_completion {
                    let _ = self.bus.send(LedgerEvent::Completed {
                        id: id.clone(),
                        status,
                    });
                }
                IngestOutcome::Enriched(id)
            }
            None => {
                debug!(
                    target: "capture-ledger",
                    url = %observed.url,
                    "completion matched no exchange"
                );
                metrics::record_miss("completion");
                IngestOutcome::Unmatched
            }
        }
    }

    /// Snapshot of all records in creation order.
    pub fn list(&self) -> Vec<Exchange> {
        self.records.read().clone()
    }

    pub fn get(&self, id: &ExchangeId) -> Option<Exchange> {
        self.records
            .read()
            .iter()
            .find(|record| record.id == *id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Drop every record. The only way records die before process end.
    pub fn clear(&self) {
        self.records.write().clear();
        let _ = self.bus.send(LedgerEvent::Cleared);
    }

    /// Replay the recorded request against its own URL and store the body
    /// on the record. Explicit on-demand network call, also used by the
    /// background fetch after a success response.
    pub async fn fetch_body(&self, id: &ExchangeId) -> Result<ResponseBody, LedgerError> {
        let fetcher = self
            .fetcher
            .clone()
            .ok_or(LedgerError::FetcherUnavailable)?;
        let probe = {
            let records = self.records.read();
            let record = records
                .iter()
                .find(|record| record.id == *id)
                .ok_or_else(|| LedgerError::UnknownExchange(id.clone()))?;
            BodyProbe {
                url: record.url.clone(),
                method: record.method.clone(),
                headers: record.request_headers.clone(),
                body: record.request_body.clone(),
            }
        };
        let fetched = fetcher.fetch(&probe).await?;
        let body = ResponseBody {
            content: fetched.content,
            kind: fetched.kind,
            fetched_at: Utc::now(),
        };
        self.attach_body(id, body.clone())?;
        metrics::record_body_fetched();
        Ok(body)
    }

    /// Attach an already-retrieved body to a record.
    pub fn attach_body(&self, id: &ExchangeId, body: ResponseBody) -> Result<(), LedgerError> {
        let kind = body.kind;
        {
            let mut records = self.records.write();
            let record = records
                .iter_mut()
                .find(|record| record.id == *id)
                .ok_or_else(|| LedgerError::UnknownExchange(id.clone()))?;
            record.response_body = Some(body);
        }
        let _ = self.bus.send(LedgerEvent::BodyAttached {
            id: id.clone(),
            kind,
        });
        Ok(())
    }

    /// Fire-and-forget body retrieval. Skipped quietly when no fetcher is
    /// configured or no runtime is running; capture must never block or
    /// fail on enrichment.
    pub fn spawn_body_fetch(self: &Arc<Self>, id: ExchangeId) {
        if self.fetcher.is_none() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let ledger = Arc::clone(self);
                handle.spawn(async move {
                    if let Err(err) = ledger.fetch_body(&id).await {
                        debug!(
                            target: "capture-ledger",
                            %id,
                            %err,
                            "background body fetch failed"
                        );
                    }
                });
            }
            Err(_) => {
                debug!(target: "capture-ledger", %id, "no runtime for body fetch");
            }
        }
    }
}

/// Most recent record in `source` matching `url`, no older than
/// `window_ms`. Records are append-ordered, so the reverse scan hits the
/// newest candidate first.
fn correlate<'a>(
    records: &'a mut [Exchange],
    source: &CaptureSource,
    url: &str,
    window_ms: u64,
    now: DateTime<Utc>,
) -> Option<&'a mut Exchange> {
    records
        .iter_mut()
        .rev()
        .find(|record| record.source == *source && record.url == url && record.age_ms(now) <= window_ms)
}
