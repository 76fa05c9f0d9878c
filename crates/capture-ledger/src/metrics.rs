use std::sync::atomic::{AtomicU64, Ordering};

use lazy_static::lazy_static;
use prometheus::{core::Collector, IntCounter, IntCounterVec, Registry};
use tracing::error;

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct LedgerMetricsSnapshot {
    pub recorded: u64,
    pub filtered: u64,
    pub duplicates: u64,
    pub correlated: u64,
    pub misses: u64,
    pub bodies_fetched: u64,
}

static RECORDED: AtomicU64 = AtomicU64::new(0);
static FILTERED: AtomicU64 = AtomicU64::new(0);
static DUPLICATES: AtomicU64 = AtomicU64::new(0);
static CORRELATED: AtomicU64 = AtomicU64::new(0);
static MISSES: AtomicU64 = AtomicU64::new(0);
static BODIES_FETCHED: AtomicU64 = AtomicU64::new(0);

lazy_static! {
    static ref EXCHANGES_RECORDED_TOTAL: IntCounter = IntCounter::new(
        "tapforge_exchanges_recorded_total",
        "Total exchange records created"
    )
    .unwrap();
    static ref EVENTS_FILTERED_TOTAL: IntCounter = IntCounter::new(
        "tapforge_capture_events_filtered_total",
        "Total phase-1 events denied by the gate"
    )
    .unwrap();
    static ref DUPLICATES_SUPPRESSED_TOTAL: IntCounter = IntCounter::new(
        "tapforge_capture_duplicates_suppressed_total",
        "Total phase-1 events dropped as duplicate firings"
    )
    .unwrap();
    static ref CORRELATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "tapforge_capture_correlations_total",
            "Total phase-2/3 events matched to a record"
        ),
        &["phase"]
    )
    .unwrap();
    static ref CORRELATION_MISSES_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "tapforge_capture_correlation_misses_total",
            "Total phase-2/3 events that matched no record"
        ),
        &["phase"]
    )
    .unwrap();
    static ref BODIES_FETCHED_TOTAL: IntCounter = IntCounter::new(
        "tapforge_capture_bodies_fetched_total",
        "Total response bodies retrieved and attached"
    )
    .unwrap();
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register ledger metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, EXCHANGES_RECORDED_TOTAL.clone());
    register(registry, EVENTS_FILTERED_TOTAL.clone());
    register(registry, DUPLICATES_SUPPRESSED_TOTAL.clone());
    register(registry, CORRELATIONS_TOTAL.clone());
    register(registry, CORRELATION_MISSES_TOTAL.clone());
    register(registry, BODIES_FETCHED_TOTAL.clone());
}

pub fn record_recorded() {
    RECORDED.fetch_add(1, Ordering::Relaxed);
    EXCHANGES_RECORDED_TOTAL.inc();
}

pub fn record_filtered() {
    FILTERED.fetch_add(1, Ordering::Relaxed);
    EVENTS_FILTERED_TOTAL.inc();
}

pub fn record_duplicate() {
    DUPLICATES.fetch_add(1, Ordering::Relaxed);
    DUPLICATES_SUPPRESSED_TOTAL.inc();
}

pub fn record_correlated(phase: &str) {
    CORRELATED.fetch_add(1, Ordering::Relaxed);
    CORRELATIONS_TOTAL.with_label_values(&[phase]).inc();
}

pub fn record_miss(phase: &str) {
    MISSES.fetch_add(1, Ordering::Relaxed);
    CORRELATION_MISSES_TOTAL.with_label_values(&[phase]).inc();
}

pub fn record_body_fetched() {
    BODIES_FETCHED.fetch_add(1, Ordering::Relaxed);
    BODIES_FETCHED_TOTAL.inc();
}

pub fn snapshot() -> LedgerMetricsSnapshot {
    LedgerMetricsSnapshot {
        recorded: RECORDED.load(Ordering::Relaxed),
        filtered: FILTERED.load(Ordering::Relaxed),
        duplicates: DUPLICATES.load(Ordering::Relaxed),
        correlated: CORRELATED.load(Ordering::Relaxed),
        misses: MISSES.load(Ordering::Relaxed),
        bodies_fetched: BODIES_FETCHED.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    RECORDED.store(0, Ordering::Relaxed);
    FILTERED.store(0, Ordering::Relaxed);
    DUPLICATES.store(0, Ordering::Relaxed);
    CORRELATED.store(0, Ordering::Relaxed);
    MISSES.store(0, Ordering::Relaxed);
    BODIES_FETCHED.store(0, Ordering::Relaxed);
}
