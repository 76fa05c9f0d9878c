use std::sync::atomic::{AtomicU64, Ordering};

use lazy_static::lazy_static;
use prometheus::{core::Collector, IntCounter, IntCounterVec, Registry};
use tracing::error;

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelayMetricsSnapshot {
    pub queries_started: u64,
    pub queries_completed: u64,
    pub queries_failed: u64,
    pub queries_cancelled: u64,
    pub tool_executions: u64,
    pub poll_timeouts: u64,
}

static QUERIES_STARTED: AtomicU64 = AtomicU64::new(0);
static QUERIES_COMPLETED: AtomicU64 = AtomicU64::new(0);
static QUERIES_FAILED: AtomicU64 = AtomicU64::new(0);
static QUERIES_CANCELLED: AtomicU64 = AtomicU64::new(0);
static TOOL_EXECUTIONS: AtomicU64 = AtomicU64::new(0);
static POLL_TIMEOUTS: AtomicU64 = AtomicU64::new(0);

lazy_static! {
    static ref QUERIES_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "tapforge_relay_queries_total",
            "Queries by terminal outcome"
        ),
        &["outcome"]
    )
    .unwrap();
    static ref TOOL_EXECUTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "tapforge_relay_tool_executions_total",
            "Locally executed tool calls by result"
        ),
        &["result"]
    )
    .unwrap();
    static ref POLL_TIMEOUTS_TOTAL: IntCounter = IntCounter::new(
        "tapforge_relay_poll_timeouts_total",
        "Poll loops that exhausted their attempt budget"
    )
    .unwrap();
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register relay metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, QUERIES_TOTAL.clone());
    register(registry, TOOL_EXECUTIONS_TOTAL.clone());
    register(registry, POLL_TIMEOUTS_TOTAL.clone());
}

pub fn record_query_started() {
    QUERIES_STARTED.fetch_add(1, Ordering::Relaxed);
    QUERIES_TOTAL.with_label_values(&["started"]).inc();
}

pub fn record_query_completed() {
    QUERIES_COMPLETED.fetch_add(1, Ordering::Relaxed);
    QUERIES_TOTAL.with_label_values(&["completed"]).inc();
}

pub fn record_query_failed() {
    QUERIES_FAILED.fetch_add(1, Ordering::Relaxed);
    QUERIES_TOTAL.with_label_values(&["failed"]).inc();
}

pub fn record_query_cancelled() {
    QUERIES_CANCELLED.fetch_add(1, Ordering::Relaxed);
    QUERIES_TOTAL.with_label_values(&["cancelled"]).inc();
}

pub fn record_tool_execution(success: bool) {
    TOOL_EXECUTIONS.fetch_add(1, Ordering::Relaxed);
    let label = if success { "success" } else { "failure" };
    TOOL_EXECUTIONS_TOTAL.with_label_values(&[label]).inc();
}

pub fn record_poll_timeout() {
    POLL_TIMEOUTS.fetch_add(1, Ordering::Relaxed);
    POLL_TIMEOUTS_TOTAL.inc();
}

pub fn snapshot() -> RelayMetricsSnapshot {
    RelayMetricsSnapshot {
        queries_started: QUERIES_STARTED.load(Ordering::Relaxed),
        queries_completed: QUERIES_COMPLETED.load(Ordering::Relaxed),
        queries_failed: QUERIES_FAILED.load(Ordering::Relaxed),
        queries_cancelled: QUERIES_CANCELLED.load(Ordering::Relaxed),
        tool_executions: TOOL_EXECUTIONS.load(Ordering::Relaxed),
        poll_timeouts: POLL_TIMEOUTS.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    QUERIES_STARTED.store(0, Ordering::Relaxed);
    QUERIES_COMPLETED.store(0, Ordering::Relaxed);
    QUERIES_FAILED.store(0, Ordering::Relaxed);
    QUERIES_CANCELLED.store(0, Ordering::Relaxed);
    TOOL_EXECUTIONS.store(0, Ordering::Relaxed);
    POLL_TIMEOUTS.store(0, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Counters are process-global; other tests bump them too, so assert on
    // deltas.
    #[test]
    fn counters_accumulate() {
        let before = snapshot();
        record_query_started();
        record_query_completed();
        record_tool_execution(true);
        record_poll_timeout();
        let after = snapshot();
        assert!(after.queries_started >= before.queries_started + 1);
        assert!(after.queries_completed >= before.queries_completed + 1);
        assert!(after.tool_executions >= before.tool_executions + 1);
        assert!(after.poll_timeouts >= before.poll_timeouts + 1);
    }
}
