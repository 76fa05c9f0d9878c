//! Configuration for the capture ledger.

use serde::{Deserialize, Serialize};

/// Correlation and dedup windows, all in milliseconds.
///
/// The defaults mirror observed capture timing: duplicate phase-1 firings
/// land within about a second, response headers within a few seconds of the
/// request, and completion can lag the headers by tens of seconds on slow
/// transfers. None of these carry a validated rationale, which is exactly
/// why they are configuration rather than constants.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Phase-1 events with the same (url, method) inside this window are
    /// treated as duplicate firings of one request, not as a new exchange.
    pub dedup_window_ms: u64,
    /// How far back a response-headers event may match a recorded request.
    pub response_window_ms: u64,
    /// How far back a completion event may match a recorded request.
    pub completion_window_ms: u64,
    /// Fetch the response body in the background after a success-status
    /// response is correlated.
    pub auto_fetch_bodies: bool,
    /// Capacity of the ledger's broadcast bus.
    pub bus_capacity: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            dedup_window_ms: 1_000,
            response_window_ms: 5_000,
            completion_window_ms: 30_000,
            auto_fetch_bodies: true,
            bus_capacity: 256,
        }
    }
}
