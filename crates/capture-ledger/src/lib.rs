//! Capture ledger: turns three decoupled network observation phases into
//! coherent exchange records.
//!
//! Capture sources report a request going out, response headers arriving,
//! and the transfer finishing as three independent callbacks with no shared
//! id. This crate owns the heuristics that stitch them back together:
//! duplicate suppression on phase 1, URL-plus-recency correlation for
//! phases 2 and 3, and background body retrieval once a success response is
//! known. The [`CaptureTap`] adapter wraps it all behind the synchronous
//! accept/continue surface host capture APIs demand.

pub mod body;
pub mod config;
pub mod error;
pub mod events;
pub mod exchange;
pub mod hook;
pub mod ledger;
pub mod metrics;

pub use body::{BodyFetcher, BodyProbe, FetchedBody, HttpBodyFetcher, StaticFetcher};
pub use config::LedgerConfig;
pub use error::LedgerError;
pub use events::{
    CaptureEvent, CompletionObserved, LedgerBus, LedgerEvent, RequestObserved, ResponseObserved,
};
pub use exchange::{Exchange, ResponseBody};
pub use hook::{CaptureTap, TapDecision};
pub use ledger::{CaptureLedger, IngestOutcome, SkipReason};
