//! Query relay: answers user questions by pairing a remote reasoning
//! service with locally executed HTTP tools.
//!
//! The remote side decides *what* to call; this side executes the call,
//! because only the local process holds the session credentials the target
//! API expects. One query runs two concurrent remote operations, a
//! long-lived solve call and a bounded poll loop for pending tool
//! requests, and relays at most one tool round-trip between them. Every
//! suspension point honors the query's cancellation token.

pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod remote;

pub use catalog::{CandidateSet, Catalog, InMemoryCatalog};
pub use config::{RelayConfig, RemoteConfig};
pub use error::RelayError;
pub use executor::{merge_headers, ToolRunner};
pub use model::{
    ChatQuery, PendingToolCall, QueryAnswer, QueryBus, QueryEvent, QueryStatus, ToolDescriptor,
    ToolOutcome,
};
pub use orchestrator::QueryOrchestrator;
pub use remote::{HttpRemoteReasoner, RemoteReasoner, ScriptedReasoner};
