//! Errors emitted by the relay surface.
//!
//! Tool execution failures never appear here: they are folded into the
//! normalized [`ToolOutcome`](crate::model::ToolOutcome) envelope and
//! relayed to the remote service like any other result.

use thiserror::Error;

#[derive(Clone, Debug, Error)]
pub enum RelayError {
    /// Cooperative cancellation. Deliberately distinct from failure; a
    /// cancelled query is never reported as failed.
    #[error("query cancelled")]
    Cancelled,
    /// The poll budget ran out before the remote asked for a tool.
    #[error("no tool request after {attempts} poll attempts")]
    PollTimeout { attempts: u32 },
    /// The remote service answered with an error.
    #[error("remote service error: {0}")]
    Remote(String),
    /// The catalog could not be consulted.
    #[error("catalog error: {0}")]
    Catalog(String),
    /// The remote service could not be reached.
    #[error("transport error: {0}")]
    Transport(String),
    /// Client-side setup failed.
    #[error("invalid configuration: {0}")]
    Config(String),
}
