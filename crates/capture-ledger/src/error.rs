//! Errors emitted by the ledger surface.

use tapforge_core_types::ExchangeId;
use thiserror::Error;

#[derive(Clone, Debug, Error)]
pub enum LedgerError {
    #[error("no exchange with id {0}")]
    UnknownExchange(ExchangeId),
    #[error("no body fetcher configured")]
    FetcherUnavailable,
    #[error("body fetch failed: {0}")]
    FetchFailed(String),
}
