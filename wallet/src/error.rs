//! Error types for the wallet context

use radix_ledger_core::Address;
use thiserror::Error;

/// Wallet error
#[derive(Debug, Error)]
pub enum Error {
    /// Ledger error (insufficient funds, consistency violation, ...)
    #[error(transparent)]
    Ledger(#[from] radix_ledger_core::Error),

    /// Feed or submission error
    #[error(transparent)]
    Feed(#[from] radix_atom_feed::Error),

    /// Address is not being watched
    #[error("Address {0} is not watched")]
    UnknownAddress(Address),

    /// Tracing could not be initialised
    #[error("Telemetry error: {0}")]
    Telemetry(String),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
