//! Error types for the ledger core

use crate::types::Quantity;
use thiserror::Error;

/// Result type for ledger core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger core errors
#[derive(Error, Debug)]
pub enum Error {
    /// The reconciler observed a state no correct feed can produce
    /// (two atoms blocked on the same particle, or a particle created twice).
    /// The reconciler that raised it refuses further input.
    #[error("Consistency violation: {0}")]
    ConsistencyViolation(String),

    /// Unconsumed value does not cover the requested transfer
    #[error("Insufficient funds: requested {requested} but only {available} available")]
    InsufficientFunds {
        /// Total value visited during selection
        available: Quantity,
        /// Amount the caller asked for
        requested: Quantity,
    },

    /// Transfer request is malformed (zero amount, unbalanced result, ...)
    #[error("Invalid transfer: {0}")]
    InvalidTransfer(String),

    /// Atom failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Signature verification failed
    #[error("Signature verification failed: {0}")]
    SignatureError(String),

    /// Canonical encoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error leaves the originating reconciler unusable
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ConsistencyViolation(_))
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::Config(format!("metrics registration failed: {}", err))
    }
}
