//! Error types for atom delivery and submission

use crate::submission::SubmissionStatus;
use radix_ledger_core::AtomId;
use thiserror::Error;

/// Atom feed error
#[derive(Debug, Error)]
pub enum Error {
    /// Connection or stream failure reported by the transport
    #[error("Transport error: {0}")]
    Transport(String),

    /// The feed gave up reconnecting
    #[error("Transport failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Consecutive failed attempts
        attempts: u32,
        /// Last transport error
        last: String,
    },

    /// The node ended a submission in a negative terminal state
    #[error("Submission of atom {atom} ended with {status}: {message}")]
    Submission {
        /// Submitted atom
        atom: AtomId,
        /// Terminal status
        status: SubmissionStatus,
        /// Node-supplied detail, if any
        message: String,
    },

    /// Stream ended without a final result
    #[error("Stream closed")]
    Closed,

    /// Ledger error
    #[error(transparent)]
    Ledger(#[from] radix_ledger_core::Error),
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
