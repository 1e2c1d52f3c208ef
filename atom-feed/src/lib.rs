//! Radix Atom Feed
//!
//! Network-facing side of the ledger client: turns the raw, at-least-once
//! atom stream into one deduplicated, validated stream per address, and
//! tracks the status of submitted atoms.
//!
//! # Features
//!
//! - **Shared feeds**: one upstream stream per address, closed with its last
//!   subscriber
//! - **Deduplication**: atom ids remembered across reconnects
//! - **Validation**: timestamps and owner signatures checked before delivery
//! - **Reconnects**: quadratic backoff with a bounded number of attempts
//! - **Submission tracking**: replayed status history per submitted atom

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, missing_debug_implementations)]

pub mod error;
pub mod filter;
pub mod retry;
pub mod submission;
pub mod transport;
pub mod validation;

pub use error::{Error, Result};
pub use filter::{AtomDeliveryFilter, AtomSubscription};
pub use retry::RetryPolicy;
pub use submission::{Submission, SubmissionStatus, SubmissionUpdate, SubmissionUpdates};
pub use transport::{AtomStream, AtomSubmitter, AtomTransport, StatusStream};
pub use validation::{AtomValidator, SignatureValidator};
