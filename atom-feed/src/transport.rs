//! Network collaborators

use crate::submission::SubmissionUpdate;
use crate::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use radix_ledger_core::{Address, Atom};

/// Raw atoms for one address: at-least-once, unordered, may redeliver
pub type AtomStream = BoxStream<'static, Result<Atom>>;

/// Status updates for one submitted atom
pub type StatusStream = BoxStream<'static, SubmissionUpdate>;

/// Source of the raw atom feed
#[async_trait]
pub trait AtomTransport: Send + Sync + 'static {
    /// Open a stream of every atom touching the address.
    ///
    /// An `Err` item or the end of the stream both count as a disconnect.
    async fn atom_stream(&self, address: Address) -> Result<AtomStream>;
}

/// Submits atoms to a node
#[async_trait]
pub trait AtomSubmitter: Send + Sync + 'static {
    /// Hand the atom to a node and stream its status until a terminal state
    async fn submit(&self, atom: Atom) -> Result<StatusStream>;
}
