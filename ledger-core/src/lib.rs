//! Radix Ledger Core
//!
//! Client-side view of a Radix address: content-addressed atoms, causal
//! reconciliation of the network feed, and state derived from it.
//!
//! # Architecture
//!
//! - **Content addressing**: atom and particle ids are hashes of a canonical
//!   encoding
//! - **Reconciliation**: atoms arrive unordered and possibly twice; each
//!   reconciler emits them once, after everything they spend
//! - **Reduction**: balances and token metadata are folds over the
//!   reconciled stream, published after a quiet period
//! - **Coin selection**: transfers spend unconsumed particles and return
//!   change to the sender
//!
//! # Invariants
//!
//! - A particle is spent at most once
//! - Every built transfer conserves value per token
//! - Same atoms in any order → same unconsumed set

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod canonical;
pub mod coin_select;
pub mod config;
pub mod crypto;
pub mod error;
pub mod metrics;
pub mod reconciler;
pub mod reducer;
pub mod reducers;
pub mod transaction;
pub mod types;

// Re-exports
pub use canonical::Canonical;
pub use coin_select::{CoinSelector, GreedyFirstFit, Selection};
pub use config::Config;
pub use crypto::KeyPair;
pub use error::{Error, Result};
pub use metrics::Metrics;
pub use reconciler::{ParticleReconciler, ReconcilerRegistry, TokenFilter};
pub use reducer::{AtomSource, ParticleEvent, ReducedState, Reducer, ReducerStore, StateSubscription};
pub use reducers::{AddressState, BalanceReducer, TokenDefinitionReducer, TokenDefinitions};
pub use transaction::{TransferBuilder, UnsignedAtom};
pub use types::{
    Address, Atom, AtomId, Hash, KeySet, Particle, ParticleId, Payload, PublicKey, Quantity,
    Signature, Spin, TokenDefinition, TokenRef, TransferParticle, UniqueIdParticle,
};
