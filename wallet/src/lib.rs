//! Radix Wallet
//!
//! Application-level entry point of the ledger client. A [`RadixWallet`] is
//! built from a configuration, an atom transport and an atom submitter, and
//! owns everything derived from them.
//!
//! # Example
//!
//! ```no_run
//! use radix_wallet::{RadixWallet, Config};
//! # use std::sync::Arc;
//! # async fn demo(
//! #     transport: Arc<dyn radix_atom_feed::AtomTransport>,
//! #     submitter: Arc<dyn radix_atom_feed::AtomSubmitter>,
//! #     me: radix_ledger_core::KeyPair,
//! #     token: radix_ledger_core::TokenRef,
//! #     friend: radix_ledger_core::KeySet,
//! # ) -> radix_wallet::Result<()> {
//! let wallet = RadixWallet::new(Config::from_env()?, transport, submitter)?;
//! wallet.watch(me.address());
//!
//! let mut balances = wallet.balances(&me.address())?;
//! if let Some(state) = balances.next().await {
//!     println!("balance: {}", state.balance(&token));
//! }
//!
//! let submission = wallet.transfer(&me, &token, friend, 30)?;
//! submission.outcome().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, missing_debug_implementations)]

pub mod error;
pub mod telemetry;
pub mod wallet;

pub use error::{Error, Result};
pub use radix_ledger_core::Config;
pub use telemetry::init_tracing;
pub use wallet::RadixWallet;
