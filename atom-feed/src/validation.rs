//! Checks applied to every atom before it leaves the feed

use radix_ledger_core::{Atom, Error, Result};

/// Decides whether a raw atom may be delivered
pub trait AtomValidator: Send + Sync + 'static {
    /// `Ok` if the atom is well formed
    fn validate(&self, atom: &Atom) -> Result<()>;
}

/// Rejects atoms without a timestamp or with a consumer its owners did not sign
#[derive(Debug, Default, Clone, Copy)]
pub struct SignatureValidator;

impl AtomValidator for SignatureValidator {
    fn validate(&self, atom: &Atom) -> Result<()> {
        if atom.timestamp == 0 {
            return Err(Error::Validation(format!(
                "atom {} has no timestamp",
                atom.id()
            )));
        }
        atom.verify_signatures()
    }
}
