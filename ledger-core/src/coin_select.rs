//! Input selection for transfers
//!
//! [`GreedyFirstFit`] walks the unconsumed particles in the order given and
//! spends each one whole until the requested amount is covered. It does not
//! try to minimise the number of inputs or the size of the change, and which
//! inputs it spends depends on the iteration order of the snapshot. The
//! policy sits behind [`CoinSelector`] so another one can be swapped in; doing
//! so changes the shape of the transactions the client produces.

use crate::types::{KeySet, Quantity, TokenRef, TransferParticle};
use crate::{Error, Result};

/// Outcome of a successful selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Particles to spend (each becomes a consumer)
    pub spent: Vec<TransferParticle>,

    /// New outputs as (owners, quantity); the recipient first, then change.
    ///
    /// Change is never folded into the recipient output, even when the
    /// recipient owns the spent particles.
    pub produced: Vec<(KeySet, Quantity)>,
}

impl Selection {
    /// Total value of the spent particles, widened so it cannot overflow
    pub fn spent_total(&self) -> u128 {
        self.spent.iter().map(|t| u128::from(t.quantity)).sum()
    }

    /// Total value of the produced outputs, widened so it cannot overflow
    pub fn produced_total(&self) -> u128 {
        self.produced.iter().map(|(_, quantity)| u128::from(*quantity)).sum()
    }
}

/// Coin selection policy
pub trait CoinSelector: Send + Sync {
    /// Choose inputs covering `amount` for `new_owner`.
    ///
    /// Fails with [`Error::InsufficientFunds`] without side effects when the
    /// particles do not cover the amount.
    fn select(
        &self,
        unconsumed: &[TransferParticle],
        amount: Quantity,
        new_owner: &KeySet,
    ) -> Result<Selection>;
}

/// Spend particles in the given order until the amount is covered
#[derive(Debug, Default, Clone, Copy)]
pub struct GreedyFirstFit;

impl CoinSelector for GreedyFirstFit {
    fn select(
        &self,
        unconsumed: &[TransferParticle],
        amount: Quantity,
        new_owner: &KeySet,
    ) -> Result<Selection> {
        if amount == 0 {
            return Err(Error::InvalidTransfer("amount must be positive".to_string()));
        }

        let mut spent = Vec::new();
        let mut to_recipient: Quantity = 0;
        let mut change_output = None;
        let mut consumed_total: Quantity = 0;

        for consumable in unconsumed {
            if consumed_total >= amount {
                break;
            }

            let remaining = amount - consumed_total;
            let take = remaining.min(consumable.quantity);
            let change = consumable.quantity - take;

            spent.push(consumable.clone());
            consumed_total = consumed_total.saturating_add(consumable.quantity);

            // Takes never exceed the amount; only the covering input leaves change
            to_recipient += take;
            if change > 0 {
                change_output = Some((consumable.owners.clone(), change));
            }
        }

        if consumed_total < amount {
            return Err(Error::InsufficientFunds {
                available: consumed_total,
                requested: amount,
            });
        }

        let mut produced = vec![(new_owner.clone(), to_recipient)];
        produced.extend(change_output);
        Ok(Selection { spent, produced })
    }
}

/// Only particles of the given token, in snapshot order
pub fn of_token(unconsumed: &[TransferParticle], token: &TokenRef) -> Vec<TransferParticle> {
    unconsumed
        .iter()
        .filter(|t| &t.token == token)
        .cloned()
        .collect()
}
