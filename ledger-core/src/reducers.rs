//! Concrete reducers: balances and token definitions

use crate::reducer::{ParticleEvent, Reducer};
use crate::types::{Particle, ParticleId, Spin, TokenDefinition, TokenRef, TransferParticle};
use std::collections::BTreeMap;
use tracing::warn;

/// Balances and spendable particles of one address
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressState {
    /// Sum of signed quantities of owned particles, per token
    pub balances: BTreeMap<TokenRef, i128>,

    /// Owned particles created and not yet consumed
    pub unconsumed: BTreeMap<ParticleId, TransferParticle>,
}

impl AddressState {
    /// Balance of one token (zero if never seen)
    pub fn balance(&self, token: &TokenRef) -> i128 {
        self.balances.get(token).copied().unwrap_or(0)
    }

    /// Spendable particles of one token
    pub fn unconsumed_for(&self, token: &TokenRef) -> Vec<TransferParticle> {
        self.unconsumed
            .values()
            .filter(|t| &t.token == token)
            .cloned()
            .collect()
    }
}

/// Folds owned value particles into [`AddressState`]
#[derive(Debug, Default, Clone, Copy)]
pub struct BalanceReducer;

impl Reducer for BalanceReducer {
    type State = AddressState;

    fn name(&self) -> &'static str {
        "balance"
    }

    fn initial_state(&self) -> AddressState {
        AddressState::default()
    }

    fn reduce(&self, mut state: AddressState, event: ParticleEvent<'_>) -> AddressState {
        let Some((transfer, spin)) = event.particle.as_transfer() else {
            return state;
        };
        if !transfer.owned_by(event.address) {
            return state;
        }

        let balance = state.balances.entry(transfer.token.clone()).or_insert(0);
        match spin {
            Spin::Up => {
                *balance += i128::from(transfer.quantity);
                state.unconsumed.insert(transfer.id(), transfer.clone());
            }
            Spin::Down => {
                *balance -= i128::from(transfer.quantity);
                if state.unconsumed.remove(&transfer.id()).is_none() {
                    warn!(atom = %event.atom_id, "Consumed particle was never seen as unconsumed");
                }
            }
        }
        state
    }
}

/// Token metadata, keyed by token
pub type TokenDefinitions = BTreeMap<TokenRef, TokenDefinition>;

/// Folds token-definition particles into [`TokenDefinitions`]
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenDefinitionReducer;

impl Reducer for TokenDefinitionReducer {
    type State = TokenDefinitions;

    fn name(&self) -> &'static str {
        "token_definitions"
    }

    fn initial_state(&self) -> TokenDefinitions {
        TokenDefinitions::new()
    }

    fn reduce(&self, mut state: TokenDefinitions, event: ParticleEvent<'_>) -> TokenDefinitions {
        if let Particle::TokenDefinition(definition) = event.particle {
            state.insert(definition.token.clone(), definition.clone());
        }
        state
    }
}
