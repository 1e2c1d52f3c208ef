//! Transfer atom construction
//!
//! # Example
//!
//! ```no_run
//! use radix_ledger_core::{KeyPair, TransferBuilder, TokenRef, TransferParticle};
//!
//! # fn demo(unconsumed: Vec<TransferParticle>, token: TokenRef) -> radix_ledger_core::Result<()> {
//! let me = KeyPair::generate();
//! let friend = KeyPair::generate();
//!
//! let unsigned = TransferBuilder::new(token, friend.address().key_set(), 30)
//!     .build(&unconsumed)?;
//! let atom = unsigned.sign(&me)?;
//! # Ok(())
//! # }
//! ```

use crate::coin_select::{of_token, CoinSelector, GreedyFirstFit, Selection};
use crate::crypto::KeyPair;
use crate::types::{Atom, AtomId, KeySet, Particle, Payload, Quantity, TokenRef, TransferParticle};
use crate::{Error, Result};
use tracing::debug;

/// Builds an unsigned transfer atom from a snapshot of unconsumed particles
pub struct TransferBuilder<'a> {
    token: TokenRef,
    recipient: KeySet,
    amount: Quantity,
    extra_particles: Vec<Particle>,
    payload: Option<Payload>,
    timestamp: Option<u64>,
    selector: &'a dyn CoinSelector,
}

impl std::fmt::Debug for TransferBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferBuilder")
            .field("token", &self.token)
            .field("recipient", &self.recipient)
            .field("amount", &self.amount)
            .field("extra_particles", &self.extra_particles.len())
            .finish_non_exhaustive()
    }
}

impl<'a> TransferBuilder<'a> {
    /// Transfer `amount` of `token` to `recipient`
    pub fn new(token: TokenRef, recipient: KeySet, amount: Quantity) -> Self {
        Self {
            token,
            recipient,
            amount,
            extra_particles: Vec::new(),
            payload: None,
            timestamp: None,
            selector: &GreedyFirstFit,
        }
    }

    /// Use a different selection policy
    pub fn with_selector(mut self, selector: &'a dyn CoinSelector) -> Self {
        self.selector = selector;
        self
    }

    /// Add a fee or marker particle supplied by the caller
    pub fn with_particle(mut self, particle: Particle) -> Self {
        self.extra_particles.push(particle);
        self
    }

    /// Attach an application payload
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Fix the atom timestamp (defaults to now)
    pub fn with_timestamp(mut self, timestamp_millis: u64) -> Self {
        self.timestamp = Some(timestamp_millis);
        self
    }

    /// Select inputs from `unconsumed` and assemble the atom.
    ///
    /// Particles of other tokens in `unconsumed` are ignored. Nothing is
    /// built when the selection fails.
    pub fn build(self, unconsumed: &[TransferParticle]) -> Result<UnsignedAtom> {
        let candidates = of_token(unconsumed, &self.token);
        let selection = self
            .selector
            .select(&candidates, self.amount, &self.recipient)?;

        let mut particles: Vec<Particle> = selection
            .spent
            .iter()
            .cloned()
            .map(Particle::Consumer)
            .collect();

        particles.extend(selection.produced.iter().map(|(owners, quantity)| {
            Particle::Consumable(TransferParticle::new(
                self.token.clone(),
                *quantity,
                owners.clone(),
                rand::random(),
            ))
        }));
        particles.extend(self.extra_particles);

        let timestamp = self.timestamp.unwrap_or_else(now_millis);
        let atom = Atom::new(particles, timestamp, self.payload);

        let delta = atom.token_deltas().get(&self.token).copied().unwrap_or(0);
        if delta != 0 {
            return Err(Error::InvalidTransfer(format!(
                "transfer of {} does not conserve value (delta {})",
                self.token, delta
            )));
        }

        debug!(
            atom = %atom.id(),
            inputs = selection.spent.len(),
            outputs = selection.produced.len(),
            "Built transfer atom"
        );

        Ok(UnsignedAtom { atom, selection })
    }
}

fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(1)
}

/// Atom awaiting signatures
#[derive(Debug, Clone)]
pub struct UnsignedAtom {
    atom: Atom,
    selection: Selection,
}

impl UnsignedAtom {
    /// Atom id (what signers sign)
    pub fn id(&self) -> AtomId {
        self.atom.id()
    }

    /// The unsigned atom
    pub fn atom(&self) -> &Atom {
        &self.atom
    }

    /// Inputs and outputs chosen for this transfer
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Sign with a single key
    pub fn sign(self, signer: &KeyPair) -> Result<Atom> {
        self.sign_all(&[signer])
    }

    /// Sign with every key owning a spent particle
    pub fn sign_all(self, signers: &[&KeyPair]) -> Result<Atom> {
        let id = self.atom.id();
        let atom = signers.iter().fold(self.atom, |atom, signer| {
            atom.with_signature(signer.public_key(), signer.sign(&id))
        });
        atom.verify_signatures()?;
        Ok(atom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UniqueIdParticle;

    struct Fixture {
        me: KeyPair,
        friend: KeyPair,
        token: TokenRef,
    }

    impl Fixture {
        fn new() -> Self {
            let issuer = KeyPair::from_seed(&[50u8; 32]);
            Self {
                me: KeyPair::from_seed(&[1u8; 32]),
                friend: KeyPair::from_seed(&[2u8; 32]),
                token: TokenRef::new(issuer.address(), "XRD"),
            }
        }

        fn coin(&self, quantity: Quantity, nonce: u64) -> TransferParticle {
            TransferParticle::new(self.token.clone(), quantity, self.me.address().key_set(), nonce)
        }
    }

    #[test]
    fn test_transfer_with_change() {
        let f = Fixture::new();
        let unsigned = TransferBuilder::new(f.token.clone(), f.friend.address().key_set(), 30)
            .with_timestamp(1_000)
            .build(&[f.coin(100, 1)])
            .unwrap();

        let atom = unsigned.atom();
        assert_eq!(atom.timestamp, 1_000);
        assert!(atom.is_balanced());
        assert_eq!(atom.consumers().collect::<Vec<_>>(), vec![&f.coin(100, 1)]);

        let outputs: Vec<(KeySet, Quantity)> = atom
            .consumables()
            .map(|t| (t.owners.clone(), t.quantity))
            .collect();
        assert_eq!(
            outputs,
            vec![
                (f.friend.address().key_set(), 30),
                (f.me.address().key_set(), 70)
            ]
        );
    }

    #[test]
    fn test_insufficient_funds_builds_nothing() {
        let f = Fixture::new();
        let err = TransferBuilder::new(f.token.clone(), f.friend.address().key_set(), 100)
            .build(&[f.coin(25, 1), f.coin(15, 2)])
            .unwrap_err();

        assert!(matches!(
            err,
            Error::InsufficientFunds {
                available: 40,
                requested: 100
            }
        ));
    }

    #[test]
    fn test_other_tokens_are_not_spent() {
        let f = Fixture::new();
        let gold = TokenRef::new(f.friend.address(), "GOLD");
        let gold_coin = TransferParticle::new(gold, 500, f.me.address().key_set(), 9);

        let err = TransferBuilder::new(f.token.clone(), f.friend.address().key_set(), 100)
            .build(&[gold_coin, f.coin(10, 1)])
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds { available: 10, .. }));
    }

    #[test]
    fn test_extra_particles_and_payload_are_included() {
        let f = Fixture::new();
        let marker = Particle::UniqueId(UniqueIdParticle {
            name: "invoice-42".to_string(),
            owners: f.me.address().key_set(),
            nonce: 1,
        });
        let payload = Payload {
            data: b"thanks".to_vec(),
            protectors: vec![vec![1, 2, 3]],
        };

        let unsigned = TransferBuilder::new(f.token.clone(), f.friend.address().key_set(), 10)
            .with_particle(marker.clone())
            .with_payload(payload.clone())
            .build(&[f.coin(10, 1)])
            .unwrap();

        assert!(unsigned.atom().particles.contains(&marker));
        assert_eq!(unsigned.atom().payload, Some(payload));
    }

    #[test]
    fn test_extra_particle_breaking_conservation_is_rejected() {
        let f = Fixture::new();
        let stray = Particle::Consumable(f.coin(1, 77));

        let err = TransferBuilder::new(f.token.clone(), f.friend.address().key_set(), 10)
            .with_particle(stray)
            .build(&[f.coin(10, 1)])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransfer(_)));
    }

    #[test]
    fn test_sign_requires_owner_key() {
        let f = Fixture::new();
        let build = || {
            TransferBuilder::new(f.token.clone(), f.friend.address().key_set(), 10)
                .with_timestamp(5)
                .build(&[f.coin(10, 1)])
                .unwrap()
        };

        let signed = build().sign(&f.me).unwrap();
        assert!(signed.verify_signatures().is_ok());

        let err = build().sign(&f.friend).unwrap_err();
        assert!(matches!(err, Error::SignatureError(_)));
    }
}
