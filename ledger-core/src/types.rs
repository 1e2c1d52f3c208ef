//! Core types for the ledger client
//!
//! All hashed types go through [`crate::canonical`] for their identity:
//! - Atoms are identified by the hash of their unsigned encoding
//! - Particles are identified by the hash of their body, spin excluded
//! - Key sets are sorted so ownership encodes deterministically

use crate::canonical::Canonical;
use crate::crypto::hash_bytes;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Amount of a token, in the token's smallest unit
pub type Quantity = u64;

/// SHA-256 digest
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl Hash {
    /// Hash arbitrary bytes
    pub fn of(data: &[u8]) -> Self {
        Self(hash_bytes(data))
    }

    /// Wrap raw digest bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({}..)", &self.to_hex()[..12])
    }
}

macro_rules! hash_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(Hash);

        impl $name {
            /// Wrap a digest
            pub fn new(hash: Hash) -> Self {
                Self(hash)
            }

            /// Underlying digest
            pub fn hash(&self) -> &Hash {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({}..)", stringify!($name), &self.0.to_hex()[..12])
            }
        }
    };
}

hash_id!(
    /// Identity of an atom (hash of its unsigned canonical encoding)
    AtomId
);

hash_id!(
    /// Identity of a particle (hash of its canonical encoding, spin excluded)
    ParticleId
);

/// Ed25519 public key
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Create from bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}..)", &hex::encode(self.0)[..12])
    }
}

/// Set of keys that jointly own a particle
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeySet(BTreeSet<PublicKey>);

impl KeySet {
    /// Create from keys (duplicates collapse)
    pub fn new(keys: impl IntoIterator<Item = PublicKey>) -> Self {
        Self(keys.into_iter().collect())
    }

    /// Key set with a single owner
    pub fn single(key: PublicKey) -> Self {
        Self::new([key])
    }

    /// Whether the key is an owner
    pub fn contains(&self, key: &PublicKey) -> bool {
        self.0.contains(key)
    }

    /// Owners in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &PublicKey> {
        self.0.iter()
    }

    /// Number of owners
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set has no owners
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Ledger address
///
/// Address derivation and management live outside this crate; here an
/// address is only the key it answers for.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    key: PublicKey,
}

impl Address {
    /// Address controlled by the given key
    pub fn from_public_key(key: PublicKey) -> Self {
        Self { key }
    }

    /// Key behind this address
    pub fn public_key(&self) -> &PublicKey {
        &self.key
    }

    /// Whether the key belongs to this address
    pub fn owns_key(&self, key: &PublicKey) -> bool {
        self.key == *key
    }

    /// Key set owning particles sent to this address
    pub fn key_set(&self) -> KeySet {
        KeySet::single(self.key)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({}..)", &self.key.to_string()[..12])
    }
}

/// Token reference: issuer plus ticker symbol
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenRef {
    /// Issuing address
    pub issuer: Address,
    /// Ticker symbol
    pub symbol: String,
}

impl TokenRef {
    /// Create new token reference
    pub fn new(issuer: Address, symbol: impl Into<String>) -> Self {
        Self {
            issuer,
            symbol: symbol.into(),
        }
    }
}

impl fmt::Display for TokenRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:?}", self.symbol, self.issuer)
    }
}

/// Particle spin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Spin {
    /// Created
    Up,
    /// Consumed
    Down,
}

impl Spin {
    /// Wire value (UP = 1, DOWN = 2)
    pub fn as_u64(&self) -> u64 {
        match self {
            Spin::Up => 1,
            Spin::Down => 2,
        }
    }
}

/// Value-bearing particle body shared by consumables and consumers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferParticle {
    /// Token this value is denominated in
    pub token: TokenRef,
    /// Amount
    pub quantity: Quantity,
    /// Owners
    pub owners: KeySet,
    /// Disambiguates otherwise identical particles
    pub nonce: u64,
}

impl TransferParticle {
    /// Create new transfer body
    pub fn new(token: TokenRef, quantity: Quantity, owners: KeySet, nonce: u64) -> Self {
        Self {
            token,
            quantity,
            owners,
            nonce,
        }
    }

    /// Particle identity
    pub fn id(&self) -> ParticleId {
        ParticleId::new(self.canonical_hash())
    }

    /// Whether any owner key belongs to the address
    pub fn owned_by(&self, address: &Address) -> bool {
        self.owners.iter().any(|key| address.owns_key(key))
    }
}

/// Token definition marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDefinition {
    /// Token being defined
    pub token: TokenRef,
    /// Human readable name
    pub name: String,
    /// Description
    pub description: String,
    /// Smallest transferable multiple
    pub granularity: Quantity,
    /// Owners
    pub owners: KeySet,
}

/// Unique-id marker (a name that may only ever be claimed once per owner)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueIdParticle {
    /// Claimed name
    pub name: String,
    /// Owners
    pub owners: KeySet,
    /// Nonce
    pub nonce: u64,
}

/// Unit of state change inside an atom
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Particle {
    /// Creates value (spin UP)
    Consumable(TransferParticle),
    /// Spends the consumable with the same identity (spin DOWN)
    Consumer(TransferParticle),
    /// Defines a token (spin UP)
    TokenDefinition(TokenDefinition),
    /// Claims a unique name (spin UP)
    UniqueId(UniqueIdParticle),
}

impl Particle {
    /// Spin implied by the variant
    pub fn spin(&self) -> Spin {
        match self {
            Particle::Consumer(_) => Spin::Down,
            _ => Spin::Up,
        }
    }

    /// Particle identity
    pub fn id(&self) -> ParticleId {
        ParticleId::new(self.canonical_hash())
    }

    /// Transfer body and spin, for value-bearing particles
    pub fn as_transfer(&self) -> Option<(&TransferParticle, Spin)> {
        match self {
            Particle::Consumable(t) => Some((t, Spin::Up)),
            Particle::Consumer(t) => Some((t, Spin::Down)),
            _ => None,
        }
    }

    /// Owners of the particle
    pub fn owners(&self) -> &KeySet {
        match self {
            Particle::Consumable(t) | Particle::Consumer(t) => &t.owners,
            Particle::TokenDefinition(d) => &d.owners,
            Particle::UniqueId(u) => &u.owners,
        }
    }

    /// Whether any owner key belongs to the address
    pub fn owned_by(&self, address: &Address) -> bool {
        self.owners().iter().any(|key| address.owns_key(key))
    }

    /// Token the particle refers to, if any
    pub fn token(&self) -> Option<&TokenRef> {
        match self {
            Particle::Consumable(t) | Particle::Consumer(t) => Some(&t.token),
            Particle::TokenDefinition(d) => Some(&d.token),
            Particle::UniqueId(_) => None,
        }
    }
}

/// Application payload with opaque encryption metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// Payload bytes (possibly ciphertext)
    pub data: Vec<u8>,
    /// Encrypted copies of the payload key, one per reader
    #[serde(default)]
    pub protectors: Vec<Vec<u8>>,
}

/// Digital signature (Ed25519)
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Signature bytes (64 bytes)
    #[serde(with = "serde_bytes")]
    bytes: [u8; 64],
}

impl Signature {
    /// Create from bytes
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self { bytes }
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.bytes
    }

    /// Verify signature
    pub fn verify(&self, message: &[u8], public_key: &PublicKey) -> bool {
        crate::crypto::verify_signature(message, self, public_key)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}..)", &hex::encode(self.bytes)[..12])
    }
}

/// Immutable, content-addressed bundle of particles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Atom {
    /// Particles in submission order
    pub particles: Vec<Particle>,
    /// Milliseconds since Unix epoch (0 is invalid)
    pub timestamp: u64,
    /// Optional application payload
    pub payload: Option<Payload>,
    /// Signatures over the atom id, keyed by signer
    #[serde(default)]
    pub signatures: BTreeMap<PublicKey, Signature>,
}

impl Atom {
    /// Create an unsigned atom
    pub fn new(particles: Vec<Particle>, timestamp: u64, payload: Option<Payload>) -> Self {
        Self {
            particles,
            timestamp,
            payload,
            signatures: BTreeMap::new(),
        }
    }

    /// Atom identity
    pub fn id(&self) -> AtomId {
        AtomId::new(self.canonical_hash())
    }

    /// Attach a signature
    pub fn with_signature(mut self, signer: PublicKey, signature: Signature) -> Self {
        self.signatures.insert(signer, signature);
        self
    }

    /// Consumers (spin DOWN) in this atom
    pub fn consumers(&self) -> impl Iterator<Item = &TransferParticle> {
        self.particles.iter().filter_map(|p| match p {
            Particle::Consumer(t) => Some(t),
            _ => None,
        })
    }

    /// Consumables (spin UP) in this atom
    pub fn consumables(&self) -> impl Iterator<Item = &TransferParticle> {
        self.particles.iter().filter_map(|p| match p {
            Particle::Consumable(t) => Some(t),
            _ => None,
        })
    }

    /// Net signed quantity per token (UP = +, DOWN = -)
    pub fn token_deltas(&self) -> BTreeMap<TokenRef, i128> {
        let mut deltas = BTreeMap::new();
        for (transfer, spin) in self.particles.iter().filter_map(Particle::as_transfer) {
            let signed = match spin {
                Spin::Up => i128::from(transfer.quantity),
                Spin::Down => -i128::from(transfer.quantity),
            };
            *deltas.entry(transfer.token.clone()).or_insert(0) += signed;
        }
        deltas
    }

    /// Whether value is conserved for every token
    pub fn is_balanced(&self) -> bool {
        self.token_deltas().values().all(|delta| *delta == 0)
    }

    /// Every owner of every consumer must have signed the atom id
    pub fn verify_signatures(&self) -> Result<()> {
        let id = self.id();
        for consumer in self.consumers() {
            for owner in consumer.owners.iter() {
                let signature = self.signatures.get(owner).ok_or_else(|| {
                    Error::SignatureError(format!("atom {} missing signature from {}", id, owner))
                })?;
                if !signature.verify(id.hash().as_bytes(), owner) {
                    return Err(Error::SignatureError(format!(
                        "atom {} has invalid signature from {}",
                        id, owner
                    )));
                }
            }
        }
        Ok(())
    }
}
