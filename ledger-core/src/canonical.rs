//! Canonical encoding for content addressing
//!
//! Every hashed type maps itself to a [`CanonicalValue`] tree through an
//! explicit [`Canonical`] implementation. Objects are string-keyed maps whose
//! keys are kept sorted (`BTreeMap`), so two logically equal values always
//! produce the same bytes regardless of the order their fields were set in.
//! Every primitive is prefixed with a one-byte type tag and all lengths and
//! integers are big-endian.
//!
//! Each object carries a `serializer` field naming its type.

use crate::types::{
    Atom, Hash, KeySet, Particle, Payload, PublicKey, TokenDefinition, TokenRef,
    TransferParticle, UniqueIdParticle,
};
use std::collections::BTreeMap;

/// Type tags written before every encoded value
mod tag {
    pub const NONE: u8 = 0x00;
    pub const BOOL: u8 = 0x01;
    pub const U64: u8 = 0x02;
    pub const BYTES: u8 = 0x03;
    pub const STR: u8 = 0x04;
    pub const LIST: u8 = 0x05;
    pub const OBJECT: u8 = 0x06;
}

/// Field holding the type discriminator of an object
pub const SERIALIZER_FIELD: &str = "serializer";

/// Intermediate value tree fed to the encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalValue {
    /// Absent optional value
    None,
    /// Boolean
    Bool(bool),
    /// Unsigned integer
    U64(u64),
    /// Opaque bytes
    Bytes(Vec<u8>),
    /// UTF-8 string
    Str(String),
    /// Ordered list (order is significant)
    List(Vec<CanonicalValue>),
    /// Object with fields sorted by name
    Object(BTreeMap<String, CanonicalValue>),
}

impl CanonicalValue {
    /// Start an object tagged with its type discriminator
    pub fn object(serializer: &str) -> ObjectBuilder {
        let mut fields = BTreeMap::new();
        fields.insert(
            SERIALIZER_FIELD.to_string(),
            CanonicalValue::Str(serializer.to_string()),
        );
        ObjectBuilder { fields }
    }

    /// Encode into canonical bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut ser = CanonicalSerializer::new();
        ser.write_value(self);
        ser.finalize()
    }
}

/// Builder for [`CanonicalValue::Object`]
#[derive(Debug)]
pub struct ObjectBuilder {
    fields: BTreeMap<String, CanonicalValue>,
}

impl ObjectBuilder {
    /// Set a field; later writes to the same name replace earlier ones
    pub fn field(mut self, name: &str, value: impl Into<CanonicalValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Finish the object
    pub fn build(self) -> CanonicalValue {
        CanonicalValue::Object(self.fields)
    }
}

impl From<u64> for CanonicalValue {
    fn from(n: u64) -> Self {
        CanonicalValue::U64(n)
    }
}

impl From<bool> for CanonicalValue {
    fn from(b: bool) -> Self {
        CanonicalValue::Bool(b)
    }
}

impl From<&str> for CanonicalValue {
    fn from(s: &str) -> Self {
        CanonicalValue::Str(s.to_string())
    }
}

impl From<&String> for CanonicalValue {
    fn from(s: &String) -> Self {
        CanonicalValue::Str(s.clone())
    }
}

impl From<&[u8]> for CanonicalValue {
    fn from(bytes: &[u8]) -> Self {
        CanonicalValue::Bytes(bytes.to_vec())
    }
}

impl<T: Into<CanonicalValue>> From<Option<T>> for CanonicalValue {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(CanonicalValue::None)
    }
}

/// Types with a canonical encoding
pub trait Canonical {
    /// Map to the canonical value tree
    fn to_canonical(&self) -> CanonicalValue;

    /// Canonical bytes (input to hashing and signing)
    fn canonical_bytes(&self) -> Vec<u8> {
        self.to_canonical().encode()
    }

    /// SHA-256 of the canonical bytes
    fn canonical_hash(&self) -> Hash {
        Hash::of(&self.canonical_bytes())
    }
}

/// Canonical serializer
#[derive(Debug, Default)]
pub struct CanonicalSerializer {
    buffer: Vec<u8>,
}

impl CanonicalSerializer {
    /// Create new serializer
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    fn write_tag(&mut self, tag: u8) {
        self.buffer.push(tag);
    }

    /// Write u32 (big-endian)
    fn write_u32(&mut self, n: u32) {
        self.buffer.extend_from_slice(&n.to_be_bytes());
    }

    /// Write length-prefixed bytes
    fn write_len_prefixed(&mut self, bytes: &[u8]) {
        self.write_u32(bytes.len() as u32);
        self.buffer.extend_from_slice(bytes);
    }

    /// Write a tagged value
    pub fn write_value(&mut self, value: &CanonicalValue) {
        match value {
            CanonicalValue::None => self.write_tag(tag::NONE),
            CanonicalValue::Bool(b) => {
                self.write_tag(tag::BOOL);
                self.buffer.push(u8::from(*b));
            }
            CanonicalValue::U64(n) => {
                self.write_tag(tag::U64);
                self.buffer.extend_from_slice(&n.to_be_bytes());
            }
            CanonicalValue::Bytes(bytes) => {
                self.write_tag(tag::BYTES);
                self.write_len_prefixed(bytes);
            }
            CanonicalValue::Str(s) => {
                self.write_tag(tag::STR);
                self.write_len_prefixed(s.as_bytes());
            }
            CanonicalValue::List(items) => {
                self.write_tag(tag::LIST);
                self.write_u32(items.len() as u32);
                for item in items {
                    self.write_value(item);
                }
            }
            CanonicalValue::Object(fields) => {
                self.write_tag(tag::OBJECT);
                self.write_u32(fields.len() as u32);
                // BTreeMap iterates in lexicographic key order
                for (name, field) in fields {
                    self.write_len_prefixed(name.as_bytes());
                    self.write_value(field);
                }
            }
        }
    }

    /// Finalize and return bytes
    pub fn finalize(self) -> Vec<u8> {
        self.buffer
    }
}

// =========================================================================
// CANONICAL ENCODING FOR LEDGER TYPES
// =========================================================================

impl Canonical for PublicKey {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::Bytes(self.as_bytes().to_vec())
    }
}

impl Canonical for KeySet {
    fn to_canonical(&self) -> CanonicalValue {
        // BTreeSet keeps keys sorted
        CanonicalValue::List(self.iter().map(Canonical::to_canonical).collect())
    }
}

impl Canonical for TokenRef {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object("radix.token_ref")
            .field("issuer", self.issuer.public_key().to_canonical())
            .field("symbol", &self.symbol)
            .build()
    }
}

impl Canonical for TransferParticle {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object("radix.particles.transfer")
            .field("nonce", self.nonce)
            .field("owners", self.owners.to_canonical())
            .field("quantity", self.quantity)
            .field("token", self.token.to_canonical())
            .build()
    }
}

impl Canonical for TokenDefinition {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object("radix.particles.token_definition")
            .field("description", &self.description)
            .field("granularity", self.granularity)
            .field("name", &self.name)
            .field("owners", self.owners.to_canonical())
            .field("token", self.token.to_canonical())
            .build()
    }
}

impl Canonical for UniqueIdParticle {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object("radix.particles.unique_id")
            .field("name", &self.name)
            .field("nonce", self.nonce)
            .field("owners", self.owners.to_canonical())
            .build()
    }
}

impl Canonical for Particle {
    /// Value particles encode their transfer body without the spin, so a
    /// consumer and the consumable it spends share one identity.
    fn to_canonical(&self) -> CanonicalValue {
        match self {
            Particle::Consumable(transfer) | Particle::Consumer(transfer) => {
                transfer.to_canonical()
            }
            Particle::TokenDefinition(definition) => definition.to_canonical(),
            Particle::UniqueId(unique) => unique.to_canonical(),
        }
    }
}

impl Canonical for Payload {
    fn to_canonical(&self) -> CanonicalValue {
        CanonicalValue::object("radix.payload")
            .field("data", self.data.as_slice())
            .field(
                "protectors",
                CanonicalValue::List(
                    self.protectors
                        .iter()
                        .map(|p| CanonicalValue::Bytes(p.clone()))
                        .collect(),
                ),
            )
            .build()
    }
}

impl Canonical for Atom {
    /// Signatures are excluded: they sign this encoding.
    fn to_canonical(&self) -> CanonicalValue {
        let particles = self
            .particles
            .iter()
            .map(|p| {
                CanonicalValue::object("radix.spun_particle")
                    .field("particle", p.to_canonical())
                    .field("spin", p.spin().as_u64())
                    .build()
            })
            .collect();

        CanonicalValue::object("radix.atom")
            .field("particles", CanonicalValue::List(particles))
            .field("payload", self.payload.as_ref().map(Canonical::to_canonical))
            .field("timestamp", self.timestamp)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Address;

    fn key(byte: u8) -> PublicKey {
        PublicKey::from_bytes([byte; 32])
    }

    fn transfer(quantity: u64, nonce: u64) -> TransferParticle {
        TransferParticle {
            token: TokenRef::new(Address::from_public_key(key(9)), "XRD"),
            quantity,
            owners: KeySet::single(key(1)),
            nonce,
        }
    }

    #[test]
    fn test_field_order_does_not_matter() {
        let a = CanonicalValue::object("t")
            .field("b", 2u64)
            .field("a", 1u64)
            .build();
        let b = CanonicalValue::object("t")
            .field("a", 1u64)
            .field("b", 2u64)
            .build();
        assert_eq!(a.encode(), b.encode());
    }

    #[test]
    fn test_primitives_are_tagged() {
        assert_eq!(CanonicalValue::U64(1).encode()[0], tag::U64);
        assert_eq!(CanonicalValue::Str("x".into()).encode()[0], tag::STR);
        assert_eq!(CanonicalValue::Bytes(vec![1]).encode()[0], tag::BYTES);
        assert_eq!(CanonicalValue::None.encode(), vec![tag::NONE]);

        // Same payload, different type, different bytes
        let as_str = CanonicalValue::Str("a".into()).encode();
        let as_bytes = CanonicalValue::Bytes(b"a".to_vec()).encode();
        assert_ne!(as_str, as_bytes);
    }

    #[test]
    fn test_big_endian_integers() {
        let bytes = CanonicalValue::U64(0x0102).encode();
        assert_eq!(bytes, vec![tag::U64, 0, 0, 0, 0, 0, 0, 1, 2]);
    }

    #[test]
    fn test_consumer_shares_consumable_identity() {
        let up = Particle::Consumable(transfer(10, 7));
        let down = Particle::Consumer(transfer(10, 7));
        assert_eq!(up.id(), down.id());
    }

    #[test]
    fn test_nonce_disambiguates_identity() {
        let a = Particle::Consumable(transfer(10, 1));
        let b = Particle::Consumable(transfer(10, 2));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_atom_hash_covers_spin() {
        let up = Atom::new(vec![Particle::Consumable(transfer(10, 1))], 1, None);
        let down = Atom::new(vec![Particle::Consumer(transfer(10, 1))], 1, None);
        assert_ne!(up.id(), down.id());
    }

    #[test]
    fn test_atom_hash_covers_payload() {
        let bare = Atom::new(vec![], 5, None);
        let with_payload = Atom::new(
            vec![],
            5,
            Some(Payload {
                data: b"hello".to_vec(),
                protectors: vec![],
            }),
        );
        assert_ne!(bare.id(), with_payload.id());
    }
}
