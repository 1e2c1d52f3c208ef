//! Cryptographic operations for the ledger client
//!
//! This module provides:
//! - Ed25519 key pair generation, signing, and verification
//! - SHA-256 hashing for atom and particle identity
//!
//! Signatures always cover the 32-byte atom id, never the raw encoding.

use crate::types::{Address, AtomId, PublicKey, Signature};
use crate::{Error, Result};
use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

/// Ed25519 key pair for signing
#[derive(Debug)]
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self::from_seed(&rand::random::<[u8; 32]>())
    }

    /// Create from seed (32 bytes) - deterministic generation
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Public key
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_bytes(self.verifying_key.to_bytes())
    }

    /// Address controlled by this key pair
    pub fn address(&self) -> Address {
        Address::from_public_key(self.public_key())
    }

    /// Sign an atom id
    pub fn sign(&self, atom_id: &AtomId) -> Signature {
        let signature = self.signing_key.sign(atom_id.hash().as_bytes());
        Signature::from_bytes(signature.to_bytes())
    }

    /// Verify a signature made by this key pair
    pub fn verify(&self, atom_id: &AtomId, signature: &Signature) -> Result<()> {
        let dalek_sig = DalekSignature::from_bytes(signature.as_bytes());
        self.verifying_key
            .verify(atom_id.hash().as_bytes(), &dalek_sig)
            .map_err(|e| Error::SignatureError(format!("Verification failed: {}", e)))
    }
}

/// Verify a signature with a public key
pub fn verify_signature(message: &[u8], signature: &Signature, public_key: &PublicKey) -> bool {
    let dalek_sig = DalekSignature::from_bytes(signature.as_bytes());

    let verifying_key = match VerifyingKey::from_bytes(public_key.as_bytes()) {
        Ok(key) => key,
        Err(_) => return false,
    };

    verifying_key.verify(message, &dalek_sig).is_ok()
}

/// Hash arbitrary bytes using SHA-256
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}
