//! Cryptographic collaborator for challenge signing and verification
//!
//! The registrar needs exactly two primitives: a fixed-length hash of a
//! public key, and detached signature verification. Both sit behind
//! [`CryptoProvider`] so deployments can swap the algorithm suite.
//!
//! The default suite, [`Ed25519Sha512`], matches NaCl's `crypto_hash` and
//! `crypto_sign_detached`:
//! - hash: SHA-512 (64 bytes)
//! - signatures: Ed25519 (32-byte public keys, 64-byte signatures)

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha512};

use crate::types::{Challenge, PublicKey, PublicKeyHash, Signature, SignedChallenge};

/// Hashing and detached-signature verification
pub trait CryptoProvider: Send + Sync {
    /// Deterministic, fixed-length hash of a public key
    fn hash(&self, public_key: &[u8]) -> Vec<u8>;

    /// Verify `signature` over `message` by `public_key`
    ///
    /// Malformed keys or signatures verify as `false`.
    fn verify_detached(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> bool;

    /// Hash a public key into its canonical credential identifier
    fn public_key_hash(&self, public_key: &PublicKey) -> PublicKeyHash {
        PublicKeyHash::from_bytes(self.hash(public_key.as_bytes()))
    }
}

/// Ed25519 signatures with SHA-512 key hashing
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Sha512;

impl Ed25519Sha512 {
    pub const PUBLIC_KEY_LENGTH: usize = ed25519_dalek::PUBLIC_KEY_LENGTH;
    pub const SIGNATURE_LENGTH: usize = ed25519_dalek::SIGNATURE_LENGTH;
    pub const HASH_LENGTH: usize = 64;
}

impl CryptoProvider for Ed25519Sha512 {
    fn hash(&self, public_key: &[u8]) -> Vec<u8> {
        Sha512::digest(public_key).to_vec()
    }

    fn verify_detached(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
        let Ok(key_bytes) = <[u8; 32]>::try_from(public_key) else {
            return false;
        };
        let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
            return false;
        };
        let Ok(signature) = ed25519_dalek::Signature::from_slice(signature) else {
            return false;
        };
        verifying_key.verify(message, &signature).is_ok()
    }
}

/// Ed25519 key pair held by a client
///
/// The registrar never handles secret keys; this type exists so clients and
/// tests can answer challenges.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key())
            .field("signing_key", &"[redacted]")
            .finish()
    }
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Create a key pair from a 32-byte secret seed
    pub fn from_bytes(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::new(self.signing_key.verifying_key().to_bytes().to_vec())
    }

    /// Raw secret seed bytes
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Produce a detached signature over the challenge
    pub fn sign(&self, challenge: &Challenge) -> SignedChallenge {
        let signature = self.signing_key.sign(challenge.as_bytes());
        SignedChallenge::new(
            Signature::new(signature.to_bytes().to_vec()),
            self.public_key(),
        )
    }

    /// Convenience for the hash a given provider assigns this key
    pub fn public_key_hash(&self, crypto: &dyn CryptoProvider) -> PublicKeyHash {
        crypto.public_key_hash(&self.public_key())
    }
}
