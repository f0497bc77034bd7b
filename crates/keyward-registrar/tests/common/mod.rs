//! Shared helpers for registrar integration tests

#![allow(dead_code)]

use keyward_core::{Challenge, Ed25519Sha512, KeyPair, PublicKeyHash, Signature, SignedChallenge};
use keyward_registrar::{MemoryStore, Registrar};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Route registrar logs to the test harness, filtered by `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Registrar over a fresh memory store
pub fn registrar() -> (Registrar, Arc<MemoryStore>) {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    (Registrar::ed25519(store.clone()), store)
}

pub fn keyring(count: usize) -> Vec<KeyPair> {
    (0..count).map(|_| KeyPair::generate()).collect()
}

pub fn sign_all(challenge: &Challenge, keys: &[&KeyPair]) -> Vec<SignedChallenge> {
    keys.iter().map(|key| key.sign(challenge)).collect()
}

/// The same entry with the first signature byte flipped
pub fn tampered(signed: SignedChallenge) -> SignedChallenge {
    let mut bytes = signed.signature.as_bytes().to_vec();
    bytes[0] ^= 0x01;
    SignedChallenge::new(Signature::new(bytes), signed.public_key)
}

pub fn hash_of(key: &KeyPair) -> PublicKeyHash {
    key.public_key_hash(&Ed25519Sha512)
}

pub fn hashes_of(keys: &[&KeyPair]) -> BTreeSet<PublicKeyHash> {
    keys.iter().map(|key| hash_of(key)).collect()
}

/// Register `keys` as one identity requiring `factor_count` signatures
pub async fn register(
    registrar: &Registrar,
    factor_count: u32,
    keys: &[&KeyPair],
) -> keyward_core::Identity {
    let challenge = registrar.get_challenge().await.expect("challenge");
    registrar
        .register(&challenge, factor_count, &sign_all(&challenge, keys))
        .await
        .expect("registration")
}

/// Sign with the first `factor_count` of `expected` and check the identity
/// holds exactly `expected`
pub async fn verify_credentials(registrar: &Registrar, expected: &[&KeyPair], factor_count: usize) {
    let challenge = registrar.get_challenge().await.expect("challenge");
    let signatures = sign_all(&challenge, &expected[..factor_count]);
    let credentials = registrar
        .enumerate_credentials(&challenge, &signatures)
        .await
        .expect("enumerate credentials");
    assert_eq!(credentials, hashes_of(expected));
}
