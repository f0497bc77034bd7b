//! Conformance suite for storage engines
//!
//! Every suite drives a [`Registrar`] over stores minted by a factory and
//! panics on the first broken guarantee, so any [`CredentialStore`] engine can
//! check itself against the same contract the in-memory engine meets. Enable
//! the `testing` feature and call [`run_all`] from the engine's tests:
//!
//! ```ignore
//! #[tokio::test(flavor = "multi_thread")]
//! async fn conformance() {
//!     keyward_registrar::testing::run_all(|| Arc::new(MyStore::open()) as _).await;
//! }
//! ```
//!
//! Each suite asks the factory for a fresh, empty store.

use keyward_core::{
    Challenge, Change, Ed25519Sha512, Identity, KeyPair, PublicKeyHash, RegistrarError,
    SignedChallenge,
};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::registrar::Registrar;
use crate::storage::CredentialStore;

/// Simultaneous registrations raced by [`concurrent_registration`]
pub const RACE_WIDTH: usize = 5;

/// Run every suite against stores built by `new_store`
pub async fn run_all<F>(new_store: F)
where
    F: Fn() -> Arc<dyn CredentialStore>,
{
    challenges(&new_store).await;
    registration(&new_store).await;
    concurrent_registration(&new_store).await;
    authentication(&new_store).await;
    updates(&new_store).await;
    deregistration(&new_store).await;
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    registrar: Registrar,
}

impl Harness {
    fn new<F>(new_store: &F) -> Self
    where
        F: Fn() -> Arc<dyn CredentialStore>,
    {
        Self {
            registrar: Registrar::ed25519(new_store()),
        }
    }

    async fn challenge(&self) -> Challenge {
        self.registrar
            .get_challenge()
            .await
            .expect("store failed to issue a challenge")
    }

    async fn identity_count(&self) -> usize {
        self.registrar
            .store()
            .identity_count()
            .await
            .expect("store failed to count identities")
    }

    async fn try_register(
        &self,
        factor_count: u32,
        keys: &[&KeyPair],
    ) -> Result<Identity, RegistrarError> {
        let challenge = self.challenge().await;
        self.registrar
            .register(&challenge, factor_count, &sign_all(&challenge, keys))
            .await
    }

    async fn register(&self, factor_count: u32, keys: &[&KeyPair]) -> Identity {
        self.try_register(factor_count, keys)
            .await
            .expect("registration should succeed")
    }

    async fn authenticate(&self, keys: &[&KeyPair]) -> Result<Identity, RegistrarError> {
        let challenge = self.challenge().await;
        self.registrar
            .authenticate(&challenge, &sign_all(&challenge, keys))
            .await
    }

    async fn update<C>(&self, keys: &[&KeyPair], changes: C) -> Result<(), RegistrarError>
    where
        C: Fn(&Challenge) -> Vec<Change>,
    {
        let challenge = self.challenge().await;
        self.registrar
            .update(&challenge, &sign_all(&challenge, keys), &changes(&challenge))
            .await
    }

    async fn credentials(&self, keys: &[&KeyPair]) -> BTreeSet<PublicKeyHash> {
        let challenge = self.challenge().await;
        self.registrar
            .enumerate_credentials(&challenge, &sign_all(&challenge, keys))
            .await
            .expect("enumeration should succeed")
    }

    async fn deregister(&self, keys: &[&KeyPair]) -> Result<Identity, RegistrarError> {
        let challenge = self.challenge().await;
        self.registrar
            .deregister(&challenge, &sign_all(&challenge, keys))
            .await
    }
}

fn keyring(count: usize) -> Vec<KeyPair> {
    (0..count).map(|_| KeyPair::generate()).collect()
}

fn sign_all(challenge: &Challenge, keys: &[&KeyPair]) -> Vec<SignedChallenge> {
    keys.iter().map(|key| key.sign(challenge)).collect()
}

fn hashes_of(keys: &[&KeyPair]) -> BTreeSet<PublicKeyHash> {
    keys.iter().map(|key| key.public_key_hash(&Ed25519Sha512)).collect()
}

// =============================================================================
// Suites
// =============================================================================

/// Challenges are non-empty, distinct per issuance and single use
pub async fn challenges<F>(new_store: &F)
where
    F: Fn() -> Arc<dyn CredentialStore>,
{
    let h = Harness::new(new_store);
    let keys = keyring(1);

    let first = h.challenge().await;
    let second = h.challenge().await;
    assert!(!first.is_empty(), "challenges must not be empty");
    assert_ne!(first, second, "each issuance must yield a new challenge");

    let signatures = sign_all(&first, &[&keys[0]]);
    h.registrar
        .register(&first, 1, &signatures)
        .await
        .expect("registration should succeed");
    assert_eq!(
        h.registrar.authenticate(&first, &signatures).await,
        Err(RegistrarError::InvalidChallenge),
        "a spent challenge must be rejected"
    );

    let unissued = Challenge::new(vec![0xA5; first.len()]);
    assert_eq!(
        h.registrar
            .authenticate(&unissued, &sign_all(&unissued, &[&keys[0]]))
            .await,
        Err(RegistrarError::InvalidChallenge),
        "an unissued challenge must be rejected"
    );

    // Spending the first challenge left the second one usable
    let identity = h
        .registrar
        .authenticate(&second, &sign_all(&second, &[&keys[0]]))
        .await
        .expect("an outstanding challenge must stay valid");
    assert_eq!(h.authenticate(&[&keys[0]]).await, Ok(identity));
}

/// Registration creates identities and refuses keys already owned
pub async fn registration<F>(new_store: &F)
where
    F: Fn() -> Arc<dyn CredentialStore>,
{
    let h = Harness::new(new_store);
    let keys = keyring(5);

    let single = h.register(1, &[&keys[0]]).await;
    assert_eq!(h.identity_count().await, 1);
    assert_eq!(h.credentials(&[&keys[0]]).await, hashes_of(&[&keys[0]]));

    assert_eq!(
        h.try_register(1, &[&keys[1], &keys[0]]).await,
        Err(RegistrarError::AlreadyRegistered)
    );
    assert_eq!(h.identity_count().await, 1);
    assert_eq!(
        h.authenticate(&[&keys[1]]).await,
        Err(RegistrarError::UnrecognizedSignature),
        "a rejected registration must not claim its other keys"
    );

    let multi = h.register(2, &[&keys[2], &keys[3], &keys[4]]).await;
    assert_ne!(single, multi);
    assert_eq!(
        h.credentials(&[&keys[4], &keys[2]]).await,
        hashes_of(&[&keys[2], &keys[3], &keys[4]])
    );
    assert_eq!(h.identity_count().await, 2);
}

/// Of several simultaneous registrations of one key, exactly one wins
pub async fn concurrent_registration<F>(new_store: &F)
where
    F: Fn() -> Arc<dyn CredentialStore>,
{
    let h = Harness::new(new_store);
    let keys = keyring(1);
    let before = h.identity_count().await;

    let mut attempts = Vec::with_capacity(RACE_WIDTH);
    for _ in 0..RACE_WIDTH {
        let challenge = h.challenge().await;
        let signatures = sign_all(&challenge, &[&keys[0]]);
        let registrar = h.registrar.clone();
        attempts.push(tokio::spawn(async move {
            registrar.register(&challenge, 1, &signatures).await
        }));
    }

    let mut succeeded = 0;
    let mut rejected = 0;
    for attempt in attempts {
        match attempt.await.expect("registration task panicked") {
            Ok(_) => succeeded += 1,
            Err(RegistrarError::AlreadyRegistered) => rejected += 1,
            Err(other) => panic!("unexpected registration error: {other}"),
        }
    }

    assert_eq!(succeeded, 1, "exactly one registration must succeed");
    assert_eq!(rejected, RACE_WIDTH - 1);
    assert_eq!(h.identity_count().await, before + 1);
}

/// Identity resolution and factor thresholds
pub async fn authentication<F>(new_store: &F)
where
    F: Fn() -> Arc<dyn CredentialStore>,
{
    let h = Harness::new(new_store);
    let keys = keyring(4);

    let identity = h.register(2, &[&keys[0], &keys[1]]).await;
    h.register(1, &[&keys[2]]).await;

    assert_eq!(h.authenticate(&[&keys[1], &keys[0]]).await, Ok(identity));
    assert_eq!(
        h.authenticate(&[&keys[0]]).await,
        Err(RegistrarError::InsufficientFactors { required: 2 })
    );
    assert_eq!(
        h.authenticate(&[&keys[3]]).await,
        Err(RegistrarError::UnrecognizedSignature)
    );
    assert_eq!(
        h.authenticate(&[&keys[0], &keys[2]]).await,
        Err(RegistrarError::UnrecognizedSignature),
        "keys spanning identities must not resolve"
    );
}

/// Change sets apply all-or-nothing
pub async fn updates<F>(new_store: &F)
where
    F: Fn() -> Arc<dyn CredentialStore>,
{
    let h = Harness::new(new_store);
    let keys = keyring(5);
    h.register(1, &[&keys[0]]).await;
    h.register(1, &[&keys[4]]).await;

    h.update(&[&keys[0]], |c| {
        vec![Change::add_key(keys[1].sign(c)), Change::add_key(keys[2].sign(c))]
    })
    .await
    .expect("adding keys should succeed");
    assert_eq!(
        h.credentials(&[&keys[0]]).await,
        hashes_of(&[&keys[0], &keys[1], &keys[2]])
    );

    h.update(&[&keys[1]], |c| {
        vec![
            Change::set_factor_count(2),
            Change::add_key(keys[3].sign(c)),
            Change::remove_key(keys[0].public_key_hash(&Ed25519Sha512)),
        ]
    })
    .await
    .expect("a mixed change set should succeed");
    let current = hashes_of(&[&keys[1], &keys[2], &keys[3]]);
    assert_eq!(h.credentials(&[&keys[1], &keys[3]]).await, current);

    assert_eq!(
        h.update(&[&keys[1], &keys[2]], |_| {
            vec![
                Change::set_factor_count(3),
                Change::remove_key(keys[3].public_key_hash(&Ed25519Sha512)),
            ]
        })
        .await,
        Err(RegistrarError::FactorCountExceedsKeyCount)
    );
    assert_eq!(
        h.update(&[&keys[1], &keys[2]], |c| vec![Change::add_key(keys[4].sign(c))])
            .await,
        Err(RegistrarError::AlreadyRegistered)
    );
    let missing = keys[0].public_key_hash(&Ed25519Sha512);
    assert_eq!(
        h.update(&[&keys[1], &keys[2]], |_| vec![Change::remove_key(missing.clone())])
            .await,
        Err(RegistrarError::KeyNotRegistered(missing.clone()))
    );

    // None of the rejected change sets left a trace
    assert_eq!(h.credentials(&[&keys[2], &keys[3]]).await, current);
    assert_eq!(
        h.authenticate(&[&keys[3]]).await,
        Err(RegistrarError::InsufficientFactors { required: 2 })
    );
}

/// Deregistration removes the identity and frees its keys
pub async fn deregistration<F>(new_store: &F)
where
    F: Fn() -> Arc<dyn CredentialStore>,
{
    let h = Harness::new(new_store);
    let keys = keyring(3);
    let identity = h.register(1, &[&keys[0], &keys[1]]).await;
    h.register(1, &[&keys[2]]).await;

    let stranger = KeyPair::generate();
    assert_eq!(
        h.deregister(&[&stranger]).await,
        Err(RegistrarError::UnrecognizedSignature)
    );
    assert_eq!(h.identity_count().await, 2);

    assert_eq!(h.deregister(&[&keys[1]]).await, Ok(identity));
    assert_eq!(h.identity_count().await, 1);
    assert_eq!(
        h.authenticate(&[&keys[0]]).await,
        Err(RegistrarError::UnrecognizedSignature)
    );

    let again = h.register(1, &[&keys[0], &keys[1]]).await;
    assert_ne!(again, identity);
}
