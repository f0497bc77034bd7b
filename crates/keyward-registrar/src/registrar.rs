//! The registrar
//!
//! Each operation validates the request shape, verifies signatures against
//! the challenge, then hands the verified hash set to storage. The registrar
//! keeps no state between calls.

use keyward_core::{
    Challenge, Change, CryptoProvider, Ed25519Sha512, FactorCount, Identity, PublicKeyHash,
    RegistrarError, Result, SignedChallenge,
};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::{normalize_changes, verify_signatures};
use crate::storage::CredentialStore;

/// Multi-factor public key registrar
///
/// Cheap to clone; clones share the same collaborators.
#[derive(Clone)]
pub struct Registrar {
    crypto: Arc<dyn CryptoProvider>,
    store: Arc<dyn CredentialStore>,
}

impl fmt::Debug for Registrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registrar")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl Registrar {
    pub fn new(crypto: Arc<dyn CryptoProvider>, store: Arc<dyn CredentialStore>) -> Self {
        Self { crypto, store }
    }

    /// Registrar using Ed25519 signatures and SHA-512 key hashes
    pub fn ed25519(store: Arc<dyn CredentialStore>) -> Self {
        Self::new(Arc::new(Ed25519Sha512), store)
    }

    pub fn crypto(&self) -> &dyn CryptoProvider {
        self.crypto.as_ref()
    }

    pub fn store(&self) -> &dyn CredentialStore {
        self.store.as_ref()
    }

    /// Issue a challenge for the client to sign
    pub async fn get_challenge(&self) -> Result<Challenge> {
        self.store.get_challenge().await
    }

    /// Register a new identity owning every signing key
    ///
    /// `factor_count` must be at least one and no more than the number of
    /// signatures, so the new identity can always authenticate with the keys
    /// it was registered with.
    pub async fn register(
        &self,
        challenge: &Challenge,
        factor_count: u32,
        signatures: &[SignedChallenge],
    ) -> Result<Identity> {
        let factor_count = FactorCount::new(factor_count)?;
        if !factor_count.is_satisfied_by(signatures.len()) {
            warn!(
                factor_count = %factor_count,
                signatures = signatures.len(),
                "Factor count exceeds signatures provided"
            );
            return Err(RegistrarError::InsufficientSignatures);
        }

        let public_key_hashes = self.verify(challenge, signatures)?;
        debug!(keys = public_key_hashes.len(), factor_count = %factor_count, "Registering");
        self.store
            .register(challenge, &public_key_hashes, factor_count)
            .await
    }

    /// Resolve the identity that owns the signing keys
    pub async fn authenticate(
        &self,
        challenge: &Challenge,
        signatures: &[SignedChallenge],
    ) -> Result<Identity> {
        let public_key_hashes = self.verify(challenge, signatures)?;
        self.store.authenticate(challenge, &public_key_hashes).await
    }

    /// Apply a change set to the identity that owns the signing keys
    ///
    /// The change set is validated in full, including each added key's own
    /// signature over the challenge, before the authenticating signatures are
    /// checked. Any failure leaves the identity unchanged.
    pub async fn update(
        &self,
        challenge: &Challenge,
        signatures: &[SignedChallenge],
        changes: &[Change],
    ) -> Result<()> {
        let changes = normalize_changes(self.crypto.as_ref(), challenge, changes)?;
        let public_key_hashes = self.verify(challenge, signatures)?;
        debug!(changes = changes.len(), "Updating");
        self.store
            .update(challenge, &public_key_hashes, &changes)
            .await
    }

    /// List the hashes of every key registered to the signer's identity
    pub async fn enumerate_credentials(
        &self,
        challenge: &Challenge,
        signatures: &[SignedChallenge],
    ) -> Result<BTreeSet<PublicKeyHash>> {
        let public_key_hashes = self.verify(challenge, signatures)?;
        self.store
            .enumerate_credentials(challenge, &public_key_hashes)
            .await
    }

    /// Remove the signer's identity and all of its keys
    pub async fn deregister(
        &self,
        challenge: &Challenge,
        signatures: &[SignedChallenge],
    ) -> Result<Identity> {
        let public_key_hashes = self.verify(challenge, signatures)?;
        self.store.deregister(challenge, &public_key_hashes).await
    }

    fn verify(
        &self,
        challenge: &Challenge,
        signatures: &[SignedChallenge],
    ) -> Result<Vec<PublicKeyHash>> {
        verify_signatures(self.crypto.as_ref(), challenge, signatures)
    }
}
