//! In-memory storage backend
//!
//! Reference storage engine. All state sits behind a single lock so every
//! operation is atomic with respect to every other. Data is lost on restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keyward_core::{
    Challenge, FactorCount, Identity, NormalizedChange, PublicKeyHash, RegistrarError, Result,
};
use rand::{rngs::OsRng, RngCore};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

use super::{backend_error, CredentialStore};
use crate::config::StoreConfig;

/// Stored state of one identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRecord {
    pub identity: Identity,
    /// Hashes of every key registered to this identity
    pub credentials: BTreeSet<PublicKeyHash>,
    pub factor_count: FactorCount,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    /// Outstanding challenges. Issued but never presented challenges stay
    /// here until the store is dropped; there is no expiry.
    challenges: HashSet<Challenge>,
    identities: HashMap<Identity, IdentityRecord>,
    /// Which identity each registered key belongs to
    owners: HashMap<PublicKeyHash, Identity>,
}

impl State {
    fn consume_challenge(&mut self, challenge: &Challenge) -> Result<()> {
        if !self.challenges.remove(challenge) {
            debug!(len = challenge.len(), "Rejected unknown or spent challenge");
            return Err(RegistrarError::InvalidChallenge);
        }
        Ok(())
    }

    /// Find the one identity owning every presented key and check its threshold
    fn resolve(&self, public_key_hashes: &[PublicKeyHash]) -> Result<&IdentityRecord> {
        let mut resolved: Option<Identity> = None;
        for hash in public_key_hashes {
            let owner = self
                .owners
                .get(hash)
                .ok_or(RegistrarError::UnrecognizedSignature)?;
            match resolved {
                None => resolved = Some(*owner),
                Some(identity) if identity != *owner => {
                    return Err(RegistrarError::UnrecognizedSignature);
                }
                Some(_) => {}
            }
        }

        let identity = resolved.ok_or(RegistrarError::UnrecognizedSignature)?;
        let record = self
            .identities
            .get(&identity)
            .ok_or_else(|| backend_error(format!("key bound to missing identity {}", identity)))?;

        if !record.factor_count.is_satisfied_by(public_key_hashes.len()) {
            return Err(RegistrarError::InsufficientFactors {
                required: record.factor_count.get(),
            });
        }
        Ok(record)
    }
}

/// In-memory credential store implementation
#[derive(Debug)]
pub struct MemoryStore {
    config: StoreConfig,
    state: RwLock<State>,
}

impl MemoryStore {
    /// Create a new in-memory store with default settings
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            config,
            state: RwLock::new(State::default()),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Look up an identity's stored record
    pub fn identity_record(&self, identity: &Identity) -> Result<Option<IdentityRecord>> {
        Ok(self.read()?.identities.get(identity).cloned())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| backend_error("memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| backend_error("memory store lock poisoned"))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get_challenge(&self) -> Result<Challenge> {
        let mut bytes = vec![0u8; self.config.challenge_len()];
        OsRng.fill_bytes(&mut bytes);
        let challenge = Challenge::new(bytes);

        let mut state = self.write()?;
        state.challenges.insert(challenge.clone());
        Ok(challenge)
    }

    async fn register(
        &self,
        challenge: &Challenge,
        public_key_hashes: &[PublicKeyHash],
        factor_count: FactorCount,
    ) -> Result<Identity> {
        let mut state = self.write()?;
        state.consume_challenge(challenge)?;

        if public_key_hashes.iter().any(|h| state.owners.contains_key(h)) {
            return Err(RegistrarError::AlreadyRegistered);
        }

        let credentials: BTreeSet<PublicKeyHash> = public_key_hashes.iter().cloned().collect();
        if !factor_count.is_satisfied_by(credentials.len()) {
            return Err(RegistrarError::FactorCountExceedsKeyCount);
        }

        let identity = Identity::generate();
        let now = Utc::now();
        for hash in &credentials {
            state.owners.insert(hash.clone(), identity);
        }
        state.identities.insert(
            identity,
            IdentityRecord {
                identity,
                credentials,
                factor_count,
                registered_at: now,
                updated_at: now,
            },
        );

        info!(
            identity = %identity,
            keys = public_key_hashes.len(),
            factor_count = %factor_count,
            "Registered identity"
        );
        Ok(identity)
    }

    async fn authenticate(
        &self,
        challenge: &Challenge,
        public_key_hashes: &[PublicKeyHash],
    ) -> Result<Identity> {
        let mut state = self.write()?;
        state.consume_challenge(challenge)?;
        let identity = state.resolve(public_key_hashes)?.identity;

        debug!(identity = %identity, "Authenticated identity");
        Ok(identity)
    }

    async fn update(
        &self,
        challenge: &Challenge,
        public_key_hashes: &[PublicKeyHash],
        changes: &[NormalizedChange],
    ) -> Result<()> {
        let mut state = self.write()?;
        state.consume_challenge(challenge)?;
        let current = state.resolve(public_key_hashes)?.clone();

        // Apply to a working copy; nothing is committed unless every change holds
        let mut credentials = current.credentials.clone();
        let mut factor_count = current.factor_count;
        for change in changes {
            match change {
                NormalizedChange::AddKey {
                    public_key_hash, ..
                } => {
                    if state.owners.contains_key(public_key_hash)
                        || credentials.contains(public_key_hash)
                    {
                        return Err(RegistrarError::AlreadyRegistered);
                    }
                    credentials.insert(public_key_hash.clone());
                }
                NormalizedChange::RemoveKey(public_key_hash) => {
                    if !credentials.remove(public_key_hash) {
                        return Err(RegistrarError::KeyNotRegistered(public_key_hash.clone()));
                    }
                }
                NormalizedChange::SetFactorCount(count) => factor_count = *count,
            }
        }

        if !factor_count.is_satisfied_by(credentials.len()) {
            return Err(RegistrarError::FactorCountExceedsKeyCount);
        }

        let identity = current.identity;
        for removed in current.credentials.difference(&credentials) {
            state.owners.remove(removed);
        }
        for added in credentials.difference(&current.credentials) {
            state.owners.insert(added.clone(), identity);
        }
        let key_count = credentials.len();
        state.identities.insert(
            identity,
            IdentityRecord {
                credentials,
                factor_count,
                updated_at: Utc::now(),
                ..current
            },
        );

        info!(
            identity = %identity,
            changes = changes.len(),
            keys = key_count,
            factor_count = %factor_count,
            "Updated identity"
        );
        Ok(())
    }

    async fn enumerate_credentials(
        &self,
        challenge: &Challenge,
        public_key_hashes: &[PublicKeyHash],
    ) -> Result<BTreeSet<PublicKeyHash>> {
        let mut state = self.write()?;
        state.consume_challenge(challenge)?;
        Ok(state.resolve(public_key_hashes)?.credentials.clone())
    }

    async fn deregister(
        &self,
        challenge: &Challenge,
        public_key_hashes: &[PublicKeyHash],
    ) -> Result<Identity> {
        let mut state = self.write()?;
        state.consume_challenge(challenge)?;
        let identity = state.resolve(public_key_hashes)?.identity;

        if let Some(record) = state.identities.remove(&identity) {
            for hash in &record.credentials {
                state.owners.remove(hash);
            }
        }

        info!(identity = %identity, "Deregistered identity");
        Ok(identity)
    }

    async fn identity_count(&self) -> Result<usize> {
        Ok(self.read()?.identities.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn hash(byte: u8) -> PublicKeyHash {
        PublicKeyHash::from_bytes(vec![byte; 64])
    }

    fn count(n: u32) -> FactorCount {
        FactorCount::new(n).unwrap()
    }

    #[tokio::test]
    async fn test_challenge_length_follows_config() {
        let store = MemoryStore::new();
        assert_eq!(store.get_challenge().await.unwrap().len(), 64);

        let store = MemoryStore::with_config(StoreConfig::default().with_challenge_len(16));
        assert_eq!(store.get_challenge().await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_zero_challenge_len_still_issues_distinct_challenges() {
        let store = MemoryStore::with_config(StoreConfig::default().with_challenge_len(0));
        let first = store.get_challenge().await.unwrap();
        let second = store.get_challenge().await.unwrap();
        assert_eq!(first.len(), 64);
        assert_ne!(first, second);

        // Spending one challenge leaves the other usable
        store.register(&first, &[hash(1)], count(1)).await.unwrap();
        store.authenticate(&second, &[hash(1)]).await.unwrap();
    }

    #[tokio::test]
    async fn test_challenge_single_use() {
        let store = MemoryStore::new();
        let challenge = store.get_challenge().await.unwrap();

        store.register(&challenge, &[hash(1)], count(1)).await.unwrap();
        let result = store.authenticate(&challenge, &[hash(1)]).await;
        assert_eq!(result, Err(RegistrarError::InvalidChallenge));
    }

    #[tokio::test]
    async fn test_unissued_challenge_rejected() {
        let store = MemoryStore::new();
        let result = store
            .register(&Challenge::new(vec![0; 64]), &[hash(1)], count(1))
            .await;
        assert_eq!(result, Err(RegistrarError::InvalidChallenge));
    }

    #[tokio::test]
    async fn test_register_and_authenticate() {
        let store = MemoryStore::new();

        let challenge = store.get_challenge().await.unwrap();
        let identity = store.register(&challenge, &[hash(1), hash(2)], count(2)).await.unwrap();

        let challenge = store.get_challenge().await.unwrap();
        let authenticated = store.authenticate(&challenge, &[hash(2), hash(1)]).await.unwrap();
        assert_eq!(authenticated, identity);

        let challenge = store.get_challenge().await.unwrap();
        let result = store.authenticate(&challenge, &[hash(1)]).await;
        assert_eq!(result, Err(RegistrarError::InsufficientFactors { required: 2 }));
    }

    #[tokio::test]
    async fn test_register_rejects_owned_key() {
        let store = MemoryStore::new();

        let challenge = store.get_challenge().await.unwrap();
        store.register(&challenge, &[hash(1)], count(1)).await.unwrap();

        let challenge = store.get_challenge().await.unwrap();
        let result = store.register(&challenge, &[hash(2), hash(1)], count(1)).await;
        assert_eq!(result, Err(RegistrarError::AlreadyRegistered));
        assert_eq!(store.identity_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_authenticate_across_identities_rejected() {
        let store = MemoryStore::new();

        let challenge = store.get_challenge().await.unwrap();
        store.register(&challenge, &[hash(1)], count(1)).await.unwrap();
        let challenge = store.get_challenge().await.unwrap();
        store.register(&challenge, &[hash(2)], count(1)).await.unwrap();

        let challenge = store.get_challenge().await.unwrap();
        let result = store.authenticate(&challenge, &[hash(1), hash(2)]).await;
        assert_eq!(result, Err(RegistrarError::UnrecognizedSignature));

        let challenge = store.get_challenge().await.unwrap();
        let result = store.authenticate(&challenge, &[hash(9)]).await;
        assert_eq!(result, Err(RegistrarError::UnrecognizedSignature));
    }

    #[tokio::test]
    async fn test_update_applies_all_changes() {
        let store = MemoryStore::new();

        let challenge = store.get_challenge().await.unwrap();
        let identity = store.register(&challenge, &[hash(1), hash(2)], count(1)).await.unwrap();

        let challenge = store.get_challenge().await.unwrap();
        let changes = vec![
            NormalizedChange::SetFactorCount(count(2)),
            NormalizedChange::RemoveKey(hash(1)),
            NormalizedChange::AddKey {
                public_key: vec![3; 32].into(),
                public_key_hash: hash(3),
                signature: vec![0; 64].into(),
            },
        ];
        store.update(&challenge, &[hash(1)], &changes).await.unwrap();

        let record = store.identity_record(&identity).unwrap().unwrap();
        assert_eq!(record.factor_count, count(2));
        assert_eq!(record.credentials, BTreeSet::from([hash(2), hash(3)]));

        // The removed key no longer resolves
        let challenge = store.get_challenge().await.unwrap();
        let result = store.authenticate(&challenge, &[hash(1)]).await;
        assert_eq!(result, Err(RegistrarError::UnrecognizedSignature));
    }

    #[tokio::test]
    async fn test_failed_update_leaves_identity_untouched() {
        let store = MemoryStore::new();

        let challenge = store.get_challenge().await.unwrap();
        let identity = store.register(&challenge, &[hash(1), hash(2)], count(1)).await.unwrap();
        let before = store.identity_record(&identity).unwrap().unwrap();

        // Removing both keys leaves none for a factor count of one
        let challenge = store.get_challenge().await.unwrap();
        let changes = vec![
            NormalizedChange::RemoveKey(hash(1)),
            NormalizedChange::RemoveKey(hash(2)),
        ];
        let result = store.update(&challenge, &[hash(1)], &changes).await;
        assert_eq!(result, Err(RegistrarError::FactorCountExceedsKeyCount));

        // Removing a key the identity never had
        let challenge = store.get_challenge().await.unwrap();
        let changes = vec![
            NormalizedChange::RemoveKey(hash(1)),
            NormalizedChange::RemoveKey(hash(7)),
        ];
        let result = store.update(&challenge, &[hash(1)], &changes).await;
        assert_eq!(result, Err(RegistrarError::KeyNotRegistered(hash(7))));

        assert_eq!(store.identity_record(&identity).unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn test_update_cannot_add_foreign_key() {
        let store = MemoryStore::new();

        let challenge = store.get_challenge().await.unwrap();
        store.register(&challenge, &[hash(1)], count(1)).await.unwrap();
        let challenge = store.get_challenge().await.unwrap();
        store.register(&challenge, &[hash(2)], count(1)).await.unwrap();

        let challenge = store.get_challenge().await.unwrap();
        let changes = vec![NormalizedChange::AddKey {
            public_key: vec![2; 32].into(),
            public_key_hash: hash(2),
            signature: vec![0; 64].into(),
        }];
        let result = store.update(&challenge, &[hash(1)], &changes).await;
        assert_eq!(result, Err(RegistrarError::AlreadyRegistered));
    }

    #[tokio::test]
    async fn test_enumerate_and_deregister() {
        let store = MemoryStore::new();

        let challenge = store.get_challenge().await.unwrap();
        let identity = store.register(&challenge, &[hash(2), hash(1)], count(1)).await.unwrap();

        let challenge = store.get_challenge().await.unwrap();
        let credentials = store.enumerate_credentials(&challenge, &[hash(1)]).await.unwrap();
        assert_eq!(credentials.into_iter().collect::<Vec<_>>(), vec![hash(1), hash(2)]);

        let challenge = store.get_challenge().await.unwrap();
        let removed = store.deregister(&challenge, &[hash(2)]).await.unwrap();
        assert_eq!(removed, identity);
        assert_eq!(store.identity_count().await.unwrap(), 0);

        // Keys are free to register again
        let challenge = store.get_challenge().await.unwrap();
        store.register(&challenge, &[hash(1)], count(1)).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_conformance() {
        crate::testing::run_all(|| Arc::new(MemoryStore::new()) as Arc<dyn CredentialStore>).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_conformance_with_short_challenges() {
        let config = StoreConfig::default().with_challenge_len(16);
        crate::testing::run_all(move || {
            Arc::new(MemoryStore::with_config(config.clone())) as Arc<dyn CredentialStore>
        })
        .await;
    }
}
