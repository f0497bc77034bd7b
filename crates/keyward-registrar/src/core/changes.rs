//! Change set validation for updates
//!
//! A change set mixes key additions, key removals and factor count changes.
//! It must be internally consistent before any authenticating signature is
//! checked or storage is consulted.

use keyward_core::{
    Challenge, Change, CryptoProvider, FactorCount, NormalizedChange, PublicKeyHash,
    RegistrarError, Result,
};
use std::collections::HashSet;
use tracing::warn;

/// Validate a change set and normalize it for storage
///
/// Walks the items once, in order:
/// - each key (added or removed) may appear at most once
/// - at most one factor count item, and its value must be at least one
/// - every added key must have signed the challenge itself
///
/// Fails on the first violation; nothing is returned for a partial set.
pub fn normalize_changes(
    crypto: &dyn CryptoProvider,
    challenge: &Challenge,
    changes: &[Change],
) -> Result<Vec<NormalizedChange>> {
    if changes.is_empty() {
        return Err(RegistrarError::NoUpdatesRequested);
    }

    let mut touched: HashSet<PublicKeyHash> = HashSet::with_capacity(changes.len());
    let mut factor_count_seen = false;
    let mut normalized = Vec::with_capacity(changes.len());

    for (index, change) in changes.iter().enumerate() {
        let item = match change {
            Change::AddKey {
                public_key,
                signature,
            } => {
                let public_key_hash = crypto.public_key_hash(public_key);
                if touched.contains(&public_key_hash) {
                    warn!(index, key = %public_key_hash, "Key appears twice in change set");
                    return Err(RegistrarError::DuplicateKeyInChangeSet);
                }
                if !crypto.verify_detached(
                    challenge.as_bytes(),
                    signature.as_bytes(),
                    public_key.as_bytes(),
                ) {
                    warn!(index, key = %public_key_hash, "Added key failed signature verification");
                    return Err(RegistrarError::SignatureVerificationFailed);
                }
                touched.insert(public_key_hash.clone());
                NormalizedChange::AddKey {
                    public_key: public_key.clone(),
                    public_key_hash,
                    signature: signature.clone(),
                }
            }
            Change::RemoveKey { public_key_hash } => {
                if !touched.insert(public_key_hash.clone()) {
                    warn!(index, key = %public_key_hash, "Key appears twice in change set");
                    return Err(RegistrarError::DuplicateKeyInChangeSet);
                }
                NormalizedChange::RemoveKey(public_key_hash.clone())
            }
            Change::SetFactorCount { factor_count } => {
                if factor_count_seen {
                    warn!(index, "Factor count appears twice in change set");
                    return Err(RegistrarError::DuplicateFactorCountUpdate);
                }
                factor_count_seen = true;
                NormalizedChange::SetFactorCount(FactorCount::new(*factor_count)?)
            }
        };
        normalized.push(item);
    }

    Ok(normalized)
}
