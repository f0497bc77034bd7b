//! Signature verification gate
//!
//! Every operation that acts as an identity passes its signature set through
//! here before storage is touched.

use keyward_core::{
    Challenge, CryptoProvider, PublicKeyHash, RegistrarError, Result, SignedChallenge,
};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Verify a signature set against a challenge
///
/// Returns one public key hash per signature, in input order. Fails fast:
/// - `NoSignatures` if the set is empty
/// - `DuplicateSignature` at the first repeated public key (the earlier
///   occurrence is kept, the later one is the duplicate)
/// - `SignatureVerificationFailed` at the first signature that does not
///   verify over the challenge
///
/// This is a pure function of its inputs; it performs no storage I/O.
pub fn verify_signatures(
    crypto: &dyn CryptoProvider,
    challenge: &Challenge,
    signatures: &[SignedChallenge],
) -> Result<Vec<PublicKeyHash>> {
    if signatures.is_empty() {
        return Err(RegistrarError::NoSignatures);
    }

    let mut seen = HashSet::with_capacity(signatures.len());
    let mut public_key_hashes = Vec::with_capacity(signatures.len());

    for (index, signed) in signatures.iter().enumerate() {
        let public_key_hash = crypto.public_key_hash(&signed.public_key);

        if seen.contains(&public_key_hash) {
            warn!(index, key = %public_key_hash, "Rejected duplicate signature");
            return Err(RegistrarError::DuplicateSignature);
        }

        if !crypto.verify_detached(
            challenge.as_bytes(),
            signed.signature.as_bytes(),
            signed.public_key.as_bytes(),
        ) {
            warn!(index, key = %public_key_hash, "Signature verification failed");
            return Err(RegistrarError::SignatureVerificationFailed);
        }

        seen.insert(public_key_hash.clone());
        public_key_hashes.push(public_key_hash);
    }

    debug!(count = public_key_hashes.len(), "Verified signature set");
    Ok(public_key_hashes)
}
