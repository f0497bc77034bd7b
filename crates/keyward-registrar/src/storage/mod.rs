//! Storage abstraction for the registrar
//!
//! The registrar verifies signatures and validates change sets; everything
//! that needs durable state lives behind [`CredentialStore`]:
//! - issuing and consuming single-use challenges
//! - resolving a verified hash set to exactly one identity
//! - enforcing the identity's factor count
//! - applying registrations, updates and removals atomically
//!
//! Implementations report domain failures as [`RegistrarError`] values, and
//! the registrar returns them to callers untouched.

pub mod memory;

pub use memory::{IdentityRecord, MemoryStore};

use async_trait::async_trait;
use keyward_core::{
    Challenge, FactorCount, Identity, NormalizedChange, PublicKeyHash, RegistrarError, Result,
};
use std::collections::BTreeSet;
use std::fmt::Debug;

/// Storage backend trait for identities and their credentials
///
/// Implementations must be thread-safe and support concurrent access. In
/// particular, when several callers register overlapping keys at the same
/// time, exactly one must succeed and every other must see
/// `AlreadyRegistered`.
///
/// Every operation except `get_challenge` and `identity_count` consumes its
/// challenge; a challenge that was never issued or was already used fails
/// with `InvalidChallenge`.
#[async_trait]
pub trait CredentialStore: Send + Sync + Debug {
    /// Issue a fresh single-use challenge
    async fn get_challenge(&self) -> Result<Challenge>;

    /// Create an identity owning `public_key_hashes`
    ///
    /// Fails with `AlreadyRegistered` if any of the keys belongs to an
    /// existing identity.
    async fn register(
        &self,
        challenge: &Challenge,
        public_key_hashes: &[PublicKeyHash],
        factor_count: FactorCount,
    ) -> Result<Identity>;

    /// Resolve the identity that owns all of `public_key_hashes`
    ///
    /// Fails with `UnrecognizedSignature` when a key is unknown or the keys
    /// belong to different identities, and with `InsufficientFactors` when
    /// fewer keys than the identity's factor count were presented.
    async fn authenticate(
        &self,
        challenge: &Challenge,
        public_key_hashes: &[PublicKeyHash],
    ) -> Result<Identity>;

    /// Authenticate as in [`authenticate`](Self::authenticate), then apply
    /// `changes` all-or-nothing
    ///
    /// Fails with `KeyNotRegistered` when removing a key the identity does
    /// not hold, `AlreadyRegistered` when adding a key any identity already
    /// holds, and `FactorCountExceedsKeyCount` when the resulting factor
    /// count exceeds the resulting number of keys.
    async fn update(
        &self,
        challenge: &Challenge,
        public_key_hashes: &[PublicKeyHash],
        changes: &[NormalizedChange],
    ) -> Result<()>;

    /// Authenticate, then return the identity's full credential set
    async fn enumerate_credentials(
        &self,
        challenge: &Challenge,
        public_key_hashes: &[PublicKeyHash],
    ) -> Result<BTreeSet<PublicKeyHash>>;

    /// Authenticate, then remove the identity and all of its credentials
    async fn deregister(
        &self,
        challenge: &Challenge,
        public_key_hashes: &[PublicKeyHash],
    ) -> Result<Identity>;

    /// Number of identities currently registered
    async fn identity_count(&self) -> Result<usize>;
}

/// Shorthand used by backends for infrastructure failures
pub(crate) fn backend_error(message: impl Into<String>) -> RegistrarError {
    RegistrarError::Backend(message.into())
}
