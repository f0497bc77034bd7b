//! Error types for the Keyward registrar

use thiserror::Error;

use crate::types::PublicKeyHash;

/// Result type alias using RegistrarError
pub type Result<T> = std::result::Result<T, RegistrarError>;

/// Errors that can occur while registering or acting as an identity
///
/// Storage backends report their domain failures with this same type, so the
/// registrar relays them to callers exactly as the backend produced them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrarError {
    // =========================================================================
    // Input shape
    // =========================================================================
    /// The signature set was empty
    #[error("at least one signature is required")]
    NoSignatures,

    /// An update carried an empty change set
    #[error("no updates requested")]
    NoUpdatesRequested,

    /// A change set item was none of add-key, remove-key or set-factor-count
    #[error("unknown update type")]
    UnknownUpdateType,

    /// A factor count below one was requested
    #[error("factor count must be greater than or equal to one")]
    InvalidFactorCount,

    /// Fewer signatures than the declared factor count were supplied
    #[error("factor count is greater than the number of signatures provided")]
    InsufficientSignatures,

    /// A public key hash could not be decoded
    #[error("invalid public key hash: {0}")]
    InvalidPublicKeyHash(String),

    // =========================================================================
    // Integrity
    // =========================================================================
    /// The same public key signed more than once
    #[error("signatures must be unique")]
    DuplicateSignature,

    /// A change set touched the same key more than once
    #[error("cannot update the same key more than once per update")]
    DuplicateKeyInChangeSet,

    /// A change set carried more than one factor count item
    #[error("cannot update factor count more than once per update")]
    DuplicateFactorCountUpdate,

    // =========================================================================
    // Cryptographic
    // =========================================================================
    /// A detached signature did not verify against the challenge
    #[error("signature verification failed")]
    SignatureVerificationFailed,

    // =========================================================================
    // Storage reported
    // =========================================================================
    /// The challenge was never issued or has already been used
    #[error("invalid challenge")]
    InvalidChallenge,

    /// A key maps to no identity, or the keys span several identities
    #[error("unrecognized signature")]
    UnrecognizedSignature,

    /// Fewer signatures than the identity's factor count
    #[error("{required} signatures required")]
    InsufficientFactors { required: u32 },

    /// One of the presented keys already belongs to an identity
    #[error("already registered")]
    AlreadyRegistered,

    /// The resulting factor count would exceed the resulting key count
    #[error("factor count would exceed the number of registered keys")]
    FactorCountExceedsKeyCount,

    /// An update tried to remove a key the identity does not hold
    #[error("key {0} is not registered to this identity")]
    KeyNotRegistered(PublicKeyHash),

    /// The storage backend itself failed
    #[error("storage error: {0}")]
    Backend(String),
}

/// Broad classification of a [`RegistrarError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request was malformed
    Input,
    /// The request contradicted itself (duplicates)
    Integrity,
    /// A signature failed to verify
    Cryptographic,
    /// Reported by the storage collaborator
    Storage,
}

impl RegistrarError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistrarError::NoSignatures
            | RegistrarError::NoUpdatesRequested
            | RegistrarError::UnknownUpdateType
            | RegistrarError::InvalidFactorCount
            | RegistrarError::InsufficientSignatures
            | RegistrarError::InvalidPublicKeyHash(_) => ErrorKind::Input,
            RegistrarError::DuplicateSignature
            | RegistrarError::DuplicateKeyInChangeSet
            | RegistrarError::DuplicateFactorCountUpdate => ErrorKind::Integrity,
            RegistrarError::SignatureVerificationFailed => ErrorKind::Cryptographic,
            RegistrarError::InvalidChallenge
            | RegistrarError::UnrecognizedSignature
            | RegistrarError::InsufficientFactors { .. }
            | RegistrarError::AlreadyRegistered
            | RegistrarError::FactorCountExceedsKeyCount
            | RegistrarError::KeyNotRegistered(_)
            | RegistrarError::Backend(_) => ErrorKind::Storage,
        }
    }
}

impl From<hex::FromHexError> for RegistrarError {
    fn from(err: hex::FromHexError) -> Self {
        RegistrarError::InvalidPublicKeyHash(err.to_string())
    }
}
