//! # Keyward Core
//!
//! Core types, error taxonomy and cryptographic primitives for Keyward, a
//! multi-factor public key credential registrar.
//!
//! ## Key Concepts
//!
//! - **Challenge**: single-use bytes issued by storage and signed by the client
//! - **Credential**: a public key registered to an identity, referenced by its hash
//! - **Factor count**: how many distinct credential signatures an identity requires
//! - **Change set**: add-key, remove-key and set-factor-count items applied in one update

pub mod crypto;
pub mod error;
pub mod types;

pub use crypto::{CryptoProvider, Ed25519Sha512, KeyPair};
pub use error::{ErrorKind, RegistrarError, Result};
pub use types::{
    Challenge, Change, FactorCount, Identity, NormalizedChange, PublicKey, PublicKeyHash,
    Signature, SignedChallenge,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
