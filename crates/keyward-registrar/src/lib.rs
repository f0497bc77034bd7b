//! Keyward Registrar
//!
//! A challenge-response registrar for multi-factor public key credentials.
//! A client proves it holds one or more keys by signing a single-use
//! challenge; a verified identity can then add keys, remove keys and change
//! how many signatures are required to act as it.
//!
//! ## Operations
//!
//! - `get_challenge` - Issue a single-use challenge
//! - `register` - Create an identity from one or more signing keys
//! - `authenticate` - Resolve the identity that owns the signing keys
//! - `update` - Add keys, remove keys and set the factor count atomically
//! - `enumerate_credentials` - List the identity's key hashes
//! - `deregister` - Remove the identity and all of its keys
//!
//! ## Layering
//!
//! The [`Registrar`] validates request shape and verifies every signature
//! before delegating to a [`CredentialStore`]. The store owns all durable
//! state and the guarantees that depend on it: single-use challenges,
//! identity resolution, factor thresholds and atomic registration.
//!
//! ## Features
//!
//! - `testing` - Exposes [`testing`], a conformance suite any storage engine
//!   can run against itself

pub mod config;
pub mod core;
pub mod registrar;
pub mod storage;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::StoreConfig;
pub use registrar::Registrar;
pub use storage::{CredentialStore, IdentityRecord, MemoryStore};
