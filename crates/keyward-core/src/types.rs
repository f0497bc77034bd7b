//! Domain types shared by the registrar and its collaborators
//!
//! Everything here is plain data. Byte payloads (challenges, keys,
//! signatures) serialize as standard base64; public key hashes serialize as
//! their canonical lowercase hex form.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use tracing::warn;
use uuid::Uuid;

use crate::error::{RegistrarError, Result};

/// Base64 (standard alphabet) serde adapter for raw byte fields
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Opaque byte payloads
// =============================================================================

/// A single-use challenge issued by storage and signed by the client
///
/// The registrar never inspects or length-checks a challenge; it is only
/// ever used as the message under verification.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Challenge(#[serde(with = "base64_bytes")] Vec<u8>);

impl Challenge {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Challenge {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Challenge({} bytes)", self.0.len())
    }
}

/// A public key, as raw bytes in whatever encoding the crypto provider uses
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicKey(#[serde(with = "base64_bytes")] Vec<u8>);

impl PublicKey {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for PublicKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.0))
    }
}

/// A detached signature over a challenge
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(#[serde(with = "base64_bytes")] Vec<u8>);

impl Signature {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Signature {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({} bytes)", self.0.len())
    }
}

/// One member of a signature set: a key and its signature over the challenge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedChallenge {
    pub signature: Signature,
    pub public_key: PublicKey,
}

impl SignedChallenge {
    pub fn new(signature: Signature, public_key: PublicKey) -> Self {
        Self {
            signature,
            public_key,
        }
    }
}

// =============================================================================
// Public key hash
// =============================================================================

/// Hash of a public key; the canonical credential identifier
///
/// The lowercase hex encoding is computed once and carried alongside the
/// bytes. Equality, hashing and ordering all use it, so the type can key a
/// `HashSet` or `BTreeSet` directly.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKeyHash {
    bytes: Vec<u8>,
    hex: String,
}

impl PublicKeyHash {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let hex = hex::encode(&bytes);
        Self { bytes, hex }
    }

    /// Parse a hash from its hex encoding (either case)
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = hex::decode(encoded)?;
        Ok(Self::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Canonical lowercase hex encoding
    pub fn as_hex(&self) -> &str {
        &self.hex
    }
}

impl PartialEq for PublicKeyHash {
    fn eq(&self, other: &Self) -> bool {
        self.hex == other.hex
    }
}

impl Eq for PublicKeyHash {}

impl Hash for PublicKeyHash {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hex.hash(state);
    }
}

impl PartialOrd for PublicKeyHash {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PublicKeyHash {
    fn cmp(&self, other: &Self) -> Ordering {
        self.hex.cmp(&other.hex)
    }
}

impl fmt::Display for PublicKeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex)
    }
}

impl fmt::Debug for PublicKeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKeyHash({})", self.hex)
    }
}

impl TryFrom<String> for PublicKeyHash {
    type Error = RegistrarError;

    fn try_from(encoded: String) -> Result<Self> {
        Self::from_hex(&encoded)
    }
}

impl From<PublicKeyHash> for String {
    fn from(hash: PublicKeyHash) -> Self {
        hash.hex
    }
}

// =============================================================================
// Factor count and identity
// =============================================================================

/// Minimum number of distinct signatures needed to act as an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct FactorCount(u32);

impl FactorCount {
    pub const ONE: FactorCount = FactorCount(1);

    /// Validate a requested factor count
    pub fn new(count: u32) -> Result<Self> {
        if count == 0 {
            return Err(RegistrarError::InvalidFactorCount);
        }
        Ok(Self(count))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Whether `available` signatures or keys are enough to satisfy this count
    pub fn is_satisfied_by(self, available: usize) -> bool {
        available as u64 >= self.0 as u64
    }
}

impl TryFrom<u32> for FactorCount {
    type Error = RegistrarError;

    fn try_from(count: u32) -> Result<Self> {
        Self::new(count)
    }
}

impl From<FactorCount> for u32 {
    fn from(count: FactorCount) -> Self {
        count.0
    }
}

impl fmt::Display for FactorCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle for a registered identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(Uuid);

impl Identity {
    /// Mint a fresh random identity handle
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Change sets
// =============================================================================

/// One item of an update request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Change {
    /// Add a key, proven by its own signature over the challenge
    AddKey {
        public_key: PublicKey,
        signature: Signature,
    },
    /// Remove the key with this hash
    RemoveKey { public_key_hash: PublicKeyHash },
    /// Replace the identity's factor count
    SetFactorCount { factor_count: u32 },
}

impl Change {
    pub fn add_key(signed: SignedChallenge) -> Self {
        Change::AddKey {
            public_key: signed.public_key,
            signature: signed.signature,
        }
    }

    pub fn remove_key(public_key_hash: PublicKeyHash) -> Self {
        Change::RemoveKey { public_key_hash }
    }

    pub fn set_factor_count(factor_count: u32) -> Self {
        Change::SetFactorCount { factor_count }
    }

    /// Decode an untyped change set item
    ///
    /// Anything that is not one of the three item shapes is reported as
    /// `UnknownUpdateType`. A factor count item carrying a negative number is
    /// reported as `InvalidFactorCount` instead.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let is_negative_factor_count = value.get("type").and_then(|t| t.as_str())
            == Some("set_factor_count")
            && value
                .get("factor_count")
                .and_then(|c| c.as_i64())
                .is_some_and(|c| c <= 0);
        if is_negative_factor_count {
            return Err(RegistrarError::InvalidFactorCount);
        }

        serde_json::from_value(value).map_err(|e| {
            warn!(error = %e, "Rejected unknown update type");
            RegistrarError::UnknownUpdateType
        })
    }
}

/// A change set item after validation, as handed to storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedChange {
    /// Add a key whose signature has already been verified
    AddKey {
        public_key: PublicKey,
        public_key_hash: PublicKeyHash,
        signature: Signature,
    },
    RemoveKey(PublicKeyHash),
    SetFactorCount(FactorCount),
}

impl NormalizedChange {
    /// The key this change targets, if any
    pub fn public_key_hash(&self) -> Option<&PublicKeyHash> {
        match self {
            NormalizedChange::AddKey {
                public_key_hash, ..
            } => Some(public_key_hash),
            NormalizedChange::RemoveKey(hash) => Some(hash),
            NormalizedChange::SetFactorCount(_) => None,
        }
    }
}
