//! Storage configuration
//!
//! Settings come from named environment variables, each parsed and falling
//! back to its default when absent or invalid.

use std::env;
use tracing::warn;

/// Environment variable holding the challenge length in bytes
pub const CHALLENGE_LEN_ENV: &str = "KEYWARD_CHALLENGE_LEN";

/// Default challenge length in bytes
pub const DEFAULT_CHALLENGE_LEN: usize = 64;

/// Settings for the in-memory storage engine
///
/// The challenge length is never zero: an empty challenge would be the same
/// map key for every issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    challenge_len: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            challenge_len: DEFAULT_CHALLENGE_LEN,
        }
    }
}

impl StoreConfig {
    /// Load configuration from process environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let challenge_len = match lookup(CHALLENGE_LEN_ENV) {
            None => DEFAULT_CHALLENGE_LEN,
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(len) => non_zero_challenge_len(len),
                Err(e) => {
                    warn!(
                        var = CHALLENGE_LEN_ENV,
                        value = %raw,
                        error = %e,
                        "Invalid challenge length, using default"
                    );
                    DEFAULT_CHALLENGE_LEN
                }
            },
        };

        Self { challenge_len }
    }

    /// Override the challenge length; zero falls back to the default
    pub fn with_challenge_len(mut self, challenge_len: usize) -> Self {
        self.challenge_len = non_zero_challenge_len(challenge_len);
        self
    }

    /// Number of random bytes in each issued challenge
    pub fn challenge_len(&self) -> usize {
        self.challenge_len
    }
}

fn non_zero_challenge_len(len: usize) -> usize {
    if len == 0 {
        warn!(
            var = CHALLENGE_LEN_ENV,
            "Challenge length must be non-zero, using default"
        );
        return DEFAULT_CHALLENGE_LEN;
    }
    len
}
