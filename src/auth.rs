//! API key authentication for the weather tool session.
//!
//! Accepted keys are stored only as SHA-256 digests. An empty key set means
//! authentication is disabled and every request is allowed (fail-open); the
//! startup log says so explicitly.

use std::collections::HashSet;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Number of random bytes in a generated key.
const GENERATED_KEY_BYTES: usize = 32;

/// Why a presented key was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Missing API key. Set MCP_CLIENT_API_KEY in client environment.")]
    MissingKey,

    #[error("Invalid API key. Access denied.")]
    InvalidKey,
}

/// Set of accepted key digests. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    key_hashes: HashSet<String>,
}

impl AuthContext {
    /// Build a context from plaintext keys. The plaintext is dropped here.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let key_hashes = keys.into_iter().map(|k| hash_key(k.as_ref())).collect();
        Self { key_hashes }
    }

    /// Build a context from the comma-separated configuration form.
    /// Entries are trimmed; empty entries are ignored.
    pub fn from_csv(value: &str) -> Self {
        Self::new(value.split(',').map(str::trim).filter(|k| !k.is_empty()))
    }

    /// Authentication with no keys configured.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Whether any keys are configured.
    pub fn is_enabled(&self) -> bool {
        !self.key_hashes.is_empty()
    }

    /// Number of distinct accepted keys.
    pub fn key_count(&self) -> usize {
        self.key_hashes.len()
    }

    /// Check a presented key. Always true when auth is disabled.
    pub fn validate(&self, presented: Option<&str>) -> bool {
        self.validate_request(presented).is_ok()
    }

    /// Like [`validate`](Self::validate) but reports the rejection reason.
    pub fn validate_request(&self, presented: Option<&str>) -> Result<(), AuthError> {
        if !self.is_enabled() {
            return Ok(());
        }

        let key = match presented {
            Some(k) if !k.is_empty() => k,
            _ => return Err(AuthError::MissingKey),
        };

        if self.key_hashes.contains(&hash_key(key)) {
            Ok(())
        } else {
            Err(AuthError::InvalidKey)
        }
    }
}

/// Hex-encoded SHA-256 digest of a key.
pub fn hash_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Generate a random URL-safe API key.
pub fn generate_key() -> String {
    let mut bytes = [0u8; GENERATED_KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
