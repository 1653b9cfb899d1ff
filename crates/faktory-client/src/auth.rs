//! Password challenge response.
//!
//! When the server greets with a salt `s` and an iteration count `i`, the
//! client proves knowledge of the password by sending
//! `hex(SHA-256^i(password || salt))`: the first round hashes the
//! concatenation, each further round hashes the previous binary digest.

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::HandshakeError;

/// Challenge embedded in the greeting of a password-protected server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Challenge {
    /// Salt appended to the password before hashing.
    #[serde(rename = "s")]
    pub salt: String,
    /// Total number of SHA-256 rounds.
    #[serde(rename = "i")]
    pub iterations: u32,
}

impl Challenge {
    /// Computes the hex-encoded response for `password`.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::MalformedChallenge`] when the iteration
    /// count is zero, which would send a reversible encoding of the password.
    pub fn respond(&self, password: &str) -> Result<String, HandshakeError> {
        if self.iterations == 0 {
            return Err(HandshakeError::MalformedChallenge {
                message: String::from("iteration count must be at least 1"),
            });
        }
        Ok(password_hash(password, &self.salt, self.iterations))
    }
}

/// Hashes `password || salt` for `iterations` total rounds and hex-encodes it.
///
/// An iteration count of zero is treated as one round.
#[must_use]
pub fn password_hash(password: &str, salt: &str, iterations: u32) -> String {
    let mut digest: [u8; 32] = Sha256::new()
        .chain_update(password.as_bytes())
        .chain_update(salt.as_bytes())
        .finalize()
        .into();
    for _ in 1..iterations {
        digest = Sha256::digest(digest).into();
    }
    hex::encode(digest)
}
