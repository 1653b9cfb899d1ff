//! Identifier generation.

use rand::RngCore;

/// Random bytes in a generated job id.
const JID_BYTES: usize = 12;

/// Random bytes in a generated worker id.
const WID_BYTES: usize = 4;

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0_u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generates a job id: 24 random hex characters.
#[must_use]
pub fn generate_jid() -> String {
    random_hex(JID_BYTES)
}

/// Generates a worker id: 8 random hex characters.
#[must_use]
pub fn generate_wid() -> String {
    random_hex(WID_BYTES)
}
