//! Definition snapshot fingerprinting.
//!
//! Each execution stores the SHA-256 of the definition snapshot it ran
//! against, so audits can tell whether two runs used the same structure.

use sha2::{Digest, Sha256};

/// Computes the fingerprint of a serialized definition snapshot.
#[must_use]
pub fn definition_fingerprint(snapshot: &serde_json::Value) -> String {
    let json = serde_json::to_string(snapshot).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    hex::encode(hasher.finalize())
}
