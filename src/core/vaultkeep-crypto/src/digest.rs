//! SHA-256 fingerprints.

use sha2::{Digest, Sha256};

use crate::hex_encode;

/// Returns the lowercase hex SHA-256 digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex_encode(&Sha256::digest(data))
}

/// Returns the first `len` hex characters of the SHA-256 digest of `data`.
///
/// `len` is clamped to the full digest length (64).
pub fn fingerprint(data: &[u8], len: usize) -> String {
    let mut hex = sha256_hex(data);
    hex.truncate(len.min(64));
    hex
}
