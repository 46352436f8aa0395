//! # Vaultkeep Crypto
//!
//! Cryptographic helpers shared by the Vaultkeep crates.
//!
//! This crate provides:
//! - Secure random generation of tokens, passwords and API keys
//! - Argon2id hashing of credentials held by self-hosted stores
//! - SHA-256 fingerprints for content-derived identifiers

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod digest;
pub mod error;
pub mod password;
pub mod random;

pub use error::CryptoError;

/// Encodes bytes as lowercase hex.
pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";
    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        hex.push(HEX_CHARS[(byte >> 4) as usize] as char);
        hex.push(HEX_CHARS[(byte & 0x0F) as usize] as char);
    }
    hex
}
