//! Cryptographically secure credential generation.
//!
//! Uses the operating system's CSPRNG for all random number generation.

use rand::{rngs::OsRng, Rng, RngCore};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::hex_encode;

/// Characters used for generated passwords.
///
/// Excludes quotes, backslashes and `@`/`:`/`/` so values survive being
/// embedded in connection strings.
const PASSWORD_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!#%+-_=";

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 12;

/// Generates cryptographically secure random bytes.
///
/// # Arguments
///
/// * `len` - Number of random bytes to generate
pub fn generate_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Generates a cryptographically secure random token as a hex string.
///
/// # Arguments
///
/// * `byte_len` - Number of random bytes (output string will be 2x this length)
pub fn generate_token(byte_len: usize) -> String {
    let bytes = Zeroizing::new(generate_bytes(byte_len));
    hex_encode(&bytes)
}

/// Generates a random password of `len` characters.
pub fn generate_password(len: usize) -> Result<String, CryptoError> {
    if len < MIN_PASSWORD_LEN {
        return Err(CryptoError::InvalidInput(format!(
            "password length must be >= {MIN_PASSWORD_LEN}"
        )));
    }

    let mut rng = OsRng;
    let password = (0..len)
        .map(|_| PASSWORD_ALPHABET[rng.gen_range(0..PASSWORD_ALPHABET.len())] as char)
        .collect();
    Ok(password)
}

/// Generates an API key of the form `{prefix}_{hex}`.
pub fn generate_api_key(prefix: &str) -> String {
    format!("{}_{}", prefix, generate_token(24))
}
