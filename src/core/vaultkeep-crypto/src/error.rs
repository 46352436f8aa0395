//! Cryptographic error types.

use thiserror::Error;

/// Errors that can occur during cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Hashing a credential failed.
    #[error("hashing failed: {0}")]
    HashingFailed(String),

    /// A stored hash could not be parsed.
    #[error("invalid hash: {0}")]
    InvalidHash(String),

    /// Invalid input data.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
