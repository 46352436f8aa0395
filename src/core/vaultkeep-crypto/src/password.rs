//! Argon2id hashing for stored credentials.
//!
//! Self-hosted stores never keep AppRole secret ids, static tokens or user
//! passwords in clear; they keep a PHC-formatted Argon2id hash instead.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::error::CryptoError;

/// Hashes a credential with Argon2id and a random salt.
pub fn hash_credential(secret: &str) -> Result<String, CryptoError> {
    if secret.is_empty() {
        return Err(CryptoError::InvalidInput("credential cannot be empty".into()));
    }

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CryptoError::HashingFailed(e.to_string()))
}

/// Verifies a credential against a stored PHC hash.
///
/// Returns `Ok(false)` on mismatch and an error only when the stored hash
/// itself is unreadable.
pub fn verify_credential(secret: &str, stored_hash: &str) -> Result<bool, CryptoError> {
    let parsed =
        PasswordHash::new(stored_hash).map_err(|e| CryptoError::InvalidHash(e.to_string()))?;

    Ok(Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_credential("s3cr3t-id").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_credential("s3cr3t-id", &hash).unwrap());
        assert!(!verify_credential("wrong", &hash).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_credential("same").unwrap();
        let b = hash_credential("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_credential_rejected() {
        assert!(matches!(
            hash_credential(""),
            Err(CryptoError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_invalid_stored_hash() {
        assert!(matches!(
            verify_credential("x", "not-a-phc-string"),
            Err(CryptoError::InvalidHash(_))
        ));
    }
}
