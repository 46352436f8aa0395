//! Client error types.

use thiserror::Error;
use vaultkeep_storage::StoreError;

/// Errors surfaced by [`SecretStoreClient`](crate::SecretStoreClient).
#[derive(Debug, Error)]
pub enum ClientError {
    /// The store is unreachable, sealed, uninitialized or timed out.
    #[error("connection error: {0}")]
    Connection(String),

    /// Credentials are missing or were rejected.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// No live secret exists at the path.
    #[error("secret not found: {0}")]
    NotFound(String),

    /// The session may not perform the operation.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Malformed configuration or request.
    #[error("validation error: {0}")]
    Validation(String),
}

impl ClientError {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an authentication error.
    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Whether this is a [`ClientError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<StoreError> for ClientError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unreachable(_)
            | StoreError::Sealed
            | StoreError::Uninitialized
            | StoreError::Backend(_) => Self::Connection(err.to_string()),
            StoreError::InvalidToken | StoreError::AuthRejected(_) => {
                Self::Authentication(err.to_string())
            },
            StoreError::PermissionDenied(path) => Self::Permission(path),
            StoreError::NotFound(path) => Self::NotFound(path),
            StoreError::CasMismatch { .. } | StoreError::InvalidRequest(_) => {
                Self::Validation(err.to_string())
            },
        }
    }
}
