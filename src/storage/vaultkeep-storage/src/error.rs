//! Store error types.

use thiserror::Error;

/// Errors a secret store can report.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("store unreachable: {0}")]
    Unreachable(String),

    /// The store is sealed and cannot serve requests.
    #[error("store is sealed")]
    Sealed,

    /// The store has not been initialized.
    #[error("store is not initialized")]
    Uninitialized,

    /// The session token is unknown or its lease has expired.
    #[error("session token is invalid or expired")]
    InvalidToken,

    /// The store rejected the supplied login credentials.
    #[error("login rejected: {0}")]
    AuthRejected(String),

    /// The session is valid but not allowed to perform the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// No live data exists at the path (or version).
    #[error("not found: {0}")]
    NotFound(String),

    /// Check-and-set version did not match the current version.
    #[error("version mismatch: expected {expected}, found {found}")]
    CasMismatch {
        /// Expected version.
        expected: u32,
        /// Actual version.
        found: u32,
    },

    /// The request was malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}
