//! Rotation error types.

use thiserror::Error;
use vaultkeep_client::ClientError;

/// Errors raised by a rotation handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The secret store call failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// A new credential could not be generated.
    #[error("credential generation failed: {0}")]
    Generation(String),

    /// Unrecoverable handler failure.
    #[error("handler error: {0}")]
    Internal(String),
}

/// Errors raised by the orchestrator, scheduler and history tracker.
#[derive(Debug, Error)]
pub enum RotationError {
    /// A rotation for the path is already running.
    #[error("rotation already in progress for {0}")]
    InProgress(String),

    /// Inactive policies cannot be scheduled.
    #[error("policy for {0} is not active")]
    InactivePolicy(String),

    /// The policy is malformed.
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    /// Handler failure.
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// Secret store failure.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// History file could not be read or written.
    #[error("history I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// History file could not be encoded or decoded.
    #[error("history serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
