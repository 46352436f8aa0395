//! Audit error types.

use thiserror::Error;

/// Errors raised while ingesting or analyzing audit logs.
#[derive(Debug, Error)]
pub enum AuditError {
    /// File system failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// A path or file pattern is invalid.
    #[error("invalid pattern '{pattern}': {reason}")]
    Pattern {
        /// The offending pattern.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A setting is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// JSON encoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
