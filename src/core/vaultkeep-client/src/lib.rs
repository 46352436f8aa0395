//! # Vaultkeep Client
//!
//! Authenticated client for a versioned, centrally hosted secret store.
//!
//! The client:
//! - Logs in lazily and reuses the session; a rejected session triggers one
//!   re-login and retry
//! - Serves reads from a TTL cache and invalidates a path before any write
//!   or delete to it returns
//! - Applies the namespace and mount prefix so callers only see logical paths
//! - Bounds every store call by the configured timeout
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vaultkeep_client::{ConnectionConfig, ReadOptions, SecretStoreClient};
//!
//! let config = ConnectionConfig::from_env()?;
//! let client = SecretStoreClient::new(config, store)?;
//! let password = client.get_field("app/db", "password").await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod secret;

pub use client::SecretStoreClient;
pub use config::{AuthMethod, ConnectionConfig};
pub use error::ClientError;
pub use secret::{ReadOptions, Secret, SecretMetadata, WriteOptions};
