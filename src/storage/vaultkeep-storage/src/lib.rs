//! # Vaultkeep Storage
//!
//! Abstraction over a centrally hosted, versioned secret store.
//!
//! The [`SecretStore`] trait is the only seam between the client and the
//! store product. It speaks in full backend paths (namespace and mount
//! already applied) and session tokens; caching, session reuse and path
//! translation belong to the client.
//!
//! [`MemoryStore`] implements the trait in-process for development and
//! tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod memory;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use store::SecretStore;
pub use types::{Credentials, Session, StoreMetadata, StoredSecret, VersionState, WriteReceipt};
