//! Secret store trait definition.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{Credentials, Session, StoreMetadata, StoredSecret, WriteReceipt};

/// A versioned key/value secret store behind an authenticated API.
///
/// Every data operation takes the session token returned by [`login`].
/// A store must answer [`StoreError::InvalidToken`] for unknown or expired
/// tokens so callers can re-authenticate.
///
/// [`login`]: SecretStore::login
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Exchanges credentials for a session.
    async fn login(&self, credentials: &Credentials) -> Result<Session, StoreError>;

    /// Revokes a session token.
    async fn revoke(&self, token: &str) -> Result<(), StoreError>;

    /// Reads the latest live version, or a specific version when given.
    async fn read(
        &self,
        token: &str,
        path: &str,
        version: Option<u32>,
    ) -> Result<StoredSecret, StoreError>;

    /// Writes a new version. `cas` requires the current version to match.
    async fn write(
        &self,
        token: &str,
        path: &str,
        data: &HashMap<String, String>,
        cas: Option<u32>,
    ) -> Result<WriteReceipt, StoreError>;

    /// Soft-deletes the named versions.
    async fn delete_versions(
        &self,
        token: &str,
        path: &str,
        versions: &[u32],
    ) -> Result<(), StoreError>;

    /// Destroys every version and the metadata of a path.
    async fn destroy(&self, token: &str, path: &str) -> Result<(), StoreError>;

    /// Lists the immediate children of a folder path.
    ///
    /// Sub-folders are returned with a trailing `/`.
    async fn list(&self, token: &str, path: &str) -> Result<Vec<String>, StoreError>;

    /// Reads version and timing metadata without secret data.
    async fn metadata(&self, token: &str, path: &str) -> Result<StoreMetadata, StoreError>;

    /// Returns the name of this store for logging.
    fn name(&self) -> &'static str;
}
