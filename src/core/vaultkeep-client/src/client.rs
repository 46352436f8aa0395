//! The secret store client.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use vaultkeep_storage::{SecretStore, Session, StoreError};

use crate::cache::SecretCache;
use crate::config::ConnectionConfig;
use crate::error::ClientError;
use crate::secret::{ReadOptions, Secret, SecretMetadata, WriteOptions};

#[derive(Default)]
struct AuthState {
    session: Option<Session>,
}

/// Authenticated client for a versioned secret store, with a TTL cache.
///
/// Safe to share across tasks (`Arc<SecretStoreClient>`). Authentication
/// state and the cache are guarded separately; when both are needed the
/// auth lock is always taken first.
pub struct SecretStoreClient {
    config: ConnectionConfig,
    store: Arc<dyn SecretStore>,
    prefix: String,
    auth: Mutex<AuthState>,
    cache: Mutex<SecretCache>,
}

impl SecretStoreClient {
    /// Creates a client. Validates the config; does not contact the store.
    pub fn new(config: ConnectionConfig, store: Arc<dyn SecretStore>) -> Result<Self, ClientError> {
        config.validate()?;

        info!(
            store = store.name(),
            address = %config.address,
            auth_method = %config.auth_method,
            "Secret store client created"
        );

        Ok(Self {
            prefix: config.path_prefix(),
            cache: Mutex::new(SecretCache::new(config.cache_ttl())),
            auth: Mutex::new(AuthState::default()),
            config,
            store,
        })
    }

    /// The validated configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Logs in now instead of on first use.
    pub async fn authenticate(&self) -> Result<(), ClientError> {
        let mut auth = self.auth.lock().await;
        self.ensure_session(&mut auth).await.map(|_| ())
    }

    /// Whether a session is currently held.
    pub async fn is_authenticated(&self) -> bool {
        self.auth.lock().await.session.is_some()
    }

    /// Reads a secret, from the cache when allowed and fresh.
    pub async fn get_secret(&self, path: &str, options: ReadOptions) -> Result<Secret, ClientError> {
        let logical = normalize(path)?;
        let full = self.full_path(&logical);

        let seen = {
            let mut cache = self.cache.lock().await;
            if options.use_cache {
                if let Some(hit) = cache.get(&full, options.version) {
                    debug!(path = %logical, "Cache hit");
                    return Ok(hit);
                }
            }
            cache.generation()
        };

        let full_path = full.as_str();
        let version = options.version;
        let stored = self
            .call(move |token| async move { self.store.read(&token, full_path, version).await })
            .await
            .map_err(|e| logical_error(e, &logical))?;

        let secret = Secret {
            path: logical,
            data: stored.data,
            version: Some(stored.version),
            created_time: stored.created_time,
        };

        if options.use_cache {
            self.cache
                .lock()
                .await
                .insert(&full, options.version, &secret, seen);
        }

        debug!(path = %secret.path, version = stored.version, "Secret fetched");
        Ok(secret)
    }

    /// Reads one field of the latest version.
    pub async fn get_field(&self, path: &str, key: &str) -> Result<String, ClientError> {
        let secret = self.get_secret(path, ReadOptions::default()).await?;
        secret
            .data
            .get(key)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("{}#{key}", secret.path)))
    }

    /// Writes a new version and invalidates the cached entry for the path.
    pub async fn write_secret(
        &self,
        path: &str,
        data: HashMap<String, String>,
        options: WriteOptions,
    ) -> Result<Secret, ClientError> {
        let logical = normalize(path)?;
        if data.keys().any(|key| key.is_empty()) {
            return Err(ClientError::validation("secret keys cannot be empty"));
        }
        let full = self.full_path(&logical);

        let full_path = full.as_str();
        let payload = &data;
        let cas = options.cas;
        let result = self
            .call(move |token| async move {
                self.store.write(&token, full_path, payload, cas).await
            })
            .await;

        // A timed-out write may still have been applied.
        self.cache.lock().await.invalidate(&full);

        let receipt = result.map_err(|e| logical_error(e, &logical))?;

        info!(path = %logical, version = ?receipt.version, "Secret written");
        Ok(Secret {
            path: logical,
            data,
            version: receipt.version,
            created_time: receipt.created_time,
        })
    }

    /// Deletes a secret.
    ///
    /// With `versions`, soft-deletes only those versions. Without, destroys
    /// every version and the metadata. Deleting an absent secret succeeds.
    pub async fn delete_secret(
        &self,
        path: &str,
        versions: Option<&[u32]>,
    ) -> Result<(), ClientError> {
        let logical = normalize(path)?;
        if versions.is_some_and(|v| v.is_empty()) {
            return Err(ClientError::validation("no versions given to delete"));
        }
        let full = self.full_path(&logical);
        let full_path = full.as_str();

        let result = match versions {
            Some(versions) => {
                self.call(move |token| async move {
                    self.store.delete_versions(&token, full_path, versions).await
                })
                .await
            },
            None => {
                self.call(move |token| async move { self.store.destroy(&token, full_path).await })
                    .await
            },
        };

        self.cache.lock().await.invalidate(&full);

        match result {
            Ok(()) | Err(ClientError::NotFound(_)) => {
                info!(path = %logical, versions = ?versions, "Secret deleted");
                Ok(())
            },
            Err(e) => Err(logical_error(e, &logical)),
        }
    }

    /// Lists the children of a folder. Sub-folders end with `/`.
    pub async fn list_secrets(&self, path: &str) -> Result<Vec<String>, ClientError> {
        let logical = normalize_folder(path)?;
        let full = if logical.is_empty() {
            self.prefix.clone()
        } else {
            self.full_path(&logical)
        };
        let full_path = full.as_str();

        match self
            .call(move |token| async move { self.store.list(&token, full_path).await })
            .await
        {
            Ok(names) => Ok(names),
            Err(ClientError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(logical_error(e, &logical)),
        }
    }

    /// Reads version and timing information without data.
    pub async fn get_secret_metadata(&self, path: &str) -> Result<SecretMetadata, ClientError> {
        let logical = normalize(path)?;
        let full = self.full_path(&logical);
        let full_path = full.as_str();

        let meta = self
            .call(move |token| async move { self.store.metadata(&token, full_path).await })
            .await
            .map_err(|e| logical_error(e, &logical))?;

        Ok(SecretMetadata {
            latest_live_version: meta.latest_live_version(),
            path: logical,
            current_version: meta.current_version,
            created_time: meta.created_time,
            updated_time: meta.updated_time,
            versions: meta.versions,
        })
    }

    /// Writes the data of an older version back as the newest version.
    pub async fn restore_version(&self, path: &str, version: u32) -> Result<Secret, ClientError> {
        let old = self
            .get_secret(
                path,
                ReadOptions {
                    version: Some(version),
                    use_cache: false,
                },
            )
            .await?;
        let restored = self
            .write_secret(path, old.data, WriteOptions::default())
            .await?;

        info!(path = %restored.path, from_version = version, "Secret version restored");
        Ok(restored)
    }

    /// Drops the cached entry for one path, or every entry.
    pub async fn invalidate_cache(&self, path: Option<&str>) -> Result<(), ClientError> {
        match path {
            Some(path) => {
                let full = self.full_path(&normalize(path)?);
                self.cache.lock().await.invalidate(&full);
            },
            None => self.cache.lock().await.clear(),
        }
        Ok(())
    }

    /// Number of entries currently cached.
    pub async fn cached_entries(&self) -> usize {
        self.cache.lock().await.len()
    }

    /// Revokes the session (best effort) and discards all in-memory state.
    pub async fn close(&self) {
        let mut auth = self.auth.lock().await;
        let session = auth.session.take();
        self.cache.lock().await.clear();

        if let Some(session) = session {
            if let Err(e) = self.timed(self.store.revoke(&session.token)).await {
                warn!(error = %e, "Failed to revoke session token");
            }
        }
        debug!("Secret store client closed");
    }

    fn full_path(&self, logical: &str) -> String {
        format!("{}/{logical}", self.prefix)
    }

    async fn ensure_session(&self, auth: &mut AuthState) -> Result<String, ClientError> {
        if let Some(session) = &auth.session {
            if !session.is_expired(Utc::now()) {
                return Ok(session.token.clone());
            }
            debug!("Session lease elapsed");
            auth.session = None;
        }

        let credentials = self.config.credentials().await?;
        let session = self
            .timed(self.store.login(&credentials))
            .await
            .map_err(|e| match e {
                StoreError::AuthRejected(msg) => ClientError::Authentication(msg),
                other => other.into(),
            })?;

        info!(method = credentials.method(), "Authenticated with secret store");
        let token = session.token.clone();
        auth.session = Some(session);
        Ok(token)
    }

    async fn session_token(&self) -> Result<String, ClientError> {
        let mut auth = self.auth.lock().await;
        self.ensure_session(&mut auth).await
    }

    async fn forget_session(&self, token: &str) {
        let mut auth = self.auth.lock().await;
        if auth.session.as_ref().is_some_and(|s| s.token == token) {
            auth.session = None;
        }
    }

    async fn timed<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.config.timeout(), fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Unreachable(format!(
                "no response within {}s",
                self.config.timeout_seconds
            ))),
        }
    }

    /// Runs a store operation with the held session.
    ///
    /// A rejected session is dropped and the login-plus-operation sequence
    /// is retried exactly once.
    async fn call<T, F, Fut>(&self, op: F) -> Result<T, ClientError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let token = self.session_token().await?;
        match self.timed(op(token.clone())).await {
            Err(StoreError::InvalidToken) => {
                warn!("Session rejected by store, re-authenticating");
                self.forget_session(&token).await;
                let token = self.session_token().await?;
                Ok(self.timed(op(token)).await?)
            },
            other => Ok(other?),
        }
    }
}

/// Normalizes a logical secret path: trims slashes, collapses empty segments.
fn normalize(path: &str) -> Result<String, ClientError> {
    let normalized = normalize_folder(path)?;
    if normalized.is_empty() {
        return Err(ClientError::validation("secret path cannot be empty"));
    }
    Ok(normalized)
}

fn normalize_folder(path: &str) -> Result<String, ClientError> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.iter().any(|s| *s == "." || *s == "..") {
        return Err(ClientError::validation(format!("invalid secret path '{path}'")));
    }
    Ok(segments.join("/"))
}

/// Rewrites path-bearing errors so backend prefixes never reach callers.
fn logical_error(err: ClientError, logical: &str) -> ClientError {
    match err {
        ClientError::NotFound(_) => ClientError::NotFound(logical.to_string()),
        ClientError::Permission(_) => ClientError::Permission(logical.to_string()),
        other => other,
    }
}
