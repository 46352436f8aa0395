//! Rotation handlers.
//!
//! A handler replaces the value of one secret. Handlers are looked up by the
//! policy's `handler_kind`; unknown kinds resolve to [`GenericHandler`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{debug, info};

use vaultkeep_client::{ReadOptions, Secret, SecretStoreClient, WriteOptions};
use vaultkeep_crypto::random;

use crate::error::HandlerError;
use crate::policy::RotationPolicy;

/// Length of generated database passwords.
pub const DATABASE_PASSWORD_LEN: usize = 32;

/// How long a replaced database password stays valid.
pub const DATABASE_GRACE_PERIOD_HOURS: i64 = 24;

/// Rotates the secret at one path.
#[async_trait]
pub trait RotationHandler: Send + Sync {
    /// Replaces the secret value.
    ///
    /// Returns `Ok(false)` for an orderly failure; `Err` only for errors the
    /// handler cannot recover from.
    async fn execute(
        &self,
        client: &SecretStoreClient,
        path: &str,
        policy: &RotationPolicy,
    ) -> Result<bool, HandlerError>;
}

/// Maps handler kinds to implementations.
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn RotationHandler>>,
    fallback: Arc<dyn RotationHandler>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl HandlerRegistry {
    /// Registry with `database`, `api_key`, `certificate` and `generic`.
    pub fn with_builtins() -> Self {
        let generic: Arc<dyn RotationHandler> = Arc::new(GenericHandler);
        let mut registry = Self {
            handlers: HashMap::new(),
            fallback: generic.clone(),
        };
        registry.register("database", Arc::new(DatabaseHandler::default()));
        registry.register("api_key", Arc::new(ApiKeyHandler::default()));
        registry.register("certificate", Arc::new(CertificateHandler));
        registry.register("generic", generic);
        registry
    }

    /// Registers or replaces the handler for `kind`.
    pub fn register(&mut self, kind: impl Into<String>, handler: Arc<dyn RotationHandler>) {
        self.handlers.insert(kind.into(), handler);
    }

    /// Handler for `kind`, or the generic handler.
    pub fn resolve(&self, kind: &str) -> Arc<dyn RotationHandler> {
        match self.handlers.get(kind) {
            Some(handler) => handler.clone(),
            None => {
                debug!(kind = kind, "No handler registered, using generic");
                self.fallback.clone()
            },
        }
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.handlers.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

async fn read_current(client: &SecretStoreClient, path: &str) -> Result<Secret, HandlerError> {
    Ok(client.get_secret(path, ReadOptions::uncached()).await?)
}

/// Generates a new password, keeping the old one for a grace period.
///
/// Writes `password`, `previous_password`, `previous_password_expires_at`
/// and `rotated_at`.
pub struct DatabaseHandler {
    field: String,
    grace: Duration,
}

impl Default for DatabaseHandler {
    fn default() -> Self {
        Self {
            field: "password".to_string(),
            grace: Duration::hours(DATABASE_GRACE_PERIOD_HOURS),
        }
    }
}

#[async_trait]
impl RotationHandler for DatabaseHandler {
    async fn execute(
        &self,
        client: &SecretStoreClient,
        path: &str,
        _policy: &RotationPolicy,
    ) -> Result<bool, HandlerError> {
        let current = read_current(client, path).await?;
        let password = random::generate_password(DATABASE_PASSWORD_LEN)
            .map_err(|e| HandlerError::Generation(e.to_string()))?;

        let now = Utc::now();
        let mut data = current.data.clone();
        if let Some(old) = data.insert(self.field.clone(), password) {
            data.insert(format!("previous_{}", self.field), old);
            data.insert(
                format!("previous_{}_expires_at", self.field),
                (now + self.grace).to_rfc3339(),
            );
        }
        data.insert("rotated_at".to_string(), now.to_rfc3339());

        client.write_secret(path, data, WriteOptions::default()).await?;
        info!(path = path, "Database credential rotated");
        Ok(true)
    }
}

/// Generates a new API key, keeping the old one under `previous_key`.
pub struct ApiKeyHandler {
    default_prefix: String,
}

impl Default for ApiKeyHandler {
    fn default() -> Self {
        Self {
            default_prefix: "vk".to_string(),
        }
    }
}

#[async_trait]
impl RotationHandler for ApiKeyHandler {
    async fn execute(
        &self,
        client: &SecretStoreClient,
        path: &str,
        _policy: &RotationPolicy,
    ) -> Result<bool, HandlerError> {
        let current = read_current(client, path).await?;
        let prefix = current
            .field("key_prefix")
            .unwrap_or(self.default_prefix.as_str())
            .to_string();

        let mut data = current.data.clone();
        if let Some(old) = data.insert("api_key".to_string(), random::generate_api_key(&prefix)) {
            data.insert("previous_key".to_string(), old);
        }
        data.insert("rotated_at".to_string(), Utc::now().to_rfc3339());

        client.write_secret(path, data, WriteOptions::default()).await?;
        info!(path = path, "API key rotated");
        Ok(true)
    }
}

/// Placeholder for certificate issuance, which happens outside this crate.
pub struct CertificateHandler;

#[async_trait]
impl RotationHandler for CertificateHandler {
    async fn execute(
        &self,
        _client: &SecretStoreClient,
        path: &str,
        _policy: &RotationPolicy,
    ) -> Result<bool, HandlerError> {
        info!(path = path, "Certificate rotation delegated to issuer");
        Ok(true)
    }
}

/// Read-modify-write that stamps `last_rotated`.
pub struct GenericHandler;

#[async_trait]
impl RotationHandler for GenericHandler {
    async fn execute(
        &self,
        client: &SecretStoreClient,
        path: &str,
        _policy: &RotationPolicy,
    ) -> Result<bool, HandlerError> {
        let current = read_current(client, path).await?;
        let mut data = current.data.clone();
        data.insert("last_rotated".to_string(), Utc::now().to_rfc3339());

        client.write_secret(path, data, WriteOptions::default()).await?;
        debug!(path = path, "Secret stamped");
        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use vaultkeep_client::ConnectionConfig;
    use vaultkeep_storage::{Credentials, MemoryStore};

    fn client() -> SecretStoreClient {
        let store = MemoryStore::new().with_credentials(Credentials::Token {
            token: "root".into(),
        });
        SecretStoreClient::new(
            ConnectionConfig::token("memory://local", "root"),
            Arc::new(store),
        )
        .unwrap()
    }

    async fn seed(client: &SecretStoreClient, path: &str, pairs: &[(&str, &str)]) {
        let data = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        client
            .write_secret(path, data, WriteOptions::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_database_keeps_previous_password() {
        let client = client();
        seed(&client, "db/main", &[("username", "app"), ("password", "old-pass")]).await;

        let ok = DatabaseHandler::default()
            .execute(&client, "db/main", &RotationPolicy::new("db/main"))
            .await
            .unwrap();
        assert!(ok);

        let secret = client.get_secret("db/main", ReadOptions::default()).await.unwrap();
        assert_eq!(secret.version, Some(2));
        assert_eq!(secret.field("username"), Some("app"));
        assert_eq!(secret.field("previous_password"), Some("old-pass"));
        assert_eq!(secret.field("password").unwrap().len(), DATABASE_PASSWORD_LEN);
        assert_ne!(secret.field("password"), Some("old-pass"));
        assert!(secret.field("previous_password_expires_at").is_some());
        assert!(secret.field("rotated_at").is_some());
    }

    #[tokio::test]
    async fn test_api_key_keeps_previous_key() {
        let client = client();
        seed(&client, "svc/key", &[("api_key", "sk_old"), ("key_prefix", "sk")]).await;

        ApiKeyHandler::default()
            .execute(&client, "svc/key", &RotationPolicy::new("svc/key"))
            .await
            .unwrap();

        let secret = client.get_secret("svc/key", ReadOptions::default()).await.unwrap();
        assert_eq!(secret.field("previous_key"), Some("sk_old"));
        assert!(secret.field("api_key").unwrap().starts_with("sk_"));
    }

    #[tokio::test]
    async fn test_generic_stamps_and_missing_secret_fails() {
        let client = client();
        seed(&client, "misc", &[("v", "1")]).await;

        GenericHandler
            .execute(&client, "misc", &RotationPolicy::new("misc"))
            .await
            .unwrap();
        let secret = client.get_secret("misc", ReadOptions::default()).await.unwrap();
        assert_eq!(secret.field("v"), Some("1"));
        assert!(secret.field("last_rotated").is_some());

        let missing = GenericHandler
            .execute(&client, "absent", &RotationPolicy::new("absent"))
            .await;
        assert!(matches!(missing, Err(HandlerError::Client(_))));
    }

    #[tokio::test]
    async fn test_certificate_is_noop() {
        let client = client();
        assert!(CertificateHandler
            .execute(&client, "tls/site", &RotationPolicy::new("tls/site"))
            .await
            .unwrap());
        assert!(client.get_secret("tls/site", ReadOptions::default()).await.is_err());
    }

    #[test]
    fn test_registry_fallback() {
        let registry = HandlerRegistry::with_builtins();
        assert_eq!(
            registry.kinds(),
            vec!["api_key", "certificate", "database", "generic"]
        );
        assert!(Arc::ptr_eq(&registry.resolve("nope"), &registry.resolve("generic")));
    }
}
