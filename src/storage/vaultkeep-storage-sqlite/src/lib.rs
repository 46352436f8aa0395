//! # Vaultkeep Storage - SQLite Store
//!
//! A self-hosted, durable implementation of [`SecretStore`] backed by a
//! single SQLite file. Versions are kept per path with soft-delete markers;
//! login credentials are stored as Argon2id hashes and sessions are issued
//! in memory with a lease.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tokio::sync::RwLock;
use tracing::{debug, info};

use vaultkeep_crypto::{password, random};
use vaultkeep_storage::types::children_of;
use vaultkeep_storage::{
    Credentials, SecretStore, Session, StoreError, StoreMetadata, StoredSecret, VersionState,
    WriteReceipt,
};

/// Default session lease.
const DEFAULT_LEASE: Duration = Duration::from_secs(3600);

/// SQL schema for the store.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS secrets (
    path             TEXT PRIMARY KEY,
    current_version  INTEGER NOT NULL,
    created_at       INTEGER NOT NULL,
    updated_at       INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS secret_versions (
    path        TEXT NOT NULL,
    version     INTEGER NOT NULL,
    data        TEXT NOT NULL,
    created_at  INTEGER NOT NULL,
    deleted_at  INTEGER,
    PRIMARY KEY (path, version)
);

CREATE TABLE IF NOT EXISTS auth_credentials (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    method       TEXT NOT NULL,
    principal    TEXT NOT NULL,
    secret_hash  TEXT NOT NULL,
    created_at   INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_secret_versions_path ON secret_versions(path);
CREATE INDEX IF NOT EXISTS idx_auth_credentials_lookup ON auth_credentials(method, principal)
"#;

/// SQLite-backed secret store.
///
/// The database lives at `{base_path}/{name}.db`.
pub struct SqliteStore {
    pool: SqlitePool,
    sessions: RwLock<HashMap<String, Session>>,
    lease: Option<Duration>,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Opens or creates a store database.
    ///
    /// # Arguments
    ///
    /// * `base_path` - Directory where the database is stored
    /// * `name` - Database name (must match `[a-z0-9_-]+`)
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The name is invalid
    /// - The directory cannot be created
    /// - The database connection fails
    pub async fn open(base_path: impl AsRef<Path>, name: &str) -> Result<Self, StoreError> {
        Self::validate_name(name)?;

        let base = base_path.as_ref();
        std::fs::create_dir_all(base).map_err(|e| {
            StoreError::Unreachable(format!("failed to create directory: {e}"))
        })?;

        let db_path = base.join(format!("{name}.db"));
        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

        debug!(path = %db_path.display(), "Opening SQLite store");

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;

        let store = Self {
            pool,
            sessions: RwLock::new(HashMap::new()),
            lease: Some(DEFAULT_LEASE),
            db_path,
        };

        store.migrate().await?;

        info!(name = %name, "SQLite store ready");

        Ok(store)
    }

    /// Sets the lease of issued sessions (`None` = never expires).
    pub fn with_lease(mut self, lease: Option<Duration>) -> Self {
        self.lease = lease;
        self
    }

    /// Path of the database file.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Validates that a database name is safe.
    ///
    /// Only allows: lowercase letters, digits, underscore, hyphen.
    fn validate_name(name: &str) -> Result<(), StoreError> {
        if name.is_empty() {
            return Err(StoreError::InvalidRequest("store name cannot be empty".into()));
        }

        if name.len() > 64 {
            return Err(StoreError::InvalidRequest("store name too long".into()));
        }

        let valid = name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');

        if !valid {
            return Err(StoreError::InvalidRequest(
                "store name must match [a-z0-9_-]+".into(),
            ));
        }

        Ok(())
    }

    /// Creates the schema.
    async fn migrate(&self) -> Result<(), StoreError> {
        debug!("Running store migrations");

        for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement.trim())
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))?;
        }

        Ok(())
    }

    /// Registers credentials that `login` will accept.
    ///
    /// Only an Argon2id hash of the secret half is stored. Re-registering a
    /// principal replaces its previous secret; static tokens accumulate.
    pub async fn register_credentials(&self, credentials: &Credentials) -> Result<(), StoreError> {
        let hash = password::hash_credential(credentials.secret())
            .map_err(|e| StoreError::InvalidRequest(e.to_string()))?;

        let mut tx = self.pool.begin().await.map_err(query_failed)?;

        if !matches!(credentials, Credentials::Token { .. }) {
            sqlx::query("DELETE FROM auth_credentials WHERE method = ? AND principal = ?")
                .bind(credentials.method())
                .bind(credentials.principal())
                .execute(&mut *tx)
                .await
                .map_err(query_failed)?;
        }

        sqlx::query(
            "INSERT INTO auth_credentials (method, principal, secret_hash, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(credentials.method())
        .bind(credentials.principal())
        .bind(&hash)
        .bind(now_millis())
        .execute(&mut *tx)
        .await
        .map_err(query_failed)?;

        tx.commit().await.map_err(query_failed)?;

        info!(
            method = credentials.method(),
            principal = credentials.principal(),
            "Credentials registered"
        );
        Ok(())
    }

    async fn authorize(&self, token: &str) -> Result<(), StoreError> {
        let sessions = self.sessions.read().await;
        match sessions.get(token) {
            Some(session) if !session.is_expired(Utc::now()) => Ok(()),
            _ => Err(StoreError::InvalidToken),
        }
    }

    async fn versions_of(&self, path: &str) -> Result<BTreeMap<u32, VersionState>, StoreError> {
        let rows: Vec<(i64, i64, Option<i64>)> = sqlx::query_as(
            "SELECT version, created_at, deleted_at FROM secret_versions WHERE path = ? ORDER BY version",
        )
        .bind(path)
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;

        Ok(rows
            .into_iter()
            .map(|(version, created_at, deleted_at)| {
                (
                    version as u32,
                    VersionState {
                        created_time: from_millis(created_at),
                        deletion_time: deleted_at.map(from_millis),
                    },
                )
            })
            .collect())
    }
}

#[async_trait]
impl SecretStore for SqliteStore {
    async fn login(&self, credentials: &Credentials) -> Result<Session, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT secret_hash FROM auth_credentials WHERE method = ? AND principal = ?",
        )
        .bind(credentials.method())
        .bind(credentials.principal())
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;

        let mut accepted = false;
        for (hash,) in &rows {
            if password::verify_credential(credentials.secret(), hash)
                .map_err(|e| StoreError::Backend(e.to_string()))?
            {
                accepted = true;
                break;
            }
        }

        if !accepted {
            return Err(StoreError::AuthRejected(format!(
                "{} login failed",
                credentials.method()
            )));
        }

        let session = Session {
            token: format!("s.{}", random::generate_token(16)),
            lease: self.lease,
            issued_at: Utc::now(),
        };
        self.sessions
            .write()
            .await
            .insert(session.token.clone(), session.clone());

        debug!(method = credentials.method(), "Session issued");
        Ok(session)
    }

    async fn revoke(&self, token: &str) -> Result<(), StoreError> {
        self.sessions.write().await.remove(token);
        Ok(())
    }

    async fn read(
        &self,
        token: &str,
        path: &str,
        version: Option<u32>,
    ) -> Result<StoredSecret, StoreError> {
        self.authorize(token).await?;

        let row: Option<(i64, String, i64)> = match version {
            Some(v) => sqlx::query_as(
                "SELECT version, data, created_at FROM secret_versions WHERE path = ? AND version = ? AND deleted_at IS NULL",
            )
            .bind(path)
            .bind(v as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?,
            None => sqlx::query_as(
                "SELECT version, data, created_at FROM secret_versions WHERE path = ? AND deleted_at IS NULL ORDER BY version DESC LIMIT 1",
            )
            .bind(path)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?,
        };

        let (version, data_json, created_at) =
            row.ok_or_else(|| StoreError::NotFound(path.to_string()))?;

        let data = serde_json::from_str(&data_json)
            .map_err(|e| StoreError::Backend(format!("corrupt secret data: {e}")))?;

        Ok(StoredSecret {
            path: path.to_string(),
            data,
            version: version as u32,
            created_time: from_millis(created_at),
        })
    }

    async fn write(
        &self,
        token: &str,
        path: &str,
        data: &HashMap<String, String>,
        cas: Option<u32>,
    ) -> Result<WriteReceipt, StoreError> {
        if path.is_empty() || path.ends_with('/') {
            return Err(StoreError::InvalidRequest(format!(
                "cannot write to folder path '{path}'"
            )));
        }
        self.authorize(token).await?;

        let data_json = serde_json::to_string(data)
            .map_err(|e| StoreError::InvalidRequest(format!("serialization failed: {e}")))?;
        let now = now_millis();

        let mut tx = self.pool.begin().await.map_err(query_failed)?;

        let existing: Option<(i64,)> =
            sqlx::query_as("SELECT current_version FROM secrets WHERE path = ?")
                .bind(path)
                .fetch_optional(&mut *tx)
                .await
                .map_err(query_failed)?;

        let current = existing.map(|(v,)| v as u32).unwrap_or(0);
        if let Some(expected) = cas {
            if current != expected {
                return Err(StoreError::CasMismatch {
                    expected,
                    found: current,
                });
            }
        }

        let new_version = current + 1;

        sqlx::query(
            r#"
            INSERT INTO secrets (path, current_version, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                current_version = excluded.current_version,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(path)
        .bind(new_version as i64)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(query_failed)?;

        sqlx::query(
            "INSERT INTO secret_versions (path, version, data, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(path)
        .bind(new_version as i64)
        .bind(&data_json)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(query_failed)?;

        tx.commit().await.map_err(query_failed)?;

        debug!(path = path, version = new_version, "Secret stored");
        Ok(WriteReceipt {
            version: Some(new_version),
            created_time: from_millis(now),
        })
    }

    async fn delete_versions(
        &self,
        token: &str,
        path: &str,
        versions: &[u32],
    ) -> Result<(), StoreError> {
        self.authorize(token).await?;
        let now = now_millis();

        let mut tx = self.pool.begin().await.map_err(query_failed)?;
        for version in versions {
            sqlx::query(
                "UPDATE secret_versions SET deleted_at = ? WHERE path = ? AND version = ? AND deleted_at IS NULL",
            )
            .bind(now)
            .bind(path)
            .bind(*version as i64)
            .execute(&mut *tx)
            .await
            .map_err(query_failed)?;
        }
        sqlx::query("UPDATE secrets SET updated_at = ? WHERE path = ?")
            .bind(now)
            .bind(path)
            .execute(&mut *tx)
            .await
            .map_err(query_failed)?;
        tx.commit().await.map_err(query_failed)?;

        debug!(path = path, count = versions.len(), "Secret versions deleted");
        Ok(())
    }

    async fn destroy(&self, token: &str, path: &str) -> Result<(), StoreError> {
        self.authorize(token).await?;

        let mut tx = self.pool.begin().await.map_err(query_failed)?;
        sqlx::query("DELETE FROM secret_versions WHERE path = ?")
            .bind(path)
            .execute(&mut *tx)
            .await
            .map_err(query_failed)?;
        sqlx::query("DELETE FROM secrets WHERE path = ?")
            .bind(path)
            .execute(&mut *tx)
            .await
            .map_err(query_failed)?;
        tx.commit().await.map_err(query_failed)?;

        info!(path = path, "Secret destroyed");
        Ok(())
    }

    async fn list(&self, token: &str, path: &str) -> Result<Vec<String>, StoreError> {
        self.authorize(token).await?;

        let prefix = if path.is_empty() || path.ends_with('/') {
            path.to_string()
        } else {
            format!("{path}/")
        };

        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT path FROM secrets WHERE substr(path, 1, ?) = ? ORDER BY path")
                .bind(prefix.chars().count() as i64)
                .bind(&prefix)
                .fetch_all(&self.pool)
                .await
                .map_err(query_failed)?;

        Ok(children_of(rows.iter().map(|(p,)| p.as_str()), &prefix))
    }

    async fn metadata(&self, token: &str, path: &str) -> Result<StoreMetadata, StoreError> {
        self.authorize(token).await?;

        let row: Option<(i64, i64, i64)> = sqlx::query_as(
            "SELECT current_version, created_at, updated_at FROM secrets WHERE path = ?",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed)?;

        let (current_version, created_at, updated_at) =
            row.ok_or_else(|| StoreError::NotFound(path.to_string()))?;

        Ok(StoreMetadata {
            path: path.to_string(),
            current_version: current_version as u32,
            created_time: from_millis(created_at),
            updated_time: from_millis(updated_at),
            versions: self.versions_of(path).await?,
        })
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

fn query_failed(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn approle() -> Credentials {
        Credentials::AppRole {
            role_id: "etl".into(),
            secret_id: "s3cr3t-id".into(),
        }
    }

    fn data(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    async fn setup() -> (TempDir, SqliteStore, String) {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::open(tmp.path(), "test").await.unwrap();
        store.register_credentials(&approle()).await.unwrap();
        let token = store.login(&approle()).await.unwrap().token;
        (tmp, store, token)
    }

    #[tokio::test]
    async fn test_open_creates_db() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::open(tmp.path(), "vault").await.unwrap();

        assert!(store.db_path().exists(), "database file should be created");
        assert_eq!(store.db_path(), tmp.path().join("vault.db"));
    }

    #[tokio::test]
    async fn test_name_validation() {
        let tmp = TempDir::new().unwrap();

        for name in ["", "Vault", "my vault", "a/b", "../escape", "x.db"] {
            let result = SqliteStore::open(tmp.path(), name).await;
            assert!(
                matches!(result, Err(StoreError::InvalidRequest(_))),
                "should reject store name: {name}"
            );
        }
    }

    #[tokio::test]
    async fn test_login_verifies_hash() {
        let (_tmp, store, _token) = setup().await;

        let wrong = Credentials::AppRole {
            role_id: "etl".into(),
            secret_id: "guess".into(),
        };
        assert!(matches!(
            store.login(&wrong).await,
            Err(StoreError::AuthRejected(_))
        ));
    }

    #[tokio::test]
    async fn test_static_tokens_accumulate() {
        let (_tmp, store, _token) = setup().await;
        let first = Credentials::Token { token: "root-a".into() };
        let second = Credentials::Token { token: "root-b".into() };
        store.register_credentials(&first).await.unwrap();
        store.register_credentials(&second).await.unwrap();

        assert!(store.login(&first).await.is_ok());
        assert!(store.login(&second).await.is_ok());
    }

    #[tokio::test]
    async fn test_versioning_roundtrip() {
        let (_tmp, store, token) = setup().await;

        let v1 = store.write(&token, "secret/app/db", &data(&[("pass", "a")]), None).await.unwrap();
        let v2 = store.write(&token, "secret/app/db", &data(&[("pass", "b")]), None).await.unwrap();
        assert_eq!(v1.version, Some(1));
        assert_eq!(v2.version, Some(2));

        let latest = store.read(&token, "secret/app/db", None).await.unwrap();
        assert_eq!(latest.version, 2);
        assert_eq!(latest.data["pass"], "b");

        let first = store.read(&token, "secret/app/db", Some(1)).await.unwrap();
        assert_eq!(first.data["pass"], "a");
    }

    #[tokio::test]
    async fn test_soft_delete_and_metadata() {
        let (_tmp, store, token) = setup().await;

        store.write(&token, "secret/k", &data(&[("v", "1")]), None).await.unwrap();
        store.write(&token, "secret/k", &data(&[("v", "2")]), None).await.unwrap();
        store.delete_versions(&token, "secret/k", &[2]).await.unwrap();

        let latest = store.read(&token, "secret/k", None).await.unwrap();
        assert_eq!(latest.version, 1);

        let meta = store.metadata(&token, "secret/k").await.unwrap();
        assert_eq!(meta.current_version, 2);
        assert_eq!(meta.latest_live_version(), Some(1));
        assert!(meta.versions[&2].deletion_time.is_some());
    }

    #[tokio::test]
    async fn test_destroy_idempotent() {
        let (_tmp, store, token) = setup().await;

        store.write(&token, "secret/gone", &data(&[("v", "1")]), None).await.unwrap();
        store.destroy(&token, "secret/gone").await.unwrap();
        store.destroy(&token, "secret/gone").await.unwrap();

        assert!(matches!(
            store.read(&token, "secret/gone", None).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cas() {
        let (_tmp, store, token) = setup().await;

        store.write(&token, "secret/c", &data(&[("v", "1")]), Some(0)).await.unwrap();
        let result = store.write(&token, "secret/c", &data(&[("v", "2")]), Some(0)).await;
        assert!(matches!(
            result,
            Err(StoreError::CasMismatch { expected: 0, found: 1 })
        ));
    }

    #[tokio::test]
    async fn test_list() {
        let (_tmp, store, token) = setup().await;

        for path in ["secret/app/db", "secret/app/api/key", "secret/other", "secret/app_x"] {
            store.write(&token, path, &data(&[("v", "1")]), None).await.unwrap();
        }

        assert_eq!(store.list(&token, "secret/app").await.unwrap(), vec!["api/", "db"]);
        assert!(store.list(&token, "secret/none").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_token_rejected() {
        let (_tmp, store, token) = setup().await;
        store.revoke(&token).await.unwrap();

        assert!(matches!(
            store.read(&token, "secret/any", None).await,
            Err(StoreError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let store = SqliteStore::open(tmp.path(), "test").await.unwrap();
            store.register_credentials(&approle()).await.unwrap();
            let token = store.login(&approle()).await.unwrap().token;
            store.write(&token, "secret/keep", &data(&[("v", "1")]), None).await.unwrap();
        }

        let store = SqliteStore::open(tmp.path(), "test").await.unwrap();
        let token = store.login(&approle()).await.unwrap().token;
        let secret = store.read(&token, "secret/keep", None).await.unwrap();
        assert_eq!(secret.data["v"], "1");
    }
}
