//! In-process secret store.
//!
//! Implements the full versioned semantics of [`SecretStore`] in memory:
//! latest-live reads, soft deletes of named versions, hard destroys and
//! hierarchical listing. Sessions are issued only for registered
//! credentials and carry a lease.
//!
//! Operator controls (`seal`, `expire_sessions`, `deny_prefix`) and call
//! counters make it usable as a test double for failure paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use vaultkeep_crypto::random;

use crate::error::StoreError;
use crate::store::SecretStore;
use crate::types::{
    children_of, Credentials, Session, StoreMetadata, StoredSecret, VersionState, WriteReceipt,
};

/// Default session lease.
const DEFAULT_LEASE: Duration = Duration::from_secs(3600);

struct VersionRecord {
    data: HashMap<String, String>,
    state: VersionState,
}

struct PathEntry {
    versions: BTreeMap<u32, VersionRecord>,
    current_version: u32,
    created_time: DateTime<Utc>,
    updated_time: DateTime<Utc>,
}

#[derive(Default)]
struct MemoryState {
    sealed: bool,
    entries: BTreeMap<String, PathEntry>,
    sessions: HashMap<String, Session>,
    credentials: Vec<Credentials>,
    denied_prefixes: Vec<String>,
}

impl MemoryState {
    fn authorize(&self, token: &str, path: &str) -> Result<(), StoreError> {
        if self.sealed {
            return Err(StoreError::Sealed);
        }
        let session = self.sessions.get(token).ok_or(StoreError::InvalidToken)?;
        if session.is_expired(Utc::now()) {
            return Err(StoreError::InvalidToken);
        }
        if self
            .denied_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
        {
            return Err(StoreError::PermissionDenied(path.to_string()));
        }
        Ok(())
    }
}

/// In-memory implementation of [`SecretStore`].
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    lease: Option<Duration>,
    echo_versions: bool,
    reads: AtomicU64,
    logins: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty, unsealed store with no registered credentials.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            lease: Some(DEFAULT_LEASE),
            echo_versions: true,
            reads: AtomicU64::new(0),
            logins: AtomicU64::new(0),
        }
    }

    /// Registers credentials that `login` will accept.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.state.get_mut().credentials.push(credentials);
        self
    }

    /// Sets the lease of issued sessions (`None` = never expires).
    pub fn with_lease(mut self, lease: Option<Duration>) -> Self {
        self.lease = lease;
        self
    }

    /// Stops reporting new version numbers on write.
    pub fn without_version_echo(mut self) -> Self {
        self.echo_versions = false;
        self
    }

    /// Seals the store; every call fails with [`StoreError::Sealed`].
    pub async fn seal(&self) {
        self.state.write().await.sealed = true;
    }

    /// Unseals the store.
    pub async fn unseal(&self) {
        self.state.write().await.sealed = false;
    }

    /// Invalidates every issued session token.
    pub async fn expire_sessions(&self) {
        let mut state = self.state.write().await;
        let count = state.sessions.len();
        state.sessions.clear();
        debug!(count = count, "Expired all sessions");
    }

    /// Denies every data operation under `prefix`.
    pub async fn deny_prefix(&self, prefix: impl Into<String>) {
        self.state.write().await.denied_prefixes.push(prefix.into());
    }

    /// Number of `read` calls served so far.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of successful logins so far.
    pub fn login_count(&self) -> u64 {
        self.logins.load(Ordering::Relaxed)
    }

    /// Number of currently held sessions.
    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn login(&self, credentials: &Credentials) -> Result<Session, StoreError> {
        let mut state = self.state.write().await;
        if state.sealed {
            return Err(StoreError::Sealed);
        }
        if !state.credentials.contains(credentials) {
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
        state
            .sessions
            .insert(session.token.clone(), session.clone());
        self.logins.fetch_add(1, Ordering::Relaxed);

        debug!(method = credentials.method(), "Session issued");
        Ok(session)
    }

    async fn revoke(&self, token: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.sealed {
            return Err(StoreError::Sealed);
        }
        state.sessions.remove(token);
        Ok(())
    }

    async fn read(
        &self,
        token: &str,
        path: &str,
        version: Option<u32>,
    ) -> Result<StoredSecret, StoreError> {
        let state = self.state.read().await;
        state.authorize(token, path)?;
        self.reads.fetch_add(1, Ordering::Relaxed);

        let entry = state
            .entries
            .get(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;

        let found = match version {
            Some(v) => entry
                .versions
                .get(&v)
                .filter(|record| record.state.is_live())
                .map(|record| (v, record)),
            None => entry
                .versions
                .iter()
                .rev()
                .find(|(_, record)| record.state.is_live())
                .map(|(v, record)| (*v, record)),
        };

        let (version, record) = found.ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        Ok(StoredSecret {
            path: path.to_string(),
            data: record.data.clone(),
            version,
            created_time: record.state.created_time,
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

        let mut state = self.state.write().await;
        state.authorize(token, path)?;

        if let Some(expected) = cas {
            let found = state
                .entries
                .get(path)
                .map(|entry| entry.current_version)
                .unwrap_or(0);
            if found != expected {
                return Err(StoreError::CasMismatch { expected, found });
            }
        }

        let now = Utc::now();
        let entry = state
            .entries
            .entry(path.to_string())
            .or_insert_with(|| PathEntry {
                versions: BTreeMap::new(),
                current_version: 0,
                created_time: now,
                updated_time: now,
            });

        entry.current_version += 1;
        entry.updated_time = now;
        entry.versions.insert(
            entry.current_version,
            VersionRecord {
                data: data.clone(),
                state: VersionState {
                    created_time: now,
                    deletion_time: None,
                },
            },
        );

        debug!(path = path, version = entry.current_version, "Secret stored");
        Ok(WriteReceipt {
            version: self.echo_versions.then_some(entry.current_version),
            created_time: now,
        })
    }

    async fn delete_versions(
        &self,
        token: &str,
        path: &str,
        versions: &[u32],
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.authorize(token, path)?;

        let now = Utc::now();
        if let Some(entry) = state.entries.get_mut(path) {
            for version in versions {
                if let Some(record) = entry.versions.get_mut(version) {
                    record.state.deletion_time.get_or_insert(now);
                }
            }
            entry.updated_time = now;
        }
        Ok(())
    }

    async fn destroy(&self, token: &str, path: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.authorize(token, path)?;
        state.entries.remove(path);
        Ok(())
    }

    async fn list(&self, token: &str, path: &str) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().await;
        state.authorize(token, path)?;
        Ok(children_of(state.entries.keys().map(String::as_str), path))
    }

    async fn metadata(&self, token: &str, path: &str) -> Result<StoreMetadata, StoreError> {
        let state = self.state.read().await;
        state.authorize(token, path)?;

        let entry = state
            .entries
            .get(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;

        Ok(StoreMetadata {
            path: path.to_string(),
            current_version: entry.current_version,
            created_time: entry.created_time,
            updated_time: entry.updated_time,
            versions: entry
                .versions
                .iter()
                .map(|(v, record)| (*v, record.state.clone()))
                .collect(),
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
