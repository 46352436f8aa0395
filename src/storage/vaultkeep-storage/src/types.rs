//! Wire-agnostic store types.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Login credentials for one of the supported auth methods.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Machine login with a role id and a secret id.
    AppRole {
        /// Role identifier.
        role_id: String,
        /// Secret identifier.
        secret_id: String,
    },
    /// A pre-issued static token.
    Token {
        /// The token.
        token: String,
    },
    /// Kubernetes service-account login.
    Kubernetes {
        /// Store-side role bound to the service account.
        role: String,
        /// Service-account JWT.
        jwt: String,
    },
    /// Username/password held by the store.
    UserPass {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// Username/password checked against a directory.
    Ldap {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
}

impl Credentials {
    /// Short name of the auth method.
    pub fn method(&self) -> &'static str {
        match self {
            Credentials::AppRole { .. } => "approle",
            Credentials::Token { .. } => "token",
            Credentials::Kubernetes { .. } => "kubernetes",
            Credentials::UserPass { .. } => "userpass",
            Credentials::Ldap { .. } => "ldap",
        }
    }

    /// Public half of the credential. Static tokens have none.
    pub fn principal(&self) -> &str {
        match self {
            Credentials::AppRole { role_id, .. } => role_id,
            Credentials::Token { .. } => "*",
            Credentials::Kubernetes { role, .. } => role,
            Credentials::UserPass { username, .. } | Credentials::Ldap { username, .. } => {
                username
            },
        }
    }

    /// Secret half of the credential.
    pub fn secret(&self) -> &str {
        match self {
            Credentials::AppRole { secret_id, .. } => secret_id,
            Credentials::Token { token } => token,
            Credentials::Kubernetes { jwt, .. } => jwt,
            Credentials::UserPass { password, .. } | Credentials::Ldap { password, .. } => {
                password
            },
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("method", &self.method())
            .field("principal", &self.principal())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// An authenticated session.
#[derive(Clone)]
pub struct Session {
    /// Session token presented on every call.
    pub token: String,
    /// Lease duration; `None` means the token does not expire.
    pub lease: Option<Duration>,
    /// When the session was issued.
    pub issued_at: DateTime<Utc>,
}

impl Session {
    /// Whether the lease has elapsed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.lease.and_then(|lease| chrono::Duration::from_std(lease).ok()) {
            Some(lease) => now >= self.issued_at + lease,
            None => false,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"[REDACTED]")
            .field("lease", &self.lease)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// One version of a secret as returned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSecret {
    /// Full backend path.
    pub path: String,
    /// Key/value data.
    pub data: HashMap<String, String>,
    /// Version number (>= 1).
    pub version: u32,
    /// Creation time of this version.
    pub created_time: DateTime<Utc>,
}

/// Result of a write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriteReceipt {
    /// New version, when the store echoes it.
    pub version: Option<u32>,
    /// Creation time of the new version.
    pub created_time: DateTime<Utc>,
}

/// State of a single version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionState {
    /// Creation time.
    pub created_time: DateTime<Utc>,
    /// Soft-deletion time, if deleted.
    pub deletion_time: Option<DateTime<Utc>>,
}

impl VersionState {
    /// Whether this version can still be read.
    pub fn is_live(&self) -> bool {
        self.deletion_time.is_none()
    }
}

/// Version and timing metadata of a path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMetadata {
    /// Full backend path.
    pub path: String,
    /// Highest version ever written.
    pub current_version: u32,
    /// Creation time of the first version.
    pub created_time: DateTime<Utc>,
    /// Time of the last write or delete.
    pub updated_time: DateTime<Utc>,
    /// Per-version state.
    pub versions: BTreeMap<u32, VersionState>,
}

impl StoreMetadata {
    /// Highest version that has not been soft-deleted.
    pub fn latest_live_version(&self) -> Option<u32> {
        self.versions
            .iter()
            .rev()
            .find(|(_, state)| state.is_live())
            .map(|(version, _)| *version)
    }
}

/// Collects the immediate children of `prefix` among `keys`.
///
/// Children with further segments are reported once as `name/`. The result
/// is sorted.
pub fn children_of<'a>(keys: impl IntoIterator<Item = &'a str>, prefix: &str) -> Vec<String> {
    let prefix = if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{prefix}/")
    };

    let names: BTreeSet<String> = keys
        .into_iter()
        .filter_map(|key| key.strip_prefix(prefix.as_str()))
        .filter(|rest| !rest.is_empty())
        .map(|rest| match rest.split_once('/') {
            Some((folder, _)) => format!("{folder}/"),
            None => rest.to_string(),
        })
        .collect();

    names.into_iter().collect()
}
