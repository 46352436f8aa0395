//! Caller-facing secret types.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use vaultkeep_storage::VersionState;

/// One version of a secret, addressed by its logical path.
#[derive(Clone, PartialEq, Serialize)]
pub struct Secret {
    /// Logical path (no mount or namespace).
    pub path: String,
    /// Key/value data.
    pub data: HashMap<String, String>,
    /// Version number. `None` after a write to a store that does not echo it.
    pub version: Option<u32>,
    /// Creation time of this version.
    pub created_time: DateTime<Utc>,
}

impl Secret {
    /// Returns the value of one field.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.data.keys().collect();
        keys.sort();
        f.debug_struct("Secret")
            .field("path", &self.path)
            .field("keys", &keys)
            .field("version", &self.version)
            .field("created_time", &self.created_time)
            .finish()
    }
}

/// Version and timing information of a secret, without data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecretMetadata {
    /// Logical path.
    pub path: String,
    /// Highest version ever written.
    pub current_version: u32,
    /// Highest version that can still be read.
    pub latest_live_version: Option<u32>,
    /// Creation time of the first version.
    pub created_time: DateTime<Utc>,
    /// Time of the last change.
    pub updated_time: DateTime<Utc>,
    /// Per-version state.
    pub versions: BTreeMap<u32, VersionState>,
}

/// Options for [`get_secret`](crate::SecretStoreClient::get_secret).
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    /// Read a specific version instead of the latest live one.
    pub version: Option<u32>,
    /// Serve from and populate the cache.
    pub use_cache: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            version: None,
            use_cache: true,
        }
    }
}

impl ReadOptions {
    /// Reads a pinned version.
    pub fn version(version: u32) -> Self {
        Self {
            version: Some(version),
            ..Self::default()
        }
    }

    /// Bypasses the cache.
    pub fn uncached() -> Self {
        Self {
            use_cache: false,
            ..Self::default()
        }
    }
}

/// Options for [`write_secret`](crate::SecretStoreClient::write_secret).
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Only write if the current version equals this (0 = must not exist).
    pub cas: Option<u32>,
}
