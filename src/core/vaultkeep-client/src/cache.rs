//! TTL read-through cache for secrets.
//!
//! Entries are keyed by full backend path plus the pinned version, if any.
//! A single counter is bumped on every invalidation and each invalidated
//! path remembers the counter value it was last invalidated at. A fetch may
//! only populate the cache if its path was not invalidated after the counter
//! value it observed before going to the store, so a read racing a write can
//! never reinsert the value the write replaced.
//!
//! At most [`MAX_TRACKED_PATHS`] invalidations are remembered. Past that the
//! map is dropped and a floor is raised instead: fetches that started before
//! the floor are not cached.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::secret::Secret;

type CacheKey = (String, Option<u32>);

/// Invalidated paths remembered before the floor is raised.
pub(crate) const MAX_TRACKED_PATHS: usize = 1024;

struct CacheEntry {
    secret: Secret,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_valid(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Invalidation counter observed before a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Generation(u64);

pub(crate) struct SecretCache {
    ttl: Duration,
    entries: HashMap<CacheKey, CacheEntry>,
    invalidated: HashMap<String, u64>,
    counter: u64,
    floor: u64,
}

impl SecretCache {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
            invalidated: HashMap::new(),
            counter: 0,
            floor: 0,
        }
    }

    fn enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Returns a live entry. Expired entries are dropped on sight.
    pub(crate) fn get(&mut self, path: &str, version: Option<u32>) -> Option<Secret> {
        if !self.enabled() {
            return None;
        }
        let now = Instant::now();

        if let Some(found) = self.lookup(&(path.to_string(), version), now) {
            return Some(found);
        }

        // A pinned read can be served by the latest entry if it is that version.
        if version.is_some() {
            if let Some(latest) = self.lookup(&(path.to_string(), None), now) {
                if latest.version == version {
                    return Some(latest);
                }
            }
        }
        None
    }

    fn lookup(&mut self, key: &CacheKey, now: Instant) -> Option<Secret> {
        match self.entries.get(key) {
            Some(entry) if entry.is_valid(now) => Some(entry.secret.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            },
            None => None,
        }
    }

    pub(crate) fn generation(&self) -> Generation {
        Generation(self.counter)
    }

    fn is_current(&self, path: &str, seen: Generation) -> bool {
        seen.0 >= self.floor && self.invalidated.get(path).map_or(true, |&at| at <= seen.0)
    }

    /// Stores a fetched secret unless `path` was invalidated since `seen`.
    ///
    /// Returns whether the entry was stored.
    pub(crate) fn insert(
        &mut self,
        path: &str,
        pinned: Option<u32>,
        secret: &Secret,
        seen: Generation,
    ) -> bool {
        if !self.enabled() || !self.is_current(path, seen) {
            return false;
        }
        let expires_at = Instant::now() + self.ttl;

        match pinned {
            None => {
                self.entries.insert(
                    (path.to_string(), None),
                    CacheEntry { secret: secret.clone(), expires_at },
                );
            },
            Some(version) => {
                self.entries.insert(
                    (path.to_string(), Some(version)),
                    CacheEntry { secret: secret.clone(), expires_at },
                );
                // Refresh the latest entry only when it already holds this version.
                if let Some(latest) = self.entries.get_mut(&(path.to_string(), None)) {
                    if latest.secret.version == Some(version) {
                        latest.secret = secret.clone();
                        latest.expires_at = expires_at;
                    }
                }
            },
        }
        true
    }

    /// Drops every entry of `path` and marks it invalidated now.
    pub(crate) fn invalidate(&mut self, path: &str) {
        self.entries.retain(|(key, _), _| key != path);
        self.counter += 1;
        if self.invalidated.len() >= MAX_TRACKED_PATHS && !self.invalidated.contains_key(path) {
            self.invalidated.clear();
            self.floor = self.counter;
        } else {
            self.invalidated.insert(path.to_string(), self.counter);
        }
    }

    /// Drops every entry and rejects every fetch already in flight.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.counter += 1;
        self.invalidated.clear();
        self.floor = self.counter;
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
