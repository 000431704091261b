//! Serial-keyed store of pre-signed responses.
//!
//! The store never mutates a published map. Each batch pass builds a fresh
//! [`CacheSnapshot`] off to the side and swaps it in behind a shared
//! pointer; the write guard is held only for the pointer assignment, so
//! request handlers never wait on a refresh. Readers clone the snapshot
//! pointer once per lookup and resolve the key against that immutable map,
//! which makes every lookup see either the previous snapshot or the new one,
//! never a half-built map.

use crate::cache::response::CachedResponse;
use crate::entry::serial_hex;
use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// One immutable generation of the response cache.
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    entries: HashMap<String, CachedResponse>,
    updated_at: DateTime<Utc>,
}

impl CacheSnapshot {
    fn empty(updated_at: DateTime<Utc>) -> Self {
        Self { entries: HashMap::new(), updated_at }
    }

    pub fn get(&self, serial: &BigUint) -> Option<&CachedResponse> {
        self.entries.get(&serial_hex(serial))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// When this snapshot was published.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// Shared store holding the current [`CacheSnapshot`].
///
/// There are no per-item add or delete operations: the refresh batch
/// replaces the whole cache at once and request handlers only read.
#[derive(Debug)]
pub struct ResponseCacheStore {
    current: RwLock<Arc<CacheSnapshot>>,
}

impl ResponseCacheStore {
    pub fn new() -> Self {
        Self { current: RwLock::new(Arc::new(CacheSnapshot::empty(Utc::now()))) }
    }

    /// Builds a fresh snapshot from `caches` and publishes it, returning the
    /// rejected caches.
    ///
    /// A cache is rejected when its signed response bytes are empty or its
    /// serial collides with another cache in the batch. On the first
    /// collision for a key, the copy already accepted is ejected together
    /// with the collider and the key is poisoned so later colliders are
    /// rejected without re-ejecting anything.
    pub fn replace(&self, caches: Vec<CachedResponse>) -> Vec<CachedResponse> {
        let mut rejected = Vec::new();
        let mut entries: HashMap<String, CachedResponse> = HashMap::with_capacity(caches.len());
        let mut poisoned: HashSet<String> = HashSet::new();

        for cache in caches {
            let key = serial_hex(&cache.template().serial);

            if poisoned.contains(&key) {
                rejected.push(cache);
                continue;
            }

            if let Some(prior) = entries.remove(&key) {
                rejected.push(prior);
                rejected.push(cache);
                poisoned.insert(key);
                continue;
            }

            if cache.response().is_empty() {
                rejected.push(cache);
                continue;
            }

            entries.insert(key, cache);
        }

        let snapshot = Arc::new(CacheSnapshot { entries, updated_at: Utc::now() });
        *self.current.write().expect("cache snapshot lock poisoned") = snapshot;

        rejected
    }

    /// Looks up the pre-signed response for `serial` in the current
    /// snapshot.
    pub fn get(&self, serial: &BigUint) -> Option<CachedResponse> {
        self.snapshot().get(serial).cloned()
    }

    /// Drops every cached response by publishing an empty snapshot.
    pub fn truncate(&self) {
        self.replace(Vec::new());
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        Arc::clone(&self.current.read().expect("cache snapshot lock poisoned"))
    }

    /// When the current snapshot was published.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.snapshot().updated_at()
    }
}

impl Default for ResponseCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only handle over a [`ResponseCacheStore`], the only view request
/// handlers get.
#[derive(Debug, Clone)]
pub struct ReadOnlyCacheStore {
    store: Arc<ResponseCacheStore>,
}

impl ReadOnlyCacheStore {
    pub fn new(store: Arc<ResponseCacheStore>) -> Self {
        Self { store }
    }

    pub fn get(&self, serial: &BigUint) -> Option<CachedResponse> {
        self.store.get(serial)
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.store.updated_at()
    }
}
